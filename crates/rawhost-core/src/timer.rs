use crate::error::RuntimeError;
use crate::tick::{TickCounter, TickRate};

/// Number of timer slots. Registration fails once every slot is enabled.
pub const MAX_TIMERS: usize = 5;

/// Deferred callback. Receives the current interval in milliseconds and
/// returns the next one; returning 0 disables the slot.
///
/// Callbacks run inside the tick interrupt and must return quickly.
pub type TimerCallback = Box<dyn FnMut(u32) -> u32 + Send>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TimerId(u8);

impl TimerId {
    pub fn slot(self) -> usize {
        self.0 as usize
    }
}

struct TimerSlot {
    enabled: bool,
    interval_ms: u32,
    period: u32,
    deadline: TickCounter,
    callback: Option<TimerCallback>,
}

impl TimerSlot {
    fn empty() -> Self {
        Self {
            enabled: false,
            interval_ms: 0,
            period: 0,
            deadline: TickCounter::default(),
            callback: None,
        }
    }
}

/// Fixed-size table of periodic callbacks driven by the tick interrupt.
pub struct TimerScheduler {
    slots: [TimerSlot; MAX_TIMERS],
    rate: TickRate,
    stretch_percent: u32,
}

impl TimerScheduler {
    pub fn new(rate: TickRate) -> Self {
        Self {
            slots: std::array::from_fn(|_| TimerSlot::empty()),
            rate,
            stretch_percent: 0,
        }
    }

    /// Lengthen every period by `percent`. Backends whose tick runs fast
    /// against wall time use 25. Callbacks still see the requested interval.
    pub fn with_stretch(mut self, percent: u32) -> Self {
        self.stretch_percent = percent;
        self
    }

    fn period_for(&self, ms: u32) -> u32 {
        stretched(self.rate.ms_to_ticks(ms), self.stretch_percent)
    }

    /// Register `callback` to fire `delay_ms` after `now`, then every
    /// interval it returns.
    ///
    /// The first disabled slot is reused, so a cancelled id may come back.
    pub fn schedule(
        &mut self,
        delay_ms: u32,
        now: TickCounter,
        callback: TimerCallback,
    ) -> Result<TimerId, RuntimeError> {
        let Some(idx) = self.slots.iter().position(|slot| !slot.enabled) else {
            return Err(RuntimeError::Full {
                capacity: MAX_TIMERS,
            });
        };
        let period = self.period_for(delay_ms);
        let slot = &mut self.slots[idx];
        slot.interval_ms = delay_ms;
        slot.period = period;
        slot.deadline = now.deadline_after(period);
        slot.callback = Some(callback);
        slot.enabled = true;
        log::trace!("timer {idx} armed for {delay_ms} ms ({period} ticks)");
        Ok(TimerId(idx as u8))
    }

    /// Disable a slot. The table is never compacted.
    pub fn cancel(&mut self, id: TimerId) {
        if let Some(slot) = self.slots.get_mut(id.slot()) {
            slot.enabled = false;
            slot.callback = None;
        }
    }

    pub fn is_enabled(&self, id: TimerId) -> bool {
        self.slots.get(id.slot()).is_some_and(|slot| slot.enabled)
    }

    pub fn active(&self) -> usize {
        self.slots.iter().filter(|slot| slot.enabled).count()
    }

    pub fn deadline(&self, id: TimerId) -> Option<TickCounter> {
        self.slots
            .get(id.slot())
            .filter(|slot| slot.enabled)
            .map(|slot| slot.deadline)
    }

    /// Interrupt entry: fire every enabled slot whose deadline `now` has
    /// reached and re-arm it relative to `now`. Returns the number fired.
    pub fn run_due(&mut self, now: TickCounter) -> usize {
        let mut fired = 0;
        for slot in self.slots.iter_mut() {
            if !slot.enabled || !now.has_reached(slot.deadline) {
                continue;
            }
            let Some(callback) = slot.callback.as_mut() else {
                slot.enabled = false;
                continue;
            };
            fired += 1;
            let next_ms = callback(slot.interval_ms);
            if next_ms == 0 {
                slot.enabled = false;
                slot.callback = None;
                continue;
            }
            if next_ms != slot.interval_ms {
                slot.interval_ms = next_ms;
                slot.period = stretched(self.rate.ms_to_ticks(next_ms), self.stretch_percent);
            }
            slot.deadline = now.deadline_after(slot.period);
        }
        fired
    }

    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = TimerSlot::empty();
        }
    }
}

fn stretched(ticks: u32, percent: u32) -> u32 {
    let ticks = u64::from(ticks) * (100 + u64::from(percent)) / 100;
    u32::try_from(ticks).unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn counting(counter: &Arc<AtomicU32>, next: u32) -> TimerCallback {
        let counter = Arc::clone(counter);
        Box::new(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
            next
        })
    }

    // One tick per millisecond keeps the arithmetic in the tests readable.
    fn scheduler() -> TimerScheduler {
        TimerScheduler::new(TickRate::new(1000, 1))
    }

    #[test]
    fn table_rejects_sixth_timer_and_reuses_cancelled_slot() {
        let mut timers = scheduler();
        let now = TickCounter::default();
        let ids: Vec<TimerId> = (0..MAX_TIMERS)
            .map(|_| timers.schedule(10, now, Box::new(|ms| ms)).unwrap())
            .collect();
        assert_eq!(
            timers.schedule(10, now, Box::new(|ms| ms)),
            Err(RuntimeError::Full { capacity: 5 })
        );

        timers.cancel(ids[2]);
        let reused = timers.schedule(10, now, Box::new(|ms| ms)).unwrap();
        assert_eq!(reused, ids[2]);
        assert_eq!(timers.active(), MAX_TIMERS);
    }

    #[test]
    fn fires_after_wrap_not_before() {
        let mut timers = scheduler();
        let fired = Arc::new(AtomicU32::new(0));
        let start = TickCounter::new(u32::MAX - 5, 3);
        let id = timers.schedule(10, start, counting(&fired, 10)).unwrap();
        assert_eq!(timers.deadline(id), Some(TickCounter::new(4, 4)));

        let mut now = start;
        for _ in 0..9 {
            now = now.advance(1);
            timers.run_due(now);
        }
        assert_eq!(now, TickCounter::new(3, 4));
        assert_eq!(fired.load(Ordering::Relaxed), 0);

        now = now.advance(1);
        assert_eq!(timers.run_due(now), 1);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert_eq!(timers.deadline(id), Some(TickCounter::new(14, 4)));
    }

    #[test]
    fn zero_interval_disables_slot() {
        let mut timers = scheduler();
        let fired = Arc::new(AtomicU32::new(0));
        let id = timers
            .schedule(5, TickCounter::default(), counting(&fired, 0))
            .unwrap();
        timers.run_due(TickCounter::new(5, 0));
        assert!(!timers.is_enabled(id));
        timers.run_due(TickCounter::new(50, 0));
        assert_eq!(fired.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let mut timers = scheduler();
        let fired = Arc::new(AtomicU32::new(0));
        let id = timers
            .schedule(5, TickCounter::default(), counting(&fired, 5))
            .unwrap();
        timers.cancel(id);
        timers.run_due(TickCounter::new(100, 0));
        assert_eq!(fired.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn callback_can_change_interval() {
        let mut timers = scheduler();
        let id = timers
            .schedule(5, TickCounter::default(), Box::new(|ms| ms * 2))
            .unwrap();
        timers.run_due(TickCounter::new(5, 0));
        assert_eq!(timers.deadline(id), Some(TickCounter::new(15, 0)));
    }

    #[test]
    fn stretch_lengthens_every_period() {
        let mut timers = scheduler().with_stretch(25);
        let seen = Arc::new(AtomicU32::new(0));
        let last = Arc::clone(&seen);
        let id = timers
            .schedule(
                40,
                TickCounter::default(),
                Box::new(move |ms| {
                    last.store(ms, Ordering::Relaxed);
                    if ms == 40 { 8 } else { ms }
                }),
            )
            .unwrap();
        assert_eq!(timers.deadline(id), Some(TickCounter::new(50, 0)));
        assert_eq!(timers.run_due(TickCounter::new(49, 0)), 0);
        assert_eq!(timers.run_due(TickCounter::new(50, 0)), 1);
        assert_eq!(seen.load(Ordering::Relaxed), 40);
        assert_eq!(timers.deadline(id), Some(TickCounter::new(60, 0)));
    }
}
