use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

/// Tick counter value paired with the number of times it has wrapped.
///
/// Counters are compared by `(epoch, value)`, so a deadline computed just
/// before the 32-bit value wraps still orders after every pre-wrap tick.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct TickCounter {
    pub value: u32,
    pub epoch: u32,
}

impl TickCounter {
    pub const fn new(value: u32, epoch: u32) -> Self {
        Self { value, epoch }
    }

    /// Advance by `ticks`, moving to the next epoch when the value wraps.
    pub fn advance(self, ticks: u32) -> Self {
        let (value, wrapped) = self.value.overflowing_add(ticks);
        let epoch = if wrapped {
            self.epoch.wrapping_add(1)
        } else {
            self.epoch
        };
        Self { value, epoch }
    }

    /// Deadline `ticks` after this counter.
    #[inline]
    pub fn deadline_after(self, ticks: u32) -> Self {
        self.advance(ticks)
    }

    /// True once this counter is at or past `deadline`.
    #[inline]
    pub fn has_reached(self, deadline: TickCounter) -> bool {
        self >= deadline
    }

    fn packed(self) -> u64 {
        ((self.epoch as u64) << 32) | self.value as u64
    }

    fn unpack(raw: u64) -> Self {
        Self {
            value: raw as u32,
            epoch: (raw >> 32) as u32,
        }
    }
}

impl Ord for TickCounter {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then(self.value.cmp(&other.value))
    }
}

impl PartialOrd for TickCounter {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// How fast the tick interrupt fires and how far each firing advances the
/// counter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickRate {
    pub interrupt_hz: u32,
    pub quantum: u32,
}

impl TickRate {
    pub const fn new(interrupt_hz: u32, quantum: u32) -> Self {
        Self {
            interrupt_hz,
            quantum,
        }
    }

    /// A rate whose ticks approximate milliseconds.
    pub const fn millis(interrupt_hz: u32) -> Self {
        let hz = if interrupt_hz == 0 { 1 } else { interrupt_hz };
        Self {
            interrupt_hz: hz,
            quantum: (1000 + hz / 2) / hz,
        }
    }

    /// Convert a delay in milliseconds to ticks, rounding up so a deadline is
    /// never earlier than requested. Non-zero delays take at least one tick.
    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        if ms == 0 {
            return 0;
        }
        let per_second = self.interrupt_hz as u64 * self.quantum as u64;
        let ticks = (ms as u64 * per_second).div_ceil(1000);
        ticks.clamp(1, u32::MAX as u64) as u32
    }
}

impl Default for TickRate {
    fn default() -> Self {
        Self::millis(60)
    }
}

/// Monotonic tick counter advanced from the tick interrupt.
///
/// The value and epoch are stored in one atomic word so mainline readers
/// never observe a torn pair while the interrupt is advancing it.
pub struct TickSource {
    counter: AtomicU64,
    rate: TickRate,
}

impl TickSource {
    pub fn new(rate: TickRate) -> Self {
        Self::starting_at(rate, TickCounter::default())
    }

    pub fn starting_at(rate: TickRate, start: TickCounter) -> Self {
        Self {
            counter: AtomicU64::new(start.packed()),
            rate,
        }
    }

    #[inline]
    pub fn now(&self) -> TickCounter {
        TickCounter::unpack(self.counter.load(AtomicOrdering::Acquire))
    }

    /// Interrupt entry: advance by one quantum and return the new counter.
    pub fn tick(&self) -> TickCounter {
        let quantum = self.rate.quantum;
        let prev = self
            .counter
            .fetch_update(AtomicOrdering::AcqRel, AtomicOrdering::Acquire, |raw| {
                Some(TickCounter::unpack(raw).advance(quantum).packed())
            })
            .unwrap_or_else(|raw| raw);
        let next = TickCounter::unpack(prev).advance(quantum);
        if next.epoch != TickCounter::unpack(prev).epoch {
            log::trace!("tick counter wrapped into epoch {}", next.epoch);
        }
        next
    }

    pub fn rate(&self) -> TickRate {
        self.rate
    }

    pub fn ms_to_ticks(&self, ms: u32) -> u32 {
        self.rate.ms_to_ticks(ms)
    }

    /// Counter value handed to the interpreter as its time stamp.
    pub fn timestamp(&self) -> u32 {
        self.now().value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_spanning_wrap_moves_to_next_epoch() {
        let start = TickCounter::new(u32::MAX - 5, 7);
        let deadline = start.deadline_after(10);
        assert_eq!(deadline, TickCounter::new(4, 8));
    }

    #[test]
    fn pre_wrap_counters_order_before_post_wrap_deadline() {
        let deadline = TickCounter::new(4, 1);
        assert!(!TickCounter::new(u32::MAX, 0).has_reached(deadline));
        assert!(!TickCounter::new(3, 1).has_reached(deadline));
        assert!(TickCounter::new(4, 1).has_reached(deadline));
        assert!(TickCounter::new(0, 2).has_reached(deadline));
    }

    #[test]
    fn millis_rate_rounds_quantum() {
        assert_eq!(TickRate::millis(60).quantum, 17);
        assert_eq!(TickRate::millis(1000).quantum, 1);
    }

    #[test]
    fn ms_to_ticks_never_shortens_a_delay() {
        let rate = TickRate::new(60, 19);
        // 60 * 19 = 1140 ticks per second.
        assert_eq!(rate.ms_to_ticks(1000), 1140);
        assert_eq!(rate.ms_to_ticks(1), 2);
        assert_eq!(rate.ms_to_ticks(0), 0);
    }

    #[test]
    fn source_ticks_by_quantum() {
        let source = TickSource::new(TickRate::new(60, 19));
        source.tick();
        source.tick();
        assert_eq!(source.now(), TickCounter::new(38, 0));
        assert_eq!(source.timestamp(), 38);
    }

    #[test]
    fn source_wraps_into_next_epoch() {
        let start = TickCounter::new(u32::MAX - 1, 0);
        let source = TickSource::starting_at(TickRate::new(60, 4), start);
        let after = source.tick();
        assert_eq!(after, TickCounter::new(2, 1));
    }
}
