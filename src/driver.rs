use log::{debug, warn};
use rawhost_core::Interrupts;
use rawhost_core::video::DEFAULT_LATCH_LINE;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Line at which the emulated field samples the frame-ready flag: halfway
/// down the visible area.
pub const SAMPLE_LINE: u32 = DEFAULT_LATCH_LINE / 2;

/// Emulated display interrupts: a thread that raises
/// [`Interrupts::scanline`] halfway through each field and
/// [`Interrupts::vblank`] at its end.
pub struct VblankDriver {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<u64>>,
}

fn wait_until(target: Instant) {
    while Instant::now() < target {
        std::hint::spin_loop();
        if target.saturating_duration_since(Instant::now()) > Duration::from_millis(2) {
            thread::sleep(Duration::from_millis(1));
        }
    }
}

impl VblankDriver {
    pub fn spawn(irq: Arc<Interrupts>, hz: u32) -> std::io::Result<Self> {
        let period = Duration::from_secs(1) / hz.max(1);
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let thread = thread::Builder::new()
            .name("vblank".into())
            .spawn(move || {
                let mut fired = 0u64;
                let mut target = Instant::now() + period;
                while !flag.load(Ordering::Acquire) {
                    wait_until(target - period / 2);
                    irq.scanline(SAMPLE_LINE);
                    wait_until(target);
                    irq.vblank();
                    fired += 1;

                    target += period;
                    // Fell far behind (suspended host); resync instead of bursting.
                    let now = Instant::now();
                    if now > target + period * 4 {
                        target = now + period;
                    }
                }
                fired
            })?;
        debug!("vblank driver running at {hz} Hz");
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Stop the thread and return how many vertical blanks it raised.
    pub fn stop(&mut self) -> u64 {
        self.stop.store(true, Ordering::Release);
        match self.thread.take().map(JoinHandle::join) {
            Some(Ok(fired)) => fired,
            Some(Err(_)) => {
                warn!("vblank thread panicked");
                0
            }
            None => 0,
        }
    }
}

impl Drop for VblankDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawhost_core::audio::SilentOutput;
    use rawhost_core::fs::MemoryMedium;
    use rawhost_core::input::NoInput;
    use rawhost_core::tick::TickRate;
    use rawhost_core::video::{Display, Frame};
    use std::sync::atomic::AtomicU64;
    use rawhost_core::{Backend, Runtime, RuntimeConfig, System};

    struct Discard;

    impl Display for Discard {
        fn present(&mut self, _frame: &Frame) {}
    }

    #[derive(Clone, Default)]
    struct Count(Arc<AtomicU64>);

    impl Display for Count {
        fn present(&mut self, _frame: &Frame) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    #[test]
    fn driver_advances_ticks_so_sleep_returns() {
        let mut rt = Runtime::new(
            RuntimeConfig {
                tick_rate: TickRate::new(500, 2),
                ..RuntimeConfig::default()
            },
            Backend {
                pcm: Box::new(SilentOutput::default()),
                display: Box::new(Discard),
                input: Box::new(NoInput),
                medium: Box::new(MemoryMedium::new()),
            },
        );
        rt.init("driver").unwrap();
        let mut driver = VblankDriver::spawn(rt.interrupts(), 500).unwrap();

        let before = rt.time_stamp();
        rt.sleep(20);
        assert!(rt.time_stamp().wrapping_sub(before) >= 20);

        let fired = driver.stop();
        assert!(fired >= 10);
        assert_eq!(driver.stop(), 0);
    }

    #[test]
    fn mid_field_sample_latches_frames_for_the_blank() {
        let shown = Count::default();
        let mut rt = Runtime::new(
            RuntimeConfig {
                tick_rate: TickRate::new(500, 2),
                sample_on_vblank: false,
                ..RuntimeConfig::default()
            },
            Backend {
                pcm: Box::new(SilentOutput::default()),
                display: Box::new(shown.clone()),
                input: Box::new(NoInput),
                medium: Box::new(MemoryMedium::new()),
            },
        );
        rt.init("driver").unwrap();
        let mut driver = VblankDriver::spawn(rt.interrupts(), 500).unwrap();

        rt.copy_rect(0, 0, 2, 1, &[0x12], 1);
        rt.sleep(40);
        driver.stop();
        assert_eq!(shown.0.load(Ordering::Relaxed), 1);
        assert_eq!(rt.interrupts().video_stats().frames_latched, 1);
    }
}
