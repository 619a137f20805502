use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::thread;

use rawhost_core::audio::{MixSource, SilentOutput};
use rawhost_core::fs::MemoryMedium;
use rawhost_core::input::NoInput;
use rawhost_core::sync::SpinLock;
use rawhost_core::tick::{TickCounter, TickRate, TickSource};
use rawhost_core::timer::TimerScheduler;
use rawhost_core::video::{Display, Frame};
use rawhost_core::{Backend, Runtime, RuntimeConfig, System};

struct Channel {
    level: i8,
}

impl MixSource for Channel {
    fn mix(&mut self, out: &mut [i8]) {
        out.fill(self.level);
    }
}

struct Discard;

impl Display for Discard {
    fn present(&mut self, _frame: &Frame) {}
}

fn runtime() -> Runtime {
    let backend = Backend {
        pcm: Box::new(SilentOutput::default()),
        display: Box::new(Discard),
        input: Box::new(NoInput),
        medium: Box::new(MemoryMedium::new()),
    };
    Runtime::new(
        RuntimeConfig {
            tick_rate: TickRate::new(1000, 1),
            ..RuntimeConfig::default()
        },
        backend,
    )
}

#[test]
fn mixer_flag_stays_binary_while_interpreter_mutates() {
    let mut rt = runtime();
    rt.init("exclusion").unwrap();
    let mixer = Arc::new(SpinLock::new(Channel { level: 0 }));
    rt.start_audio(mixer.clone());

    let irq = rt.interrupts();
    let done = Arc::new(AtomicBool::new(false));
    let observer = {
        let mixer = mixer.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::Relaxed) {
                assert!(mixer.flag().count() <= 1);
            }
        })
    };
    let interrupt = thread::spawn(move || {
        for _ in 0..5_000 {
            irq.vblank();
            irq.audio_fill();
        }
        irq
    });

    for i in 0..5_000 {
        let mut channel = mixer.lock();
        channel.level = (i % 100) as i8;
        assert_eq!(mixer.flag().count(), 1);
    }

    let irq = interrupt.join().unwrap();
    done.store(true, Ordering::Relaxed);
    observer.join().unwrap();

    assert_eq!(mixer.flag().count(), 0);
    let stats = irq.audio_stats();
    assert_eq!(
        stats.slots_filled + stats.skipped_busy + stats.skipped_contended,
        10_000
    );
    assert_eq!(stats.restarts, 0);
}

#[test]
fn timer_deadline_survives_counter_wrap() {
    let rate = TickRate::new(1000, 1);
    let ticks = TickSource::starting_at(rate, TickCounter::new(u32::MAX - 5, 0));
    let mut timers = TimerScheduler::new(rate);
    let fired = Arc::new(AtomicU32::new(0));
    let counter = fired.clone();
    timers
        .schedule(
            10,
            ticks.now(),
            Box::new(move |_| {
                counter.fetch_add(1, Ordering::Relaxed);
                0
            }),
        )
        .unwrap();

    for _ in 0..9 {
        let now = ticks.tick();
        timers.run_due(now);
    }
    assert_eq!(ticks.now(), TickCounter::new(3, 1));
    assert_eq!(fired.load(Ordering::Relaxed), 0);

    let now = ticks.tick();
    assert_eq!(now, TickCounter::new(4, 1));
    timers.run_due(now);
    assert_eq!(fired.load(Ordering::Relaxed), 1);
}
