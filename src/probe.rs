//! Mainline smoke run over a data directory.
//!
//! Drives the runtime the way the interpreter does at start-up: reads the
//! resource list, pushes a palette and a frame, plays a tone, arms a timer
//! and polls input until the time runs out or quit is requested. Needs a
//! [`crate::driver::VblankDriver`] (or another interrupt source) running.

use log::{info, warn};
use rawhost_core::audio::{AudioStats, MixSource, OUTPUT_SAMPLE_RATE};
use rawhost_core::fs::FsStats;
use rawhost_core::sync::SpinLock;
use rawhost_core::video::{PACKED_PITCH, PALETTE_COLORS, SCREEN_HEIGHT, SCREEN_WIDTH};
use rawhost_core::{Runtime, RuntimeError, System};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

/// Resource list at the root of the data directory.
pub const RESOURCE_LIST: &str = "MEMLIST.BIN";
const ENTRY_END: u8 = 0xff;

/// One entry of the resource list (20 bytes, big-endian).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResourceEntry {
    pub state: u8,
    pub kind: u8,
    pub rank: u8,
    pub bank: u8,
    pub bank_pos: u32,
    pub packed_size: u16,
    pub size: u16,
}

#[derive(Clone, Copy, Debug)]
pub struct ProbeOptions {
    pub duration_ms: u32,
    pub tone_hz: u32,
    pub timer_ms: u32,
}

impl Default for ProbeOptions {
    fn default() -> Self {
        Self {
            duration_ms: 1000,
            tone_hz: 440,
            timer_ms: 50,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProbeReport {
    pub resources: Vec<ResourceEntry>,
    pub timer_fires: u32,
    pub polls: u32,
    pub quit: bool,
    pub audio: AudioStats,
    pub fs: FsStats,
    pub frames_presented: u64,
}

/// Square wave at a fixed volume.
pub struct SquareTone {
    half_period: u32,
    phase: u32,
    level: i8,
}

impl SquareTone {
    pub fn new(hz: u32, level: i8) -> Self {
        Self {
            half_period: (OUTPUT_SAMPLE_RATE / hz.max(1) / 2).max(1),
            phase: 0,
            level,
        }
    }
}

impl MixSource for SquareTone {
    fn mix(&mut self, out: &mut [i8]) {
        for sample in out.iter_mut() {
            *sample = if self.phase < self.half_period {
                self.level
            } else {
                -self.level
            };
            self.phase = (self.phase + 1) % (self.half_period * 2);
        }
    }
}

/// Read the resource list. A missing list is not an error; the probe simply
/// reports no resources.
pub fn read_resource_list(rt: &mut Runtime) -> Result<Vec<ResourceEntry>, RuntimeError> {
    let mut file = match rt.open(RESOURCE_LIST) {
        Ok(file) => file,
        Err(RuntimeError::NotFound(path)) => {
            warn!("{path} not found; skipping resource list");
            return Ok(Vec::new());
        }
        Err(e) => return Err(e),
    };

    let mut entries = Vec::new();
    let fs = rt.fs()?;
    loop {
        let state = fs.read_u8(&mut file);
        if state == ENTRY_END || file.io_err() {
            break;
        }
        let kind = fs.read_u8(&mut file);
        let _buf_ptr = fs.read_u16_be(&mut file);
        let _unused = fs.read_u16_be(&mut file);
        let rank = fs.read_u8(&mut file);
        let bank = fs.read_u8(&mut file);
        let bank_pos = fs.read_u32_be(&mut file);
        let _unused = fs.read_u16_be(&mut file);
        let packed_size = fs.read_u16_be(&mut file);
        let _unused = fs.read_u16_be(&mut file);
        let size = fs.read_u16_be(&mut file);
        if file.io_err() {
            warn!("{RESOURCE_LIST} truncated after {} entries", entries.len());
            break;
        }
        entries.push(ResourceEntry {
            state,
            kind,
            rank,
            bank,
            bank_pos,
            packed_size,
            size,
        });
    }
    fs.close(file);
    Ok(entries)
}

/// Grey ramp across the 16 entries and a frame of vertical bands, one per
/// entry.
fn push_test_pattern(rt: &mut Runtime) {
    let triples: Vec<u8> = (0..PALETTE_COLORS as u8)
        .flat_map(|i| {
            let c = i * 4 + i / 4;
            [c, c, c]
        })
        .collect();
    rt.set_palette(0, PALETTE_COLORS as u8, &triples);

    let band = SCREEN_WIDTH / PALETTE_COLORS;
    let mut screen = vec![0u8; PACKED_PITCH * SCREEN_HEIGHT];
    for (i, byte) in screen.iter_mut().enumerate() {
        let x = (i % PACKED_PITCH) * 2;
        let left = (x / band) as u8;
        let right = ((x + 1) / band) as u8;
        *byte = (left << 4) | right;
    }
    rt.copy_rect(
        0,
        0,
        SCREEN_WIDTH as u16,
        SCREEN_HEIGHT as u16,
        &screen,
        PACKED_PITCH as u32,
    );
}

pub fn run(rt: &mut Runtime, opts: ProbeOptions) -> Result<ProbeReport, RuntimeError> {
    rt.init("rawhost probe")?;
    let mut report = ProbeReport {
        resources: read_resource_list(rt)?,
        ..ProbeReport::default()
    };
    info!("{} resource entries", report.resources.len());

    push_test_pattern(rt);

    let fires = Arc::new(AtomicU32::new(0));
    let counter = Arc::clone(&fires);
    let timer = rt.add_timer(
        opts.timer_ms,
        Box::new(move |interval| {
            counter.fetch_add(1, Ordering::Relaxed);
            interval
        }),
    )?;

    let tone = Arc::new(SpinLock::new(SquareTone::new(opts.tone_hz, 24)));
    rt.start_audio(tone.clone());

    let irq = rt.interrupts();
    let start = rt.time_stamp();
    let deadline = irq
        .now()
        .deadline_after(rt.config().tick_rate.ms_to_ticks(opts.duration_ms));
    let mut faded = false;
    while !irq.now().has_reached(deadline) {
        rt.process_events();
        report.polls += 1;
        if rt.take_quit() || rt.input().quit {
            report.quit = true;
            break;
        }
        if rt.input().pause {
            rt.input_mut().pause = false;
            faded = !faded;
            if faded {
                rt.fade_palette();
            } else {
                rt.restore_palette();
            }
        }

        // The mixer lock is what keeps the audio fill out.
        tone.lock().level = if rt.input().button { 48 } else { 24 };

        rt.sleep(20);
    }

    rt.remove_timer(timer);
    rt.stop_audio();
    report.timer_fires = fires.load(Ordering::Relaxed);
    report.audio = irq.audio_stats();
    report.frames_presented = irq.video_stats().frames_presented;
    report.fs = rt.fs_stats();
    info!(
        "probe ran {} ticks: {} polls, {} timer fires, {} frames, {} audio swaps",
        rt.time_stamp().wrapping_sub(start),
        report.polls,
        report.timer_fires,
        report.frames_presented,
        report.audio.swaps
    );
    rt.destroy();
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn square_tone_alternates_each_half_period() {
        let mut tone = SquareTone::new(OUTPUT_SAMPLE_RATE / 4, 10);
        let mut out = [0i8; 8];
        tone.mix(&mut out);
        assert_eq!(out, [10, 10, -10, -10, 10, 10, -10, -10]);
    }
}
