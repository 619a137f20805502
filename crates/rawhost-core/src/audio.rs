use std::sync::Arc;

use crate::sync::SpinLock;

#[cfg(feature = "audio-trace")]
macro_rules! audio_trace {
    ($($arg:tt)*) => {
        log::trace!($($arg)*);
    };
}
#[cfg(not(feature = "audio-trace"))]
macro_rules! audio_trace {
    ($($arg:tt)*) => {};
}

/// Samples pulled from the mixer per fill interrupt.
pub const SLOT_SAMPLES: usize = 512;
/// Slots per playback buffer.
pub const SLOTS_PER_BUFFER: usize = 10;
pub const BUFFER_SAMPLES: usize = SLOT_SAMPLES * SLOTS_PER_BUFFER;
/// Fixed output format: signed 8-bit mono at this rate.
pub const OUTPUT_SAMPLE_RATE: u32 = 22050;
/// Consecutive buffer swaps allowed before the pipeline is restarted.
pub const SWAP_WATCHDOG_LIMIT: u32 = 9000;

/// Producer of raw samples, typically the interpreter's mixer.
pub trait MixSource: Send {
    /// Fill `out` completely with signed 8-bit mono samples.
    fn mix(&mut self, out: &mut [i8]);
}

/// Mixer shared between the interpreter and the fill interrupt.
///
/// The interpreter takes the lock while it mutates channel state; the fill
/// interrupt only ever uses `try_lock` and skips the slot when it loses.
pub type SharedMixer = Arc<SpinLock<dyn MixSource>>;

/// Opaque binding of one buffer's samples to the hardware output path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PcmHandle(pub u32);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlayStatus {
    Queued,
    Playing,
    /// Playback ran out of data although more was expected.
    Ended,
}

/// Hardware PCM output seam.
///
/// Handles are short-lived: the pipeline creates one per buffer hand-off and
/// destroys it when the buffer is retired.
pub trait PcmOutput: Send {
    fn init(&mut self) {}

    /// Bind a copy of `samples` to a new handle. `None` if the hardware has
    /// no room for another handle.
    fn create_handle(&mut self, samples: &[i8]) -> Option<PcmHandle>;

    fn destroy_handle(&mut self, handle: PcmHandle);

    /// Start playing `handle` immediately.
    fn start(&mut self, handle: PcmHandle);

    /// Queue `handle` to play after whatever is playing now.
    fn enqueue_next(&mut self, handle: PcmHandle);

    fn stop(&mut self, handle: PcmHandle);

    /// True while a queued handle is still waiting to start.
    fn has_pending_entry(&self) -> bool;

    fn play_status(&self, handle: PcmHandle) -> PlayStatus;

    /// Periodic housekeeping, called once per management step.
    fn task(&mut self) {}

    fn finish(&mut self) {}
}

/// Output that discards samples. Each `task` call finishes the playing
/// handle and starts the next queued one.
#[derive(Debug, Default)]
pub struct SilentOutput {
    next_id: u32,
    playing: Option<PcmHandle>,
    queue: std::collections::VecDeque<PcmHandle>,
}

impl PcmOutput for SilentOutput {
    fn create_handle(&mut self, _samples: &[i8]) -> Option<PcmHandle> {
        self.next_id = self.next_id.wrapping_add(1);
        Some(PcmHandle(self.next_id))
    }

    fn destroy_handle(&mut self, handle: PcmHandle) {
        self.queue.retain(|&h| h != handle);
        if self.playing == Some(handle) {
            self.playing = None;
        }
    }

    fn start(&mut self, handle: PcmHandle) {
        self.playing = Some(handle);
    }

    fn enqueue_next(&mut self, handle: PcmHandle) {
        self.queue.push_back(handle);
    }

    fn stop(&mut self, handle: PcmHandle) {
        self.destroy_handle(handle);
    }

    fn has_pending_entry(&self) -> bool {
        !self.queue.is_empty()
    }

    fn play_status(&self, handle: PcmHandle) -> PlayStatus {
        if self.playing == Some(handle) {
            PlayStatus::Playing
        } else {
            PlayStatus::Queued
        }
    }

    fn task(&mut self) {
        if let Some(next) = self.queue.pop_front() {
            self.playing = Some(next);
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FillOutcome {
    Disabled,
    /// The target buffer is still waiting to be retired.
    BufferBusy,
    /// The mixer was locked by the mainline.
    Contended,
    Filled {
        buffer: usize,
        slot: usize,
        completed: bool,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StallReason {
    WatchdogExpired,
    PlayEnded,
    HandleUnavailable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ManageOutcome {
    Idle,
    Swapped { buffer: usize },
    Restarted(StallReason),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AudioStats {
    pub slots_filled: u64,
    pub skipped_busy: u64,
    pub skipped_contended: u64,
    pub swaps: u64,
    pub restarts: u64,
}

/// Two slot-divided buffers filled from the mixer and handed alternately to
/// the output path.
pub struct AudioPipeline {
    output: Box<dyn PcmOutput>,
    mixer: Option<SharedMixer>,
    enabled: bool,
    buffers: Box<[[i8; BUFFER_SAMPLES]; 2]>,
    filled: [bool; 2],
    fill_buf: usize,
    fill_slot: usize,
    play_buf: usize,
    handles: [Option<PcmHandle>; 2],
    swaps: u32,
    watchdog_limit: u32,
    stats: AudioStats,
}

impl AudioPipeline {
    pub fn new(output: Box<dyn PcmOutput>) -> Self {
        Self::with_watchdog(output, SWAP_WATCHDOG_LIMIT)
    }

    pub fn with_watchdog(output: Box<dyn PcmOutput>, watchdog_limit: u32) -> Self {
        Self {
            output,
            mixer: None,
            enabled: false,
            buffers: Box::new([[0; BUFFER_SAMPLES]; 2]),
            filled: [false; 2],
            fill_buf: 0,
            fill_slot: 0,
            play_buf: 0,
            handles: [None; 2],
            swaps: 0,
            watchdog_limit,
            stats: AudioStats::default(),
        }
    }

    pub const fn output_sample_rate() -> u32 {
        OUTPUT_SAMPLE_RATE
    }

    /// Attach `mixer` and start continuous playback of both (silent) buffers.
    pub fn start(&mut self, mixer: SharedMixer) {
        if self.enabled {
            self.stop();
        }
        self.output.init();
        self.mixer = Some(mixer);
        self.reset_buffers();
        self.bind_fresh_handles();
        self.enabled = true;
        log::info!(
            "audio started: {} Hz, {} slots of {} samples per buffer",
            OUTPUT_SAMPLE_RATE,
            SLOTS_PER_BUFFER,
            SLOT_SAMPLES
        );
    }

    pub fn stop(&mut self) {
        if !self.enabled {
            return;
        }
        self.enabled = false;
        self.release_handles();
        self.output.finish();
        self.mixer = None;
        log::info!("audio stopped after {} swaps", self.stats.swaps);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Fill interrupt: pull one slot from the mixer into the current buffer.
    pub fn fill_slot(&mut self) -> FillOutcome {
        if !self.enabled {
            return FillOutcome::Disabled;
        }
        let buffer = self.fill_buf;
        if self.filled[buffer] {
            self.stats.skipped_busy += 1;
            return FillOutcome::BufferBusy;
        }
        let Some(mixer) = self.mixer.as_ref() else {
            return FillOutcome::Disabled;
        };
        let Some(mut source) = mixer.try_lock() else {
            self.stats.skipped_contended += 1;
            return FillOutcome::Contended;
        };

        let slot = self.fill_slot;
        let start = slot * SLOT_SAMPLES;
        source.mix(&mut self.buffers[buffer][start..start + SLOT_SAMPLES]);
        drop(source);
        self.stats.slots_filled += 1;

        self.fill_slot = (slot + 1) % SLOTS_PER_BUFFER;
        let completed = self.fill_slot == 0;
        if completed {
            self.filled[buffer] = true;
            self.fill_buf = buffer ^ 1;
            audio_trace!("buffer {buffer} filled");
        }
        FillOutcome::Filled {
            buffer,
            slot,
            completed,
        }
    }

    /// Playback management: retire the played buffer once the output has
    /// nothing queued, and restart the pipeline when it has stalled.
    pub fn manage_playback(&mut self) -> ManageOutcome {
        if !self.enabled {
            return ManageOutcome::Idle;
        }
        self.output.task();

        let mut outcome = ManageOutcome::Idle;
        let buffer = self.play_buf;
        if self.filled[buffer] && !self.output.has_pending_entry() {
            if self.swaps >= self.watchdog_limit {
                return self.restart(StallReason::WatchdogExpired);
            }
            if let Some(old) = self.handles[buffer].take() {
                self.output.destroy_handle(old);
            }
            let Some(handle) = self.output.create_handle(&self.buffers[buffer][..]) else {
                return self.restart(StallReason::HandleUnavailable);
            };
            self.output.enqueue_next(handle);
            self.handles[buffer] = Some(handle);
            self.filled[buffer] = false;
            self.play_buf = buffer ^ 1;
            self.swaps += 1;
            self.stats.swaps += 1;
            audio_trace!("buffer {buffer} queued as {:?}", handle);
            outcome = ManageOutcome::Swapped { buffer };
        }

        let ended = self
            .handles
            .iter()
            .flatten()
            .any(|&handle| self.output.play_status(handle) == PlayStatus::Ended);
        if ended {
            return self.restart(StallReason::PlayEnded);
        }
        outcome
    }

    /// Tear down both handles, zero the buffers and start over.
    pub fn restart(&mut self, reason: StallReason) -> ManageOutcome {
        log::debug!(
            "audio stall ({reason:?}) after {} swaps; restarting pipeline",
            self.swaps
        );
        self.stats.restarts += 1;
        self.release_handles();
        self.reset_buffers();
        self.bind_fresh_handles();
        ManageOutcome::Restarted(reason)
    }

    fn reset_buffers(&mut self) {
        for buffer in self.buffers.iter_mut() {
            buffer.fill(0);
        }
        self.filled = [false; 2];
        self.fill_buf = 0;
        self.fill_slot = 0;
        self.play_buf = 0;
        self.swaps = 0;
    }

    fn bind_fresh_handles(&mut self) {
        let first = self.output.create_handle(&self.buffers[0][..]);
        let second = self.output.create_handle(&self.buffers[1][..]);
        if let Some(handle) = first {
            self.output.start(handle);
        }
        if let Some(handle) = second {
            self.output.enqueue_next(handle);
        }
        if first.is_none() || second.is_none() {
            log::warn!("audio output refused a playback handle");
        }
        self.handles = [first, second];
    }

    fn release_handles(&mut self) {
        for handle in self.handles.iter_mut() {
            if let Some(handle) = handle.take() {
                self.output.stop(handle);
                self.output.destroy_handle(handle);
            }
        }
    }

    pub fn is_filled(&self, buffer: usize) -> bool {
        self.filled[buffer]
    }

    /// Buffer and slot the next fill will write.
    pub fn fill_position(&self) -> (usize, usize) {
        (self.fill_buf, self.fill_slot)
    }

    pub fn swap_count(&self) -> u32 {
        self.swaps
    }

    pub fn buffer(&self, index: usize) -> &[i8] {
        &self.buffers[index][..]
    }

    pub fn stats(&self) -> AudioStats {
        self.stats
    }
}

impl Drop for AudioPipeline {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockState {
        next_id: u32,
        live: HashSet<u32>,
        queue: VecDeque<u32>,
        playing: Option<u32>,
        ended: HashSet<u32>,
        created: Vec<Vec<i8>>,
        destroyed: usize,
        refuse: bool,
    }

    #[derive(Clone, Default)]
    struct MockOutput(Arc<Mutex<MockState>>);

    impl MockOutput {
        fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
            self.0.lock().unwrap()
        }

        /// Finish the playing handle and start the next queued one.
        fn advance(&self) {
            let mut st = self.state();
            st.playing = st.queue.pop_front();
        }
    }

    impl PcmOutput for MockOutput {
        fn create_handle(&mut self, samples: &[i8]) -> Option<PcmHandle> {
            let mut st = self.state();
            if st.refuse {
                return None;
            }
            st.next_id += 1;
            let id = st.next_id;
            st.live.insert(id);
            st.created.push(samples.to_vec());
            Some(PcmHandle(id))
        }

        fn destroy_handle(&mut self, handle: PcmHandle) {
            let mut st = self.state();
            st.live.remove(&handle.0);
            st.queue.retain(|&h| h != handle.0);
            st.destroyed += 1;
        }

        fn start(&mut self, handle: PcmHandle) {
            self.state().playing = Some(handle.0);
        }

        fn enqueue_next(&mut self, handle: PcmHandle) {
            self.state().queue.push_back(handle.0);
        }

        fn stop(&mut self, handle: PcmHandle) {
            let mut st = self.state();
            if st.playing == Some(handle.0) {
                st.playing = None;
            }
        }

        fn has_pending_entry(&self) -> bool {
            !self.state().queue.is_empty()
        }

        fn play_status(&self, handle: PcmHandle) -> PlayStatus {
            let st = self.state();
            if st.ended.contains(&handle.0) {
                PlayStatus::Ended
            } else if st.playing == Some(handle.0) {
                PlayStatus::Playing
            } else {
                PlayStatus::Queued
            }
        }
    }

    struct Ramp(i8);

    impl MixSource for Ramp {
        fn mix(&mut self, out: &mut [i8]) {
            for sample in out.iter_mut() {
                *sample = self.0;
            }
            self.0 = self.0.wrapping_add(1);
        }
    }

    fn started(watchdog: u32) -> (AudioPipeline, MockOutput, Arc<SpinLock<Ramp>>) {
        let output = MockOutput::default();
        let mut pipeline = AudioPipeline::with_watchdog(Box::new(output.clone()), watchdog);
        let mixer = Arc::new(SpinLock::new(Ramp(1)));
        pipeline.start(mixer.clone());
        (pipeline, output, mixer)
    }

    #[test]
    fn buffer_fills_on_last_slot() {
        let (mut pipeline, _, _) = started(SWAP_WATCHDOG_LIMIT);
        for slot in 0..SLOTS_PER_BUFFER - 1 {
            let outcome = pipeline.fill_slot();
            assert_eq!(
                outcome,
                FillOutcome::Filled {
                    buffer: 0,
                    slot,
                    completed: false
                }
            );
            assert!(!pipeline.is_filled(0));
        }
        assert_eq!(
            pipeline.fill_slot(),
            FillOutcome::Filled {
                buffer: 0,
                slot: SLOTS_PER_BUFFER - 1,
                completed: true
            }
        );
        assert!(pipeline.is_filled(0));
        assert_eq!(pipeline.fill_position(), (1, 0));
        assert_eq!(pipeline.buffer(0)[0], 1);
        assert_eq!(pipeline.buffer(0)[BUFFER_SAMPLES - 1], SLOTS_PER_BUFFER as i8);
    }

    #[test]
    fn filled_buffer_is_not_refilled_until_retired() {
        let (mut pipeline, output, _) = started(SWAP_WATCHDOG_LIMIT);
        for _ in 0..2 * SLOTS_PER_BUFFER {
            pipeline.fill_slot();
        }
        assert!(pipeline.is_filled(0) && pipeline.is_filled(1));
        let before = pipeline.buffer(0).to_vec();
        assert_eq!(pipeline.fill_slot(), FillOutcome::BufferBusy);
        assert_eq!(pipeline.buffer(0), &before[..]);

        // The initial second handle is still queued, so nothing retires yet.
        assert_eq!(pipeline.manage_playback(), ManageOutcome::Idle);
        output.advance();
        assert_eq!(
            pipeline.manage_playback(),
            ManageOutcome::Swapped { buffer: 0 }
        );
        assert!(!pipeline.is_filled(0));
        assert_eq!(output.state().created.last().unwrap(), &before);
        assert!(matches!(pipeline.fill_slot(), FillOutcome::Filled { buffer: 0, .. }));
    }

    #[test]
    fn contended_mixer_skips_the_slot() {
        let (mut pipeline, _, mixer) = started(SWAP_WATCHDOG_LIMIT);
        let guard = mixer.lock();
        assert_eq!(pipeline.fill_slot(), FillOutcome::Contended);
        assert_eq!(pipeline.fill_position(), (0, 0));
        drop(guard);
        assert!(matches!(pipeline.fill_slot(), FillOutcome::Filled { slot: 0, .. }));
        assert_eq!(pipeline.stats().skipped_contended, 1);
    }

    #[test]
    fn both_handles_ended_restart_once() {
        let (mut pipeline, output, _) = started(SWAP_WATCHDOG_LIMIT);
        for _ in 0..SLOTS_PER_BUFFER {
            pipeline.fill_slot();
        }
        output.advance();
        assert_eq!(
            pipeline.manage_playback(),
            ManageOutcome::Swapped { buffer: 0 }
        );
        assert_eq!(pipeline.swap_count(), 1);

        {
            let mut st = output.state();
            let live: Vec<u32> = st.live.iter().copied().collect();
            st.ended.extend(live);
        }
        assert_eq!(
            pipeline.manage_playback(),
            ManageOutcome::Restarted(StallReason::PlayEnded)
        );
        assert_eq!(pipeline.stats().restarts, 1);
        assert_eq!(pipeline.swap_count(), 0);
        assert_eq!(pipeline.fill_position(), (0, 0));
        assert!(pipeline.buffer(0).iter().all(|&s| s == 0));
        assert!(pipeline.buffer(1).iter().all(|&s| s == 0));

        // Fresh handles are healthy, so the next step does not restart again.
        assert_eq!(pipeline.manage_playback(), ManageOutcome::Idle);
        assert_eq!(pipeline.stats().restarts, 1);
    }

    #[test]
    fn watchdog_forces_restart() {
        let (mut pipeline, output, _) = started(2);
        for _ in 0..2 {
            for _ in 0..SLOTS_PER_BUFFER {
                pipeline.fill_slot();
            }
            output.advance();
            assert!(matches!(
                pipeline.manage_playback(),
                ManageOutcome::Swapped { .. }
            ));
        }
        for _ in 0..SLOTS_PER_BUFFER {
            pipeline.fill_slot();
        }
        output.advance();
        assert_eq!(
            pipeline.manage_playback(),
            ManageOutcome::Restarted(StallReason::WatchdogExpired)
        );
        assert_eq!(pipeline.swap_count(), 0);
    }

    #[test]
    fn refused_handle_triggers_recovery() {
        let (mut pipeline, output, _) = started(SWAP_WATCHDOG_LIMIT);
        for _ in 0..SLOTS_PER_BUFFER {
            pipeline.fill_slot();
        }
        output.advance();
        output.state().refuse = true;
        assert_eq!(
            pipeline.manage_playback(),
            ManageOutcome::Restarted(StallReason::HandleUnavailable)
        );
    }

    #[test]
    fn stop_releases_every_handle() {
        let (mut pipeline, output, _) = started(SWAP_WATCHDOG_LIMIT);
        pipeline.stop();
        assert!(output.state().live.is_empty());
        assert_eq!(pipeline.fill_slot(), FillOutcome::Disabled);
        assert_eq!(pipeline.manage_playback(), ManageOutcome::Idle);
    }
}
