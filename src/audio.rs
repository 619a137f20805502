use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel as cb;
use log::{info, warn};
use rawhost_core::audio::{OUTPUT_SAMPLE_RATE, PcmHandle, PcmOutput, PlayStatus};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};

type Block = Arc<[i8]>;

enum Command {
    Play(PcmHandle, Block),
    Queue(PcmHandle, Block),
    Stop(PcmHandle),
}

/// State the stream callback publishes back to the pipeline.
#[derive(Default)]
struct Shared {
    /// Id of the block being played, 0 when idle.
    playing: AtomicU32,
    queued: AtomicUsize,
    /// Id of the last block that ran out with nothing queued behind it.
    ended: AtomicU32,
    underruns: AtomicU64,
}

/// PCM output on a cpal stream.
///
/// Blocks of signed 8-bit mono at [`OUTPUT_SAMPLE_RATE`] are handed to the
/// stream callback over a channel and resampled to the device rate there.
pub struct CpalOutput {
    tx: cb::Sender<Command>,
    shared: Arc<Shared>,
    blocks: HashMap<u32, Block>,
    next_id: u32,
}

/// Consumer half, owned by the stream callback.
pub struct Player {
    rx: cb::Receiver<Command>,
    shared: Arc<Shared>,
    current: Option<(PcmHandle, Block)>,
    queue: VecDeque<(PcmHandle, Block)>,
    pos: usize,
    phase: u32,
    device_rate: u32,
}

/// Output/player pair for a device running at `device_rate`.
pub fn channel(device_rate: u32) -> (CpalOutput, Player) {
    let (tx, rx) = cb::unbounded();
    let shared = Arc::new(Shared::default());
    let output = CpalOutput {
        tx,
        shared: Arc::clone(&shared),
        blocks: HashMap::new(),
        next_id: 0,
    };
    let player = Player {
        rx,
        shared,
        current: None,
        queue: VecDeque::new(),
        pos: 0,
        phase: 0,
        device_rate: device_rate.max(1),
    };
    (output, player)
}

impl CpalOutput {
    /// Times the stream ran dry with nothing queued.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    fn send(&self, command: Command) {
        if self.tx.send(command).is_err() {
            warn!("audio stream is gone; dropping command");
        }
    }
}

impl PcmOutput for CpalOutput {
    fn create_handle(&mut self, samples: &[i8]) -> Option<PcmHandle> {
        self.next_id = self.next_id.wrapping_add(1).max(1);
        let handle = PcmHandle(self.next_id);
        self.blocks.insert(handle.0, Arc::from(samples));
        Some(handle)
    }

    fn destroy_handle(&mut self, handle: PcmHandle) {
        self.blocks.remove(&handle.0);
    }

    fn start(&mut self, handle: PcmHandle) {
        if let Some(block) = self.blocks.get(&handle.0) {
            self.send(Command::Play(handle, Arc::clone(block)));
        }
    }

    fn enqueue_next(&mut self, handle: PcmHandle) {
        if let Some(block) = self.blocks.get(&handle.0) {
            self.shared.queued.fetch_add(1, Ordering::AcqRel);
            self.send(Command::Queue(handle, Arc::clone(block)));
        }
    }

    fn stop(&mut self, handle: PcmHandle) {
        self.send(Command::Stop(handle));
    }

    fn has_pending_entry(&self) -> bool {
        self.shared.queued.load(Ordering::Acquire) > 0
    }

    fn play_status(&self, handle: PcmHandle) -> PlayStatus {
        if self.shared.ended.load(Ordering::Acquire) == handle.0 {
            PlayStatus::Ended
        } else if self.shared.playing.load(Ordering::Acquire) == handle.0 {
            PlayStatus::Playing
        } else {
            PlayStatus::Queued
        }
    }
}

impl Player {
    fn drain_commands(&mut self) {
        while let Ok(command) = self.rx.try_recv() {
            match command {
                Command::Play(handle, block) => {
                    self.dequeue(self.queue.len());
                    self.queue.clear();
                    self.begin(handle, block);
                }
                Command::Queue(handle, block) => self.queue.push_back((handle, block)),
                Command::Stop(handle) => {
                    let before = self.queue.len();
                    self.queue.retain(|(h, _)| *h != handle);
                    self.dequeue(before - self.queue.len());
                    if matches!(self.current, Some((h, _)) if h == handle) {
                        self.current = None;
                        self.shared.playing.store(0, Ordering::Release);
                    }
                }
            }
        }
    }

    fn dequeue(&self, count: usize) {
        if count > 0 {
            self.shared.queued.fetch_sub(count, Ordering::AcqRel);
        }
    }

    fn begin(&mut self, handle: PcmHandle, block: Block) {
        self.current = Some((handle, block));
        self.pos = 0;
        self.shared.playing.store(handle.0, Ordering::Release);
    }

    fn next_sample(&mut self) -> i8 {
        loop {
            let Some((handle, block)) = &self.current else {
                return 0;
            };
            if let Some(&sample) = block.get(self.pos) {
                self.phase += OUTPUT_SAMPLE_RATE;
                while self.phase >= self.device_rate {
                    self.phase -= self.device_rate;
                    self.pos += 1;
                }
                return sample;
            }

            let finished = *handle;
            match self.queue.pop_front() {
                Some((next, block)) => {
                    self.dequeue(1);
                    self.begin(next, block);
                }
                None => {
                    self.current = None;
                    self.shared.playing.store(0, Ordering::Release);
                    self.shared.ended.store(finished.0, Ordering::Release);
                    self.shared.underruns.fetch_add(1, Ordering::Relaxed);
                    return 0;
                }
            }
        }
    }

    /// Fill an interleaved device buffer, duplicating the mono signal to
    /// every channel.
    pub fn fill<T: Copy>(&mut self, data: &mut [T], channels: usize, convert: impl Fn(i8) -> T) {
        self.drain_commands();
        for frame in data.chunks_mut(channels.max(1)) {
            let sample = convert(self.next_sample());
            frame.fill(sample);
        }
    }
}

/// Open the default output device. The returned stream must be kept alive
/// for as long as the output is used.
pub fn open_output() -> Option<(CpalOutput, cpal::Stream)> {
    let host = cpal::default_host();
    let device = host.default_output_device()?;
    let supported = match device.default_output_config() {
        Ok(c) => c,
        Err(e) => {
            warn!("no supported output config: {e}");
            return None;
        }
    };
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let (output, mut player) = channel(config.sample_rate.0);
    let channels = config.channels as usize;
    let err_fn = |err| warn!("cpal stream error: {err}");

    let stream = match sample_format {
        cpal::SampleFormat::I16 => device.build_output_stream(
            &config,
            move |data: &mut [i16], _| player.fill(data, channels, |s| (s as i16) << 8),
            err_fn,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_output_stream(
            &config,
            move |data: &mut [u16], _| {
                player.fill(data, channels, |s| (((s as i16) << 8) as i32 + 32768) as u16)
            },
            err_fn,
            None,
        ),
        cpal::SampleFormat::F32 => device.build_output_stream(
            &config,
            move |data: &mut [f32], _| player.fill(data, channels, |s| s as f32 / 128.0),
            err_fn,
            None,
        ),
        other => {
            warn!("unsupported sample format {other:?}");
            return None;
        }
    };
    let stream = match stream {
        Ok(s) => s,
        Err(e) => {
            warn!("failed to build output stream: {e}");
            return None;
        }
    };
    if let Err(e) = stream.play() {
        warn!("failed to start output stream: {e}");
        return None;
    }
    info!(
        "audio: {} Hz, {channels} channel(s), {sample_format:?}",
        config.sample_rate.0
    );
    Some((output, stream))
}
