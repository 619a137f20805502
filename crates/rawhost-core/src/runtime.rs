use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::audio::{
    AudioPipeline, AudioStats, FillOutcome, ManageOutcome, PcmOutput, SWAP_WATCHDOG_LIMIT,
    SharedMixer,
};
use crate::error::RuntimeError;
use crate::fs::{DEFAULT_CACHE_CAPACITY, FsStats, MAX_DEPTH, MediaFs, Medium};
use crate::input::{ButtonPolicy, InputNormalizer, InputSource, PlayerInput};
use crate::sync::SpinLock;
use crate::system::System;
use crate::tick::{TickCounter, TickRate, TickSource};
use crate::timer::{TimerCallback, TimerId, TimerScheduler};
use crate::video::{Display, VideoConfig, VideoPresenter, VideoStats};

#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    pub tick_rate: TickRate,
    pub cache_capacity: usize,
    pub max_depth: usize,
    pub video: VideoConfig,
    pub input_policy: ButtonPolicy,
    /// Pull one audio slot on every vertical blank. Backends with a separate
    /// audio interrupt turn this off and call [`Interrupts::audio_fill`].
    pub fill_on_vblank: bool,
    /// Run playback management every this many vertical blanks.
    pub manage_every: u32,
    /// Sample the frame-ready flag at the top of each vertical blank.
    /// Backends with a scanline interrupt turn this off and call
    /// [`Interrupts::scanline`] at their sampling point, so a frame finished
    /// after that point waits for the following blank.
    pub sample_on_vblank: bool,
    /// Extra length added to every timer period, in percent.
    pub timer_stretch_percent: u32,
    pub watchdog_limit: u32,
    pub data_root: PathBuf,
    pub save_root: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_rate: TickRate::default(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_depth: MAX_DEPTH,
            video: VideoConfig::default(),
            input_policy: ButtonPolicy::default(),
            fill_on_vblank: true,
            manage_every: 2,
            sample_on_vblank: true,
            timer_stretch_percent: 0,
            watchdog_limit: SWAP_WATCHDOG_LIMIT,
            data_root: PathBuf::from("."),
            save_root: PathBuf::from("."),
        }
    }
}

/// Hardware seams a backend plugs into the runtime.
pub struct Backend {
    pub pcm: Box<dyn PcmOutput>,
    pub display: Box<dyn Display>,
    pub input: Box<dyn InputSource>,
    pub medium: Box<dyn Medium>,
}

/// State shared with interrupt context.
///
/// Every entry point here only ever try-locks; on contention the work for
/// that interrupt is skipped.
pub struct Interrupts {
    ticks: TickSource,
    timers: SpinLock<TimerScheduler>,
    audio: SpinLock<AudioPipeline>,
    video: SpinLock<VideoPresenter>,
    fill_on_vblank: bool,
    sample_on_vblank: bool,
    manage_every: u64,
    vblanks: AtomicU64,
    skipped: AtomicU64,
}

impl Interrupts {
    fn new(config: &RuntimeConfig, pcm: Box<dyn PcmOutput>, display: Box<dyn Display>) -> Self {
        Self {
            ticks: TickSource::new(config.tick_rate),
            timers: SpinLock::new(
                TimerScheduler::new(config.tick_rate).with_stretch(config.timer_stretch_percent),
            ),
            audio: SpinLock::new(AudioPipeline::with_watchdog(pcm, config.watchdog_limit)),
            video: SpinLock::new(VideoPresenter::new(config.video, display)),
            fill_on_vblank: config.fill_on_vblank,
            sample_on_vblank: config.sample_on_vblank,
            manage_every: config.manage_every.max(1) as u64,
            vblanks: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    /// Tick/vertical-blank interrupt.
    pub fn vblank(&self) -> TickCounter {
        let now = self.ticks.tick();
        let count = self.vblanks.fetch_add(1, Ordering::Relaxed) + 1;

        if self.fill_on_vblank {
            self.audio_fill();
        }
        if count % self.manage_every == 0 {
            self.manage_audio();
        }

        match self.timers.try_lock() {
            Some(mut timers) => {
                timers.run_due(now);
            }
            None => self.skip("timers"),
        }

        match self.video.try_lock() {
            Some(mut video) => {
                if self.sample_on_vblank {
                    video.sample_scanline(0);
                }
                video.vblank();
            }
            None => self.skip("video"),
        }
        now
    }

    /// Audio-fill interrupt.
    pub fn audio_fill(&self) -> FillOutcome {
        match self.audio.try_lock() {
            Some(mut audio) => audio.fill_slot(),
            None => {
                self.skip("audio fill");
                FillOutcome::Contended
            }
        }
    }

    pub fn manage_audio(&self) -> Option<ManageOutcome> {
        match self.audio.try_lock() {
            Some(mut audio) => Some(audio.manage_playback()),
            None => {
                self.skip("audio management");
                None
            }
        }
    }

    /// Scanline interrupt: the sampling point of the field. Latches a
    /// pending frame only before the latch line.
    pub fn scanline(&self, line: u32) -> bool {
        match self.video.try_lock() {
            Some(mut video) => video.sample_scanline(line),
            None => {
                self.skip("scanline");
                false
            }
        }
    }

    pub fn now(&self) -> TickCounter {
        self.ticks.now()
    }

    pub fn vblank_count(&self) -> u64 {
        self.vblanks.load(Ordering::Relaxed)
    }

    /// Interrupt steps skipped because mainline held the lock.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    pub fn audio_stats(&self) -> AudioStats {
        self.audio.lock().stats()
    }

    pub fn video_stats(&self) -> VideoStats {
        self.video.lock().stats()
    }

    fn skip(&self, what: &str) {
        self.skipped.fetch_add(1, Ordering::Relaxed);
        log::trace!("{what} skipped: lock held by mainline");
    }
}

/// Owned runtime context: the mainline half of a backend.
pub struct Runtime {
    config: RuntimeConfig,
    interrupts: Arc<Interrupts>,
    input: Box<dyn InputSource>,
    normalizer: InputNormalizer,
    fs: MediaFs,
    title: Option<String>,
}

impl Runtime {
    pub fn new(config: RuntimeConfig, backend: Backend) -> Self {
        let Backend {
            pcm,
            display,
            input,
            medium,
        } = backend;
        let interrupts = Arc::new(Interrupts::new(&config, pcm, display));
        let mut fs = MediaFs::with_capacity(medium, config.cache_capacity);
        fs.set_max_depth(config.max_depth);
        let normalizer = InputNormalizer::new(config.input_policy.clone());
        Self {
            config,
            interrupts,
            input,
            normalizer,
            fs,
            title: None,
        }
    }

    /// Shared half to hand to whatever drives the interrupts.
    pub fn interrupts(&self) -> Arc<Interrupts> {
        Arc::clone(&self.interrupts)
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.title.is_some()
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn data_root(&self) -> &Path {
        &self.config.data_root
    }

    pub fn save_root(&self) -> &Path {
        &self.config.save_root
    }

    /// Consume a pending quit request.
    pub fn take_quit(&mut self) -> bool {
        self.normalizer.take_quit()
    }

    pub fn fs_stats(&self) -> FsStats {
        self.fs.stats()
    }

    fn ensure_init(&self) -> Result<(), RuntimeError> {
        if self.title.is_none() {
            return Err(RuntimeError::NotInitialized);
        }
        Ok(())
    }
}

impl System for Runtime {
    fn init(&mut self, title: &str) -> Result<(), RuntimeError> {
        if let Some(current) = &self.title {
            log::warn!("init({title}) on a runtime already running {current}");
            return Ok(());
        }
        log::info!(
            "{title}: tick {} Hz x{}, cache {} bytes, input {}",
            self.config.tick_rate.interrupt_hz,
            self.config.tick_rate.quantum,
            self.config.cache_capacity,
            self.normalizer.policy().name
        );
        self.title = Some(title.to_string());
        Ok(())
    }

    fn destroy(&mut self) {
        self.interrupts.audio.lock().stop();
        self.interrupts.timers.lock().clear();
        if let Some(title) = self.title.take() {
            log::info!("{title}: runtime shut down");
        }
    }

    fn set_palette(&mut self, start: u8, count: u8, triples: &[u8]) {
        self.interrupts
            .video
            .lock()
            .set_palette(start as usize, count as usize, triples);
    }

    fn copy_rect(&mut self, x: u16, y: u16, w: u16, h: u16, buf: &[u8], pitch: u32) {
        self.interrupts.video.lock().copy_rect(
            x as usize,
            y as usize,
            w as usize,
            h as usize,
            buf,
            pitch as usize,
        );
    }

    fn fade_palette(&mut self) {
        self.interrupts.video.lock().fade_palette();
    }

    fn restore_palette(&mut self) {
        self.interrupts.video.lock().restore_palette();
    }

    fn process_events(&mut self) {
        let raw = self.input.read();
        self.normalizer.poll(&raw);
    }

    fn input(&self) -> &PlayerInput {
        self.normalizer.input()
    }

    fn input_mut(&mut self) -> &mut PlayerInput {
        self.normalizer.input_mut()
    }

    /// Busy-wait on the tick counter. Needs something driving
    /// [`Interrupts::vblank`].
    fn sleep(&self, ms: u32) {
        let deadline = self
            .interrupts
            .ticks
            .now()
            .deadline_after(self.interrupts.ticks.ms_to_ticks(ms));
        while !self.interrupts.ticks.now().has_reached(deadline) {
            std::hint::spin_loop();
            std::thread::yield_now();
        }
    }

    fn time_stamp(&self) -> u32 {
        self.interrupts.ticks.timestamp()
    }

    fn start_audio(&mut self, mixer: SharedMixer) {
        self.interrupts.audio.lock().start(mixer);
    }

    fn stop_audio(&mut self) {
        self.interrupts.audio.lock().stop();
    }

    fn output_sample_rate(&self) -> u32 {
        AudioPipeline::output_sample_rate()
    }

    fn add_timer(
        &mut self,
        delay_ms: u32,
        callback: TimerCallback,
    ) -> Result<TimerId, RuntimeError> {
        self.ensure_init()?;
        let now = self.interrupts.ticks.now();
        self.interrupts.timers.lock().schedule(delay_ms, now, callback)
    }

    fn remove_timer(&mut self, id: TimerId) {
        self.interrupts.timers.lock().cancel(id);
    }

    fn fs(&mut self) -> Result<&mut MediaFs, RuntimeError> {
        self.ensure_init()?;
        Ok(&mut self.fs)
    }
}
