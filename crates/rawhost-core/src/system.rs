use std::sync::Arc;

use crate::audio::SharedMixer;
use crate::error::RuntimeError;
use crate::fs::{FileHandle, MediaFs, Whence};
use crate::input::PlayerInput;
use crate::sync::SpinFlag;
use crate::timer::{TimerCallback, TimerId};

/// Mutex handed to the interpreter. Locking from mainline busy-waits.
///
/// Interrupt handlers never look at these. Exclusion against the audio fill
/// goes through the [`SharedMixer`] lock passed to [`System::start_audio`];
/// hold that lock to touch mixer state from mainline.
pub type MutexHandle = Arc<SpinFlag>;

/// Everything the interpreter needs from a platform.
pub trait System {
    fn init(&mut self, title: &str) -> Result<(), RuntimeError>;
    fn destroy(&mut self);

    /// Stage palette entries `start..start + count` from a table of 6-bit
    /// RGB triples indexed by entry.
    fn set_palette(&mut self, start: u8, count: u8, triples: &[u8]);

    /// Blit a packed 4bpp rectangle and hand the frame to the next vertical
    /// blank.
    fn copy_rect(&mut self, x: u16, y: u16, w: u16, h: u16, buf: &[u8], pitch: u32);

    fn fade_palette(&mut self) {}
    fn restore_palette(&mut self) {}

    /// Poll the input device into [`System::input`].
    fn process_events(&mut self);
    fn input(&self) -> &PlayerInput;
    fn input_mut(&mut self) -> &mut PlayerInput;

    fn sleep(&self, ms: u32);
    fn time_stamp(&self) -> u32;

    fn start_audio(&mut self, mixer: SharedMixer);
    fn stop_audio(&mut self);
    fn output_sample_rate(&self) -> u32;

    fn add_timer(
        &mut self,
        delay_ms: u32,
        callback: TimerCallback,
    ) -> Result<TimerId, RuntimeError>;
    fn remove_timer(&mut self, id: TimerId);

    fn create_mutex(&mut self) -> MutexHandle {
        Arc::new(SpinFlag::new())
    }

    fn destroy_mutex(&mut self, mutex: MutexHandle) {
        drop(mutex);
    }

    fn lock_mutex(&self, mutex: &MutexHandle) {
        mutex.acquire();
    }

    fn unlock_mutex(&self, mutex: &MutexHandle) {
        mutex.release();
    }

    fn fs(&mut self) -> Result<&mut MediaFs, RuntimeError>;

    fn open(&mut self, path: &str) -> Result<FileHandle, RuntimeError> {
        self.fs()?.open(path)
    }

    fn seek(
        &mut self,
        file: &mut FileHandle,
        offset: i64,
        whence: Whence,
    ) -> Result<u64, RuntimeError> {
        self.fs()?.seek(file, offset, whence)
    }

    fn read(&mut self, file: &mut FileHandle, buf: &mut [u8]) -> usize {
        match self.fs() {
            Ok(fs) => fs.read(file, buf),
            Err(_) => 0,
        }
    }

    fn write(&mut self, file: &mut FileHandle, data: &[u8]) -> usize {
        match self.fs() {
            Ok(fs) => fs.write(file, data),
            Err(_) => 0,
        }
    }

    fn close(&mut self, file: FileHandle) {
        if let Ok(fs) = self.fs() {
            fs.close(file);
        }
    }

    fn read_u16_be(&mut self, file: &mut FileHandle) -> u16 {
        match self.fs() {
            Ok(fs) => fs.read_u16_be(file),
            Err(_) => 0,
        }
    }

    fn read_u32_be(&mut self, file: &mut FileHandle) -> u32 {
        match self.fs() {
            Ok(fs) => fs.read_u32_be(file),
            Err(_) => 0,
        }
    }

    fn write_u16_be(&mut self, file: &mut FileHandle, value: u16) -> usize {
        self.write(file, &value.to_be_bytes())
    }

    fn write_u32_be(&mut self, file: &mut FileHandle, value: u32) -> usize {
        self.write(file, &value.to_be_bytes())
    }
}
