use log::debug;
use rawhost_core::video::{Display, Frame};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Default)]
struct Latest {
    frame: Option<Frame>,
    presented: u64,
}

/// Headless scan-out: keeps the last presented frame and can dump it as a
/// PNG. Clones share the same frame.
#[derive(Clone, Default)]
pub struct FrameSink {
    latest: Arc<Mutex<Latest>>,
    snapshot_dir: Option<PathBuf>,
}

impl FrameSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Also write every presented frame to `dir` as `frame-NNNNNN.png`.
    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn presented(&self) -> u64 {
        self.lock().presented
    }

    pub fn last_frame(&self) -> Option<Frame> {
        self.lock().frame.clone()
    }

    /// Write the last presented frame. `Ok(false)` if nothing was presented
    /// yet.
    pub fn save_png(&self, path: &Path) -> image::ImageResult<bool> {
        let guard = self.lock();
        let Some(frame) = guard.frame.as_ref() else {
            return Ok(false);
        };
        write_png(frame, path)?;
        Ok(true)
    }

    fn lock(&self) -> MutexGuard<'_, Latest> {
        self.latest.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

pub fn write_png(frame: &Frame, path: &Path) -> image::ImageResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image::save_buffer(
        path,
        &frame.to_rgb8(),
        frame.width as u32,
        frame.height as u32,
        image::ColorType::Rgb8,
    )
}

impl Display for FrameSink {
    fn present(&mut self, frame: &Frame) {
        let mut latest = self.lock();
        latest.presented += 1;
        latest.frame = Some(frame.clone());

        if let Some(dir) = &self.snapshot_dir {
            let path = dir.join(format!("frame-{:06}.png", frame.sequence));
            if let Err(e) = write_png(frame, &path) {
                debug!("snapshot {} failed: {e}", path.display());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rawhost_core::video::{ColorDepth, Palette, Rgb, Surface};

    fn two_pixel_frame() -> Frame {
        let mut palette = Palette::default();
        palette.apply(0, 2, &[0, 0, 0, 63, 0, 0]);
        Frame {
            width: 2,
            height: 1,
            depth: ColorDepth::Xrgb8888,
            palette,
            surface: Surface::Indexed(vec![0x01]),
            sequence: 7,
        }
    }

    #[test]
    fn keeps_the_last_frame() {
        let mut sink = FrameSink::new();
        let viewer = sink.clone();
        assert!(viewer.last_frame().is_none());
        sink.present(&two_pixel_frame());
        assert_eq!(viewer.presented(), 1);
        let frame = viewer.last_frame().unwrap();
        assert_eq!(frame.rgb_at(1, 0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn snapshot_dir_receives_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = FrameSink::new().with_snapshot_dir(dir.path());
        sink.present(&two_pixel_frame());
        assert!(dir.path().join("frame-000007.png").exists());
    }
}
