use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, Ordering};

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 200;
pub const PALETTE_COLORS: usize = 16;
/// Bytes per row of a packed 4bpp screen.
pub const PACKED_PITCH: usize = SCREEN_WIDTH / 2;
/// A pending frame sampled before this scanline is shown at the coming
/// vertical blank; sampled at or after it, it waits one more interval.
pub const DEFAULT_LATCH_LINE: u32 = 192;

/// Expand a 6-bit palette channel to 8 bits.
#[inline]
pub fn expand_channel(c: u8) -> u8 {
    let c = c & 0x3f;
    (c << 2) | (c & 3)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Quarter brightness, as used for menu overlays.
    pub fn dimmed(self) -> Self {
        Self {
            r: self.r >> 2,
            g: self.g >> 2,
            b: self.b >> 2,
        }
    }
}

/// Native pixel formats of the supported backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ColorDepth {
    /// 15-bit BGR with the RGB flag in bit 15 (console color RAM).
    Bgr555,
    Rgb555,
    #[default]
    Rgb565,
    Xrgb8888,
}

const BGR555_RGB_FLAG: u32 = 0x8000;

impl ColorDepth {
    pub fn quantize(self, c: Rgb) -> u32 {
        let (r, g, b) = (c.r as u32, c.g as u32, c.b as u32);
        match self {
            ColorDepth::Bgr555 => BGR555_RGB_FLAG | ((b >> 3) << 10) | ((g >> 3) << 5) | (r >> 3),
            ColorDepth::Rgb555 => ((r >> 3) << 10) | ((g >> 3) << 5) | (b >> 3),
            ColorDepth::Rgb565 => ((r >> 3) << 11) | ((g >> 2) << 5) | (b >> 3),
            ColorDepth::Xrgb8888 => (r << 16) | (g << 8) | b,
        }
    }

    /// Back to 8-bit channels, replicating high bits into the low ones.
    pub fn to_rgb(self, native: u32) -> Rgb {
        fn widen5(v: u32) -> u8 {
            let v = (v & 0x1f) as u8;
            (v << 3) | (v >> 2)
        }
        fn widen6(v: u32) -> u8 {
            let v = (v & 0x3f) as u8;
            (v << 2) | (v >> 4)
        }
        let n = native;
        match self {
            ColorDepth::Bgr555 => Rgb::new(widen5(n), widen5(n >> 5), widen5(n >> 10)),
            ColorDepth::Rgb555 => Rgb::new(widen5(n >> 10), widen5(n >> 5), widen5(n)),
            ColorDepth::Rgb565 => Rgb::new(widen5(n >> 11), widen6(n >> 5), widen5(n)),
            ColorDepth::Xrgb8888 => Rgb::new((n >> 16) as u8, (n >> 8) as u8, n as u8),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ColorDepth::Xrgb8888 => 4,
            _ => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BlitMode {
    /// Expand indices to native pixels in software.
    #[default]
    TrueColor,
    /// Keep packed indices; the palette is applied at scan-out.
    IndexedPlane,
}

/// Point and edge-aware software scalers for true-color backends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Scaler {
    #[default]
    Point1x,
    Point2x,
    Point3x,
    Scale2x,
}

impl Scaler {
    pub fn factor(self) -> usize {
        match self {
            Scaler::Point1x => 1,
            Scaler::Point2x | Scaler::Scale2x => 2,
            Scaler::Point3x => 3,
        }
    }

    pub fn apply(self, src: &[u32], width: usize, height: usize) -> Vec<u32> {
        match self {
            Scaler::Point1x => src.to_vec(),
            Scaler::Point2x | Scaler::Point3x => point(src, width, height, self.factor()),
            Scaler::Scale2x => scale2x(src, width, height),
        }
    }
}

impl fmt::Display for Scaler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Scaler::Point1x => "point1x",
            Scaler::Point2x => "point2x",
            Scaler::Point3x => "point3x",
            Scaler::Scale2x => "scale2x",
        };
        f.write_str(name)
    }
}

impl FromStr for Scaler {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "point1x" | "1x" => Ok(Scaler::Point1x),
            "point2x" | "2x" => Ok(Scaler::Point2x),
            "point3x" | "3x" => Ok(Scaler::Point3x),
            "scale2x" => Ok(Scaler::Scale2x),
            other => Err(format!("unknown scaler '{other}'")),
        }
    }
}

fn point(src: &[u32], width: usize, height: usize, factor: usize) -> Vec<u32> {
    let out_w = width * factor;
    let mut out = vec![0; out_w * height * factor];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        for dy in 0..factor {
            let dst = &mut out[(y * factor + dy) * out_w..(y * factor + dy + 1) * out_w];
            for (x, &px) in row.iter().enumerate() {
                dst[x * factor..(x + 1) * factor].fill(px);
            }
        }
    }
    out
}

fn scale2x(src: &[u32], width: usize, height: usize) -> Vec<u32> {
    let out_w = width * 2;
    let mut out = vec![0; out_w * height * 2];
    let at = |x: usize, y: usize| src[y * width + x];
    for y in 0..height {
        for x in 0..width {
            let e = at(x, y);
            let b = at(x, y.saturating_sub(1));
            let h = at(x, (y + 1).min(height - 1));
            let d = at(x.saturating_sub(1), y);
            let f = at((x + 1).min(width - 1), y);
            let (e0, e1, e2, e3) = if b != h && d != f {
                (
                    if d == b { d } else { e },
                    if b == f { f } else { e },
                    if d == h { d } else { e },
                    if h == f { f } else { e },
                )
            } else {
                (e, e, e, e)
            };
            let top = 2 * y * out_w + 2 * x;
            out[top] = e0;
            out[top + 1] = e1;
            out[top + out_w] = e2;
            out[top + out_w + 1] = e3;
        }
    }
    out
}

/// 16-entry palette in 8-bit channels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Palette {
    entries: [Rgb; PALETTE_COLORS],
}

impl Palette {
    /// Load entries `start..start + count` from `triples`, a 6-bit RGB table
    /// indexed by palette entry. Entries past the table or the palette are
    /// ignored; returns how many were applied.
    pub fn apply(&mut self, start: usize, count: usize, triples: &[u8]) -> usize {
        let end = (start + count).min(PALETTE_COLORS);
        let mut applied = 0;
        for i in start..end {
            let Some(c) = triples.get(i * 3..i * 3 + 3) else {
                break;
            };
            self.entries[i] =
                Rgb::new(expand_channel(c[0]), expand_channel(c[1]), expand_channel(c[2]));
            applied += 1;
        }
        applied
    }

    pub fn get(&self, index: usize) -> Rgb {
        self.entries[index & 0xf]
    }

    pub fn entries(&self) -> &[Rgb; PALETTE_COLORS] {
        &self.entries
    }

    pub fn dimmed(&self) -> Palette {
        Palette {
            entries: self.entries.map(Rgb::dimmed),
        }
    }

    pub fn native(&self, depth: ColorDepth) -> [u32; PALETTE_COLORS] {
        self.entries.map(|c| depth.quantize(c))
    }
}

const IDLE: u8 = 0;
const PENDING: u8 = 1;
const LATCHED: u8 = 2;

/// Single-writer/single-reader frame-ready flag.
///
/// Mainline marks a frame ready; the sampling point latches a pending frame
/// only while it is still early enough in the field; the vertical blank
/// consumes a latched frame.
#[derive(Debug, Default)]
pub struct FrameHandoff {
    state: AtomicU8,
}

impl FrameHandoff {
    pub const fn new() -> Self {
        Self {
            state: AtomicU8::new(IDLE),
        }
    }

    pub fn mark_ready(&self) {
        self.state.store(PENDING, Ordering::Release);
    }

    /// Sampling point. Returns true if a pending frame was latched.
    pub fn sample(&self, scanline: u32, latch_line: u32) -> bool {
        scanline < latch_line
            && self
                .state
                .compare_exchange(PENDING, LATCHED, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
    }

    /// Vertical blank. Returns true if a latched frame is due for display.
    pub fn take_vblank(&self) -> bool {
        self.state
            .compare_exchange(LATCHED, IDLE, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_pending(&self) -> bool {
        self.state.load(Ordering::Acquire) == PENDING
    }

    pub fn is_latched(&self) -> bool {
        self.state.load(Ordering::Acquire) == LATCHED
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Surface {
    /// Native pixels, `width * height`.
    TrueColor(Vec<u32>),
    /// Packed 4bpp indices, high nibble first, `width / 2` bytes per row.
    Indexed(Vec<u8>),
}

/// A latched frame as handed to the display.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub depth: ColorDepth,
    pub palette: Palette,
    pub surface: Surface,
    pub sequence: u64,
}

impl Frame {
    pub fn rgb_at(&self, x: usize, y: usize) -> Rgb {
        match &self.surface {
            Surface::TrueColor(pixels) => self.depth.to_rgb(pixels[y * self.width + x]),
            Surface::Indexed(packed) => {
                let byte = packed[y * (self.width / 2) + x / 2];
                let index = if x % 2 == 0 { byte >> 4 } else { byte & 0xf };
                self.palette.get(index as usize)
            }
        }
    }

    /// Packed RGB8 rows, for snapshots and software presenters.
    pub fn to_rgb8(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.width * self.height * 3);
        for y in 0..self.height {
            for x in 0..self.width {
                let c = self.rgb_at(x, y);
                out.extend_from_slice(&[c.r, c.g, c.b]);
            }
        }
        out
    }
}

/// Scan-out seam. Called from the vertical-blank interrupt.
pub trait Display: Send {
    fn present(&mut self, frame: &Frame);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoConfig {
    pub mode: BlitMode,
    pub depth: ColorDepth,
    pub scaler: Scaler,
    pub latch_line: u32,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            mode: BlitMode::TrueColor,
            depth: ColorDepth::Rgb565,
            scaler: Scaler::Point1x,
            latch_line: DEFAULT_LATCH_LINE,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct VideoStats {
    pub frames_submitted: u64,
    pub frames_latched: u64,
    pub frames_presented: u64,
}

/// Back buffer written by the interpreter, latched at the sampling point and
/// presented at the following vertical blank.
pub struct VideoPresenter {
    config: VideoConfig,
    display: Box<dyn Display>,
    palette: Palette,
    dimmed: bool,
    back_indices: Vec<u8>,
    back_pixels: Vec<u32>,
    front: Option<Frame>,
    handoff: FrameHandoff,
    sequence: u64,
    stats: VideoStats,
}

impl VideoPresenter {
    pub fn new(config: VideoConfig, display: Box<dyn Display>) -> Self {
        let back_pixels = match config.mode {
            BlitMode::TrueColor => vec![0; SCREEN_WIDTH * SCREEN_HEIGHT],
            BlitMode::IndexedPlane => Vec::new(),
        };
        Self {
            config,
            display,
            palette: Palette::default(),
            dimmed: false,
            back_indices: vec![0; PACKED_PITCH * SCREEN_HEIGHT],
            back_pixels,
            front: None,
            handoff: FrameHandoff::new(),
            sequence: 0,
            stats: VideoStats::default(),
        }
    }

    pub fn config(&self) -> VideoConfig {
        self.config
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    /// Stage palette entries. They reach the screen with the next latched
    /// frame, together with any pixels submitted in the same frame.
    pub fn set_palette(&mut self, start: usize, count: usize, triples: &[u8]) {
        let applied = self.palette.apply(start, count, triples);
        if applied < count {
            log::warn!(
                "palette update {start}+{count} truncated to {applied} entries ({} bytes given)",
                triples.len()
            );
        }
    }

    /// Copy a packed 4bpp rectangle into the back buffer and mark the frame
    /// ready. `x` and `w` are in pixels; `pitch` is bytes per source row and
    /// the source is addressed at `y * pitch + x / 2`.
    pub fn copy_rect(
        &mut self,
        x: usize,
        y: usize,
        w: usize,
        h: usize,
        buf: &[u8],
        pitch: usize,
    ) {
        let x = x & !1;
        let w = w.min(SCREEN_WIDTH.saturating_sub(x)) & !1;
        let h = h.min(SCREEN_HEIGHT.saturating_sub(y));
        if w == 0 || h == 0 {
            log::debug!("copy_rect at ({x}, {y}) clipped to nothing");
            return;
        }
        let row_bytes = w / 2;
        let native = self.native_palette();

        for row in 0..h {
            let src_start = (y + row) * pitch + x / 2;
            let Some(src) = buf.get(src_start..src_start + row_bytes) else {
                log::warn!("copy_rect source ends at row {row} of {h}");
                break;
            };
            let dst_start = (y + row) * PACKED_PITCH + x / 2;
            self.back_indices[dst_start..dst_start + row_bytes].copy_from_slice(src);

            if self.config.mode == BlitMode::TrueColor {
                let line = (y + row) * SCREEN_WIDTH + x;
                for (i, &byte) in src.iter().enumerate() {
                    self.back_pixels[line + i * 2] = native[(byte >> 4) as usize];
                    self.back_pixels[line + i * 2 + 1] = native[(byte & 0xf) as usize];
                }
            }
        }
        self.mark_frame_ready();
    }

    pub fn mark_frame_ready(&mut self) {
        self.stats.frames_submitted += 1;
        self.handoff.mark_ready();
    }

    /// Dim the visible palette to a quarter and resubmit the current frame.
    pub fn fade_palette(&mut self) {
        self.dimmed = true;
        self.redraw();
    }

    pub fn restore_palette(&mut self) {
        self.dimmed = false;
        self.redraw();
    }

    pub fn is_dimmed(&self) -> bool {
        self.dimmed
    }

    /// Sampling point of the field. Latches a pending frame if `scanline` is
    /// still before the latch line.
    pub fn sample_scanline(&mut self, scanline: u32) -> bool {
        if !self.handoff.sample(scanline, self.config.latch_line) {
            return false;
        }
        self.latch();
        true
    }

    /// Vertical blank: present the latched frame, if any.
    pub fn vblank(&mut self) -> bool {
        if !self.handoff.take_vblank() {
            return false;
        }
        if let Some(frame) = self.front.as_ref() {
            self.display.present(frame);
            self.stats.frames_presented += 1;
        }
        true
    }

    pub fn front(&self) -> Option<&Frame> {
        self.front.as_ref()
    }

    pub fn handoff(&self) -> &FrameHandoff {
        &self.handoff
    }

    pub fn stats(&self) -> VideoStats {
        self.stats
    }

    fn visible_palette(&self) -> Palette {
        if self.dimmed {
            self.palette.dimmed()
        } else {
            self.palette
        }
    }

    fn native_palette(&self) -> [u32; PALETTE_COLORS] {
        self.visible_palette().native(self.config.depth)
    }

    fn redraw(&mut self) {
        if self.config.mode == BlitMode::TrueColor {
            let native = self.native_palette();
            for (i, &byte) in self.back_indices.iter().enumerate() {
                self.back_pixels[i * 2] = native[(byte >> 4) as usize];
                self.back_pixels[i * 2 + 1] = native[(byte & 0xf) as usize];
            }
        }
        self.mark_frame_ready();
    }

    fn latch(&mut self) {
        self.sequence += 1;
        let palette = self.visible_palette();
        let frame = match self.config.mode {
            BlitMode::TrueColor => {
                let factor = self.config.scaler.factor();
                Frame {
                    width: SCREEN_WIDTH * factor,
                    height: SCREEN_HEIGHT * factor,
                    depth: self.config.depth,
                    palette,
                    surface: Surface::TrueColor(self.config.scaler.apply(
                        &self.back_pixels,
                        SCREEN_WIDTH,
                        SCREEN_HEIGHT,
                    )),
                    sequence: self.sequence,
                }
            }
            BlitMode::IndexedPlane => Frame {
                width: SCREEN_WIDTH,
                height: SCREEN_HEIGHT,
                depth: self.config.depth,
                palette,
                surface: Surface::Indexed(self.back_indices.clone()),
                sequence: self.sequence,
            },
        };
        self.front = Some(frame);
        self.stats.frames_latched += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Frame>>>);

    impl Display for Recorder {
        fn present(&mut self, frame: &Frame) {
            self.0.lock().unwrap().push(frame.clone());
        }
    }

    fn presenter(config: VideoConfig) -> (VideoPresenter, Recorder) {
        let recorder = Recorder::default();
        (VideoPresenter::new(config, Box::new(recorder.clone())), recorder)
    }

    fn ramp_triples() -> Vec<u8> {
        (0..PALETTE_COLORS as u8)
            .flat_map(|i| [i * 4, 63 - i * 4, i])
            .collect()
    }

    #[test]
    fn channel_expansion_fills_low_bits() {
        assert_eq!(expand_channel(0), 0);
        assert_eq!(expand_channel(63), 255);
        assert_eq!(expand_channel(0x21), 0x85);
    }

    #[test]
    fn console_color_carries_rgb_flag() {
        let white = Rgb::new(255, 255, 255);
        assert_eq!(ColorDepth::Bgr555.quantize(white), 0xffff);
        assert_eq!(ColorDepth::Bgr555.quantize(Rgb::new(255, 0, 0)), 0x801f);
        assert_eq!(ColorDepth::Rgb565.quantize(Rgb::new(0, 255, 0)), 0x07e0);
        assert_eq!(ColorDepth::Rgb565.to_rgb(0xffff), white);
    }

    #[test]
    fn dimming_matches_five_bit_shift() {
        let c = Rgb::new(expand_channel(63), expand_channel(40), expand_channel(8));
        let native = ColorDepth::Bgr555.quantize(c);
        let shifted = BGR555_RGB_FLAG
            | ((((native >> 10) & 0x1f) >> 2) << 10)
            | ((((native >> 5) & 0x1f) >> 2) << 5)
            | ((native & 0x1f) >> 2);
        assert_eq!(ColorDepth::Bgr555.quantize(c.dimmed()), shifted);
    }

    #[test]
    fn palette_update_is_clipped() {
        let mut palette = Palette::default();
        assert_eq!(palette.apply(14, 4, &ramp_triples()), 2);
        assert_eq!(palette.apply(0, 16, &[63, 0, 0]), 1);
        assert_eq!(palette.get(0), Rgb::new(255, 0, 0));
    }

    #[test]
    fn off_screen_rectangles_clip_to_nothing() {
        let (mut video, _) = presenter(VideoConfig::default());
        let screen = vec![0x11u8; PACKED_PITCH * SCREEN_HEIGHT * 2];
        video.copy_rect(322, 199, 8, 1, &screen, PACKED_PITCH);
        video.copy_rect(SCREEN_WIDTH, 0, 16, 16, &screen, PACKED_PITCH);
        video.copy_rect(0, SCREEN_HEIGHT, 16, 16, &screen, PACKED_PITCH);
        video.copy_rect(10, 10, 0, 4, &screen, PACKED_PITCH);
        assert_eq!(video.stats().frames_submitted, 0);
        assert!(!video.handoff().is_pending());

        // Partly visible rectangles still land inside the back buffer.
        video.copy_rect(316, 198, 8, 8, &screen, PACKED_PITCH);
        assert_eq!(video.stats().frames_submitted, 1);
    }

    #[test]
    fn copy_rect_decodes_high_nibble_first() {
        let (mut video, _) = presenter(VideoConfig::default());
        video.set_palette(0, 16, &ramp_triples());
        let mut screen = vec![0u8; PACKED_PITCH * SCREEN_HEIGHT];
        screen[0] = 0x1f;
        screen[PACKED_PITCH + 1] = 0x23;
        video.copy_rect(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT, &screen, PACKED_PITCH);
        assert!(video.sample_scanline(0));

        let frame = video.front().unwrap();
        let palette = *video.palette();
        let depth = ColorDepth::Rgb565;
        let shown = |i: usize| depth.to_rgb(depth.quantize(palette.get(i)));
        assert_eq!(frame.rgb_at(0, 0), shown(1));
        assert_eq!(frame.rgb_at(1, 0), shown(15));
        assert_eq!(frame.rgb_at(2, 1), shown(2));
        assert_eq!(frame.rgb_at(3, 1), shown(3));
    }

    #[test]
    fn indexed_plane_keeps_packed_indices() {
        let (mut video, _) = presenter(VideoConfig {
            mode: BlitMode::IndexedPlane,
            depth: ColorDepth::Bgr555,
            ..VideoConfig::default()
        });
        let mut screen = vec![0u8; PACKED_PITCH * SCREEN_HEIGHT];
        screen[5] = 0xab;
        video.copy_rect(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT, &screen, PACKED_PITCH);
        video.sample_scanline(0);
        match &video.front().unwrap().surface {
            Surface::Indexed(packed) => assert_eq!(packed, &screen),
            other => panic!("expected indexed surface, got {other:?}"),
        }
    }

    #[test]
    fn late_frame_waits_for_next_interval() {
        let (mut video, recorder) = presenter(VideoConfig::default());
        let screen = vec![0x11u8; PACKED_PITCH * SCREEN_HEIGHT];
        video.copy_rect(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT, &screen, PACKED_PITCH);

        assert!(!video.sample_scanline(DEFAULT_LATCH_LINE + 3));
        assert!(!video.vblank());
        assert!(recorder.0.lock().unwrap().is_empty());

        assert!(video.sample_scanline(10));
        assert!(video.vblank());
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
        assert!(!video.vblank());
    }

    #[test]
    fn palette_and_pixels_land_in_the_same_frame() {
        let (mut video, recorder) = presenter(VideoConfig::default());
        let screen = vec![0x00u8; PACKED_PITCH * SCREEN_HEIGHT];
        video.set_palette(0, 1, &[63, 63, 63]);
        video.copy_rect(0, 0, SCREEN_WIDTH, SCREEN_HEIGHT, &screen, PACKED_PITCH);
        video.sample_scanline(0);
        video.set_palette(0, 1, &[0, 0, 0]);
        video.vblank();

        let frames = recorder.0.lock().unwrap();
        assert_eq!(frames[0].rgb_at(0, 0), Rgb::new(255, 255, 255));
    }

    #[test]
    fn fade_and_restore_resubmit_frame() {
        let (mut video, _) = presenter(VideoConfig::default());
        video.set_palette(0, 1, &[63, 63, 63]);
        video.copy_rect(0, 0, 2, 1, &[0x00], 1);
        video.sample_scanline(0);
        video.vblank();

        video.fade_palette();
        assert!(video.handoff().is_pending());
        video.sample_scanline(0);
        let dim = ColorDepth::Rgb565.to_rgb(ColorDepth::Rgb565.quantize(Rgb::new(63, 63, 63)));
        assert_eq!(video.front().unwrap().rgb_at(0, 0), dim);

        video.restore_palette();
        video.sample_scanline(0);
        assert_eq!(video.front().unwrap().rgb_at(0, 0), Rgb::new(255, 255, 255));
    }

    #[test]
    fn point_scaler_replicates_pixels() {
        let out = Scaler::Point2x.apply(&[1, 2, 3, 4], 2, 2);
        assert_eq!(out, vec![1, 1, 2, 2, 1, 1, 2, 2, 3, 3, 4, 4, 3, 3, 4, 4]);
    }

    #[test]
    fn scale2x_rounds_diagonal_edges() {
        // 1 1
        // 1 0  -> the bottom-right block's top-left corner takes the edge color.
        let out = Scaler::Scale2x.apply(&[1, 1, 1, 0], 2, 2);
        assert_eq!(out[2 * 4 + 2], 1);
        assert_eq!(out[3 * 4 + 3], 0);
        assert_eq!("3x".parse::<Scaler>(), Ok(Scaler::Point3x));
    }
}
