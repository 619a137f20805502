use log::warn;
use rawhost_core::RuntimeConfig;
use rawhost_core::fs::DEFAULT_CACHE_CAPACITY;
use rawhost_core::input::ButtonPolicy;
use rawhost_core::tick::TickRate;
use rawhost_core::video::{ColorDepth, Scaler, VideoConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum Scale {
    #[serde(rename = "1x")]
    #[default]
    X1,
    #[serde(rename = "2x")]
    X2,
    #[serde(rename = "3x")]
    X3,
    #[serde(rename = "scale2x")]
    Scale2x,
}

impl Scale {
    pub fn scaler(self) -> Scaler {
        match self {
            Self::X1 => Scaler::Point1x,
            Self::X2 => Scaler::Point2x,
            Self::X3 => Scaler::Point3x,
            Self::Scale2x => Scaler::Scale2x,
        }
    }
}

impl FromStr for Scale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1x" => Ok(Self::X1),
            "2x" => Ok(Self::X2),
            "3x" => Ok(Self::X3),
            "scale2x" => Ok(Self::Scale2x),
            other => Err(format!("unknown scale '{other}' (1x, 2x, 3x, scale2x)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum InputProfile {
    #[default]
    ConsolePad,
    Handheld,
    Keyboard,
}

impl InputProfile {
    pub fn policy(self) -> ButtonPolicy {
        match self {
            Self::ConsolePad => ButtonPolicy::console_pad(),
            Self::Handheld => ButtonPolicy::handheld(),
            Self::Keyboard => ButtonPolicy::keyboard(),
        }
    }
}

impl FromStr for InputProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "console-pad" | "pad" => Ok(Self::ConsolePad),
            "handheld" => Ok(Self::Handheld),
            "keyboard" => Ok(Self::Keyboard),
            other => Err(format!("unknown input profile '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub data_dir: PathBuf,
    pub save_dir: Option<PathBuf>,
    pub snapshot_dir: Option<PathBuf>,
    /// Vertical blanks per second. Each one advances the tick counter.
    pub tick_hz: u32,
    pub scale: Scale,
    pub audio: bool,
    pub cache_capacity: usize,
    pub input: InputProfile,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            save_dir: None,
            snapshot_dir: None,
            tick_hz: 60,
            scale: Scale::default(),
            audio: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            input: InputProfile::default(),
        }
    }
}

impl HostConfig {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            tick_rate: TickRate::millis(self.tick_hz),
            cache_capacity: self.cache_capacity,
            video: VideoConfig {
                depth: ColorDepth::Xrgb8888,
                scaler: self.scale.scaler(),
                ..VideoConfig::default()
            },
            input_policy: self.input.policy(),
            data_root: self.data_dir.clone(),
            save_root: self.save_dir.clone().unwrap_or_else(|| self.data_dir.clone()),
            // The driver raises the mid-field scanline sample itself.
            sample_on_vblank: false,
            ..RuntimeConfig::default()
        }
    }
}

pub fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = std::env::var_os("APPDATA") {
            return PathBuf::from(appdata).join("rawhost").join("host.toml");
        }
    }

    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("rawhost").join("host.toml");
    }

    if let Some(home) = std::env::var_os("HOME") {
        return PathBuf::from(home)
            .join(".config")
            .join("rawhost")
            .join("host.toml");
    }

    PathBuf::from("host.toml")
}

pub fn load_from_file(path: &PathBuf) -> HostConfig {
    let text = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(_) => return HostConfig::default(),
    };

    match toml::from_str::<HostConfig>(&text) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(
                "Failed to parse host config {}: {e}; using defaults",
                path.display()
            );
            HostConfig::default()
        }
    }
}

pub fn save_to_file(path: &PathBuf, cfg: &HostConfig) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let text = toml::to_string_pretty(cfg).unwrap_or_else(|_| String::new());
    std::fs::write(path, text)
}
