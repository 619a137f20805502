use clap::Parser;
use log::{info, warn};
use rawhost::audio;
use rawhost::config::{self, HostConfig, InputProfile, Scale};
use rawhost::display::FrameSink;
use rawhost::driver::VblankDriver;
use rawhost::input::GamepadInput;
use rawhost::probe::{self, ProbeOptions};
use rawhost_core::audio::{PcmOutput, SilentOutput};
use rawhost_core::fs::HostDirMedium;
use rawhost_core::{Backend, Runtime};
use std::path::PathBuf;

#[derive(Parser)]
struct Args {
    /// Directory holding the game data
    data_dir: Option<PathBuf>,

    /// Config file to load (defaults to the per-user config)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for save states
    #[arg(long)]
    save_dir: Option<PathBuf>,

    /// Write every presented frame as a PNG into this directory
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,

    /// Write the last presented frame to this PNG on exit
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Vertical blanks per second
    #[arg(long)]
    tick_hz: Option<u32>,

    /// Output scale: 1x, 2x, 3x or scale2x
    #[arg(long)]
    scale: Option<Scale>,

    /// Button profile: console-pad, handheld or keyboard
    #[arg(long)]
    input: Option<InputProfile>,

    /// Run without an audio device
    #[arg(long)]
    no_audio: bool,

    /// How long to run, in milliseconds
    #[arg(long, default_value_t = 3000)]
    duration_ms: u32,

    /// Save the effective configuration back to the config file
    #[arg(long)]
    write_config: bool,
}

impl Args {
    fn apply(&self, cfg: &mut HostConfig) {
        if let Some(dir) = &self.data_dir {
            cfg.data_dir = dir.clone();
        }
        if let Some(dir) = &self.save_dir {
            cfg.save_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.snapshot_dir {
            cfg.snapshot_dir = Some(dir.clone());
        }
        if let Some(hz) = self.tick_hz {
            cfg.tick_hz = hz;
        }
        if let Some(scale) = self.scale {
            cfg.scale = scale;
        }
        if let Some(input) = self.input {
            cfg.input = input;
        }
        if self.no_audio {
            cfg.audio = false;
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(config::default_config_path);
    let mut cfg = config::load_from_file(&config_path);
    args.apply(&mut cfg);
    if args.write_config {
        config::save_to_file(&config_path, &cfg)?;
        info!("Wrote config to {}", config_path.display());
    }

    info!("Starting runtime on {}", cfg.data_dir.display());
    let medium = HostDirMedium::new(cfg.data_dir.clone())?;

    // The stream must outlive the runtime's use of the output.
    let mut stream = None;
    let pcm: Box<dyn PcmOutput> = match cfg.audio.then(audio::open_output).flatten() {
        Some((output, s)) => {
            stream = Some(s);
            Box::new(output)
        }
        None => {
            if cfg.audio {
                warn!("No usable audio device; continuing silent");
            }
            Box::new(SilentOutput::default())
        }
    };

    let mut sink = FrameSink::new();
    if let Some(dir) = &cfg.snapshot_dir {
        sink = sink.with_snapshot_dir(dir.clone());
    }

    let backend = Backend {
        pcm,
        display: Box::new(sink.clone()),
        input: Box::new(GamepadInput::new()),
        medium: Box::new(medium),
    };
    let mut rt = Runtime::new(cfg.runtime_config(), backend);
    let mut driver = VblankDriver::spawn(rt.interrupts(), cfg.tick_hz)?;

    let report = probe::run(
        &mut rt,
        ProbeOptions {
            duration_ms: args.duration_ms,
            ..ProbeOptions::default()
        },
    );
    let vblanks = driver.stop();
    drop(stream);
    let report = report?;

    println!("resources:       {}", report.resources.len());
    println!("vblanks:         {vblanks}");
    println!("frames shown:    {}", report.frames_presented);
    println!("timer fires:     {}", report.timer_fires);
    println!(
        "audio:           {} slots, {} swaps, {} restarts",
        report.audio.slots_filled, report.audio.swaps, report.audio.restarts
    );
    println!(
        "media:           {} opens, {} backing reads, {} cache hits",
        report.fs.opens, report.fs.backing_reads, report.fs.cache_hits
    );
    if report.quit {
        println!("stopped by quit request");
    }

    if let Some(path) = &args.snapshot {
        if sink.save_png(path)? {
            info!("Saved snapshot to {}", path.display());
        } else {
            warn!("No frame was presented; snapshot not written");
        }
    }
    Ok(())
}
