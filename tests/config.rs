use rawhost::config::{self, HostConfig, InputProfile, Scale};
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn saved_config_loads_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("host.toml");
    let cfg = HostConfig {
        data_dir: PathBuf::from("/games/raw"),
        save_dir: Some(PathBuf::from("/saves")),
        tick_hz: 50,
        scale: Scale::Scale2x,
        audio: false,
        input: InputProfile::Handheld,
        ..HostConfig::default()
    };
    config::save_to_file(&path, &cfg).unwrap();
    assert_eq!(config::load_from_file(&path), cfg);
}

#[test]
fn missing_or_broken_files_fall_back_to_defaults() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    assert_eq!(config::load_from_file(&missing), HostConfig::default());

    let broken = dir.path().join("broken.toml");
    std::fs::write(&broken, "tick_hz = \"fast\"\n[[[").unwrap();
    assert_eq!(config::load_from_file(&broken), HostConfig::default());
}
