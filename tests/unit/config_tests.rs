use std::path::{Path, PathBuf};

use rawbak::config::{self, BackupConfig, ConfigFile, Engine, Overrides};
use tempfile::tempdir;

fn expect_config_error(result: rawbak::Result<BackupConfig>) {
    let err = result.expect_err("configuration should be rejected");
    assert!(
        matches!(err.downcast_ref::<rawbak::Error>(), Some(rawbak::Error::Config(_))),
        "unexpected error: {err:?}"
    );
}

#[test]
fn defaults_are_compiled_in() -> rawbak::Result<()> {
    let config = config::resolve(None, &Overrides::default())?;
    assert_eq!(Path::new(config::DEFAULT_DEVICE), config.device);
    assert_eq!(Path::new(config::DEFAULT_BACKUP_DIR), config.backup_dir);
    assert_eq!(64 * 1024, config.block_size);
    assert_eq!(10, config.space_margin_percent);
    assert_eq!(Engine::Native, config.engine);
    assert!(config.require_root);
    assert_eq!("mmcblk0", config.device_id()?);
    Ok(())
}

#[test]
fn file_values_layer_over_defaults_and_flags_win() -> rawbak::Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("rawbak.toml");
    std::fs::write(
        &path,
        r#"
device = "/dev/sdb"
backup_dir = "/srv/images"
engine = "external"
compression_level = 9
require_root = false
"#,
    )?;

    let config = config::resolve(Some(&path), &Overrides::default())?;
    assert_eq!(PathBuf::from("/dev/sdb"), config.device);
    assert_eq!(PathBuf::from("/srv/images"), config.backup_dir);
    assert_eq!(Engine::External, config.engine);
    assert_eq!(9, config.compression_level);
    assert!(!config.require_root);
    assert_eq!(config::DEFAULT_BLOCK_SIZE, config.block_size);

    let overrides = Overrides {
        device: Some(PathBuf::from("/dev/nvme0n1")),
        backup_dir: None,
        engine: Some(Engine::Native),
    };
    let config = config::resolve(Some(&path), &overrides)?;
    assert_eq!(PathBuf::from("/dev/nvme0n1"), config.device);
    assert_eq!(PathBuf::from("/srv/images"), config.backup_dir);
    assert_eq!(Engine::Native, config.engine);
    Ok(())
}

#[test]
fn rejects_unknown_keys() {
    assert!(ConfigFile::parse("device = \"/dev/sda\"\nretention = 3\n").is_err());
}

#[test]
fn missing_file_is_a_config_error() {
    expect_config_error(config::resolve(
        Some(Path::new("/no/such/rawbak.toml")),
        &Overrides::default(),
    ));
}

#[test]
fn validates_numeric_settings() {
    let mut config = BackupConfig::default();
    config.block_size = 1000;
    expect_config_error(config.validate().map(|_| config.clone()));

    let mut config = BackupConfig::default();
    config.compression_level = 0;
    expect_config_error(config.validate().map(|_| config.clone()));

    let mut config = BackupConfig::default();
    config.channel_depth = 0;
    expect_config_error(config.validate().map(|_| config.clone()));

    let mut config = BackupConfig::default();
    config.device = PathBuf::from("/");
    expect_config_error(config.validate().map(|_| config.clone()));
}
