use std::path::Path;

use chrono::NaiveDate;
use rawbak::backup::{device_id, ArtifactKind, ArtifactName};

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn names_follow_device_and_date() {
    let name = ArtifactName::new("sda", date(2024, 7, 3));
    assert_eq!("sda_2024-07-03.img.gz", name.file_name());
    assert_eq!("sda_2024-07-03.img.gz.tmp", name.temp_file_name());
    assert_eq!(
        Path::new("/mnt/backup/sda_2024-07-03.img.gz"),
        name.final_path(Path::new("/mnt/backup"))
    );
    assert_eq!(
        Path::new("/mnt/backup/sda_2024-07-03.img.gz.tmp"),
        name.temp_path(Path::new("/mnt/backup"))
    );
}

#[test]
fn device_id_is_last_path_component() -> rawbak::Result<()> {
    assert_eq!("mmcblk0", device_id(Path::new("/dev/mmcblk0"))?);
    assert_eq!(
        "usb-SanDisk_Ultra-0:0",
        device_id(Path::new("/dev/disk/by-id/usb-SanDisk_Ultra-0:0"))?
    );
    let err = device_id(Path::new("/")).expect_err("root has no file name");
    assert!(matches!(
        err.downcast_ref::<rawbak::Error>(),
        Some(rawbak::Error::Config(_))
    ));
    Ok(())
}

#[test]
fn parses_final_and_temp_names() {
    let (name, kind) = ArtifactName::parse("devX_2023-01-01.img.gz").unwrap();
    assert_eq!(ArtifactName::new("devX", date(2023, 1, 1)), name);
    assert_eq!(ArtifactKind::Final, kind);

    let (name, kind) = ArtifactName::parse("devX_2023-01-01.img.gz.tmp").unwrap();
    assert_eq!("devX", name.device_id);
    assert_eq!(ArtifactKind::Temp, kind);
}

#[test]
fn ignores_names_outside_the_pattern() {
    for name in [
        "devX_2023-01-01.img",
        "devX_2023-01-01.img.gz.bak",
        "devX-2023-01-01.img.gz",
        "_2023-01-01.img.gz",
        "devX_2023-13-01.img.gz",
        "devX_latest.img.gz",
        "notes.txt",
    ] {
        assert!(ArtifactName::parse(name).is_none(), "{name} should not parse");
    }
}

#[test]
fn matching_is_scoped_to_one_device() {
    assert!(ArtifactName::matches("sda_2023-01-01.img.gz", "sda").is_some());
    assert!(ArtifactName::matches("sdb_2023-01-01.img.gz", "sda").is_none());
    // A device whose name extends another's must not be swept up with it.
    assert!(ArtifactName::matches("sda1_2023-01-01.img.gz", "sda").is_none());
}
