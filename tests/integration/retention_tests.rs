//! Integration tests for single-copy retention in the backup directory.

use std::fs;

use rawbak::backup::{list_artifacts, remove_previous, ArtifactKind};
use tempfile::tempdir;

#[test]
fn removes_only_artifacts_of_the_device() -> rawbak::Result<()> {
    let dir = tempdir()?;
    let keep = [
        "sdb_2023-01-01.img.gz",
        "sda1_2023-01-01.img.gz",
        "sda_notes.txt",
        "sda_2023-01-01.img",
    ];
    for name in keep {
        fs::write(dir.path().join(name), b"keep")?;
    }
    fs::write(dir.path().join("sda_2023-01-01.img.gz"), b"old")?;
    fs::write(dir.path().join("sda_2023-06-01.img.gz"), b"older run")?;

    let removed = remove_previous(dir.path(), "sda")?;

    assert_eq!(2, removed.len());
    assert!(!dir.path().join("sda_2023-01-01.img.gz").exists());
    assert!(!dir.path().join("sda_2023-06-01.img.gz").exists());
    for name in keep {
        assert!(dir.path().join(name).exists(), "{name} must survive");
    }
    Ok(())
}

#[test]
fn removes_stale_temp_files() -> rawbak::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("sda_2023-01-01.img.gz.tmp"), b"partial")?;

    let removed = remove_previous(dir.path(), "sda")?;

    assert_eq!(vec![dir.path().join("sda_2023-01-01.img.gz.tmp")], removed);
    assert!(fs::read_dir(dir.path())?.next().is_none());
    Ok(())
}

#[test]
fn empty_directory_is_not_an_error() -> rawbak::Result<()> {
    let dir = tempdir()?;
    assert!(remove_previous(dir.path(), "sda")?.is_empty());
    Ok(())
}

#[test]
fn directories_with_matching_names_are_left_alone() -> rawbak::Result<()> {
    let dir = tempdir()?;
    let sub = dir.path().join("sda_2023-01-01.img.gz");
    fs::create_dir(&sub)?;
    fs::write(sub.join("inner"), b"x")?;

    assert!(remove_previous(dir.path(), "sda")?.is_empty());
    assert!(sub.join("inner").exists());
    Ok(())
}

#[test]
fn lists_artifacts_oldest_first_with_kind_and_size() -> rawbak::Result<()> {
    let dir = tempdir()?;
    fs::write(dir.path().join("sda_2024-02-01.img.gz.tmp"), b"12")?;
    fs::write(dir.path().join("sda_2024-01-01.img.gz"), b"12345")?;
    fs::write(dir.path().join("sdb_2023-01-01.img.gz"), b"other")?;

    let entries = list_artifacts(dir.path(), "sda")?;

    assert_eq!(2, entries.len());
    assert_eq!(ArtifactKind::Final, entries[0].kind);
    assert_eq!(5, entries[0].size_bytes);
    assert_eq!(ArtifactKind::Temp, entries[1].kind);
    assert_eq!("2024-02-01", entries[1].date.to_string());
    Ok(())
}
