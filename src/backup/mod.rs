//! Backup artifacts on disk.
//!
//! Naming of final and temporary artifacts, single-copy retention in the
//! backup directory, and the guard that owns a temporary artifact until it is
//! committed.

pub mod artifact;
pub mod guard;
pub mod retention;

pub use artifact::{device_id, ArtifactKind, ArtifactName};
pub use guard::TempArtifact;
pub use retention::{list_artifacts, remove_previous, ArtifactEntry};
