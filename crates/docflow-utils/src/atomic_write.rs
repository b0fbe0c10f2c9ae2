//! Atomic file writes via temp file + fsync + rename.
//!
//! Both the session record and artifact bytes are written through this path
//! so a crash mid-write can never leave a half-written file where a consumer
//! (or a resumed run) would read it.

use anyhow::{Context, Result};
use camino::Utf8Path;
use std::fs;
use std::io::Write;
use tempfile::NamedTempFile;

/// Atomically write `content` to `path`.
///
/// The temporary file is created in the target's parent directory so the
/// final rename stays on one filesystem.
pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("No parent directory for {path}"))?;

    fs::create_dir_all(parent)
        .with_context(|| format!("Failed to create parent directory: {parent}"))?;

    let mut temp_file = NamedTempFile::new_in(parent)
        .with_context(|| format!("Failed to create temporary file in: {parent}"))?;

    temp_file
        .write_all(content)
        .with_context(|| format!("Failed to write temporary file for: {path}"))?;

    temp_file
        .as_file()
        .sync_all()
        .with_context(|| format!("Failed to fsync temporary file for: {path}"))?;

    temp_file
        .persist(path.as_std_path())
        .map_err(|e| anyhow::Error::new(e.error))
        .with_context(|| format!("Failed to atomically rename into place: {path}"))?;

    Ok(())
}
