//! Persistence of flat weight buffers.
//!
//! A snapshot file holds the amount of values as a little-endian `u64` followed by the raw
//! `f32` values in native byte order. Files are written next to their destination and renamed
//! into place, a reader never observes a partially written snapshot.

use std::{
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
    process,
    sync::atomic::{AtomicU64, Ordering},
};

use crate::{Result, StoreErr};

const HEADER_LEN: usize = size_of::<u64>();

static WRITES: AtomicU64 = AtomicU64::new(0);

/// A temporary file next to `path`, distinct for every call.
///
/// Concurrent writers of the same destination never share a temporary file, the last rename
/// wins.
pub fn temp_path(path: &Path) -> PathBuf {
    let id = WRITES.fetch_add(1, Ordering::Relaxed);

    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(format!(".{}-{id}.tmp", process::id()));
    path.with_file_name(name)
}

/// Writes `values` to `path`, creating the parent directories if needed.
///
/// # Arguments
/// * `path` - Where to write the snapshot.
/// * `values` - The weights to persist.
///
/// # Returns
/// An io error if failed to do so.
pub fn save(path: &Path, values: &[f32]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp = temp_path(path);
    let mut file = File::create(&tmp)?;
    file.write_all(&(values.len() as u64).to_le_bytes())?;
    file.write_all(bytemuck::cast_slice(values))?;
    file.sync_all()?;

    fs::rename(&tmp, path)?;
    Ok(())
}

/// Reads the snapshot stored at `path`.
///
/// # Returns
/// The persisted weights, an io error if the file can't be read or a `Corrupt` error if its
/// contents don't match the header.
pub fn load(path: &Path) -> Result<Vec<f32>> {
    let bytes = fs::read(path)?;

    let corrupt = |reason: String| StoreErr::Corrupt {
        path: path.to_path_buf(),
        reason,
    };

    let Some((header, body)) = bytes.split_first_chunk::<HEADER_LEN>() else {
        return Err(corrupt(format!("expected at least {HEADER_LEN} bytes")));
    };

    let len = u64::from_le_bytes(*header) as usize;
    if body.len() != len * size_of::<f32>() {
        return Err(corrupt(format!(
            "header declares {len} values but the body holds {} bytes",
            body.len()
        )));
    }

    Ok(bytemuck::pod_collect_to_vec(body))
}
