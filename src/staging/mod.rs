//! Staging file management.
//!
//! Every transfer moves bytes through a private local file:
//!
//! - **Import**: the external database is copied into a staging file, and the
//!   merge reads from that copy instead of the caller's handle.
//! - **Export**: the snapshot is built in a scratch file, then streamed out to
//!   the caller's destination.
//!
//! # Lifecycle
//!
//! A [`StagingFile`] is created by a [`StagingArea`] and must be handed to
//! [`StagingFile::release`] exactly once. Release also removes the SQLite
//! sidecars (`-journal`, `-wal`, `-shm`) a connection may have left next to
//! it, and tolerates files that are already gone. A staging file dropped
//! without release is removed best-effort in `Drop`.
//!
//! Names embed the direction, table, a UTC timestamp and a random suffix,
//! so concurrent operations never share a path.

pub mod location;

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{CleanupWarning, Error, Result};
use crate::validate::TableName;

pub use location::{ExternalDestination, ExternalSource, FileLocation, StdioLocation};

/// SQLite files that can appear beside a database file.
const SIDECAR_SUFFIXES: &[&str] = &["-journal", "-wal", "-shm"];

/// Directory owning all staging files for a process.
#[derive(Debug, Clone)]
pub struct StagingArea {
    dir: PathBuf,
}

impl StagingArea {
    /// Use `dir` as the staging directory, creating it owner-only if needed.
    ///
    /// An existing directory must belong to the current user and must not be
    /// writable by anyone else.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the directory cannot be created or fails
    /// the ownership and permission checks.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        create_private_dir(&dir).map_err(|e| Error::Staging {
            context: format!("create staging directory {}", dir.display()),
            source: e,
        })?;
        check_private_dir(&dir).map_err(|e| Error::Staging {
            context: format!("staging directory {} is not private", dir.display()),
            source: e,
        })?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy an external source into a fresh staging file.
    ///
    /// The file is flushed and synced before it is returned. On any failure
    /// the partial copy is released before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the source cannot be opened or the copy
    /// is interrupted.
    pub fn stage_in(&self, source: &dyn ExternalSource, table: &TableName) -> Result<StagingFile> {
        let (file, staged) = self.reserve("import", table)?;

        match copy_into(source, file) {
            Ok(bytes) => {
                debug!(path = %staged.path.display(), bytes, "Staged external source");
                Ok(staged)
            }
            Err(e) => {
                staged.release_logged();
                Err(Error::Staging {
                    context: format!("copy from {}", source.describe()),
                    source: e,
                })
            }
        }
    }

    /// Stream a staged file out to an external destination.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the staged file cannot be read or the
    /// destination cannot be written.
    pub fn stage_out(&self, staged: &StagingFile, destination: &dyn ExternalDestination) -> Result<u64> {
        let wrap = |e: io::Error| Error::Staging {
            context: format!("copy to {}", destination.describe()),
            source: e,
        };

        let mut reader = BufReader::new(File::open(&staged.path).map_err(wrap)?);
        let bytes = destination.write_from(&mut reader).map_err(wrap)?;
        debug!(destination = %destination.describe(), bytes, "Delivered staged file");
        Ok(bytes)
    }

    /// Reserve an empty scratch file for an export snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Staging`] if the file cannot be created.
    pub fn create_scratch(&self, table: &TableName) -> Result<StagingFile> {
        let (_file, staged) = self.reserve("export", table)?;
        Ok(staged)
    }

    fn reserve(&self, kind: &str, table: &TableName) -> Result<(File, StagingFile)> {
        let prefix = format!(
            "{kind}-{}-{}-",
            table.file_label(),
            Utc::now().format("%Y%m%dT%H%M%S%3f")
        );

        let temp = tempfile::Builder::new()
            .prefix(&prefix)
            .suffix(".db")
            .tempfile_in(&self.dir)
            .map_err(|e| Error::Staging {
                context: format!("create staging file in {}", self.dir.display()),
                source: e,
            })?;

        let (file, path) = temp.keep().map_err(|e| Error::Staging {
            context: "take ownership of staging file".to_string(),
            source: e.error,
        })?;

        Ok((file, StagingFile::new(path)))
    }
}

#[cfg(unix)]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(dir)
}

#[cfg(not(unix))]
fn create_private_dir(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)
}

#[cfg(unix)]
fn check_private_dir(dir: &Path) -> io::Result<()> {
    use std::os::unix::fs::MetadataExt;

    let meta = fs::metadata(dir)?;
    if !meta.is_dir() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"));
    }

    let mode = meta.mode() & 0o777;
    if mode & 0o022 != 0 {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            format!("writable by other users (mode {mode:o})"),
        ));
    }

    // Files created here are owned by the effective user
    let owner_probe = tempfile::tempfile_in(dir)?;
    if owner_probe.metadata()?.uid() != meta.uid() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "owned by another user",
        ));
    }
    Ok(())
}

#[cfg(not(unix))]
fn check_private_dir(dir: &Path) -> io::Result<()> {
    if fs::metadata(dir)?.is_dir() {
        Ok(())
    } else {
        Err(io::Error::new(io::ErrorKind::InvalidInput, "not a directory"))
    }
}

fn copy_into(source: &dyn ExternalSource, file: File) -> io::Result<u64> {
    let mut reader = source.open_reader()?;
    let mut writer = BufWriter::new(file);
    let bytes = io::copy(&mut reader, &mut writer)?;
    writer.flush()?;
    writer.get_ref().sync_all()?;
    Ok(bytes)
}

/// A private local file holding database bytes for one transfer.
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    released: bool,
}

impl StagingFile {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            released: false,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staging file and its SQLite sidecars.
    ///
    /// Files that are already gone count as released.
    ///
    /// # Errors
    ///
    /// Returns a [`CleanupWarning`] for the first file that could not be
    /// removed. Callers log it; it never changes a transfer's outcome.
    pub fn release(mut self) -> std::result::Result<(), CleanupWarning> {
        self.released = true;
        remove_with_sidecars(&self.path)
    }

    /// Release, logging instead of returning a cleanup failure.
    pub fn release_logged(self) {
        if let Err(warning) = self.release() {
            warn!(path = %warning.path.display(), error = %warning.source, "Staging cleanup failed");
        }
    }
}

impl Drop for StagingFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(warning) = remove_with_sidecars(&self.path) {
            warn!(path = %warning.path.display(), error = %warning.source, "Staging cleanup on drop failed");
        }
    }
}

fn remove_with_sidecars(path: &Path) -> std::result::Result<(), CleanupWarning> {
    let mut first_failure = None;

    let sidecars = SIDECAR_SUFFIXES.iter().map(|suffix| {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    });

    for candidate in std::iter::once(path.to_path_buf()).chain(sidecars) {
        match fs::remove_file(&candidate) {
            Ok(()) => debug!(path = %candidate.display(), "Removed staging file"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => {
                if first_failure.is_none() {
                    first_failure = Some(CleanupWarning {
                        path: candidate,
                        source: e,
                    });
                }
            }
        }
    }

    first_failure.map_or(Ok(()), Err)
}

/// Size and SHA256 of a file, computed in one streaming pass.
///
/// # Errors
///
/// Returns [`Error::Staging`] if the file cannot be read.
pub fn file_digest(path: &Path) -> Result<(u64, String)> {
    digest_file(path).map_err(|e| Error::Staging {
        context: format!("digest {}", path.display()),
        source: e,
    })
}

fn digest_file(path: &Path) -> io::Result<(u64, String)> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    Ok((total, format!("{:x}", hasher.finalize())))
}
