// src/persist.rs

// durable snapshot of the ledger: one JSON document, rewritten whole

// dependencies
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::GatewayError;
use crate::record::RecordSnapshot;

/// File-backed snapshot of the ledger.
#[derive(Debug, Clone)]
pub struct SnapshotFile {
    path: PathBuf,
}

impl SnapshotFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the snapshot. A missing file is a cold start, not an error.
    pub fn read(&self) -> Result<Vec<RecordSnapshot>, GatewayError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                info!(path = %self.path.display(), "no snapshot file found, starting fresh");
                return Ok(Vec::new());
            }
            Err(source) => {
                return Err(GatewayError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        serde_json::from_slice(&data).map_err(|source| GatewayError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Read the snapshot, logging any failure and treating it as an empty ledger.
    pub fn load(&self) -> Vec<RecordSnapshot> {
        match self.read() {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "could not load snapshot, starting with an empty ledger");
                Vec::new()
            }
        }
    }

    /// Replace the snapshot with `records`.
    ///
    /// Writes a sibling temp file and renames it into place, so a crash
    /// mid-write leaves the previous snapshot intact.
    pub fn save(&self, records: &[RecordSnapshot]) -> Result<(), GatewayError> {
        let data = serde_json::to_vec_pretty(records).map_err(GatewayError::Serialize)?;
        let tmp = self.tmp_path();

        let io_err = |source: std::io::Error| GatewayError::Io {
            path: tmp.clone(),
            source,
        };

        let mut file = owner_only()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(io_err)?;
        file.write_all(&data).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;
        drop(file);

        fs::rename(&tmp, &self.path).map_err(|source| GatewayError::Io {
            path: self.path.clone(),
            source,
        })?;
        let dir = parent_dir(&self.path);
        sync_dir(dir).map_err(|source| GatewayError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        info!(path = %self.path.display(), count = records.len(), "saved snapshot");
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

// a bare file name lives in the working directory
fn parent_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

// makes the rename itself durable
#[cfg(unix)]
fn sync_dir(dir: &Path) -> std::io::Result<()> {
    fs::File::open(dir)?.sync_all()
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> std::io::Result<()> {
    Ok(())
}

#[cfg(unix)]
fn owner_only() -> OpenOptions {
    use std::os::unix::fs::OpenOptionsExt;
    let mut options = OpenOptions::new();
    options.mode(0o600);
    options
}

#[cfg(not(unix))]
fn owner_only() -> OpenOptions {
    OpenOptions::new()
}
