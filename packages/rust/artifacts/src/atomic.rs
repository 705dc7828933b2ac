//! Atomic write primitives.
//!
//! Content goes to a uniquely named temp file in the target directory, is
//! flushed to disk, and is then renamed over the target. Readers see either
//! the old file or the new one, never a partial write.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;
use uuid::Uuid;

use scholarsnap_shared::{Result, ScholarSnapError};

/// Metadata for a single written file.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ArtifactMeta {
    pub path: PathBuf,
    pub sha256: String,
    pub size_bytes: usize,
}

/// Atomically write bytes to `target`, creating parent directories.
pub fn write_atomic(target: &Path, content: &[u8]) -> Result<ArtifactMeta> {
    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| ScholarSnapError::io(&dir, e))?;

    let file_name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ScholarSnapError::validation(format!("not a file path: {}", target.display())))?;
    let temp = dir.join(format!(".{file_name}.{}.tmp", Uuid::now_v7().simple()));

    if let Err(e) = write_and_sync(&temp, content) {
        let _ = fs::remove_file(&temp);
        return Err(ScholarSnapError::io(&temp, e));
    }

    if let Err(e) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(ScholarSnapError::io(target, e));
    }

    let mut hasher = Sha256::new();
    hasher.update(content);
    let sha256 = format!("{:x}", hasher.finalize());

    debug!(path = %target.display(), size = content.len(), "wrote file atomically");

    Ok(ArtifactMeta {
        path: target.to_path_buf(),
        sha256,
        size_bytes: content.len(),
    })
}

/// Serialize `value` as pretty JSON (with a trailing newline) and write it atomically.
pub fn write_json_atomic<T: Serialize>(target: &Path, value: &T) -> Result<ArtifactMeta> {
    let mut json = serde_json::to_vec_pretty(value).map_err(|e| {
        ScholarSnapError::validation(format!("cannot serialize {}: {e}", target.display()))
    })?;
    json.push(b'\n');
    write_atomic(target, &json)
}

fn write_and_sync(path: &Path, content: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content)?;
    file.sync_all()
}
