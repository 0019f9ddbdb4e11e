//! Atomic Store (spec.md §4.1): the write→fsync→rename→fsync-dir file
//! primitive, SHA-256 helpers, and deterministic JSON serialization that
//! every persisted JSON document in `.ace/` is written through.
//!
//! New module: the teacher has no single dedicated durability helper (its
//! durability discipline is spread across `broker.rs`'s mutex-guarded
//! writer and `state_commit.rs`'s content hashing), so this is written
//! fresh in the teacher's idiom — small, single-purpose, returning
//! `Result<_, AceError>` — rather than adapted from one file.

use crate::core::error::AceError;
use crate::core::time;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Write;
use std::path::Path;

/// Writes `bytes` to `path` via write-temp → fsync → rename → fsync-dir.
///
/// Errors raised before the rename is attempted surface as the raw I/O
/// error (the target file was never touched). Errors raised at or after
/// the rename surface as [`AceError::Durability`]: the caller cannot
/// assume which of the old or new content is now on disk without
/// re-reading and re-hashing the file.
pub fn atomic_write(path: &Path, bytes: &[u8]) -> Result<(), AceError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .ok_or_else(|| AceError::InvalidState("atomic_write target has no parent dir".into()))?;
    let file_name = path
        .file_name()
        .ok_or_else(|| AceError::InvalidState("atomic_write target has no file name".into()))?
        .to_string_lossy()
        .into_owned();
    let tmp_path = dir.join(format!(".{file_name}.tmp-{}", time::new_event_id()));

    let write_result: std::io::Result<()> = (|| {
        let mut f = std::fs::File::create(&tmp_path)?;
        f.write_all(bytes)?;
        f.sync_all()
    })();
    if let Err(e) = write_result {
        let _ = std::fs::remove_file(&tmp_path);
        return Err(AceError::Io(e));
    }

    let commit_result: std::io::Result<()> = (|| {
        std::fs::rename(&tmp_path, path)?;
        let dir_handle = std::fs::File::open(dir)?;
        dir_handle.sync_all()
    })();
    commit_result.map_err(|e| AceError::Durability(e.to_string()))
}

/// Hex-encoded SHA-256 of raw bytes. No newline or encoding normalization
/// is applied — content fingerprints are computed on exact file bytes
/// (spec.md §4.1).
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Serializes `value` deterministically: UTF-8, object keys in codepoint
/// order, 2-space indent. Routes through `serde_json::Value` first so key
/// order comes from `serde_json::Map`'s `BTreeMap` backing regardless of
/// the source struct's field declaration order.
pub fn to_deterministic_json_pretty<T: Serialize>(value: &T) -> Result<String, AceError> {
    let v = serde_json::to_value(value)?;
    serde_json::to_string_pretty(&v).map_err(AceError::from)
}

/// Same ordering guarantee as [`to_deterministic_json_pretty`] but with no
/// insignificant whitespace — used for one-object-per-line JSONL records.
pub fn to_deterministic_json_compact<T: Serialize>(value: &T) -> Result<String, AceError> {
    let v = serde_json::to_value(value)?;
    serde_json::to_string(&v).map_err(AceError::from)
}
