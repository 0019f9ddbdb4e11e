//! Journal (spec.md §4.5): append-only, fsync-ordered edit log with
//! intent/success/revert entries, crash recovery, and revert-by-id.
//!
//! Grounded on the teacher's `core/broker.rs::log_event`: a mutex-guarded
//! `OpenOptions::append` writer that serializes one JSON object per line
//! and fsyncs, generalized here to fsync the directory too (spec.md
//! §4.1's durability primitive) and to a three-entry-kind schema instead
//! of one audit-event schema.

use crate::core::atomic::sha256_hex;
use crate::core::error::AceError;
use crate::core::model::Edit;
use crate::core::store::ProjectStore;
use crate::core::time::{new_event_id, now_iso8601};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::sync::Mutex;

/// Pre-image bytes beyond this size are backed up in full under
/// `.ace/blobs/<sha256>` rather than inlined (spec.md §9 open question,
/// resolved as option (a) in DESIGN.md).
pub const INLINE_PRE_IMAGE_LIMIT: usize = 4096;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    Intent {
        event_id: String,
        timestamp: String,
        file: String,
        plan_id: String,
        rule_ids: Vec<String>,
        before_sha: String,
        before_size: u64,
        /// First 4 KiB of the original bytes, base64-free: stored as a
        /// UTF-8-lossy string is not acceptable for binary data, so this
        /// is hex-encoded.
        pre_image_hex: String,
        /// Present when `before_size` exceeds [`INLINE_PRE_IMAGE_LIMIT`]:
        /// the sha256 of the full original bytes, recoverable from
        /// `.ace/blobs/<blob_ref>`.
        blob_ref: Option<String>,
    },
    Success {
        event_id: String,
        timestamp: String,
        file: String,
        plan_id: String,
        after_sha: String,
        after_size: u64,
        receipt_id: String,
    },
    Revert {
        event_id: String,
        timestamp: String,
        file: String,
        plan_id: String,
        reason: String,
    },
}

impl JournalEntry {
    pub fn file(&self) -> &str {
        match self {
            JournalEntry::Intent { file, .. } => file,
            JournalEntry::Success { file, .. } => file,
            JournalEntry::Revert { file, .. } => file,
        }
    }

    pub fn plan_id(&self) -> &str {
        match self {
            JournalEntry::Intent { plan_id, .. } => plan_id,
            JournalEntry::Success { plan_id, .. } => plan_id,
            JournalEntry::Revert { plan_id, .. } => plan_id,
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, AceError> {
    if hex.len() % 2 != 0 {
        return Err(AceError::Integrity("odd-length hex pre_image".into()));
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&hex[i..i + 2], 16)
                .map_err(|e| AceError::Integrity(format!("invalid hex pre_image: {e}")))
        })
        .collect()
}

/// Single-writer, mutex-serialized appender for one run's journal file
/// (spec.md §5: "a single journal writer with its own mutex, fsyncing
/// each line").
pub struct JournalWriter {
    path: std::path::PathBuf,
    lock: Mutex<()>,
}

impl JournalWriter {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append(&self, entry: &JournalEntry) -> Result<(), AceError> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| AceError::InvalidState("journal lock poisoned".into()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut f = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(f, "{}", serde_json::to_string(entry)?)?;
        f.sync_all()?;
        if let Some(parent) = self.path.parent() {
            let dir_handle = std::fs::File::open(parent)?;
            dir_handle.sync_all()?;
        }
        Ok(())
    }

    pub fn append_intent(
        &self,
        store: &ProjectStore,
        file: &str,
        plan_id: &str,
        rule_ids: Vec<String>,
        before_bytes: &[u8],
    ) -> Result<JournalEntry, AceError> {
        let before_sha = sha256_hex(before_bytes);
        let before_size = before_bytes.len() as u64;
        let (pre_image, blob_ref) = if before_bytes.len() <= INLINE_PRE_IMAGE_LIMIT {
            (before_bytes.to_vec(), None)
        } else {
            store.ensure_dirs()?;
            let blob_path = store.blob_path(&before_sha);
            crate::core::atomic::atomic_write(&blob_path, before_bytes)?;
            (before_bytes[..INLINE_PRE_IMAGE_LIMIT].to_vec(), Some(before_sha.clone()))
        };
        let entry = JournalEntry::Intent {
            event_id: new_event_id(),
            timestamp: now_iso8601(),
            file: file.to_string(),
            plan_id: plan_id.to_string(),
            rule_ids,
            before_sha,
            before_size,
            pre_image_hex: hex_encode(&pre_image),
            blob_ref,
        };
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn append_success(
        &self,
        file: &str,
        plan_id: &str,
        after_bytes: &[u8],
        receipt_id: &str,
    ) -> Result<JournalEntry, AceError> {
        let entry = JournalEntry::Success {
            event_id: new_event_id(),
            timestamp: now_iso8601(),
            file: file.to_string(),
            plan_id: plan_id.to_string(),
            after_sha: sha256_hex(after_bytes),
            after_size: after_bytes.len() as u64,
            receipt_id: receipt_id.to_string(),
        };
        self.append(&entry)?;
        Ok(entry)
    }

    pub fn append_revert(&self, file: &str, plan_id: &str, reason: &str) -> Result<JournalEntry, AceError> {
        let entry = JournalEntry::Revert {
            event_id: new_event_id(),
            timestamp: now_iso8601(),
            file: file.to_string(),
            plan_id: plan_id.to_string(),
            reason: reason.to_string(),
        };
        self.append(&entry)?;
        Ok(entry)
    }
}

/// Reads every entry from a journal file in line order. Missing required
/// fields reject the line and mark the run non-recoverable (spec.md §6);
/// unknown fields are ignored automatically by `serde`.
pub fn read_entries(path: &Path) -> Result<Vec<JournalEntry>, AceError> {
    if !path.exists() {
        return Ok(vec![]);
    }
    let f = std::fs::File::open(path)?;
    let reader = BufReader::new(f);
    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: JournalEntry = serde_json::from_str(&line).map_err(|e| {
            AceError::Integrity(format!("journal line is malformed, run non-recoverable: {e}"))
        })?;
        entries.push(entry);
    }
    Ok(entries)
}

/// Restores the pre-image bytes recorded by an intent entry, resolving
/// the content-addressed side store when the file exceeded the inline
/// limit.
pub fn recover_pre_image(store: &ProjectStore, intent: &JournalEntry) -> Result<Vec<u8>, AceError> {
    match intent {
        JournalEntry::Intent {
            pre_image_hex,
            blob_ref,
            ..
        } => match blob_ref {
            Some(sha) => {
                let blob_path = store.blob_path(sha);
                std::fs::read(&blob_path).map_err(|_| {
                    AceError::Integrity(format!("pre-image blob {sha} missing from side store"))
                })
            }
            None => hex_decode(pre_image_hex),
        },
        _ => Err(AceError::InvalidState("recover_pre_image called on a non-intent entry".into())),
    }
}

/// Crash-recovery pass (spec.md §4.5): finds every file whose last entry
/// in `entries` is an intent with no matching success/revert, and
/// restores or no-ops per the current on-disk state.
pub fn recover(
    store: &ProjectStore,
    writer: &JournalWriter,
    entries: &[JournalEntry],
) -> Result<Vec<String>, AceError> {
    use std::collections::BTreeMap;
    let mut last_by_file: BTreeMap<&str, &JournalEntry> = BTreeMap::new();
    for entry in entries {
        last_by_file.insert(entry.file(), entry);
    }

    let mut recovered = Vec::new();
    for (file, entry) in last_by_file {
        let JournalEntry::Intent {
            before_sha, plan_id, ..
        } = entry
        else {
            continue;
        };
        let full_path = store.resolve(file);
        let current_bytes = match std::fs::read(&full_path) {
            Ok(b) => b,
            Err(_) => continue,
        };
        let current_sha = sha256_hex(&current_bytes);
        if &current_sha == before_sha {
            // Crashed before any write landed; nothing to do.
            continue;
        }
        let pre_image = recover_pre_image(store, entry)?;
        crate::core::atomic::atomic_write(&full_path, &pre_image)?;
        writer.append_revert(file, plan_id, "crash-orphan")?;
        recovered.push(file.to_string());
    }
    Ok(recovered)
}

/// Reverts a single applied plan by id: verifies the file's current hash
/// matches the recorded `after_sha`, restores the pre-image, verifies the
/// restored hash matches `before_sha`, and appends a revert entry.
pub fn revert_plan(
    store: &ProjectStore,
    writer: &JournalWriter,
    entries: &[JournalEntry],
    plan_id: &str,
) -> Result<(), AceError> {
    let intent = entries
        .iter()
        .find(|e| e.plan_id() == plan_id && matches!(e, JournalEntry::Intent { .. }))
        .ok_or_else(|| AceError::NotFound(format!("no intent entry for plan {plan_id}")))?;
    let success = entries
        .iter()
        .find(|e| e.plan_id() == plan_id && matches!(e, JournalEntry::Success { .. }));

    let JournalEntry::Intent { file, before_sha, .. } = intent else {
        unreachable!()
    };

    let full_path = store.resolve(file);
    let current_bytes = std::fs::read(&full_path)?;
    let current_sha = sha256_hex(&current_bytes);

    if let Some(JournalEntry::Success { after_sha, .. }) = success {
        if &current_sha != after_sha {
            return Err(AceError::Integrity(format!(
                "file {file} hash does not match recorded after_sha; skipping revert"
            )));
        }
    }

    let pre_image = recover_pre_image(store, intent)?;
    crate::core::atomic::atomic_write(&full_path, &pre_image)?;

    let restored_bytes = std::fs::read(&full_path)?;
    let restored_sha = sha256_hex(&restored_bytes);
    if &restored_sha != before_sha {
        return Err(AceError::Integrity(format!(
            "restored bytes for {file} do not match recorded before_sha"
        )));
    }

    writer.append_revert(file, plan_id, "user-requested")?;
    Ok(())
}
