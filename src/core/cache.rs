//! Cache (spec.md §4.3): content-addressed memoization of detector
//! results keyed by `(path, file-sha256, ruleset-hash, engine-version)`.
//!
//! Grounded on the teacher's `core/migration.rs` version-gated pattern
//! (a `DECAPOD_VERSION` const that invalidates persisted state across
//! incompatible releases) generalized into a cache-key component, plus
//! the teacher's JSON-document persistence style (`core/store.rs`
//! read-whole/write-whole, no partial updates) for the on-disk form.

use crate::core::atomic::{self, sha256_hex};
use crate::core::error::AceError;
use crate::core::model::Finding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Bumped whenever a change to detector/codemod logic could alter
/// findings for unchanged input bytes, invalidating every cache entry.
pub const ENGINE_VERSION: &str = "1";

/// How long a cache entry stays valid after insertion (spec.md §4.2:
/// cache maps to "a detector result object plus an insertion time" and
/// lists "TTL expired" among the invalidation rules). Not configurable
/// via `policy.toml` — the spec ties TTL to the cache's own lifecycle,
/// not to scoring/decision policy.
pub const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    pub path: String,
    pub file_sha256: String,
    pub ruleset_hash: String,
    pub engine_version: String,
}

impl CacheKey {
    pub fn new(path: &str, file_bytes: &[u8], ruleset_hash: &str) -> Self {
        Self {
            path: path.to_string(),
            file_sha256: sha256_hex(file_bytes),
            ruleset_hash: ruleset_hash.to_string(),
            engine_version: ENGINE_VERSION.to_string(),
        }
    }

    fn to_storage_key(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.path, self.file_sha256, self.ruleset_hash, self.engine_version
        )
    }
}

/// A memoized detector result plus the epoch-seconds timestamp it was
/// inserted at, so a lookup can apply the TTL invalidation rule without
/// touching the detector result itself (spec.md §4.2).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEntry {
    findings: Vec<Finding>,
    inserted_at: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Cache {
    entries: BTreeMap<String, CacheEntry>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, AceError> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)?;
        if bytes.is_empty() {
            return Ok(Self::new());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), AceError> {
        let json = atomic::to_deterministic_json_pretty(self)?;
        atomic::atomic_write(path, json.as_bytes())
    }

    /// Returns the memoized findings for `key` unless the entry's TTL
    /// has expired as of `now` (spec.md §4.2 "TTL expired").
    pub fn get(&self, key: &CacheKey, now: u64) -> Option<&Vec<Finding>> {
        self.entries
            .get(&key.to_storage_key())
            .filter(|entry| now.saturating_sub(entry.inserted_at) < DEFAULT_TTL_SECS)
            .map(|entry| &entry.findings)
    }

    pub fn put(&mut self, key: &CacheKey, findings: Vec<Finding>, now: u64) {
        self.entries.insert(
            key.to_storage_key(),
            CacheEntry {
                findings,
                inserted_at: now,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every entry whose `engine_version` doesn't match the
    /// current build, used on startup before any lookups (spec.md §4.3:
    /// "invalidated by file hash, ruleset hash, or engine version").
    pub fn prune_stale_engine_versions(&mut self) {
        self.entries.retain(|key, _| {
            key.rsplit('|').next() == Some(ENGINE_VERSION)
        });
    }

    /// Drops every entry whose TTL has expired as of `now`, alongside
    /// `prune_stale_engine_versions` as an explicit invalidation pass
    /// (rather than relying solely on lookups filtering expired hits).
    pub fn prune_expired(&mut self, now: u64) {
        self.entries
            .retain(|_, entry| now.saturating_sub(entry.inserted_at) < DEFAULT_TTL_SECS);
    }
}

/// Runs `compute` under the cache: returns the memoized findings for
/// `key` if present, otherwise computes, stores, and returns them. The
/// memoizer is pure: calling with `cache_enabled = false` must return the
/// identical findings as the cached path for the same inputs (spec.md §8
/// "Cache coherence").
pub fn findings_with_cache(
    cache: &mut Cache,
    key: &CacheKey,
    cache_enabled: bool,
    now: u64,
    compute: impl FnOnce() -> Result<Vec<Finding>, AceError>,
) -> Result<Vec<Finding>, AceError> {
    if cache_enabled {
        if let Some(hit) = cache.get(key, now) {
            return Ok(hit.clone());
        }
    }
    let findings = compute()?;
    if cache_enabled {
        cache.put(key, findings.clone(), now);
    }
    Ok(findings)
}
