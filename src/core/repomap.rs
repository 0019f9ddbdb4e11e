//! RepoMap (spec.md §4.2): a deterministic symbol/import-dependency index
//! over a project's source files, feeding the Planner's context boost
//! (symbol density, recency).
//!
//! Grounded on the teacher's `core/repomap::generate_doc_graph`: a
//! regex-based scanner over a recursively-walked, ignore-aware file tree,
//! retargeted from markdown cross-links to source declarations
//! (SPEC_FULL.md §C.4). The walk/ignore and sort-then-serialize shape is
//! the teacher's; the regexes and the entry schema are new.

use crate::core::error::AceError;
use crate::core::globs;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::LazyLock;

/// One declared symbol or top-level module (spec.md §3 "RepoMap entry").
/// Serialized form contains **no wall-clock generation timestamp** — only
/// this entry's own file `mtime`, which is a property of the file, not of
/// when RepoMap was run (spec.md §8 "Determinism of RepoMap
/// serialization").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct SymbolEntry {
    pub file: String,
    pub line: usize,
    pub name: String,
    pub kind: SymbolKind,
    /// Sorted import identifiers the declaring file depends on.
    pub deps: Vec<String>,
    pub mtime: u64,
    pub size: u64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind {
    Function,
    Class,
    Module,
}

/// The full deterministic index for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepoMap {
    /// Sorted by `(file, line)` (spec.md §4.2).
    pub entries: Vec<SymbolEntry>,
}

static DEF_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*def\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_][A-Za-z0-9_]*)").unwrap());
static IMPORT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(?:import\s+([A-Za-z_][\w.]*)|from\s+([A-Za-z_][\w.]*)\s+import)").unwrap());

const DEFAULT_IGNORES: [&str; 4] = [".git/**", "target/**", "**/.ace/**", "**/node_modules/**"];

/// Walks `root`, honoring `.aceignore` (gitignore syntax) plus a small
/// set of always-ignored directories, and emits a deterministic,
/// sorted-by-`(file, line)` `RepoMap`.
pub fn build(root: &Path) -> Result<RepoMap, AceError> {
    let ignore_patterns = load_ignore_patterns(root)?;
    let mut files = Vec::new();
    collect_source_files(root, root, &ignore_patterns, &mut files);
    files.sort();

    let mut entries = Vec::new();
    for rel in &files {
        let full = root.join(rel);
        let bytes = std::fs::read(&full)?;
        let metadata = std::fs::metadata(&full)?;
        let mtime = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let size = metadata.len();

        let text = match std::str::from_utf8(&bytes) {
            Ok(t) => t,
            Err(_) => continue,
        };

        let mut deps: BTreeSet<String> = BTreeSet::new();
        for line in text.lines() {
            if let Some(caps) = IMPORT_RE.captures(line) {
                let module = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str());
                if let Some(m) = module {
                    deps.insert(m.to_string());
                }
            }
        }
        let deps: Vec<String> = deps.into_iter().collect();

        for (idx, line) in text.lines().enumerate() {
            let line_no = idx + 1;
            if let Some(caps) = DEF_RE.captures(line) {
                entries.push(SymbolEntry {
                    file: rel.clone(),
                    line: line_no,
                    name: caps[1].to_string(),
                    kind: SymbolKind::Function,
                    deps: deps.clone(),
                    mtime,
                    size,
                });
            } else if let Some(caps) = CLASS_RE.captures(line) {
                entries.push(SymbolEntry {
                    file: rel.clone(),
                    line: line_no,
                    name: caps[1].to_string(),
                    kind: SymbolKind::Class,
                    deps: deps.clone(),
                    mtime,
                    size,
                });
            }
        }

        if !deps.is_empty() {
            // One module-level entry at line 0 carries the file's own
            // dependency edges even when it declares no functions/classes.
            entries.push(SymbolEntry {
                file: rel.clone(),
                line: 0,
                name: module_name(rel),
                kind: SymbolKind::Module,
                deps,
                mtime,
                size,
            });
        }
    }

    entries.sort_by(|a, b| (a.file.as_str(), a.line).cmp(&(b.file.as_str(), b.line)));
    Ok(RepoMap { entries })
}

fn module_name(rel: &str) -> String {
    Path::new(rel)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| rel.to_string())
}

fn load_ignore_patterns(root: &Path) -> Result<Vec<String>, AceError> {
    let mut patterns: Vec<String> = DEFAULT_IGNORES.iter().map(|s| s.to_string()).collect();
    let ignore_path = root.join(".aceignore");
    if ignore_path.exists() {
        let content = std::fs::read_to_string(&ignore_path)?;
        for line in content.lines() {
            let line = line.trim();
            if !line.is_empty() && !line.starts_with('#') {
                patterns.push(line.to_string());
            }
        }
    }
    Ok(patterns)
}

fn collect_source_files(root: &Path, dir: &Path, ignore: &[String], out: &mut Vec<String>) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        let rel = match path.strip_prefix(root) {
            Ok(r) => r.to_string_lossy().replace('\\', "/"),
            Err(_) => continue,
        };
        if globs::matches_any(ignore, &rel) {
            continue;
        }
        if path.is_dir() {
            collect_source_files(root, &path, ignore, out);
        } else if path.is_file() && has_source_extension(&path) {
            out.push(rel);
        }
    }
}

fn has_source_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("py") | Some("rs") | Some("js") | Some("ts")
    )
}

/// Density signal for the Planner's context boost: symbol count / file
/// line count, normalized against the run's maximum (SPEC_FULL.md §C.5).
pub fn density_by_file(map: &RepoMap, line_counts: &std::collections::HashMap<String, usize>) -> std::collections::HashMap<String, f64> {
    let mut raw: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
    for entry in &map.entries {
        if entry.kind != SymbolKind::Module {
            let lines = *line_counts.get(&entry.file).unwrap_or(&1).max(&1);
            *raw.entry(entry.file.clone()).or_insert(0.0) += 1.0 / lines as f64;
        }
    }
    normalize_to_unit(raw)
}

/// Recency signal: file mtime normalized against the run's newest mtime.
pub fn recency_by_file(map: &RepoMap) -> std::collections::HashMap<String, f64> {
    let mut mtimes: std::collections::HashMap<String, u64> = std::collections::HashMap::new();
    for entry in &map.entries {
        mtimes.insert(entry.file.clone(), entry.mtime);
    }
    let max = mtimes.values().copied().max().unwrap_or(0).max(1);
    mtimes
        .into_iter()
        .map(|(file, mtime)| (file, mtime as f64 / max as f64))
        .collect()
}

fn normalize_to_unit(raw: std::collections::HashMap<String, f64>) -> std::collections::HashMap<String, f64> {
    let max = raw.values().cloned().fold(0.0_f64, f64::max).max(f64::MIN_POSITIVE);
    raw.into_iter().map(|(k, v)| (k, v / max)).collect()
}

/// Looks up the enclosing symbol (function/class) whose declaration line
/// is the closest preceding `line` in `file`, used by Pack Synthesis to
/// key function/class contexts off real symbols rather than line buckets
/// (spec.md §9 open question, resolved in DESIGN.md).
pub fn enclosing_symbol<'a>(map: &'a RepoMap, file: &str, line: usize) -> Option<&'a SymbolEntry> {
    map.entries
        .iter()
        .filter(|e| e.file == file && e.kind != SymbolKind::Module && e.line <= line)
        .max_by_key(|e| e.line)
}

/// Content fingerprint of the serialized map: two builds over identical
/// bytes must produce byte-identical serialized output (spec.md §4.2,
/// §8 "Determinism of RepoMap serialization").
pub fn fingerprint(map: &RepoMap) -> Result<String, AceError> {
    let serialized = crate::core::atomic::to_deterministic_json_pretty(map)?;
    Ok(crate::core::atomic::sha256_hex(serialized.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, rel: &str, content: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_build_is_sorted_by_file_then_line() {
        let dir = tempdir().unwrap();
        write(dir.path(), "b.py", "def z():\n    pass\n");
        write(dir.path(), "a.py", "def y():\n    pass\ndef x():\n    pass\n");
        let map = build(dir.path()).unwrap();
        let keys: Vec<(String, usize)> = map.entries.iter().map(|e| (e.file.clone(), e.line)).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    #[test]
    fn test_build_is_deterministic_byte_identical() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.py", "import os\ndef f():\n    pass\n");
        let map1 = build(dir.path()).unwrap();
        let map2 = build(dir.path()).unwrap();
        assert_eq!(fingerprint(&map1).unwrap(), fingerprint(&map2).unwrap());
    }

    #[test]
    fn test_aceignore_excludes_matching_paths() {
        let dir = tempdir().unwrap();
        write(dir.path(), ".aceignore", "vendor/**\n");
        write(dir.path(), "vendor/lib.py", "def ignored():\n    pass\n");
        write(dir.path(), "main.py", "def kept():\n    pass\n");
        let map = build(dir.path()).unwrap();
        assert!(map.entries.iter().all(|e| e.file != "vendor/lib.py"));
        assert!(map.entries.iter().any(|e| e.file == "main.py"));
    }

    #[test]
    fn test_enclosing_symbol_picks_nearest_preceding_declaration() {
        let dir = tempdir().unwrap();
        write(dir.path(), "a.py", "def f():\n    pass\n\ndef g():\n    pass\n");
        let map = build(dir.path()).unwrap();
        let sym = enclosing_symbol(&map, "a.py", 4).unwrap();
        assert_eq!(sym.name, "g");
    }
}
