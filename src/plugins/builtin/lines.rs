//! Bundled language parser (SPEC_FULL.md §C.2): a line-oriented
//! approximation of a Python-like surface grammar. Treats a file as
//! logical blocks delimited by `def `/`class `/`import `/`from ` tokens.
//! Good enough to exercise every Guard layer (spec.md §4.4) without a
//! real compiler front-end, which spec.md explicitly scopes out of the
//! core as a replaceable plug-in.

use crate::core::error::AceError;
use crate::core::plugin_api::{LanguageParser, ParseTree, SymbolCounts};
use sha2::{Digest, Sha256};

pub struct LineParser;

pub struct LineTree {
    original_bytes: Vec<u8>,
    canonical_lines: Vec<String>,
    symbols: Vec<(String, &'static str, usize)>,
    imports: Vec<String>,
    counts: SymbolCounts,
}

/// Strips a trailing `# ...` line comment (outside of quotes is not
/// tracked — this is a line-oriented approximation, not a real lexer)
/// and trims trailing whitespace.
fn canonicalize_line(line: &str) -> Option<String> {
    let without_comment = match line.find('#') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let trimmed = without_comment.trim_end();
    if trimmed.trim().is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn extract_name(after_keyword: &str) -> String {
    after_keyword
        .trim()
        .split(|c: char| c == '(' || c == ':' || c.is_whitespace())
        .next()
        .unwrap_or("")
        .to_string()
}

/// Parses `bytes` into a [`LineTree`] without consuming a `dyn ParseTree`
/// trait object, so detectors and codemods can use it directly instead of
/// going through the boxed trait.
pub fn parse_lines(bytes: &[u8]) -> Result<LineTree, AceError> {
    let text = std::str::from_utf8(bytes).map_err(|e| AceError::Parse {
        file: String::new(),
        message: format!("invalid UTF-8: {e}"),
    })?;

    let mut canonical_lines = Vec::new();
    let mut symbols = Vec::new();
    let mut imports = Vec::new();
    let mut functions = 0usize;
    let mut classes = 0usize;
    let mut import_count = 0usize;

    for (idx, raw_line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let trimmed = raw_line.trim_start();

        if let Some(rest) = trimmed.strip_prefix("def ") {
            functions += 1;
            symbols.push((extract_name(rest), "function", line_no));
        } else if let Some(rest) = trimmed.strip_prefix("class ") {
            classes += 1;
            symbols.push((extract_name(rest), "class", line_no));
        } else if trimmed.starts_with("import ") || trimmed.starts_with("from ") {
            import_count += 1;
            if let Some(canon) = canonicalize_line(raw_line) {
                imports.push(canon.clone());
            }
        }

        if let Some(canon) = canonicalize_line(raw_line) {
            canonical_lines.push(canon);
        }
    }

    Ok(LineTree {
        original_bytes: bytes.to_vec(),
        canonical_lines,
        symbols,
        imports,
        counts: SymbolCounts {
            functions,
            classes,
            imports: import_count,
        },
    })
}

impl ParseTree for LineTree {
    fn canonical_hash(&self) -> [u8; 32] {
        let joined = self.canonical_lines.join("\n");
        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.finalize().into()
    }

    fn structure_hash(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for (name, kind, _) in &self.symbols {
            hasher.update(kind.as_bytes());
            hasher.update(b":");
            hasher.update(name.as_bytes());
            hasher.update(b"\n");
        }
        for imp in &self.imports {
            hasher.update(b"import:");
            hasher.update(imp.as_bytes());
            hasher.update(b"\n");
        }
        hasher.finalize().into()
    }

    fn symbol_counts(&self) -> SymbolCounts {
        self.counts
    }

    fn imports(&self) -> Vec<String> {
        self.imports.clone()
    }

    fn symbols(&self) -> Vec<(String, &'static str, usize)> {
        self.symbols.clone()
    }

    fn reemit(&self) -> Vec<u8> {
        // This parser canonicalizes only for hashing; it never
        // reconstructs text from structure, so re-emission is always
        // the exact bytes the tree was parsed from.
        self.original_bytes.clone()
    }
}

impl LanguageParser for LineParser {
    fn parse(&self, file_path: &str, bytes: &[u8]) -> Result<Box<dyn ParseTree>, AceError> {
        parse_lines(bytes)
            .map(|t| Box::new(t) as Box<dyn ParseTree>)
            .map_err(|e| match e {
                AceError::Parse { message, .. } => AceError::Parse {
                    file: file_path.to_string(),
                    message,
                },
                other => other,
            })
    }

    fn roundtrip_is_byte_identical(&self) -> bool {
        true
    }
}

pub fn canonical_hash_of(tree: &LineTree) -> [u8; 32] {
    tree.canonical_hash()
}

pub fn symbol_counts_of(tree: &LineTree) -> SymbolCounts {
    tree.symbol_counts()
}

pub fn imports_of(tree: &LineTree) -> Vec<String> {
    tree.imports()
}
