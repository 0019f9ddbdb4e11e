//! Reference codemod pair paired with `builtin::detectors` (SPEC_FULL.md
//! §C.3). Both declare a symbol-count-stable, import-stable effect
//! manifest but are not structure-preserving: each legitimately changes
//! an expression's contents (a call's argument list, an except clause's
//! exception type), so Guard's layer 2 is skipped for them while layers
//! 3, 5, and 6 still apply.

use crate::core::error::AceError;
use crate::core::model::{Edit, EditOp};
use crate::core::plugin_api::{Codemod, EffectManifest};
use regex::Regex;
use std::sync::LazyLock;

static HTTP_CALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\brequests\.(get|post|put|delete|head|patch)\s*\(([^)]*)\)").unwrap());

pub struct HttpTimeoutCodemod;

impl Codemod for HttpTimeoutCodemod {
    fn rule_id(&self) -> &'static str {
        "net.unsafe-http-timeout"
    }

    fn effects(&self) -> EffectManifest {
        EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: false,
            removed_imports: vec![],
        }
    }

    fn plan(&self, file_path: &str, bytes: &[u8]) -> Result<Option<Vec<Edit>>, AceError> {
        let text = std::str::from_utf8(bytes).map_err(|e| AceError::Parse {
            file: file_path.to_string(),
            message: format!("invalid UTF-8: {e}"),
        })?;

        let mut edits = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some(caps) = HTTP_CALL.captures(line) {
                let args = &caps[2];
                if args.contains("timeout") {
                    continue;
                }
                let line_no = idx + 1;
                let method = &caps[1];
                let new_args = if args.trim().is_empty() {
                    "timeout=30".to_string()
                } else {
                    format!("{}, timeout=30", args.trim())
                };
                let replaced = line.replacen(
                    &format!("requests.{method}({args})"),
                    &format!("requests.{method}({new_args})"),
                    1,
                );
                edits.push(Edit {
                    file: file_path.to_string(),
                    start_line: line_no,
                    end_line: line_no,
                    op: EditOp::Replace,
                    payload: replaced,
                    rule_id: self.rule_id().to_string(),
                });
            }
        }
        Ok(if edits.is_empty() { None } else { Some(edits) })
    }
}

static BARE_EXCEPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\s*)except(\s*):(\s*)$").unwrap());

pub struct BroadExceptCodemod;

impl Codemod for BroadExceptCodemod {
    fn rule_id(&self) -> &'static str {
        "err.broad-except"
    }

    fn effects(&self) -> EffectManifest {
        EffectManifest {
            structure_preserving: false,
            may_change_symbol_counts: false,
            removed_imports: vec![],
        }
    }

    fn plan(&self, file_path: &str, bytes: &[u8]) -> Result<Option<Vec<Edit>>, AceError> {
        let text = std::str::from_utf8(bytes).map_err(|e| AceError::Parse {
            file: file_path.to_string(),
            message: format!("invalid UTF-8: {e}"),
        })?;

        let mut edits = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some(caps) = BARE_EXCEPT.captures(line) {
                let line_no = idx + 1;
                let indent = &caps[1];
                edits.push(Edit {
                    file: file_path.to_string(),
                    start_line: line_no,
                    end_line: line_no,
                    op: EditOp::Replace,
                    payload: format!("{indent}except Exception:"),
                    rule_id: self.rule_id().to_string(),
                });
            }
        }
        Ok(if edits.is_empty() { None } else { Some(edits) })
    }
}
