//! Reference detector pair (SPEC_FULL.md §C.3), matching the worked
//! scenarios in spec.md §8: a bare-HTTP-call rule and a broad-except
//! rule. Each is a pure function of its input bytes, as spec.md §6
//! requires of the `Detector` plug-in.

use crate::core::error::AceError;
use crate::core::model::Finding;
use crate::core::plugin_api::{Detector, PolicyView};
use regex::Regex;
use std::sync::LazyLock;

static HTTP_CALL_NO_TIMEOUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\brequests\.(get|post|put|delete|head|patch)\s*\(([^)]*)\)").unwrap()
});

pub struct UnsafeHttpTimeoutDetector;

impl Detector for UnsafeHttpTimeoutDetector {
    fn manifest(&self) -> &[(&'static str, f64)] {
        &[("net.unsafe-http-timeout", 0.8)]
    }

    fn analyze(&self, file_path: &str, bytes: &[u8], policy: &PolicyView) -> Result<Vec<Finding>, AceError> {
        if !policy.enabled_rule_ids.is_empty()
            && !policy.enabled_rule_ids.iter().any(|r| r == "net.unsafe-http-timeout")
        {
            return Ok(vec![]);
        }
        let text = std::str::from_utf8(bytes).map_err(|e| AceError::Parse {
            file: file_path.to_string(),
            message: format!("invalid UTF-8: {e}"),
        })?;

        let mut findings = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if let Some(caps) = HTTP_CALL_NO_TIMEOUT.captures(line) {
                let args = &caps[2];
                if args.contains("timeout") {
                    continue;
                }
                let line_no = idx + 1;
                let message = "HTTP call has no timeout; a slow/unresponsive peer can hang the process indefinitely".to_string();
                let context_hash = Finding::compute_context_hash(
                    "net.unsafe-http-timeout",
                    file_path,
                    line.trim(),
                    &message,
                );
                findings.push(Finding {
                    rule_id: "net.unsafe-http-timeout".to_string(),
                    file: file_path.to_string(),
                    start_line: line_no,
                    end_line: line_no,
                    severity: 0.8,
                    complexity: 0.2,
                    message,
                    context_hash,
                });
            }
        }
        Ok(findings)
    }
}

static BARE_EXCEPT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*except\s*:\s*$").unwrap());

pub struct BroadExceptDetector;

impl Detector for BroadExceptDetector {
    fn manifest(&self) -> &[(&'static str, f64)] {
        &[("err.broad-except", 0.6)]
    }

    fn analyze(&self, file_path: &str, bytes: &[u8], policy: &PolicyView) -> Result<Vec<Finding>, AceError> {
        if !policy.enabled_rule_ids.is_empty()
            && !policy.enabled_rule_ids.iter().any(|r| r == "err.broad-except")
        {
            return Ok(vec![]);
        }
        let text = std::str::from_utf8(bytes).map_err(|e| AceError::Parse {
            file: file_path.to_string(),
            message: format!("invalid UTF-8: {e}"),
        })?;

        let mut findings = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            if BARE_EXCEPT.is_match(line) {
                let line_no = idx + 1;
                let message = "bare except swallows all exceptions, including KeyboardInterrupt and SystemExit".to_string();
                let context_hash = Finding::compute_context_hash(
                    "err.broad-except",
                    file_path,
                    line.trim(),
                    &message,
                );
                findings.push(Finding {
                    rule_id: "err.broad-except".to_string(),
                    file: file_path.to_string(),
                    start_line: line_no,
                    end_line: line_no,
                    severity: 0.6,
                    complexity: 0.3,
                    message,
                    context_hash,
                });
            }
        }
        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> PolicyView {
        PolicyView::default()
    }

    #[test]
    fn test_detects_bare_http_get_without_timeout() {
        let src = b"def f():\n    requests.get(url)\n";
        let findings = UnsafeHttpTimeoutDetector.analyze("app.py", src, &policy()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line, 2);
        assert_eq!(findings[0].severity, 0.8);
    }

    #[test]
    fn test_no_finding_when_timeout_present() {
        let src = b"requests.get(url, timeout=30)\n";
        let findings = UnsafeHttpTimeoutDetector.analyze("app.py", src, &policy()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_detects_bare_except() {
        let src = b"try:\n    risky()\nexcept:\n    pass\n";
        let findings = BroadExceptDetector.analyze("app.py", src, &policy()).unwrap();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].start_line, 3);
    }

    #[test]
    fn test_except_exception_is_not_flagged() {
        let src = b"try:\n    risky()\nexcept Exception:\n    pass\n";
        let findings = BroadExceptDetector.analyze("app.py", src, &policy()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn test_stable_id_identical_across_runs() {
        let src = b"requests.get(url)\n";
        let a = UnsafeHttpTimeoutDetector.analyze("app.py", src, &policy()).unwrap();
        let b = UnsafeHttpTimeoutDetector.analyze("app.py", src, &policy()).unwrap();
        assert_eq!(a[0].stable_id(), b[0].stable_id());
    }
}
