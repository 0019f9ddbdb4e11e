//! Minimal gitignore-style glob matcher shared by `.aceignore`, Policy's
//! path-based suppressions, and per-rule path globs (spec.md §4.11).
//!
//! Grounded on the teacher's `core/gatekeeper::glob_match`: a deliberately
//! small prefix/suffix matcher rather than a full glob engine, extended
//! here with directory-anchored `**` segments since `.aceignore` needs to
//! match whole subtrees, not just filename suffixes.

/// Returns true if `text` (a POSIX-separated relative path) matches
/// `pattern` (a single gitignore-style glob).
pub fn glob_match(pattern: &str, text: &str) -> bool {
    if pattern.contains("**") {
        let parts: Vec<&str> = pattern.splitn(2, "**").collect();
        let prefix = parts[0].trim_end_matches('/');
        let suffix = parts.get(1).copied().unwrap_or("").trim_start_matches('/');
        let prefix_ok = prefix.is_empty() || text.starts_with(prefix);
        let suffix_ok = suffix.is_empty() || text.ends_with(suffix) || segment_match(suffix, text);
        return prefix_ok && suffix_ok;
    }

    if let Some(star_pos) = pattern.find('*') {
        let prefix = &pattern[..star_pos];
        let suffix = &pattern[star_pos + 1..];
        return text.starts_with(prefix)
            && text.ends_with(suffix)
            && text.len() >= prefix.len() + suffix.len();
    }

    pattern == text
}

/// Returns true if `suffix` matches one path segment of `text` exactly
/// (used so `**/secrets/**` matches `a/secrets/b.txt`).
fn segment_match(suffix: &str, text: &str) -> bool {
    text.split('/').any(|seg| seg == suffix)
}

/// Returns true if `path` matches any pattern in `patterns`.
pub fn matches_any(patterns: &[String], path: &str) -> bool {
    patterns.iter().any(|p| glob_match(p, path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(glob_match("src/main.rs", "src/main.rs"));
        assert!(!glob_match("src/main.rs", "src/lib.rs"));
    }

    #[test]
    fn test_single_star() {
        assert!(glob_match("*.env", ".env"));
        assert!(glob_match("*.env", "prod.env"));
        assert!(!glob_match("*.env", "prod.env.bak"));
    }

    #[test]
    fn test_double_star_prefix_and_suffix() {
        assert!(glob_match("**/secrets/**", "a/secrets/b.txt"));
        assert!(glob_match("vendor/**", "vendor/pkg/mod.rs"));
        assert!(!glob_match("vendor/**", "src/vendor/mod.rs"));
    }

    #[test]
    fn test_matches_any() {
        let patterns = vec!["*.env".to_string(), "**/secrets/**".to_string()];
        assert!(matches_any(&patterns, "config/secrets/db.txt"));
        assert!(!matches_any(&patterns, "src/main.rs"));
    }
}
