//! Line canonicalization masks
//!
//! Reduces a raw line to a stable template by masking volatile fragments:
//! timestamps, UUIDs, hex literals, IPs, emails, URLs, paths, quoted
//! strings, and bare numbers. Custom masks are process-scoped and can run
//! before or after the built-ins. Masking is idempotent: applying
//! `template` to its own output is a no-op.

use regex::Regex;
use std::sync::{OnceLock, RwLock};

/// POSIX multi-segment path or Windows drive path.
const PATH_CORE: &str = r"/[A-Za-z0-9._-]+(?:/[A-Za-z0-9._-]+)+|[A-Za-z]:\\[A-Za-z0-9._\\-]+";

static BUILTIN_MASKS: OnceLock<Vec<(Regex, &'static str)>> = OnceLock::new();

/// Built-in masks in order of specificity (order matters for overlaps).
fn builtin_masks() -> &'static [(Regex, &'static str)] {
    BUILTIN_MASKS.get_or_init(|| {
        let compile = |pattern: &str| Regex::new(pattern).expect("built-in mask pattern");
        vec![
            (
                compile(r"\b\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?Z?\b"),
                "<ts>",
            ),
            (
                compile(
                    r"\b[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[1-5][0-9a-fA-F]{3}-[89abAB][0-9a-fA-F]{3}-[0-9a-fA-F]{12}\b",
                ),
                "<uuid>",
            ),
            (compile(r"\b0x[0-9a-fA-F]+\b"), "<hex>"),
            (compile(r"\b(?:\d{1,3}\.){3}\d{1,3}\b"), "<ip>"),
            (
                compile(r"\b[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}\b"),
                "<email>",
            ),
            (compile(r"\bhttps?://\S+\b"), "<url>"),
            // Quote pairs around a path are consumed with it; the regex crate
            // has no backreferences, so quoted and bare forms are spelled out.
            (
                compile(&format!(r#""(?:{p})"|'(?:{p})'|{p}"#, p = PATH_CORE)),
                "<path>",
            ),
            (compile(r#""(?:\\.|[^"\\])*"|'(?:\\.|[^'\\])*'"#), "<str>"),
            (compile(r"\b\d+\b"), "<num>"),
        ]
    })
}

/// Whether custom masks run before or after the built-ins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MaskOrder {
    #[default]
    Before,
    After,
}

#[derive(Default)]
struct CustomMasks {
    masks: Vec<(Regex, String)>,
    order: MaskOrder,
}

static CUSTOM_MASKS: OnceLock<RwLock<CustomMasks>> = OnceLock::new();

fn custom_masks() -> &'static RwLock<CustomMasks> {
    CUSTOM_MASKS.get_or_init(|| RwLock::new(CustomMasks::default()))
}

/// Install process-scoped custom masks.
///
/// Replacement strings are applied verbatim and should be short markers
/// like `<user>`. Masks run before or after the built-in canonicalization
/// rules depending on `order`; order can matter for overlapping patterns
/// (e.g. a custom digit mask vs the built-in `<num>`).
pub fn set_custom_masks(masks: Vec<(Regex, String)>, order: MaskOrder) {
    let mut registry = custom_masks().write().unwrap_or_else(|e| e.into_inner());
    registry.masks = masks;
    registry.order = order;
}

/// Reset to no custom masks (mainly for tests).
pub fn clear_custom_masks() {
    set_custom_masks(Vec::new(), MaskOrder::Before);
}

fn apply_builtin(mut text: String) -> String {
    for (pattern, replacement) in builtin_masks() {
        if let std::borrow::Cow::Owned(masked) =
            pattern.replace_all(&text, regex::NoExpand(replacement))
        {
            text = masked;
        }
    }
    text
}

fn apply_custom(mut text: String, masks: &[(Regex, String)]) -> String {
    for (pattern, replacement) in masks {
        if let std::borrow::Cow::Owned(masked) =
            pattern.replace_all(&text, regex::NoExpand(replacement))
        {
            text = masked;
        }
    }
    text
}

/// Return the canonical template for a raw log line.
pub fn template(line: &str) -> String {
    let registry = custom_masks().read().unwrap_or_else(|e| e.into_inner());
    let mut text = line.to_string();
    if !registry.masks.is_empty() && registry.order == MaskOrder::Before {
        text = apply_custom(text, &registry.masks);
    }
    text = apply_builtin(text);
    if !registry.masks.is_empty() && registry.order == MaskOrder::After {
        text = apply_custom(text, &registry.masks);
    }
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_masks_numbers_and_ips() {
        let line = "WARN user=42 ip=10.0.0.1 failed after 12ms";
        let tpl = template(line);
        assert!(tpl.contains("<num>"), "template was: {tpl}");
        assert!(tpl.contains("<ip>"), "template was: {tpl}");
    }

    #[test]
    fn test_masks_emails_urls_and_paths() {
        let line = concat!(
            "ERROR user=jane email=jane.doe@example.com visited https://example.com/login ",
            r#"path="/var/log/app.log" windows="C:\Temp\data.log" "#,
            "uuid=123e4567-e89b-12d3-a456-426614174000 hex=0xDEADBEEF ",
            r#"note="unexpected drop""#,
        );
        let tpl = template(line);
        assert!(tpl.contains("<email>"), "template was: {tpl}");
        assert!(tpl.contains("<url>"), "template was: {tpl}");
        assert_eq!(tpl.matches("<path>").count(), 2, "template was: {tpl}");
        assert!(tpl.contains("<uuid>"), "template was: {tpl}");
        assert!(tpl.contains("<hex>"), "template was: {tpl}");
        assert!(tpl.matches("<str>").count() >= 1, "template was: {tpl}");
    }

    #[test]
    fn test_template_is_idempotent() {
        let lines = [
            "WARN user=42 ip=10.0.0.1 failed after 12ms",
            "2024-05-01T10:22:33Z GET https://example.com/a?b=1 took 15ms",
            r#"open "/etc/passwd" failed uuid=123e4567-e89b-12d3-a456-426614174000"#,
            "   spaced \t out\tline 77   ",
        ];
        for line in lines {
            let once = template(line);
            let twice = template(&once);
            assert_eq!(once, twice, "not idempotent for: {line}");
        }
    }

    #[test]
    fn test_timestamp_mask() {
        let tpl = template("at 2024-05-01T10:22:33.123Z everything stopped");
        assert!(tpl.contains("<ts>"), "template was: {tpl}");
        assert!(!tpl.contains("2024"));
    }

    #[test]
    fn test_whitespace_collapsed() {
        assert_eq!(template("a   b\t\tc"), "a b c");
    }

    // Custom-mask tests use patterns that cannot match any other test's
    // input: the registry is process-global and tests run in parallel.
    #[test]
    fn test_custom_mask_before_builtins() {
        let re = Regex::new(r"sessiontoken=\d+").unwrap();
        set_custom_masks(vec![(re, "<session>".to_string())], MaskOrder::Before);
        let tpl = template("login sessiontoken=4711 attempt 9");
        clear_custom_masks();
        assert!(tpl.contains("<session>"), "template was: {tpl}");
        // Remaining digits still hit the built-in number mask
        assert!(tpl.contains("<num>"), "template was: {tpl}");
    }

    #[test]
    fn test_custom_mask_after_builtins() {
        // After the built-ins run, digits are already <num>; mask the pair
        let re = Regex::new(r"shardindex=<num>").unwrap();
        set_custom_masks(vec![(re, "<shard>".to_string())], MaskOrder::After);
        let tpl = template("rebalancing shardindex=4711 now");
        clear_custom_masks();
        assert!(tpl.contains("<shard>"), "template was: {tpl}");
    }

    #[test]
    fn test_quoted_string_masked() {
        let tpl = template(r#"note="something bad happened" code=7"#);
        assert!(tpl.contains("<str>"), "template was: {tpl}");
        assert!(!tpl.contains("something"));
    }
}
