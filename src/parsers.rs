//! Best-effort line parsing
//!
//! Extracts (timestamp, level, message) from a raw line. Single-line
//! structured payloads are parsed as JSON; everything else goes through
//! lightweight heuristic scans. Any component may be absent.

use regex::Regex;
use std::sync::{Once, OnceLock};
use tracing::warn;

/// The fixed severity set; anything else is treated as absent.
pub const LEVELS: &[&str] = &[
    "CRITICAL", "ERROR", "WARN", "WARNING", "INFO", "DEBUG", "TRACE",
];

static LEVEL_RE: OnceLock<Regex> = OnceLock::new();
static TS_RE: OnceLock<Regex> = OnceLock::new();

fn level_re() -> &'static Regex {
    LEVEL_RE.get_or_init(|| {
        Regex::new(r"\b(CRITICAL|ERROR|WARN|WARNING|INFO|DEBUG|TRACE)\b").expect("level pattern")
    })
}

fn ts_re() -> &'static Regex {
    TS_RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}T?\s?\d{2}:\d{2}:\d{2}").expect("timestamp pattern")
    })
}

/// Result of parsing one line.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedLine {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub message: String,
}

fn json_string_field(obj: &serde_json::Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        match obj.get(key) {
            Some(serde_json::Value::String(s)) => return Some(s.clone()),
            Some(serde_json::Value::Number(n)) => return Some(n.to_string()),
            _ => continue,
        }
    }
    None
}

fn parse_structured(line: &str) -> Option<ParsedLine> {
    let obj: serde_json::Value = match serde_json::from_str(line) {
        Ok(v) => v,
        Err(err) => {
            // Malformed structured payloads are common in mixed streams;
            // report once, then fall back to heuristics silently.
            static WARNED: Once = Once::new();
            WARNED.call_once(|| {
                warn!("structured line parse failed, falling back to heuristics: {err}");
            });
            return None;
        }
    };
    let timestamp = json_string_field(&obj, &["timestamp", "ts", "@timestamp"]);
    let level = json_string_field(&obj, &["level", "severity", "lvl"])
        .map(|l| l.to_ascii_uppercase())
        .filter(|l| LEVELS.contains(&l.as_str()));
    let message = json_string_field(&obj, &["message", "msg", "log"])
        .unwrap_or_else(|| line.to_string());
    Some(ParsedLine { timestamp, level, message })
}

/// Parse one raw line into (timestamp, level, message).
///
/// The original text becomes the message when no structured body is
/// available.
pub fn parse_line(line: &str) -> ParsedLine {
    let line = line.trim();
    if line.is_empty() {
        return ParsedLine::default();
    }

    if line.starts_with('{') && line.ends_with('}') {
        if let Some(parsed) = parse_structured(line) {
            return parsed;
        }
    }

    let level = level_re()
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string());
    let timestamp = ts_re().find(line).map(|m| m.as_str().to_string());

    ParsedLine {
        timestamp,
        level,
        message: line.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_line() {
        let parsed = parse_line(
            r#"{"timestamp":"2024-05-01T10:22:33Z","level":"error","message":"disk full"}"#,
        );
        assert_eq!(parsed.timestamp.as_deref(), Some("2024-05-01T10:22:33Z"));
        assert_eq!(parsed.level.as_deref(), Some("ERROR"));
        assert_eq!(parsed.message, "disk full");
    }

    #[test]
    fn test_json_alternate_keys() {
        let parsed = parse_line(r#"{"ts":"2024-05-01T10:22:33Z","lvl":"warn","msg":"slow"}"#);
        assert_eq!(parsed.timestamp.as_deref(), Some("2024-05-01T10:22:33Z"));
        assert_eq!(parsed.level.as_deref(), Some("WARN"));
        assert_eq!(parsed.message, "slow");
    }

    #[test]
    fn test_json_unknown_level_dropped() {
        let parsed = parse_line(r#"{"level":"NOTICE","message":"hello"}"#);
        assert!(parsed.level.is_none());
        assert_eq!(parsed.message, "hello");
    }

    #[test]
    fn test_json_numeric_timestamp() {
        let parsed = parse_line(r#"{"ts":1714558953,"message":"tick"}"#);
        assert_eq!(parsed.timestamp.as_deref(), Some("1714558953"));
    }

    #[test]
    fn test_json_without_message_uses_line() {
        let line = r#"{"level":"INFO","extra":1}"#;
        let parsed = parse_line(line);
        assert_eq!(parsed.message, line);
        assert_eq!(parsed.level.as_deref(), Some("INFO"));
    }

    #[test]
    fn test_malformed_json_falls_back_to_heuristics() {
        let line = r#"{"level":"ERROR","message":"unterminated"#;
        // No closing brace, so this never tries JSON at all
        let parsed = parse_line(line);
        assert_eq!(parsed.level.as_deref(), Some("ERROR"));
        assert_eq!(parsed.message, line);

        // Braced but invalid JSON: structured parse fails, heuristics win
        let broken = r#"{"level": ERROR, "message": nope}"#;
        let parsed = parse_line(broken);
        assert_eq!(parsed.level.as_deref(), Some("ERROR"));
        assert_eq!(parsed.message, broken);
    }

    #[test]
    fn test_loose_level_and_timestamp() {
        let parsed = parse_line("2024-05-01 10:22:33 WARN cache nearly full");
        assert_eq!(parsed.level.as_deref(), Some("WARN"));
        assert_eq!(parsed.timestamp.as_deref(), Some("2024-05-01 10:22:33"));
        assert_eq!(parsed.message, "2024-05-01 10:22:33 WARN cache nearly full");
    }

    #[test]
    fn test_warning_not_cut_to_warn() {
        let parsed = parse_line("a WARNING appeared");
        assert_eq!(parsed.level.as_deref(), Some("WARNING"));
    }

    #[test]
    fn test_level_requires_word_boundary() {
        let parsed = parse_line("MIRRORED copy done");
        assert!(parsed.level.is_none());
    }

    #[test]
    fn test_empty_line() {
        let parsed = parse_line("   \n");
        assert_eq!(parsed, ParsedLine::default());
    }
}
