//! Token extraction for the information model
//!
//! Produces a deduplicated, order-preserving sequence of lowercase
//! alphanumeric/underscore tokens. Optional augmentation adds camelCase
//! components, dotted-identifier wholes, and adjacent bigrams.

use crate::config::ScoringConfig;
use regex::Regex;
use rustc_hash::FxHashSet;
use std::sync::OnceLock;

static WORD_RE: OnceLock<Regex> = OnceLock::new();
static DOTTED_RE: OnceLock<Regex> = OnceLock::new();

fn word_re() -> &'static Regex {
    WORD_RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+").expect("word pattern"))
}

fn dotted_re() -> &'static Regex {
    DOTTED_RE.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)+").expect("dotted identifier pattern")
    })
}

/// Tokenization switches, copied from the scoring config.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenizeOptions {
    pub include_bigrams: bool,
    pub split_camel: bool,
    pub split_dot: bool,
}

impl TokenizeOptions {
    pub fn from_config(cfg: &ScoringConfig) -> Self {
        Self {
            include_bigrams: cfg.include_bigrams,
            split_camel: cfg.split_camel,
            split_dot: cfg.split_dot,
        }
    }
}

/// Marker joining the halves of a bigram token.
const BIGRAM_SEP: &str = "__";

/// Extract tokens from `text` in order of first appearance.
///
/// Base tokens are deduplicated before augmentation; augmented tokens are
/// appended after the base sequence, deduplicated against everything seen
/// so far. The per-line cap is enforced by the model during observe.
pub fn tokens(text: &str, opts: &TokenizeOptions) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let mut seen: FxHashSet<String> = FxHashSet::default();
    let mut fragments: Vec<&str> = Vec::new();

    for m in word_re().find_iter(text) {
        let fragment = m.as_str();
        fragments.push(fragment);
        let lower = fragment.to_ascii_lowercase();
        if seen.insert(lower.clone()) {
            out.push(lower);
        }
    }

    let mut augmented: Vec<String> = Vec::new();
    if opts.split_camel {
        for fragment in &fragments {
            if !is_mixed_case(fragment) {
                continue;
            }
            for part in camel_parts(fragment) {
                augmented.push(part.to_ascii_lowercase());
            }
        }
    }
    if opts.split_dot {
        // Parts are already base tokens; the whole keeps its dots so it
        // stays distinguishable from them.
        for m in dotted_re().find_iter(text) {
            augmented.push(m.as_str().to_ascii_lowercase());
        }
    }
    if opts.include_bigrams && out.len() >= 2 {
        for pair in out.windows(2) {
            augmented.push(format!("{}{}{}", pair[0], BIGRAM_SEP, pair[1]));
        }
    }

    for token in augmented {
        if !token.is_empty() && seen.insert(token.clone()) {
            out.push(token);
        }
    }
    out
}

fn is_mixed_case(s: &str) -> bool {
    s.chars().any(|c| c.is_ascii_uppercase()) && s.chars().any(|c| c.is_ascii_lowercase())
}

/// Split a mixedCase/PascalCase fragment into its components.
///
/// Boundaries fall before an uppercase char that follows a non-uppercase
/// one, and before the last uppercase char of an acronym run that is
/// followed by lowercase ("parseHTTPResponse" -> parse, HTTP, Response).
fn camel_parts(s: &str) -> Vec<String> {
    let chars: Vec<char> = s.chars().collect();
    let mut parts = Vec::new();
    let mut start = 0;
    for i in 1..chars.len() {
        let prev_upper = chars[i - 1].is_ascii_uppercase();
        let cur_upper = chars[i].is_ascii_uppercase();
        let next_lower = chars
            .get(i + 1)
            .map(|c| c.is_ascii_lowercase())
            .unwrap_or(false);
        let boundary = (cur_upper && !prev_upper) || (cur_upper && prev_upper && next_lower);
        if boundary {
            parts.push(chars[start..i].iter().collect());
            start = i;
        }
    }
    parts.push(chars[start..].iter().collect());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts() -> TokenizeOptions {
        TokenizeOptions::default()
    }

    #[test]
    fn test_basic_tokens_lowercased_in_order() {
        let toks = tokens("Disk ERROR on node_7", &opts());
        assert_eq!(toks, vec!["disk", "error", "on", "node_7"]);
    }

    #[test]
    fn test_duplicates_removed_first_occurrence_wins() {
        let toks = tokens("retry retry RETRY again retry", &opts());
        assert_eq!(toks, vec!["retry", "again"]);
    }

    #[test]
    fn test_empty_and_symbol_only_input() {
        assert!(tokens("", &opts()).is_empty());
        assert!(tokens("--- !!! ===", &opts()).is_empty());
    }

    #[test]
    fn test_bigrams_appended_after_base() {
        let o = TokenizeOptions { include_bigrams: true, ..Default::default() };
        let toks = tokens("conn reset peer", &o);
        assert_eq!(
            toks,
            vec!["conn", "reset", "peer", "conn__reset", "reset__peer"]
        );
    }

    #[test]
    fn test_bigrams_skip_single_token() {
        let o = TokenizeOptions { include_bigrams: true, ..Default::default() };
        assert_eq!(tokens("lonely", &o), vec!["lonely"]);
    }

    #[test]
    fn test_camel_split_retains_original() {
        let o = TokenizeOptions { split_camel: true, ..Default::default() };
        let toks = tokens("call parseHTTPResponse now", &o);
        assert_eq!(
            toks,
            vec!["call", "parsehttpresponse", "now", "parse", "http", "response"]
        );
    }

    #[test]
    fn test_camel_split_ignores_flat_case() {
        let o = TokenizeOptions { split_camel: true, ..Default::default() };
        assert_eq!(tokens("nothing special", &o), vec!["nothing", "special"]);
    }

    #[test]
    fn test_dot_split_adds_whole() {
        let o = TokenizeOptions { split_dot: true, ..Default::default() };
        let toks = tokens("svc.auth.login failed", &o);
        assert_eq!(
            toks,
            vec!["svc", "auth", "login", "failed", "svc.auth.login"]
        );
    }

    #[test]
    fn test_camel_parts() {
        assert_eq!(camel_parts("fooBar"), vec!["foo", "Bar"]);
        assert_eq!(camel_parts("FooBarBaz"), vec!["Foo", "Bar", "Baz"]);
        assert_eq!(camel_parts("parseHTTPResponse"), vec!["parse", "HTTP", "Response"]);
        assert_eq!(camel_parts("plain"), vec!["plain"]);
    }
}
