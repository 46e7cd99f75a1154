//! Core data models for Logsift
//!
//! Score breakdowns produced by the information model and the alert
//! record emitted through sinks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Score breakdown for a single line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineScore {
    /// Weighted combination of the components below
    pub score: f64,
    /// Average token self-information in bits
    pub token_info: f64,
    /// Template self-information in bits
    pub template_info: f64,
    /// Severity bonus from the level table
    pub level_bonus: f64,
    /// 1 - exp(-token_info), bounded in [0, 1)
    pub novelty: f64,
    /// Canonical template of the line
    pub template: String,
    /// Tokens extracted from the line, order preserved
    pub tokens: Vec<String>,
}

impl LineScore {
    /// Score for a line with no extractable tokens.
    pub fn empty(template: String) -> Self {
        Self {
            score: 0.0,
            token_info: 0.0,
            template_info: 0.0,
            level_bonus: 0.0,
            novelty: 0.0,
            template,
            tokens: Vec::new(),
        }
    }
}

/// Per-token surprisal detail attached to alerts and explanations.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TokenContributor {
    pub token: String,
    pub prob: f64,
    pub bits: f64,
    pub freq: usize,
}

/// A recent line ranked by token-set similarity to the alerting line.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Neighbor {
    pub similarity: f64,
    pub line: String,
}

/// One emitted alert record (the JSONL schema).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Alert {
    pub timestamp: Option<String>,
    pub level: Option<String>,
    pub novelty: f64,
    pub score: f64,
    pub token_info_bits: f64,
    pub template_info_bits: f64,
    pub level_bonus: f64,
    pub template: String,
    pub template_probability: f64,
    pub tokens: Vec<String>,
    pub token_contributors: Vec<TokenContributor>,
    /// Original line, trimmed
    pub line: String,
    /// Active alerting threshold (none while still in burn-in)
    pub threshold: Option<f64>,
    /// Target quantile behind the threshold (none for manual thresholds)
    pub quantile: Option<f64>,
    /// All individual quantile estimates, keyed by target (multi-q only)
    pub quantile_estimates: Option<BTreeMap<String, f64>>,
    pub neighbors: Vec<Neighbor>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_serde_round_trip() {
        let alert = Alert {
            timestamp: Some("2024-01-01T00:00:00".into()),
            level: Some("ERROR".into()),
            novelty: 0.93,
            score: 12.5,
            template: "disk <path> failed code=<num>".into(),
            tokens: vec!["disk".into(), "failed".into(), "code".into()],
            token_contributors: vec![TokenContributor {
                token: "disk".into(),
                prob: 0.001,
                bits: 9.96,
                freq: 1,
            }],
            line: "disk /dev/sda failed code=5".into(),
            threshold: Some(0.9),
            quantile: Some(0.992),
            neighbors: vec![Neighbor { similarity: 0.5, line: "disk ok".into() }],
            ..Default::default()
        };
        let json = serde_json::to_string(&alert).unwrap();
        let back: Alert = serde_json::from_str(&json).unwrap();
        assert_eq!(back.level.as_deref(), Some("ERROR"));
        assert_eq!(back.tokens.len(), 3);
        assert_eq!(back.neighbors[0].line, "disk ok");
        assert_eq!(back.threshold, Some(0.9));
    }

    #[test]
    fn test_alert_deserialize_missing_fields() {
        // Older alert files may lack newer fields; defaults fill the gaps
        let json = r#"{"novelty":0.5,"score":3.0,"template":"t","line":"l"}"#;
        let alert: Alert = serde_json::from_str(json).unwrap();
        assert!(alert.timestamp.is_none());
        assert!(alert.quantile_estimates.is_none());
        assert!(alert.token_contributors.is_empty());
    }

    #[test]
    fn test_line_score_empty() {
        let sc = LineScore::empty("<num>".into());
        assert_eq!(sc.score, 0.0);
        assert_eq!(sc.novelty, 0.0);
        assert!(sc.tokens.is_empty());
        assert_eq!(sc.template, "<num>");
    }
}
