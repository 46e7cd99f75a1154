//! Read-only metrics snapshot for the info model
//!
//! A lightweight copy of internal counters suitable for logging or an
//! observation endpoint. Never mutates the model.

use crate::score::InfoModel;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ModelMetrics {
    pub tokens: usize,
    pub templates: usize,
    pub total_tokens: f64,
    pub total_templates: f64,
    pub seen_lines: u64,
    pub g: f64,
    pub renormalizations: u64,
    pub lines_truncated: u64,
    pub lines_token_truncated: u64,
    pub lines_dropped: u64,
    pub config: MetricsConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsConfig {
    pub decay: f64,
    pub decay_every: u64,
    pub max_tokens: usize,
    pub max_templates: usize,
    pub max_tokens_per_line: usize,
    pub max_line_length: usize,
    pub include_bigrams: bool,
    pub split_camel: bool,
    pub split_dot: bool,
}

pub fn model_metrics(model: &InfoModel) -> ModelMetrics {
    let cfg = model.cfg();
    ModelMetrics {
        tokens: model.vocab_tokens(),
        templates: model.vocab_templates(),
        total_tokens: model.total_tokens(),
        total_templates: model.total_templates(),
        seen_lines: model.seen_lines(),
        g: model.scale(),
        renormalizations: model.renormalizations,
        lines_truncated: model.lines_truncated,
        lines_token_truncated: model.lines_token_truncated,
        lines_dropped: model.lines_dropped,
        config: MetricsConfig {
            decay: cfg.decay,
            decay_every: cfg.decay_every,
            max_tokens: cfg.max_tokens,
            max_templates: cfg.max_templates,
            max_tokens_per_line: cfg.max_tokens_per_line,
            max_line_length: cfg.max_line_length,
            include_bigrams: cfg.include_bigrams,
            split_camel: cfg.split_camel,
            split_dot: cfg.split_dot,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_reflect_model_state() {
        let mut model = InfoModel::default();
        model.observe("INFO one two");
        model.observe("INFO one two");
        let metrics = model_metrics(&model);
        assert_eq!(metrics.seen_lines, 2);
        assert_eq!(metrics.tokens, 3);
        assert_eq!(metrics.templates, 1);
        assert_eq!(metrics.lines_dropped, 0);
        assert!(metrics.g > 0.0 && metrics.g <= 1.0);
    }

    #[test]
    fn test_metrics_serialize() {
        let model = InfoModel::default();
        let json = serde_json::to_value(model_metrics(&model)).unwrap();
        assert_eq!(json["seen_lines"], 0);
        assert_eq!(json["config"]["max_tokens"], 30000);
    }
}
