//! Scoring configuration and tail presets

use serde::{Deserialize, Serialize};

/// Tunables for the online information model.
///
/// Immutable after model construction; rides inside state snapshots so a
/// restored model scores exactly like the one that was saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Laplace smoothing for token and template probabilities
    pub alpha: f64,
    /// Weighting for token-level info vs template rarity vs level/severity
    pub w_token: f64,
    pub w_template: f64,
    pub w_level: f64,
    /// Per-line exponential decay multiplier (applied lazily)
    pub decay: f64,
    /// Apply the decay multiplier every N lines
    pub decay_every: u64,
    /// Window for nearest-neighbor context search
    pub nn_window: usize,
    pub nn_topk: usize,
    /// Maximum vocabulary sizes before evicting least-used entries
    pub max_tokens: usize,
    pub max_templates: usize,
    /// Tokenization controls
    pub include_bigrams: bool,
    pub split_camel: bool,
    pub split_dot: bool,
    /// Guardrails: longer lines are truncated, extra tokens dropped
    pub max_line_length: usize,
    pub max_tokens_per_line: usize,
    /// When the lazy global scale factor g shrinks below this threshold,
    /// fold g into the stored counts and reset g = 1.0.
    pub renorm_min_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            w_token: 1.0,
            w_template: 1.0,
            w_level: 0.25,
            decay: 0.9999,
            decay_every: 1,
            nn_window: 5000,
            nn_topk: 2,
            max_tokens: 30_000,
            max_templates: 10_000,
            include_bigrams: false,
            split_camel: false,
            split_dot: false,
            max_line_length: 2000,
            max_tokens_per_line: 400,
            renorm_min_scale: 1e-9,
        }
    }
}

/// Severity bonus added to the score (scaled by `w_level`).
pub fn level_bonus(level: &str) -> f64 {
    match level.to_ascii_uppercase().as_str() {
        "CRITICAL" => 1.0,
        "ERROR" => 0.7,
        "WARN" | "WARNING" => 0.3,
        "INFO" => 0.0,
        "DEBUG" => -0.05,
        "TRACE" => -0.1,
        _ => 0.0,
    }
}

/// Resolved settings for the tail/alerting loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TailSettings {
    pub quantile: f64,
    pub window: usize,
    pub burn_in: u64,
}

const TAIL_DEFAULTS: TailSettings = TailSettings {
    quantile: 0.992,
    window: 1000,
    burn_in: 500,
};

/// Smallest admissible rolling window.
pub const MIN_WINDOW: usize = 10;

/// Hard bounds for alerting quantiles.
pub const MIN_QUANTILE: f64 = 0.5;
pub const MAX_QUANTILE: f64 = 0.9995;

/// Tuned defaults for common log shapes.
pub fn tail_profile(name: &str) -> Option<TailSettings> {
    match name {
        "web" => Some(TailSettings { quantile: 0.992, window: 1200, burn_in: 400 }),
        "k8s" => Some(TailSettings { quantile: 0.995, window: 900, burn_in: 350 }),
        "auth" => Some(TailSettings { quantile: 0.994, window: 1100, burn_in: 500 }),
        _ => None,
    }
}

/// Quick quantile presets: triage keeps more, page keeps less.
pub fn mode_quantile(name: &str) -> Option<f64> {
    match name {
        "triage" => Some(0.992),
        "page" => Some(0.995),
        _ => None,
    }
}

pub fn clamp_quantile(q: f64) -> f64 {
    q.clamp(MIN_QUANTILE, MAX_QUANTILE)
}

/// Merge profile/mode presets with explicit overrides and clamp the result.
pub fn resolve_tail_settings(
    profile: Option<&str>,
    mode: Option<&str>,
    quantile: Option<f64>,
    window: Option<usize>,
    burn_in: Option<u64>,
) -> TailSettings {
    let mut settings = TAIL_DEFAULTS;
    if let Some(p) = profile.and_then(tail_profile) {
        settings = p;
    }
    if let Some(q) = mode.and_then(mode_quantile) {
        settings.quantile = q;
    }
    if let Some(q) = quantile {
        settings.quantile = q;
    }
    if let Some(w) = window {
        settings.window = w;
    }
    if let Some(b) = burn_in {
        settings.burn_in = b;
    }
    settings.quantile = clamp_quantile(settings.quantile);
    settings.window = settings.window.max(MIN_WINDOW);
    settings
}
