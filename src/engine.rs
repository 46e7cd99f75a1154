//! Streaming alert engine
//!
//! Runs the per-line pipeline over a tailed stream:
//! parse -> observe -> score -> threshold -> dedupe -> neighborhood.
//!
//! Thresholds come from a manual score bar, one or more P² estimators, or
//! a rolling-window quantile. Alerts are withheld during burn-in while
//! the model and estimators stabilize.
//!
//! The model sits behind one exclusive lock so a snapshot worker (or any
//! other context) can share it; the hot path takes the lock once per line.

use crate::config::ScoringConfig;
use crate::models::{Alert, Neighbor};
use crate::parsers::parse_line;
use crate::quantile::{compute_quantile, P2Quantile};
use crate::score::InfoModel;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

/// Jaccard similarity of two token sequences, on their sets.
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let sa: FxHashSet<&str> = a.iter().map(String::as_str).collect();
    let sb: FxHashSet<&str> = b.iter().map(String::as_str).collect();
    if sa.is_empty() && sb.is_empty() {
        return 0.0;
    }
    let intersection = sa.intersection(&sb).count();
    let union = sa.union(&sb).count();
    intersection as f64 / union.max(1) as f64
}

/// Alerting configuration for one engine run.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Single target quantile (already clamped)
    pub quantile: f64,
    /// Multiple target quantiles, cleaned and sorted ascending; the
    /// highest one decides alerting
    pub quantiles: Vec<f64>,
    /// Rolling window: novelty-buffer capacity and template-dedup horizon
    pub window: usize,
    /// P² estimators when true, fixed-window quantiles when false
    pub use_p2: bool,
    /// Lines to observe before any alert may fire
    pub burn_in: u64,
    /// Manual raw-score bar; bypasses quantiles and burn-in entirely
    pub threshold: Option<f64>,
    /// Suppress a template that alerted within the last `window` lines
    pub dedupe_template: bool,
    /// Attach every individual quantile estimate to alerts (multi-q only)
    pub emit_intermediate: bool,
    /// Keep the full token-contributor list instead of the top 10
    pub all_token_contributors: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            quantile: 0.992,
            quantiles: Vec::new(),
            window: 1000,
            use_p2: true,
            burn_in: 500,
            threshold: None,
            dedupe_template: false,
            emit_intermediate: false,
            all_token_contributors: false,
        }
    }
}

/// Minimum samples before the P² path may arm.
const MIN_P2_SAMPLES: u64 = 10;

/// Window-mode arming floor: the buffer must hold min(window, 30) values.
const WINDOW_ARM_FLOOR: usize = 30;

/// Truncation cap for token contributors unless the full list is requested.
const TOP_CONTRIBUTORS: usize = 10;

pub struct AlertEngine {
    model: Arc<Mutex<InfoModel>>,
    cfg: ScoringConfig,
    opts: EngineOptions,
    /// Ascending by q; empty in manual and window modes
    estimators: Vec<P2Quantile>,
    /// Rolling novelty buffer (window mode)
    novelties: VecDeque<f64>,
    /// Ring of (tokens, raw line) for neighborhood context
    recent: VecDeque<(Vec<String>, String)>,
    template_last_seen: FxHashMap<String, u64>,
    line_idx: u64,
    alerts_emitted: u64,
}

impl AlertEngine {
    pub fn new(model: InfoModel, opts: EngineOptions) -> Self {
        let cfg = model.cfg().clone();
        let estimators = if opts.threshold.is_none() && opts.use_p2 {
            if opts.quantiles.is_empty() {
                vec![P2Quantile::new(opts.quantile)]
            } else {
                opts.quantiles.iter().map(|&q| P2Quantile::new(q)).collect()
            }
        } else {
            Vec::new()
        };
        Self {
            model: Arc::new(Mutex::new(model)),
            cfg,
            opts,
            estimators,
            novelties: VecDeque::new(),
            recent: VecDeque::new(),
            template_last_seen: FxHashMap::default(),
            line_idx: 0,
            alerts_emitted: 0,
        }
    }

    /// Shared handle for snapshot workers and other contexts. All access
    /// goes through the one exclusive lock.
    pub fn model_handle(&self) -> Arc<Mutex<InfoModel>> {
        Arc::clone(&self.model)
    }

    pub fn options(&self) -> &EngineOptions {
        &self.opts
    }

    pub fn lines_seen(&self) -> u64 {
        self.line_idx
    }

    pub fn alerts_emitted(&self) -> u64 {
        self.alerts_emitted
    }

    pub fn observed_rate(&self) -> f64 {
        if self.line_idx == 0 {
            0.0
        } else {
            self.alerts_emitted as f64 / self.line_idx as f64
        }
    }

    pub fn is_manual(&self) -> bool {
        self.opts.threshold.is_some()
    }

    pub fn is_multi(&self) -> bool {
        !self.opts.quantiles.is_empty()
    }

    /// Occupancy of the rolling novelty buffer (window mode).
    pub fn window_fill(&self) -> usize {
        self.novelties.len()
    }

    /// The quantile whose estimate decides alerting; None for manual.
    pub fn active_quantile(&self) -> Option<f64> {
        if self.is_manual() {
            return None;
        }
        Some(self.opts.quantiles.last().copied().unwrap_or(self.opts.quantile))
    }

    /// Target quantile for stats reporting (0.0 in manual mode).
    pub fn target_quantile(&self) -> f64 {
        self.active_quantile().unwrap_or(0.0)
    }

    /// Current (q, estimate) pairs for the active adaptive mode.
    pub fn current_estimates(&self) -> Vec<(f64, f64)> {
        if self.is_manual() {
            return Vec::new();
        }
        if self.opts.use_p2 {
            self.estimators.iter().map(|e| (e.q(), e.value())).collect()
        } else if self.opts.quantiles.is_empty() {
            vec![(
                self.opts.quantile,
                compute_quantile(self.novelties.iter().copied(), self.opts.quantile),
            )]
        } else {
            self.opts
                .quantiles
                .iter()
                .map(|&q| (q, compute_quantile(self.novelties.iter().copied(), q)))
                .collect()
        }
    }

    fn armed(&self) -> bool {
        if self.line_idx <= self.opts.burn_in {
            return false;
        }
        if self.opts.use_p2 {
            self.line_idx >= MIN_P2_SAMPLES
        } else {
            self.novelties.len() >= self.opts.window.min(WINDOW_ARM_FLOOR)
        }
    }

    /// Run the full per-line pipeline. Returns the alert record when the
    /// line clears the active threshold (and survives dedup).
    pub fn process_line(&mut self, raw: &str) -> Option<Alert> {
        self.line_idx += 1;
        let parsed = parse_line(raw);

        let mut model = self.model.lock().unwrap_or_else(PoisonError::into_inner);
        model.observe(&parsed.message);
        let sc = model.score(&parsed.message, parsed.level.as_deref());

        let mut threshold_value: Option<f64> = None;
        let mut should_alert = false;
        match self.opts.threshold {
            Some(bar) => {
                threshold_value = Some(bar);
                should_alert = sc.score >= bar;
            }
            None => {
                if self.opts.use_p2 {
                    for est in &mut self.estimators {
                        est.update(sc.novelty);
                    }
                    if self.armed() {
                        // Estimators sit in ascending q order; the last
                        // (strictest) one gates alerting
                        if let Some(top) = self.estimators.last() {
                            let value = top.value();
                            threshold_value = Some(value);
                            should_alert = sc.novelty >= value;
                        }
                    }
                } else {
                    self.novelties.push_back(sc.novelty);
                    while self.novelties.len() > self.opts.window {
                        self.novelties.pop_front();
                    }
                    if self.armed() {
                        let top_q = self
                            .opts
                            .quantiles
                            .last()
                            .copied()
                            .unwrap_or(self.opts.quantile);
                        let value = compute_quantile(self.novelties.iter().copied(), top_q);
                        threshold_value = Some(value);
                        should_alert = sc.novelty >= value;
                    }
                }
            }
        }

        let last_seen = self.template_last_seen.get(&sc.template).copied();
        self.template_last_seen.insert(sc.template.clone(), self.line_idx);
        if should_alert && self.opts.dedupe_template {
            if let Some(prev) = last_seen {
                if self.line_idx - prev < self.opts.window as u64 {
                    should_alert = false;
                }
            }
        }

        let alert = if should_alert {
            let mut ranked: Vec<(f64, &str)> = self
                .recent
                .iter()
                .map(|(toks, line)| (jaccard(&sc.tokens, toks), line.as_str()))
                .collect();
            ranked.sort_by(|a, b| b.0.total_cmp(&a.0));
            let neighbors: Vec<Neighbor> = ranked
                .iter()
                .take(self.cfg.nn_topk)
                .map(|(similarity, line)| Neighbor {
                    similarity: *similarity,
                    line: line.trim().to_string(),
                })
                .collect();

            let template_probability = model.template_probability(&sc.template);
            let mut token_contributors = model.token_surprisals(&sc.tokens);
            if !self.opts.all_token_contributors {
                token_contributors.truncate(TOP_CONTRIBUTORS);
            }
            drop(model);

            let quantile_estimates = if self.opts.emit_intermediate && self.is_multi() {
                let map: BTreeMap<String, f64> = self
                    .current_estimates()
                    .into_iter()
                    .map(|(q, value)| (format!("{q:.3}"), value))
                    .collect();
                Some(map)
            } else {
                None
            };

            self.alerts_emitted += 1;
            Some(Alert {
                timestamp: parsed.timestamp,
                level: parsed.level,
                novelty: sc.novelty,
                score: sc.score,
                token_info_bits: sc.token_info,
                template_info_bits: sc.template_info,
                level_bonus: sc.level_bonus,
                template: sc.template,
                template_probability,
                tokens: sc.tokens.clone(),
                token_contributors,
                line: parsed.message.trim().to_string(),
                threshold: threshold_value,
                quantile: self.active_quantile(),
                quantile_estimates,
                neighbors,
            })
        } else {
            None
        };

        self.recent.push_back((sc.tokens, raw.to_string()));
        while self.recent.len() > self.cfg.nn_window {
            self.recent.pop_front();
        }
        alert
    }
}
