//! Online information model
//!
//! Counts tokens and templates with Laplace smoothing and gentle
//! exponential decay, then scores lines by self-information:
//!
//!   score = w_token * avg_token_self_info
//!         + w_template * template_self_info
//!         + w_level * bonus
//!
//! with self_info(x) = -log2(p(x)). Decay is lazy: a single global scale
//! factor g shrinks over time and effective counts are stored * g, so one
//! observation costs O(tokens) instead of a full table scan. When g
//! underflows it is folded back into the stored counts.

use crate::config::{level_bonus, ScoringConfig};
use crate::models::{LineScore, TokenContributor};
use crate::template::template;
use crate::tokenize::{tokens, TokenizeOptions};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Probability floor inside log2 so empty models never produce -inf.
const PROB_FLOOR: f64 = 1e-12;

const SNAPSHOT_VERSION: u32 = 3;

/// Errors on the snapshot load/save path.
///
/// A missing file is recoverable (start fresh); the rest abort only the
/// load path and leave the decision to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("state file not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to access state file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("state file {path} is not a valid snapshot: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported snapshot version {found} (expected {SNAPSHOT_VERSION})")]
    Version { found: u32 },
}

/// Serialized model state (version tag 3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSnapshot {
    pub version: u32,
    pub cfg: ScoringConfig,
    pub token_counts: FxHashMap<String, f64>,
    pub template_counts: FxHashMap<String, f64>,
    pub total_tokens: f64,
    pub total_templates: f64,
    pub seen_lines: u64,
    pub g: f64,
    pub last_decay_line: u64,
    #[serde(default)]
    pub lines_truncated: u64,
    #[serde(default)]
    pub lines_token_truncated: u64,
    #[serde(default)]
    pub lines_dropped: u64,
    #[serde(default)]
    pub renormalizations: u64,
}

impl ModelSnapshot {
    /// Persist to disk as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| SnapshotError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let data = serde_json::to_string_pretty(self).map_err(|source| SnapshotError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, data).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        let data = std::fs::read_to_string(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                SnapshotError::NotFound(path.to_path_buf())
            } else {
                SnapshotError::Io { path: path.to_path_buf(), source }
            }
        })?;
        let snap: ModelSnapshot =
            serde_json::from_str(&data).map_err(|source| SnapshotError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if snap.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::Version { found: snap.version });
        }
        Ok(snap)
    }
}

/// Online frequency model over tokens and templates.
#[derive(Debug, Clone)]
pub struct InfoModel {
    cfg: ScoringConfig,
    token_counts: FxHashMap<String, f64>,
    template_counts: FxHashMap<String, f64>,
    /// Unscaled aggregates; effective totals = stored * g
    total_tokens: f64,
    total_templates: f64,
    seen_lines: u64,
    /// Global scale factor for lazy decay
    g: f64,
    last_decay_line: u64,
    // Guardrail counters
    pub lines_truncated: u64,
    pub lines_token_truncated: u64,
    pub lines_dropped: u64,
    pub renormalizations: u64,
}

impl Default for InfoModel {
    fn default() -> Self {
        Self::new(ScoringConfig::default())
    }
}

impl InfoModel {
    pub fn new(cfg: ScoringConfig) -> Self {
        Self {
            cfg,
            token_counts: FxHashMap::default(),
            template_counts: FxHashMap::default(),
            total_tokens: 0.0,
            total_templates: 0.0,
            seen_lines: 0,
            g: 1.0,
            last_decay_line: 0,
            lines_truncated: 0,
            lines_token_truncated: 0,
            lines_dropped: 0,
            renormalizations: 0,
        }
    }

    pub fn cfg(&self) -> &ScoringConfig {
        &self.cfg
    }

    pub fn seen_lines(&self) -> u64 {
        self.seen_lines
    }

    pub fn scale(&self) -> f64 {
        self.g
    }

    pub fn vocab_tokens(&self) -> usize {
        self.token_counts.len()
    }

    pub fn vocab_templates(&self) -> usize {
        self.template_counts.len()
    }

    pub fn total_tokens(&self) -> f64 {
        self.total_tokens
    }

    pub fn total_templates(&self) -> f64 {
        self.total_templates
    }

    /// Laplace-smoothed probability against current effective counts.
    fn prob(&self, count: f64, total: f64, vocab: usize) -> f64 {
        let eff_count = count * self.g;
        let eff_total = total * self.g;
        (eff_count + self.cfg.alpha) / (eff_total + self.cfg.alpha * vocab.max(1) as f64)
    }

    fn self_info(prob: f64) -> f64 {
        -prob.max(PROB_FLOOR).log2()
    }

    /// Apply lazy decay by updating the global scale factor only.
    fn decay_maybe(&mut self) {
        if self.seen_lines == 0 {
            return;
        }
        let every = self.cfg.decay_every.max(1);
        if self.seen_lines - self.last_decay_line >= every {
            let steps = (self.seen_lines - self.last_decay_line) / every;
            if steps > 0 {
                self.g *= self.cfg.decay.powf(steps as f64);
                self.last_decay_line += steps * every;
            }
            if self.g < self.cfg.renorm_min_scale {
                self.renormalize();
            }
        }
    }

    /// Fold the scale factor into stored counts and reset g = 1.0.
    /// Probabilities before and after agree up to rounding.
    fn renormalize(&mut self) {
        let g = self.g;
        for value in self.token_counts.values_mut() {
            *value *= g;
        }
        for value in self.template_counts.values_mut() {
            *value *= g;
        }
        self.total_tokens *= g;
        self.total_templates *= g;
        self.g = 1.0;
        self.renormalizations += 1;
    }

    /// Evict minimum-count entries until the map fits its cap. Ties break
    /// toward the lexicographically smallest key so eviction is
    /// reproducible across platforms. A cap of zero means unbounded.
    fn prune(counts: &mut FxHashMap<String, f64>, total: &mut f64, cap: usize) {
        if cap == 0 {
            return;
        }
        while counts.len() > cap {
            let victim = counts
                .iter()
                .min_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)))
                .map(|(key, value)| (key.clone(), *value));
            let Some((key, removed)) = victim else { break };
            counts.remove(&key);
            // Clamp: accumulated float drift must not push totals negative
            *total = (*total - removed).max(0.0);
        }
    }

    /// Truncate at a char boundary, keeping at most `max_chars` chars.
    fn truncate_chars(line: &str, max_chars: usize) -> Option<&str> {
        line.char_indices().nth(max_chars).map(|(idx, _)| &line[..idx])
    }

    /// Update counts from one line (unsupervised).
    pub fn observe(&mut self, line: &str) {
        let text = match Self::truncate_chars(line, self.cfg.max_line_length) {
            Some(truncated) => {
                self.lines_truncated += 1;
                truncated
            }
            None => line,
        };

        let tpl = template(text);
        let mut toks = tokens(text, &TokenizeOptions::from_config(&self.cfg));
        if toks.len() > self.cfg.max_tokens_per_line {
            toks.truncate(self.cfg.max_tokens_per_line);
            self.lines_token_truncated += 1;
        }
        if toks.is_empty() {
            self.seen_lines += 1;
            self.decay_maybe();
            return;
        }

        // Add scaled so the effective increment is exactly 1 after g
        let inv_g = 1.0 / self.g;
        for tok in &toks {
            *self.token_counts.entry(tok.clone()).or_insert(0.0) += inv_g;
            self.total_tokens += inv_g;
        }
        *self.template_counts.entry(tpl).or_insert(0.0) += inv_g;
        self.total_templates += inv_g;

        if self.template_counts.len() > self.cfg.max_templates {
            Self::prune(
                &mut self.template_counts,
                &mut self.total_templates,
                self.cfg.max_templates,
            );
        }
        if self.token_counts.len() > self.cfg.max_tokens {
            Self::prune(
                &mut self.token_counts,
                &mut self.total_tokens,
                self.cfg.max_tokens,
            );
        }

        self.seen_lines += 1;
        self.decay_maybe();
    }

    /// Score one line against current frequencies. Does not mutate.
    pub fn score(&self, line: &str, level: Option<&str>) -> LineScore {
        let tpl = template(line);
        let toks = tokens(line, &TokenizeOptions::from_config(&self.cfg));
        if toks.is_empty() {
            return LineScore::empty(tpl);
        }

        let vocab = self.token_counts.len();
        let mut token_info_total = 0.0;
        for tok in &toks {
            let count = self.token_counts.get(tok).copied().unwrap_or(0.0);
            token_info_total += Self::self_info(self.prob(count, self.total_tokens, vocab));
        }
        let token_info = token_info_total / toks.len() as f64;

        let template_info = Self::self_info(self.template_probability(&tpl));

        let bonus = level.map(level_bonus).unwrap_or(0.0);
        let novelty = 1.0 - (-token_info).exp();
        let score = self.cfg.w_token * token_info
            + self.cfg.w_template * template_info
            + self.cfg.w_level * bonus;

        LineScore {
            score,
            token_info,
            template_info,
            level_bonus: bonus,
            novelty,
            template: tpl,
            tokens: toks,
        }
    }

    /// Per-token surprisal details for the unique tokens of a line,
    /// sorted by bits descending then token ascending.
    pub fn token_surprisals(&self, toks: &[String]) -> Vec<TokenContributor> {
        let vocab = self.token_counts.len();
        let mut freqs: Vec<(&str, usize)> = Vec::new();
        for tok in toks {
            match freqs.iter_mut().find(|(t, _)| *t == tok.as_str()) {
                Some((_, f)) => *f += 1,
                None => freqs.push((tok, 1)),
            }
        }
        let mut details: Vec<TokenContributor> = freqs
            .into_iter()
            .map(|(tok, freq)| {
                let count = self.token_counts.get(tok).copied().unwrap_or(0.0);
                let prob = self.prob(count, self.total_tokens, vocab);
                TokenContributor {
                    token: tok.to_string(),
                    prob,
                    bits: Self::self_info(prob),
                    freq,
                }
            })
            .collect();
        details.sort_by(|a, b| b.bits.total_cmp(&a.bits).then_with(|| a.token.cmp(&b.token)));
        details
    }

    /// Probability estimate for a template.
    pub fn template_probability(&self, tpl: &str) -> f64 {
        let count = self.template_counts.get(tpl).copied().unwrap_or(0.0);
        self.prob(count, self.total_templates, self.template_counts.len())
    }

    // Persistence ---------------------------------------------------------

    /// Copy out the full serializable state.
    pub fn snapshot(&self) -> ModelSnapshot {
        ModelSnapshot {
            version: SNAPSHOT_VERSION,
            cfg: self.cfg.clone(),
            token_counts: self.token_counts.clone(),
            template_counts: self.template_counts.clone(),
            total_tokens: self.total_tokens,
            total_templates: self.total_templates,
            seen_lines: self.seen_lines,
            g: self.g,
            last_decay_line: self.last_decay_line,
            lines_truncated: self.lines_truncated,
            lines_token_truncated: self.lines_token_truncated,
            lines_dropped: self.lines_dropped,
            renormalizations: self.renormalizations,
        }
    }

    /// Persist current state to disk as JSON.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        self.snapshot().save(path)
    }

    /// Rebuild a model from a snapshot. A config override substitutes the
    /// non-count fields while the learned counts are preserved.
    pub fn from_snapshot(snap: ModelSnapshot, cfg_override: Option<ScoringConfig>) -> Self {
        Self {
            cfg: cfg_override.unwrap_or(snap.cfg),
            token_counts: snap.token_counts,
            template_counts: snap.template_counts,
            total_tokens: snap.total_tokens,
            total_templates: snap.total_templates,
            seen_lines: snap.seen_lines,
            g: snap.g,
            last_decay_line: snap.last_decay_line,
            lines_truncated: snap.lines_truncated,
            lines_token_truncated: snap.lines_token_truncated,
            lines_dropped: snap.lines_dropped,
            renormalizations: snap.renormalizations,
        }
    }

    /// Load model state from disk.
    pub fn load(path: &Path, cfg_override: Option<ScoringConfig>) -> Result<Self, SnapshotError> {
        let snap = ModelSnapshot::load(path)?;
        Ok(Self::from_snapshot(snap, cfg_override))
    }
}
