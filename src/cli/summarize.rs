//! `logsift summarize` — aggregate an alerts JSONL file produced by tail

use super::read_lossy;
use crate::models::Alert;
use anyhow::{Context, Result};
use clap::Args;
use rustc_hash::FxHashMap;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct SummarizeCommand {
    /// Path to an alerts JSONL file produced by `tail --jsonl`
    pub file: PathBuf,

    /// Number of top templates to show
    #[arg(long, default_value = "10")]
    pub top_templates: usize,

    /// Number of top tokens by cumulative bits to show
    #[arg(long, default_value = "10")]
    pub top_tokens: usize,

    /// Optional path for a JSON summary (prints text otherwise)
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[derive(Serialize)]
struct Summary {
    alerts: usize,
    quantile: Option<f64>,
    novelty_min: f64,
    novelty_max: f64,
    novelty_mean: f64,
    novelty_p50: f64,
    score_mean: f64,
    threshold_mean: Option<f64>,
    threshold_last: Option<f64>,
    top_templates: Vec<(String, u64)>,
    top_tokens: Vec<(String, f64)>,
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

pub fn run(cmd: SummarizeCommand) -> Result<()> {
    if !cmd.file.exists() {
        anyhow::bail!("alerts JSONL not found: {}", cmd.file.display());
    }
    let text = read_lossy(&cmd.file)?;

    let mut alerts: Vec<Alert> = Vec::new();
    for raw in text.lines() {
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        match serde_json::from_str::<Alert>(raw) {
            Ok(alert) => alerts.push(alert),
            Err(err) => eprintln!("[logsift] skipped malformed JSON line: {err}"),
        }
    }
    if alerts.is_empty() {
        eprintln!("[logsift] no alert lines found");
        return Ok(());
    }

    let novelties: Vec<f64> = alerts.iter().map(|a| a.novelty).collect();
    let scores: Vec<f64> = alerts.iter().map(|a| a.score).collect();
    let thresholds: Vec<f64> = alerts.iter().filter_map(|a| a.threshold).collect();
    let quantile = alerts.iter().find_map(|a| a.quantile);

    let mut template_counts: FxHashMap<String, u64> = FxHashMap::default();
    let mut token_bits: FxHashMap<String, f64> = FxHashMap::default();
    for alert in &alerts {
        if !alert.template.is_empty() {
            *template_counts.entry(alert.template.clone()).or_insert(0) += 1;
        }
        for tc in &alert.token_contributors {
            *token_bits.entry(tc.token.clone()).or_insert(0.0) += tc.bits;
        }
    }
    let mut top_templates: Vec<(String, u64)> = template_counts.into_iter().collect();
    top_templates.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_templates.truncate(cmd.top_templates);
    let mut top_tokens: Vec<(String, f64)> = token_bits.into_iter().collect();
    top_tokens.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_tokens.truncate(cmd.top_tokens);

    let summary = Summary {
        alerts: alerts.len(),
        quantile,
        novelty_min: novelties.iter().copied().fold(f64::INFINITY, f64::min),
        novelty_max: novelties.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        novelty_mean: mean(&novelties),
        novelty_p50: median(&novelties),
        score_mean: mean(&scores),
        threshold_mean: if thresholds.is_empty() { None } else { Some(mean(&thresholds)) },
        threshold_last: thresholds.last().copied(),
        top_templates,
        top_tokens,
    };

    if let Some(out) = &cmd.out {
        let data = serde_json::to_string_pretty(&summary)?;
        std::fs::write(out, data)
            .with_context(|| format!("writing summary JSON to {}", out.display()))?;
        println!("Wrote summary JSON to {}", out.display());
    } else {
        println!("Alerts: {}", summary.alerts);
        if let Some(q) = summary.quantile {
            println!("Quantile (active): {q:.3}");
        }
        println!(
            "Novelty min={:.3} p50={:.3} max={:.3} mean={:.3}",
            summary.novelty_min, summary.novelty_p50, summary.novelty_max, summary.novelty_mean
        );
        match summary.threshold_mean {
            Some(mean) => println!("Score mean={:.3} threshold_mean={mean:.3}", summary.score_mean),
            None => println!("Score mean={:.3} threshold_mean=n/a", summary.score_mean),
        }
        if !summary.top_templates.is_empty() {
            println!("Top templates:");
            for (tpl, count) in &summary.top_templates {
                println!("  {count:5} {tpl}");
            }
        }
        if !summary.top_tokens.is_empty() {
            println!("Top tokens by cumulative bits:");
            for (token, bits) in &summary.top_tokens {
                println!("  {bits:7.2} {token}");
            }
        }
    }
    Ok(())
}
