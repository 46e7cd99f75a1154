//! `logsift explain` — break down the score of a single line

use super::{build_model, maybe_save_model, print_guardrail_summary, read_lossy, ModelArgs};
use crate::models::TokenContributor;
use crate::parsers::parse_line;
use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ExplainCommand {
    /// Log file used to prime frequencies
    pub file: PathBuf,

    /// A single log line to explain (quote it)
    #[arg(long)]
    pub line: String,

    /// How many tokens to list in the explanation
    #[arg(long, default_value = "10")]
    pub top_tokens: usize,

    /// Write a JSON explanation to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Do not truncate the token contributor list in JSON output
    #[arg(long)]
    pub all_token_contributors: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Serialize)]
struct ExplainWeights {
    w_token: f64,
    w_template: f64,
    w_level: f64,
}

#[derive(Serialize)]
struct Explanation {
    novelty: f64,
    score: f64,
    token_info_bits: f64,
    template_info_bits: f64,
    level_bonus: f64,
    weights: ExplainWeights,
    template: String,
    template_probability: f64,
    token_contributors: Vec<TokenContributor>,
    line: String,
}

pub fn run(cmd: ExplainCommand) -> Result<()> {
    let mut model = build_model(&cmd.model);

    // Prime the model with the file to get reasonable frequencies
    let text = read_lossy(&cmd.file)?;
    for raw in text.lines() {
        let parsed = parse_line(raw);
        model.observe(&parsed.message);
    }

    let parsed = parse_line(&cmd.line);
    let sc = model.score(&parsed.message, parsed.level.as_deref());
    let template_probability = model.template_probability(&sc.template);
    let contributors = model.token_surprisals(&sc.tokens);

    if let Some(json_path) = &cmd.json {
        let kept = if cmd.all_token_contributors {
            contributors
        } else {
            contributors.into_iter().take(cmd.top_tokens).collect()
        };
        let explanation = Explanation {
            novelty: sc.novelty,
            score: sc.score,
            token_info_bits: sc.token_info,
            template_info_bits: sc.template_info,
            level_bonus: sc.level_bonus,
            weights: ExplainWeights {
                w_token: model.cfg().w_token,
                w_template: model.cfg().w_template,
                w_level: model.cfg().w_level,
            },
            template: sc.template.clone(),
            template_probability,
            token_contributors: kept,
            line: parsed.message.clone(),
        };
        let data = serde_json::to_string_pretty(&explanation)?;
        std::fs::write(json_path, data)
            .with_context(|| format!("writing JSON to {}", json_path.display()))?;
        println!("Wrote JSON explanation to {}", json_path.display());
    } else {
        println!(
            "Line: {}\nScore: {:.3} (novelty={:.3}, token_info={:.3}, template_info={:.3}, level_bonus={:.2})\nWeights: w_token={} w_template={} w_level={}",
            parsed.message,
            sc.score,
            sc.novelty,
            sc.token_info,
            sc.template_info,
            sc.level_bonus,
            model.cfg().w_token,
            model.cfg().w_template,
            model.cfg().w_level,
        );
        let top: Vec<&TokenContributor> = contributors.iter().take(cmd.top_tokens).collect();
        if top.is_empty() {
            println!("No tokens to report (line was empty after masking).");
        } else {
            println!("Top tokens by surprisal:");
            for tc in top {
                println!(
                    "   {:<20} bits={:.2} freq={} p~{:.5}",
                    tc.token, tc.bits, tc.freq, tc.prob
                );
            }
        }
        println!("Template: {} (p~{:.5})", sc.template, template_probability);
    }

    maybe_save_model(&model, cmd.model.state_out.as_deref());
    print_guardrail_summary(&model);
    Ok(())
}
