//! `logsift rank` — score a whole file and print the most novel lines

use super::{build_model, maybe_save_model, novelty_style, print_guardrail_summary, read_lossy, ModelArgs};
use crate::models::TokenContributor;
use crate::parsers::parse_line;
use anyhow::{Context, Result};
use clap::Args;
use console::style;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct RankCommand {
    /// Log file to rank
    pub file: PathBuf,

    /// Write CSV if set
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// How many lines to print
    #[arg(long, default_value = "20")]
    pub top: usize,

    /// Write full JSON results (array) to this path
    #[arg(long)]
    pub json: Option<PathBuf>,

    /// Include all token contributors in JSON output (no truncation)
    #[arg(long)]
    pub all_token_contributors: bool,

    #[command(flatten)]
    pub model: ModelArgs,
}

struct RankRow {
    timestamp: Option<String>,
    level: Option<String>,
    novelty: f64,
    score: f64,
    token_info: f64,
    template_info: f64,
    template: String,
    line: String,
}

/// JSON output record, emitted in file order with the model state current
/// at that point in the pass.
#[derive(Serialize)]
struct RankJsonRow {
    timestamp: Option<String>,
    level: Option<String>,
    novelty: f64,
    score: f64,
    token_info_bits: f64,
    template_info_bits: f64,
    level_bonus: f64,
    template: String,
    token_contributors: Vec<TokenContributor>,
    line: String,
}

pub fn run(cmd: RankCommand) -> Result<()> {
    if cmd.model.no_color {
        console::set_colors_enabled(false);
    }
    let mut model = build_model(&cmd.model);
    let text = read_lossy(&cmd.file)?;

    let mut rows: Vec<RankRow> = Vec::new();
    let mut json_rows: Vec<RankJsonRow> = Vec::new();
    for raw in text.lines() {
        let parsed = parse_line(raw);
        model.observe(&parsed.message);
        let sc = model.score(&parsed.message, parsed.level.as_deref());
        if cmd.json.is_some() {
            let mut contributors = model.token_surprisals(&sc.tokens);
            if !cmd.all_token_contributors {
                contributors.truncate(10);
            }
            json_rows.push(RankJsonRow {
                timestamp: parsed.timestamp.clone(),
                level: parsed.level.clone(),
                novelty: sc.novelty,
                score: sc.score,
                token_info_bits: sc.token_info,
                template_info_bits: sc.template_info,
                level_bonus: sc.level_bonus,
                template: sc.template.clone(),
                token_contributors: contributors,
                line: parsed.message.trim().to_string(),
            });
        }
        rows.push(RankRow {
            timestamp: parsed.timestamp,
            level: parsed.level,
            novelty: sc.novelty,
            score: sc.score,
            token_info: sc.token_info,
            template_info: sc.template_info,
            template: sc.template,
            line: parsed.message.trim().to_string(),
        });
    }
    rows.sort_by(|a, b| b.novelty.total_cmp(&a.novelty));

    if let Some(json_path) = &cmd.json {
        let data = serde_json::to_string_pretty(&json_rows)?;
        std::fs::write(json_path, data)
            .with_context(|| format!("writing JSON to {}", json_path.display()))?;
        println!("Wrote JSON {} ({} objects)", json_path.display(), json_rows.len());
    }

    if let Some(out) = &cmd.out {
        write_csv(out, &rows)?;
        println!("Wrote {} ({} lines)", out.display(), rows.len());
    } else {
        for row in rows.iter().take(cmd.top) {
            println!(
                "{} {} {} {}  {}",
                style(row.timestamp.as_deref().unwrap_or("-")).dim(),
                style(format!("[{}]", row.level.as_deref().unwrap_or("-"))).cyan(),
                novelty_style(row.novelty).apply_to(format!("novelty={:.3}", row.novelty)),
                style(format!("score={:.3}", row.score)).magenta(),
                row.line,
            );
        }
    }

    maybe_save_model(&model, cmd.model.state_out.as_deref());
    print_guardrail_summary(&model);
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn write_csv(path: &std::path::Path, rows: &[RankRow]) -> Result<()> {
    use std::io::Write;
    let mut file = std::fs::File::create(path)
        .with_context(|| format!("creating CSV file {}", path.display()))?;
    writeln!(file, "timestamp,level,novelty,score,token_info,template_info,template,line")?;
    for row in rows {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{}",
            csv_field(row.timestamp.as_deref().unwrap_or("")),
            csv_field(row.level.as_deref().unwrap_or("")),
            row.novelty,
            row.score,
            row.token_info,
            row.template_info,
            csv_field(&row.template),
            csv_field(&row.line),
        )?;
    }
    Ok(())
}
