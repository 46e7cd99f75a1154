//! CLI command definitions and handlers

pub mod cluster;
pub mod explain;
pub mod rank;
pub mod summarize;
pub mod tail;

use crate::config::ScoringConfig;
use crate::score::{InfoModel, SnapshotError};
use crate::template::{self, MaskOrder};
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use regex::Regex;
use std::path::{Path, PathBuf};

/// Logsift - surface rare, high-signal log lines
///
/// Learns token and template frequencies online from the stream itself;
/// no labels, no training corpus, nothing leaves your machine.
#[derive(Parser, Debug)]
#[command(name = "logsift")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Model-shaping flags shared by every command that builds a model.
#[derive(Args, Debug, Clone, Default)]
pub struct ModelArgs {
    /// Custom regex=replacement mask (repeatable)
    #[arg(long = "mask")]
    pub mask: Vec<String>,

    /// Apply custom masks before or after built-ins
    #[arg(long, default_value = "before", value_parser = ["before", "after"])]
    pub mask_order: String,

    /// Include token bigrams while scoring
    #[arg(long)]
    pub with_bigrams: bool,

    /// Split mixedCase/PascalCase tokens into parts (retain original)
    #[arg(long)]
    pub split_camel: bool,

    /// Split dotted.identifiers into parts (retain original)
    #[arg(long)]
    pub split_dot: bool,

    /// Override weight for the token surprisal component
    #[arg(long)]
    pub w_token: Option<f64>,

    /// Override weight for the template surprisal component
    #[arg(long)]
    pub w_template: Option<f64>,

    /// Override weight for the level bonus component
    #[arg(long)]
    pub w_level: Option<f64>,

    /// Per-line decay multiplier (e.g. 0.9999)
    #[arg(long)]
    pub decay: Option<f64>,

    /// Apply the decay multiplier every N lines
    #[arg(long)]
    pub decay_every: Option<u64>,

    /// Load model state from this JSON snapshot
    #[arg(long)]
    pub state_in: Option<PathBuf>,

    /// Persist the updated model state to this JSON snapshot
    #[arg(long)]
    pub state_out: Option<PathBuf>,

    /// Disable colorized output
    #[arg(long)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank a log file by novelty
    #[command(visible_alias = "score")]
    Rank(rank::RankCommand),

    /// Tail a log and print only high-novelty lines with context
    Tail(tail::TailCommand),

    /// Explain why a line scores the way it does
    Explain(explain::ExplainCommand),

    /// Show the most common templates
    Cluster(cluster::ClusterCommand),

    /// Summarize an alerts JSONL file (from tail)
    Summarize(summarize::SummarizeCommand),

    /// Show version and exit
    Version,
}

/// Run the CLI with parsed arguments
pub fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Rank(cmd) => rank::run(cmd),
        Commands::Tail(cmd) => tail::run(cmd),
        Commands::Explain(cmd) => explain::run(cmd),
        Commands::Cluster(cmd) => cluster::run(cmd),
        Commands::Summarize(cmd) => summarize::run(cmd),
        Commands::Version => {
            println!("logsift {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Install custom masks from `pattern=replacement` specs. Malformed specs
/// are reported once on stderr and skipped; they never abort the run.
pub(crate) fn install_masks(specs: &[String], order: &str) {
    if specs.is_empty() {
        return;
    }
    let mut compiled: Vec<(Regex, String)> = Vec::new();
    for spec in specs {
        match spec.split_once('=') {
            None => eprintln!(
                "[logsift] ignoring malformed --mask '{spec}' (expected pattern=replacement)"
            ),
            Some((pattern, replacement)) => match Regex::new(pattern) {
                Ok(re) => compiled.push((re, replacement.to_string())),
                Err(err) => eprintln!("[logsift] invalid regex in --mask '{pattern}': {err}"),
            },
        }
    }
    let order = if order == "after" { MaskOrder::After } else { MaskOrder::Before };
    template::set_custom_masks(compiled, order);
}

/// Build a model from shared flags, restoring saved state when requested.
pub(crate) fn build_model(args: &ModelArgs) -> InfoModel {
    install_masks(&args.mask, &args.mask_order);

    let mut cfg = ScoringConfig {
        include_bigrams: args.with_bigrams,
        split_camel: args.split_camel,
        split_dot: args.split_dot,
        ..Default::default()
    };
    if let Some(w) = args.w_token {
        cfg.w_token = w;
    }
    if let Some(w) = args.w_template {
        cfg.w_template = w;
    }
    if let Some(w) = args.w_level {
        cfg.w_level = w;
    }
    if let Some(decay) = args.decay {
        if decay > 0.0 && decay <= 1.0 {
            cfg.decay = decay;
        } else {
            eprintln!("[logsift] invalid --decay {decay}; using default");
        }
    }
    if let Some(every) = args.decay_every {
        if every >= 1 {
            cfg.decay_every = every;
        } else {
            eprintln!("[logsift] invalid --decay-every; using default");
        }
    }

    if let Some(path) = &args.state_in {
        match InfoModel::load(path, Some(cfg.clone())) {
            Ok(model) => return model,
            Err(SnapshotError::NotFound(p)) => {
                eprintln!("[logsift] state file '{}' not found; starting fresh.", p.display());
            }
            Err(err) => {
                eprintln!("[logsift] failed to load state '{}': {err}", path.display());
            }
        }
    }
    InfoModel::new(cfg)
}

/// Persist model state when a path was given.
pub(crate) fn maybe_save_model(model: &InfoModel, path: Option<&Path>) {
    if let Some(path) = path {
        match model.save(path) {
            Ok(()) => println!("Wrote state snapshot to {}", path.display()),
            Err(err) => eprintln!("[logsift] failed to write state snapshot: {err}"),
        }
    }
}

/// Emit guardrail counters to stderr. Runs on every exit path.
pub(crate) fn print_guardrail_summary(model: &InfoModel) {
    eprintln!(
        "[logsift] summary: truncated_lines={} token_truncated_lines={} dropped_lines={} vocab_tokens={} vocab_templates={}",
        model.lines_truncated,
        model.lines_token_truncated,
        model.lines_dropped,
        model.vocab_tokens(),
        model.vocab_templates(),
    );
}

/// Map novelty [0,1] to a terminal color, green through red.
pub(crate) fn novelty_style(novelty: f64) -> console::Style {
    let style = console::Style::new();
    if novelty < 0.6 {
        style.green()
    } else if novelty < 0.75 {
        style.yellow()
    } else if novelty < 0.9 {
        style.color256(208)
    } else {
        style.red()
    }
}

/// Read a whole log file permissively: malformed bytes are replaced.
pub(crate) fn read_lossy(path: &Path) -> Result<String> {
    use anyhow::Context;
    let bytes = std::fs::read(path)
        .with_context(|| format!("reading log file {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
