//! `logsift cluster` — show the most common templates in a file

use super::{install_masks, read_lossy};
use crate::parsers::parse_line;
use crate::template::template;
use anyhow::Result;
use clap::Args;
use rustc_hash::FxHashMap;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ClusterCommand {
    /// Log file to cluster
    pub file: PathBuf,

    /// How many templates to print
    #[arg(long, default_value = "30")]
    pub top: usize,

    /// Custom regex=replacement mask (repeatable)
    #[arg(long = "mask")]
    pub mask: Vec<String>,

    /// Apply custom masks before or after built-ins
    #[arg(long, default_value = "before", value_parser = ["before", "after"])]
    pub mask_order: String,
}

pub fn run(cmd: ClusterCommand) -> Result<()> {
    install_masks(&cmd.mask, &cmd.mask_order);
    let text = read_lossy(&cmd.file)?;

    let mut counts: FxHashMap<String, u64> = FxHashMap::default();
    for raw in text.lines() {
        let parsed = parse_line(raw);
        if parsed.message.is_empty() {
            continue;
        }
        *counts.entry(template(&parsed.message)).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, u64)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    for (tpl, count) in ranked.into_iter().take(cmd.top) {
        println!("{count:6}  {tpl}");
    }
    Ok(())
}
