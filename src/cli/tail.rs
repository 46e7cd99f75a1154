//! `logsift tail` — follow a log and alert on high-novelty lines

use super::{build_model, maybe_save_model, novelty_style, print_guardrail_summary, ModelArgs};
use crate::config::{clamp_quantile, resolve_tail_settings};
use crate::engine::{AlertEngine, EngineOptions};
use crate::models::Alert;
use crate::score::InfoModel;
use crate::sinks::{AlertSink, JsonlSink};
use crate::tail::TailReader;
use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::warn;

#[derive(Args, Debug)]
pub struct TailCommand {
    /// Log file to follow
    pub file: PathBuf,

    /// Process existing file once and exit (do not wait for new lines)
    #[arg(long)]
    pub no_follow: bool,

    /// Override the rolling novelty quantile [0,1)
    #[arg(long)]
    pub quantile: Option<f64>,

    /// Multiple high-percentile quantiles (e.g. 0.99 0.995); the highest
    /// decides alerting
    #[arg(long, num_args = 1..)]
    pub quantiles: Option<Vec<f64>>,

    /// Rolling window size in lines; selects the fixed-window estimator
    /// instead of P²
    #[arg(long)]
    pub window: Option<usize>,

    /// Lines to observe before emitting alerts
    #[arg(long)]
    pub burn_in: Option<u64>,

    /// Apply tuned defaults for a common log profile
    #[arg(long, value_parser = ["web", "k8s", "auth"])]
    pub profile: Option<String>,

    /// Quick preset: triage (0.992) or page (0.995)
    #[arg(long, value_parser = ["triage", "page"])]
    pub mode: Option<String>,

    /// Bypass quantiles and alert when the raw score exceeds this bar
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Skip alerts when the same template fired recently
    #[arg(long)]
    pub dedupe_template: bool,

    /// Write JSON lines for each emitted alert to this file
    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// Include the full token contributor list in alerts (instead of top 10)
    #[arg(long)]
    pub all_token_contributors: bool,

    /// Include all individual quantile estimates in alerts
    #[arg(long)]
    pub emit_intermediate: bool,

    /// Seconds between periodic snapshots (requires --state-out)
    #[arg(long)]
    pub snapshot_interval: Option<f64>,

    /// Seconds between alert rate stats on stderr
    #[arg(long)]
    pub stats_interval: Option<f64>,

    /// Poll interval in milliseconds
    #[arg(long, default_value = "250")]
    pub poll_ms: u64,

    #[command(flatten)]
    pub model: ModelArgs,
}

pub fn run(cmd: TailCommand) -> Result<()> {
    if cmd.model.no_color {
        console::set_colors_enabled(false);
    }
    let model = build_model(&cmd.model);

    let settings = resolve_tail_settings(
        cmd.profile.as_deref(),
        cmd.mode.as_deref(),
        cmd.quantile,
        cmd.window,
        cmd.burn_in,
    );
    let mut quantiles: Vec<f64> = cmd
        .quantiles
        .clone()
        .unwrap_or_default()
        .into_iter()
        .map(clamp_quantile)
        .collect();
    quantiles.sort_by(f64::total_cmp);
    quantiles.dedup();

    let opts = EngineOptions {
        quantile: settings.quantile,
        quantiles,
        window: settings.window,
        use_p2: cmd.window.is_none(),
        burn_in: settings.burn_in,
        threshold: cmd.threshold,
        dedupe_template: cmd.dedupe_template,
        emit_intermediate: cmd.emit_intermediate,
        all_token_contributors: cmd.all_token_contributors,
    };
    let mut engine = AlertEngine::new(model, opts);

    let mut sink: Option<JsonlSink> = match &cmd.jsonl {
        Some(path) => match JsonlSink::open(path) {
            Ok(sink) => Some(sink),
            Err(err) => {
                eprintln!("[logsift] could not open JSONL file {}: {err}", path.display());
                None
            }
        },
        None => None,
    };

    // Translate SIGINT/SIGTERM into a cooperative stop
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        if let Err(err) = ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst)) {
            warn!("could not install signal handler: {err}");
        }
    }

    let snapshot_worker = spawn_snapshot_worker(&cmd, &engine);

    let stats_interval = cmd.stats_interval.filter(|s| *s > 0.0);
    let mut last_stats = Instant::now();

    // With a manual threshold the existing content is scored against the
    // bar too; adaptive modes start at the end like tail -f
    let reader = TailReader::new(&cmd.file)
        .follow(!cmd.no_follow)
        .start_at_end(cmd.threshold.is_none())
        .poll_interval(Duration::from_millis(cmd.poll_ms.max(1)))
        .with_stop_flag(Arc::clone(&stop));

    for raw in reader {
        if let Some(alert) = engine.process_line(&raw) {
            print_alert(&alert, &engine);
            if let Some(sink) = sink.as_mut() {
                if let Err(err) = sink.emit(&alert) {
                    eprintln!("[logsift] failed to write alert via sink: {err}");
                }
            }
        }
        if let Some(interval) = stats_interval {
            if last_stats.elapsed().as_secs_f64() >= interval {
                print_stats(&engine);
                last_stats = Instant::now();
            }
        }
    }

    if stop.load(Ordering::SeqCst) {
        eprintln!("[logsift] stopping tail (interrupt)");
    }

    // Every exit path: stop the worker, close the sink, final stats,
    // final snapshot, guardrail summary
    if let Some((stop_tx, handle)) = snapshot_worker {
        drop(stop_tx);
        let _ = handle.join();
    }
    if let Some(mut sink) = sink {
        sink.close();
    }
    if stats_interval.is_some() {
        print_stats(&engine);
    }
    let model_handle = engine.model_handle();
    let model = model_handle.lock().unwrap_or_else(PoisonError::into_inner);
    maybe_save_model(&model, cmd.model.state_out.as_deref());
    print_guardrail_summary(&model);
    Ok(())
}

type SnapshotWorker = (mpsc::Sender<()>, std::thread::JoinHandle<()>);

/// Periodically serialize the model while tailing. The worker copies the
/// state out under the model lock, then writes outside it; dropping the
/// sender wakes and stops the worker.
fn spawn_snapshot_worker(cmd: &TailCommand, engine: &AlertEngine) -> Option<SnapshotWorker> {
    let interval = cmd.snapshot_interval?;
    let state_out = match &cmd.model.state_out {
        Some(path) => path.clone(),
        None => return None,
    };
    if !(interval.is_finite() && interval > 0.0) {
        eprintln!("[logsift] invalid --snapshot-interval; ignoring");
        return None;
    }
    let period = Duration::from_secs_f64(interval);
    let handle: Arc<Mutex<InfoModel>> = engine.model_handle();
    let (stop_tx, stop_rx) = mpsc::channel::<()>();
    let worker = std::thread::spawn(move || loop {
        match stop_rx.recv_timeout(period) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let snapshot = {
                    let model = handle.lock().unwrap_or_else(PoisonError::into_inner);
                    model.snapshot()
                };
                match snapshot.save(&state_out) {
                    Ok(()) => println!("Wrote state snapshot to {}", state_out.display()),
                    Err(err) => eprintln!("[logsift] periodic snapshot failed: {err}"),
                }
            }
        }
    });
    Some((stop_tx, worker))
}

fn print_stats(engine: &AlertEngine) {
    eprintln!(
        "[logsift] stats: lines={} alerts={} observed_rate={:.4} target_quantile={:.4}",
        engine.lines_seen(),
        engine.alerts_emitted(),
        engine.observed_rate(),
        engine.target_quantile(),
    );
}

/// Threshold annotation for the console header, matching the active mode.
fn threshold_note(alert: &Alert, engine: &AlertEngine) -> Option<String> {
    let threshold = alert.threshold?;
    if engine.is_manual() {
        return Some(format!("(>={threshold:.3})"));
    }
    let quantile = alert.quantile.unwrap_or(0.0);
    if engine.options().use_p2 {
        if engine.is_multi() {
            let parts: Vec<String> = engine
                .current_estimates()
                .iter()
                .map(|(q, value)| format!("q{q:.3}={value:.3}"))
                .collect();
            Some(format!("({}; using>={threshold:.3})", parts.join(",")))
        } else {
            Some(format!("(q{quantile:.3}@p2>={threshold:.3})"))
        }
    } else {
        Some(format!("(q{quantile:.3}@w{}>={threshold:.3})", engine.window_fill()))
    }
}

fn print_alert(alert: &Alert, engine: &AlertEngine) {
    let note = threshold_note(alert, engine);
    let mut header = format!(
        "{} {} {}",
        style(alert.timestamp.as_deref().unwrap_or("-")).dim(),
        style(format!("[{}]", alert.level.as_deref().unwrap_or("-"))).cyan(),
        novelty_style(alert.novelty).apply_to(format!("novelty={:.3}", alert.novelty)),
    );
    if let (Some(note), false) = (&note, engine.is_manual()) {
        header.push_str(&format!(" {}", style(note).dim()));
    }
    header.push_str(&format!(" {}", style(format!("score={:.3}", alert.score)).magenta()));
    if let (Some(note), true) = (&note, engine.is_manual()) {
        header.push_str(&format!(" {}", style(note).dim()));
    }
    header.push_str(&format!("  {}", alert.line));
    println!("{header}");

    for neighbor in &alert.neighbors {
        println!(
            "{}",
            style(format!(
                "   -> neighbor (sim={:.2}): {}",
                neighbor.similarity, neighbor.line
            ))
            .dim()
        );
    }
    println!(
        "{}",
        style(format!(
            "   template={} p~{:.5}",
            alert.template, alert.template_probability
        ))
        .dim()
    );
}
