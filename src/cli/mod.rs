//! URL Sentinel CLI Module
//!
//! Command-line interface for training runs, validation, prediction and
//! store inspection.

use clap::{Parser, Subcommand};
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::data::{CsvRecordSource, Dataset, Label, RecordSource};
use crate::drift::DriftOutcome;
use crate::export::{ArtifactStore, LocalArtifactStore, VersionSelector};
use crate::pipeline::{PipelineConfig, TrainingPipeline};
use crate::schema::Schema;
use crate::synthetic::url_feature_dataset;
use crate::tracking::JsonLinesSink;
use crate::validation::DataValidator;

// ─── Styling helpers ───────────────────────────────────────────────────────────

const W: usize = 58; // box inner width

fn dim(s: &str) -> ColoredString   { s.truecolor(100, 100, 100) }
fn accent(s: &str) -> ColoredString { s.truecolor(120, 170, 255) }
fn muted(s: &str) -> ColoredString  { s.truecolor(140, 140, 140) }
fn ok(s: &str) -> ColoredString     { s.truecolor(100, 210, 120) }
fn bad(s: &str) -> ColoredString    { s.truecolor(235, 100, 100) }

fn line_box_top()    { println!("  {}", dim("┌─────────────────────────────────────────────────────────┐")); }
fn line_box_bottom() { println!("  {}", dim("└─────────────────────────────────────────────────────────┘")); }
fn line_box_sep()    { println!("  {}", dim("├─────────────────────────────────────────────────────────┤")); }

fn line_box(content: &str) {
    let visible_len = strip_ansi(content).chars().count();
    let pad = W.saturating_sub(visible_len);
    println!("  {}  {}{} {}", dim("│"), content, " ".repeat(pad), dim("│"));
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::new();
    let mut in_escape = false;
    for c in s.chars() {
        if c == '\x1b' { in_escape = true; continue; }
        if in_escape { if c == 'm' { in_escape = false; } continue; }
        out.push(c);
    }
    out
}

fn kv(key: &str, val: &str) -> String {
    format!("{} {}", muted(&format!("{:<14}", key)), val.white())
}

fn step_run(msg: &str) {
    print!("  {} {}... ", accent("›"), msg);
}

fn step_done(detail: &str) {
    println!("{} {}", ok("done"), dim(detail));
}

fn section(title: &str) {
    println!();
    println!("  {}", title.white().bold());
    println!("  {}", dim(&"─".repeat(56)));
}

// ─── CLI definition ────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "url-sentinel")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Train, validate and version malicious-URL classifiers")]
#[command(long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full training pipeline
    Train {
        /// Training snapshot (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Drift reference dataset (CSV)
        #[arg(short, long)]
        reference: PathBuf,

        /// Pipeline config (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Artifact store directory; overrides the config's model_dir
        #[arg(short, long)]
        store: Option<PathBuf>,
    },

    /// Validate a dataset against the schema and a drift reference
    Validate {
        /// Dataset to check (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Drift reference dataset (CSV)
        #[arg(short, long)]
        reference: PathBuf,

        /// Schema file (JSON); the built-in URL feature schema by default
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Predict labels with a stored bundle
    Predict {
        /// Artifact store directory
        #[arg(short, long)]
        store: PathBuf,

        /// Version to load: latest, v3 or 3
        #[arg(short, long, default_value = "latest")]
        version: String,

        /// Input data file (CSV)
        #[arg(short, long)]
        data: PathBuf,

        /// Output predictions file (CSV)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List stored versions
    Versions {
        /// Artifact store directory
        #[arg(short, long)]
        store: PathBuf,
    },

    /// Write a synthetic URL feature dataset
    Synth {
        #[arg(short, long, default_value = "1000")]
        rows: usize,

        #[arg(long, default_value = "42")]
        seed: u64,

        /// Fraction of cells left empty
        #[arg(long, default_value = "0.0")]
        missing_rate: f64,

        /// Output file (CSV)
        #[arg(short, long)]
        output: PathBuf,
    },
}

// ─── Data loading ──────────────────────────────────────────────────────────────

fn csv_source(path: &Path, config: &PipelineConfig) -> CsvRecordSource {
    CsvRecordSource::new(path)
        .with_target_column(config.target_column.clone())
        .with_malicious_value(config.malicious_value)
}

fn load_dataset(path: &Path, config: &PipelineConfig) -> anyhow::Result<Dataset> {
    step_run(&format!("Loading {}", path.display()));
    let start = Instant::now();
    let dataset = csv_source(path, config).fetch()?.dataset;
    step_done(&format!(
        "{} rows × {} cols in {:?}",
        dataset.n_rows(),
        dataset.columns().len(),
        start.elapsed()
    ));
    Ok(dataset)
}

fn load_config(path: Option<&Path>) -> anyhow::Result<PipelineConfig> {
    Ok(match path {
        Some(p) => PipelineConfig::from_file(p)?,
        None => PipelineConfig::default(),
    })
}

// ─── Commands ──────────────────────────────────────────────────────────────────

pub fn cmd_train(
    data_path: &Path,
    reference_path: &Path,
    config_path: Option<&Path>,
    store_dir: Option<&Path>,
) -> anyhow::Result<()> {
    section("Train");

    let config = load_config(config_path)?;
    let store_dir = store_dir
        .map(Path::to_path_buf)
        .unwrap_or_else(|| config.model_dir.clone());

    let reference = load_dataset(reference_path, &config)?;
    let store = Arc::new(LocalArtifactStore::open(&store_dir)?);
    let sink = Arc::new(JsonLinesSink::new(config.runs_log_path()));
    let source = csv_source(data_path, &config);

    let pipeline = TrainingPipeline::new(config, store)?
        .with_sink(sink)
        .with_report_files();

    step_run("Running pipeline");
    let start = Instant::now();
    let outcome = match pipeline.run_from_source(&source, &reference) {
        Ok(outcome) => outcome,
        Err(e) => {
            println!("{}", bad("failed"));
            println!();
            println!("  {} {}", bad("✗"), e.to_string().white());
            if let Some(report) = e.report() {
                for column in report.drift.drifted_columns() {
                    println!("    {} {}", muted("drifted"), column);
                }
            }
            println!();
            return Err(e.into());
        }
    };
    step_done(&format!("{:?}", start.elapsed()));

    let m = outcome.selected.test_metrics;
    println!();
    line_box_top();
    line_box(&kv("Version", &outcome.version.to_string()).bold().to_string());
    line_box(&kv("Model", &outcome.selected.params.to_string()));
    line_box_sep();
    line_box(&kv("F1", &format!("{:.4}", m.f1)));
    line_box(&kv("Recall", &format!("{:.4}", m.recall)));
    line_box(&kv("Precision", &format!("{:.4}", m.precision)));
    line_box(&kv("Accuracy", &format!("{:.4}", m.accuracy)));
    line_box_sep();
    line_box(&kv(
        "Candidates",
        &format!("{} ({} failed)", outcome.n_candidates, outcome.n_failed),
    ));
    line_box(&kv(
        "Replaced",
        &outcome
            .previous
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".to_string()),
    ));
    line_box(&kv("Run", &outcome.run_id));
    line_box_bottom();
    println!("  {}", dim(&outcome.uri.to_string()));
    println!();

    Ok(())
}

pub fn cmd_validate(
    data_path: &Path,
    reference_path: &Path,
    schema_path: Option<&Path>,
) -> anyhow::Result<()> {
    section("Validate");

    let config = PipelineConfig::default();
    let schema = match schema_path {
        Some(p) => Schema::from_json_file(p)?,
        None => Schema::url_features(),
    };
    let data = load_dataset(data_path, &config)?;
    let reference = load_dataset(reference_path, &config)?;

    let validator = DataValidator::new(config.validation.clone(), config.drift.clone())?;
    let (accepted, report) = validator.run(&data, &schema, &reference);

    println!();
    println!("  {:<16} {}", muted("Schema"), report.schema.summary());
    for column in &report.drift.columns {
        let verdict = match &column.outcome {
            DriftOutcome::NoDrift { statistic, .. } => format!("{} D={:.4}", ok("ok"), statistic),
            DriftOutcome::Drift { statistic, p_value, .. } => {
                format!("{} D={:.4} p={:.2e}", bad("drift"), statistic, p_value)
            }
            DriftOutcome::Error { reason } => format!("{} {}", bad("error"), reason),
        };
        println!("  {:<28} {}", muted(&column.column), verdict);
    }
    println!();

    if accepted {
        println!("  {} {}", ok("✓"), "dataset accepted".white());
        println!();
        Ok(())
    } else {
        for reason in &report.rejection_reasons {
            println!("  {} {}", bad("✗"), reason);
        }
        println!();
        anyhow::bail!("dataset rejected")
    }
}

pub fn cmd_predict(
    store_dir: &Path,
    version: &str,
    data_path: &Path,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    section("Predict");

    let selector: VersionSelector = version.parse()?;
    let store = LocalArtifactStore::open(store_dir)?;
    step_run(&format!("Loading bundle {}", selector));
    let deployed = store.deploy(selector)?;
    step_done(&format!("{} ({})", deployed.tag, deployed.bundle.family()));

    let config = PipelineConfig::default();
    let data = load_dataset(data_path, &config)?;

    step_run("Predicting");
    let start = Instant::now();
    let predictions = deployed.predict(&data)?;
    step_done(&format!("{:?}", start.elapsed()));

    let malicious = predictions.iter().filter(|l| **l == Label::Malicious).count();
    println!();
    println!("  {:<16} {}", muted("Rows"), predictions.len().to_string().white());
    println!("  {:<16} {}", muted("Malicious"), malicious.to_string().white().bold());
    if data.labels().is_some() {
        let m = deployed.bundle.score(&data)?;
        println!("  {:<16} {}", muted("F1"), format!("{:.4}", m.f1).white());
    }

    if let Some(path) = output {
        let labelled = data.without_labels().with_labels(predictions)?;
        csv_source(path, &config).write(&labelled)?;
        println!("  {:<16} {}", muted("Output"), path.display().to_string().white());
    }
    println!();
    Ok(())
}

pub fn cmd_versions(store_dir: &Path) -> anyhow::Result<()> {
    section("Versions");

    let store = LocalArtifactStore::open(store_dir)?;
    let latest = store.latest_tag()?;
    let entries = store.entries()?;
    if entries.is_empty() {
        println!("  {}", muted("no versions stored"));
        println!();
        return Ok(());
    }

    for entry in entries.iter().rev() {
        let marker = if Some(entry.tag) == latest { ok("●") } else { dim("○") };
        println!(
            "  {} {:<6} {:<20} {} {}",
            marker,
            entry.tag.to_string().white().bold(),
            entry.family.to_string(),
            format!("F1 {:.4}", entry.f1).white(),
            dim(&entry.stored_at.format("%Y-%m-%d %H:%M:%S").to_string()),
        );
    }
    println!();
    Ok(())
}

pub fn cmd_synth(rows: usize, seed: u64, missing_rate: f64, output: &Path) -> anyhow::Result<()> {
    section("Synth");

    step_run(&format!("Generating {} rows", rows));
    let dataset = url_feature_dataset(rows, seed, missing_rate)?;
    csv_source(output, &PipelineConfig::default()).write(&dataset)?;
    step_done(&output.display().to_string());
    println!();
    Ok(())
}

/// Dispatch a parsed command line
pub fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Train { data, reference, config, store } => {
            cmd_train(&data, &reference, config.as_deref(), store.as_deref())
        }
        Commands::Validate { data, reference, schema } => {
            cmd_validate(&data, &reference, schema.as_deref())
        }
        Commands::Predict { store, version, data, output } => {
            cmd_predict(&store, &version, &data, output.as_deref())
        }
        Commands::Versions { store } => cmd_versions(&store),
        Commands::Synth { rows, seed, missing_rate, output } => {
            cmd_synth(rows, seed, missing_rate, &output)
        }
    }
}
