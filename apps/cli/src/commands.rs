//! CLI command definitions, routing, and tracing setup.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use graphqa_analyzer::analyze_record;
use graphqa_core::{GraphConversionService, JobSnapshot, JobStatus, ServiceConfig};
use graphqa_shared::fs::write_json_atomic;
use graphqa_shared::{AppConfig, ConversionConfig, GraphRecord, init_config, load_config};
use graphqa_splitter::{
    ChunkInfo, MassiveFileSplitter, SplitManifest, SplitOptions, SplitProgress, merge_chunks,
    validate_chunk_integrity, verify_split,
};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(200);

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// graphqa: turn graph datasets into question-answer corpora.
#[derive(Parser)]
#[command(
    name = "graphqa",
    version,
    about = "Convert large line-delimited JSON graph datasets into QA corpora.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Convert a graph dataset into a QA dataset.
    Convert {
        /// Line-delimited JSON graph file.
        file: PathBuf,

        /// Output dataset path (defaults to <file stem>.qa.json next to the input).
        #[arg(short, long)]
        out: Option<PathBuf>,

        #[command(flatten)]
        overrides: ConversionOverrides,

        /// Work directory for chunks and checkpoints.
        #[arg(long, env = "GRAPHQA_WORK_DIR")]
        work_dir: Option<PathBuf>,
    },

    /// Split a file into record-aligned chunks plus a manifest.
    Split {
        /// Line-delimited JSON file to split.
        file: PathBuf,

        /// Directory receiving the chunks and manifest.json.
        #[arg(long)]
        out_dir: PathBuf,

        /// Target chunk size in bytes.
        #[arg(long)]
        chunk_size: Option<u64>,

        /// Keep lines that are not valid JSON.
        #[arg(long)]
        no_integrity: bool,
    },

    /// Check every chunk of a split against its manifest.
    Verify {
        /// Path to manifest.json.
        manifest: PathBuf,
    },

    /// Concatenate a split's chunks back into one file.
    Merge {
        /// Path to manifest.json.
        manifest: PathBuf,

        /// Output file.
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Print the graph analysis of each record as JSON lines.
    Analyze {
        /// Line-delimited JSON graph file.
        file: PathBuf,

        /// Stop after this many records.
        #[arg(long)]
        limit: Option<usize>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Per-run overrides of the `[conversion]` config section.
#[derive(clap::Args, Debug, Default)]
pub(crate) struct ConversionOverrides {
    /// Target chunk size in bytes.
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Memory ceiling in bytes.
    #[arg(long)]
    pub max_memory: Option<u64>,

    /// Records converted between memory checks.
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Keep lines that are not valid JSON when splitting.
    #[arg(long)]
    pub no_integrity: bool,

    /// Disable checkpoints (no resume after interruption).
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Keep chunk files and converted outputs after success.
    #[arg(long)]
    pub keep_chunks: bool,
}

impl ConversionOverrides {
    fn apply(&self, mut config: ConversionConfig) -> ConversionConfig {
        if let Some(size) = self.chunk_size {
            config.target_chunk_size_bytes = size;
        }
        if let Some(max) = self.max_memory {
            config.max_memory_usage_bytes = max;
        }
        if let Some(batch) = self.batch_size {
            config.batch_size = batch;
        }
        if self.no_integrity {
            config.preserve_graph_integrity = false;
        }
        if self.no_checkpoint {
            config.enable_checkpointing = false;
        }
        if self.keep_chunks {
            config.keep_chunks = true;
        }
        config
    }
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "graphqa=info",
        1 => "graphqa=debug",
        _ => "graphqa=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Convert {
            file,
            out,
            overrides,
            work_dir,
        } => cmd_convert(&file, out, &overrides, work_dir).await,
        Command::Split {
            file,
            out_dir,
            chunk_size,
            no_integrity,
        } => cmd_split(&file, &out_dir, chunk_size, no_integrity),
        Command::Verify { manifest } => cmd_verify(&manifest),
        Command::Merge { manifest, out } => cmd_merge(&manifest, &out),
        Command::Analyze { file, limit } => cmd_analyze(&file, limit),
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        },
    }
}

// ---------------------------------------------------------------------------
// convert
// ---------------------------------------------------------------------------

async fn cmd_convert(
    file: &Path,
    out: Option<PathBuf>,
    overrides: &ConversionOverrides,
    work_dir: Option<PathBuf>,
) -> Result<()> {
    let app = load_config()?;
    let config = overrides.apply(ConversionConfig::from(&app));
    config.validate()?;

    let mut service_config = ServiceConfig::from_app(&app)?;
    if let Some(dir) = work_dir {
        service_config.work_dir = dir;
    }
    let out = out.unwrap_or_else(|| default_output_path(file));

    info!(
        file = %file.display(),
        chunk_size = config.target_chunk_size_bytes,
        checkpointing = config.enable_checkpointing,
        "converting dataset"
    );

    let service = GraphConversionService::new(service_config)?;
    let id = service.convert(file, config)?;
    let bar = progress_bar();

    let snapshot = loop {
        let snap = service.status(id)?;
        bar.set_position((snap.progress * 100.0).round() as u64);
        bar.set_message(status_message(&snap));
        if snap.status.is_terminal() {
            break snap;
        }

        tokio::select! {
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
            _ = tokio::signal::ctrl_c() => {
                warn!("interrupt received, cancelling at the next chunk boundary");
                service.cancel(id);
            }
        }
    };
    bar.finish_and_clear();

    let outcome = match snapshot.status {
        JobStatus::Completed => {
            let dataset = service.result(id)?;
            write_json_atomic(&out, &dataset)?;
            let stats = &dataset.statistics;

            println!();
            println!("  Dataset written successfully!");
            println!("  Job:      {id}");
            println!("  Entries:  {}", stats.total_entries);
            println!("  Skipped:  {}", stats.skipped_records);
            println!("  Invalid:  {}", stats.invalid_lines);
            println!("  Chunks:   {}", snapshot.chunks_total);
            if let Some(chunk) = snapshot.resumed_from_chunk {
                println!("  Resumed:  from chunk {chunk}");
            }
            println!("  Output:   {}", out.display());
            println!();
            Ok(())
        }
        JobStatus::Cancelled => Err(eyre!(
            "conversion cancelled after {} of {} chunks; rerun to resume",
            snapshot.chunks_done,
            snapshot.chunks_total
        )),
        _ => Err(eyre!(
            "conversion failed: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        )),
    };

    service.shutdown().await;
    outcome
}

fn default_output_path(file: &Path) -> PathBuf {
    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "dataset".into());
    file.with_file_name(format!("{stem}.qa.json"))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(100);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

fn status_message(snap: &JobSnapshot) -> String {
    match snap.status {
        JobStatus::Converting => format!(
            "converting [{}/{}] {} records",
            snap.chunks_done, snap.chunks_total, snap.records_seen
        ),
        status => status.to_string(),
    }
}

// ---------------------------------------------------------------------------
// split / verify / merge
// ---------------------------------------------------------------------------

/// Spinner-backed split progress.
struct CliSplitProgress {
    spinner: ProgressBar,
}

impl CliSplitProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl SplitProgress for CliSplitProgress {
    fn chunk_written(&self, chunk: &ChunkInfo) {
        self.spinner.set_message(format!(
            "wrote {} ({} records)",
            chunk.filename, chunk.record_count
        ));
    }

    fn lines_scanned(&self, lines: u64, bytes_read: u64, total_bytes: u64) {
        let pct = if total_bytes == 0 {
            100.0
        } else {
            bytes_read as f64 * 100.0 / total_bytes as f64
        };
        self.spinner
            .set_message(format!("scanned {lines} lines ({pct:.0}%)"));
    }
}

fn cmd_split(file: &Path, out_dir: &Path, chunk_size: Option<u64>, no_integrity: bool) -> Result<()> {
    let app = load_config()?;
    let target = chunk_size.unwrap_or(app.conversion.target_chunk_size_bytes);

    let mut options = SplitOptions::new(out_dir, target);
    options.preserve_integrity = !no_integrity;

    let progress = CliSplitProgress::new();
    let result = MassiveFileSplitter::new(options)?.split(file, &progress)?;
    progress.spinner.finish_and_clear();

    let mut unclean = 0;
    for chunk in &result.chunks {
        let report = validate_chunk_integrity(&SplitManifest::chunk_path(out_dir, chunk))?;
        if !report.is_clean() {
            unclean += 1;
            warn!(
                chunk = %chunk.filename,
                malformed = report.malformed_lines.len(),
                shape_violations = report.shape_violations.len(),
                "chunk contains non-graph records"
            );
        }
    }

    println!();
    println!("  Split complete!");
    println!("  Chunks:    {}", result.total_chunks);
    println!("  Records:   {}", result.total_objects);
    println!("  Invalid:   {}", result.metadata.invalid_records);
    println!("  Strategy:  {:?}", result.metadata.strategy);
    println!("  Unclean:   {unclean}");
    println!("  Manifest:  {}", result.metadata.manifest_path.display());
    println!("  Time:      {:.1}s", result.metadata.elapsed.as_secs_f64());
    println!();
    Ok(())
}

fn cmd_verify(manifest: &Path) -> Result<()> {
    let report = verify_split(manifest)?;

    println!("  Chunks checked: {}", report.chunks_checked);
    println!(
        "  Records:        {} (manifest total {})",
        report.record_count_sum, report.total_objects
    );
    for name in &report.missing {
        println!("  missing:   {name}");
    }
    for name in &report.corrupted {
        println!("  corrupted: {name}");
    }

    if report.is_ok() {
        println!("  OK");
        Ok(())
    } else {
        Err(eyre!(
            "split verification failed ({} missing, {} corrupted, complete = {})",
            report.missing.len(),
            report.corrupted.len(),
            report.complete
        ))
    }
}

fn cmd_merge(manifest: &Path, out: &Path) -> Result<()> {
    let summary = merge_chunks(manifest, out)?;
    println!(
        "  Merged {} chunks ({} records, {} bytes) into {}",
        summary.chunks,
        summary.records,
        summary.bytes_written,
        out.display()
    );
    Ok(())
}

// ---------------------------------------------------------------------------
// analyze
// ---------------------------------------------------------------------------

fn cmd_analyze(file: &Path, limit: Option<usize>) -> Result<()> {
    let reader = BufReader::new(
        File::open(file).map_err(|e| eyre!("cannot open '{}': {e}", file.display()))?,
    );
    let limit = limit.unwrap_or(usize::MAX);
    let mut analyzed = 0;

    for (idx, line) in reader.lines().enumerate() {
        if analyzed >= limit {
            break;
        }
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: GraphRecord = match serde_json::from_str(&line) {
            Ok(r) => r,
            Err(e) => {
                warn!(line = idx + 1, error = %e, "skipping non-graph line");
                continue;
            }
        };

        let analysis = analyze_record(&record);
        let row = serde_json::json!({ "id": record.id, "analysis": analysis });
        println!("{}", serde_json::to_string(&row)?);
        analyzed += 1;
    }

    info!(analyzed, "analysis complete");
    Ok(())
}

// ---------------------------------------------------------------------------
// config
// ---------------------------------------------------------------------------

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn convert_flags_override_config() {
        let cli = Cli::try_parse_from([
            "graphqa",
            "convert",
            "in.jsonl",
            "--chunk-size",
            "4096",
            "--batch-size",
            "10",
            "--no-checkpoint",
            "--keep-chunks",
        ])
        .unwrap();

        let Command::Convert { overrides, out, .. } = cli.command else {
            panic!("expected convert");
        };
        assert!(out.is_none());

        let config = overrides.apply(ConversionConfig::default());
        assert_eq!(config.target_chunk_size_bytes, 4096);
        assert_eq!(config.batch_size, 10);
        assert!(!config.enable_checkpointing);
        assert!(config.preserve_graph_integrity);
        assert!(config.keep_chunks);
    }

    #[test]
    fn default_output_sits_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/data/graphs.jsonl")),
            PathBuf::from("/data/graphs.qa.json")
        );
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from(["graphqa", "verify", "m.json", "-vv", "--log-format", "json"])
            .unwrap();
        assert_eq!(cli.verbose, 2);
        assert!(matches!(cli.log_format, LogFormat::Json));
    }
}
