mod aggregate;
mod assemble;
mod config;
mod config_doc;
mod corpus;
mod counters;
mod pipeline;
mod runtime_log;
mod sink;

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// A Rust CLI tool that mines a tree of distributed-job history records:
/// pair each job's config document with its runtime log, assemble normalized
/// records, aggregate them by field combinations over fixed time windows,
/// and ship the sums to a metrics sink.
#[derive(Parser, Debug)]
#[command(name = "jobtrawl", version, about)]
pub struct Cli {
    /// History corpus root (overrides config)
    #[arg(value_name = "HISTORY_ROOT")]
    root: Option<PathBuf>,

    /// Config file path
    #[arg(short, long, default_value = "jobtrawl.toml")]
    config: PathBuf,

    /// Projection: comma-separated field names, repeatable
    /// (e.g. -p USER -p USER,QUEUE)
    #[arg(short, long = "projection", value_name = "FIELDS")]
    projections: Vec<String>,

    /// Time-bucket field name (overrides config)
    #[arg(long)]
    bucket_field: Option<String>,

    /// Time-bucket interval in seconds (overrides config)
    #[arg(long)]
    interval: Option<u64>,

    /// Fail on the first per-job error instead of skip-and-count
    #[arg(long)]
    strict: bool,

    /// Extract key/value metadata from job names
    #[arg(long)]
    job_name_metadata: bool,

    /// Metric name prefix (overrides config)
    #[arg(long)]
    prefix: Option<String>,

    /// Sink: console, json, or graphite (overrides config)
    #[arg(short, long)]
    sink: Option<String>,

    /// Validate config and print resolved settings, don't run
    #[arg(long)]
    dry_run: bool,

    /// Extra logging (per-job skips, corpus scan detail)
    #[arg(short, long)]
    verbose: bool,

    /// Only errors and the final summary
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .init();

    let config = match resolve_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!("{e}");
            std::process::exit(1);
        }
    };

    if cli.dry_run {
        print_resolved(&config);
        return;
    }

    let mut sink = match sink::create_sink(&config.sink) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("failed to set up sink: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(root = %config.corpus.root.display(), "jobtrawl starting");
    match pipeline::run(&config, sink.as_mut()) {
        Ok(stats) => {
            println!(
                "Aggregated {} jobs in {:.2}s",
                stats.jobs_aggregated, stats.elapsed_seconds
            );
            println!("Job parsing errors:      {}", stats.job_errors);
            println!("History matching errors: {}", stats.history_errors);
            println!("Job name parsing errors: {}", stats.job_name_errors);
        }
        Err(e) => {
            tracing::error!("run failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Load the config file (when present) and apply CLI overrides on top.
fn resolve_config(cli: &Cli) -> Result<config::AnalyzerConfig, config::ConfigError> {
    let mut cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        tracing::debug!(path = %cli.config.display(), "no config file, using defaults");
        config::AnalyzerConfig::default()
    };

    if let Some(root) = &cli.root {
        cfg.corpus.root = root.clone();
    }
    if !cli.projections.is_empty() {
        cfg.projections = cli
            .projections
            .iter()
            .map(|p| p.split(',').map(|f| f.trim().to_string()).collect())
            .collect();
    }
    if let Some(field) = &cli.bucket_field {
        cfg.bucket.field = field.clone();
    }
    if let Some(interval) = cli.interval {
        cfg.bucket.interval_seconds = interval;
    }
    if cli.strict {
        cfg.corpus.strict = true;
    }
    if cli.job_name_metadata {
        cfg.job_name.extract_metadata = true;
    }
    if let Some(prefix) = &cli.prefix {
        cfg.sink.prefix = prefix.clone();
    }
    if let Some(kind) = &cli.sink {
        cfg.sink.kind = kind.clone();
    }

    cfg.validate()?;
    Ok(cfg)
}

fn print_resolved(config: &config::AnalyzerConfig) {
    println!("jobtrawl v{}", env!("CARGO_PKG_VERSION"));
    println!("History root:    {}", config.corpus.root.display());
    println!("Config suffix:   {}", config.corpus.config_suffix);
    println!(
        "Mode:            {}",
        if config.corpus.strict { "strict" } else { "relaxed" }
    );
    println!(
        "Bucketing:       {} / {}s",
        config.bucket.field, config.bucket.interval_seconds
    );
    println!(
        "Job name:        extract={} separator={:?} max_len={}",
        config.job_name.extract_metadata,
        config.job_name.separator,
        config.job_name.max_value_len
    );
    println!("Sink:            {} (prefix {:?})", config.sink.kind, config.sink.prefix);
    for projection in &config.projections {
        println!("Projection:      {}", projection.join(","));
    }
    println!("Dry run mode — config validated, not running.");
}
