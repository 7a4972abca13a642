//! End-to-end run orchestration: scan the corpus, parse and assemble every
//! matched job, feed each record to every projection, then flatten and emit.
//!
//! Error policy is threaded through the relaxed/strict mode: per-job failures
//! are counted and skipped in relaxed mode and abort the run in strict mode.
//! Filename-format and I/O-during-walk errors are always fatal, as is a sink
//! transport failure.

use crate::aggregate::{Aggregation, ProjectionError};
use crate::assemble::{assemble_record, AssemblyError};
use crate::config::AnalyzerConfig;
use crate::config_doc::parse_config_doc;
use crate::corpus::{scan_corpus, CorpusError};
use crate::runtime_log::parse_runtime_log;
use crate::sink::MetricsEmitter;
use std::path::PathBuf;
use std::time::Instant;

/// Counters reported at the end of a run, both on stdout and as run-level
/// metrics through the sink.
#[derive(Debug, Default)]
pub struct RunStats {
    pub jobs_aggregated: u64,
    /// Per-job assembly/parse failures skipped in relaxed mode.
    pub job_errors: u64,
    /// Config files with no matching runtime file.
    pub history_errors: u64,
    /// Jobs whose name metadata could not be extracted (never fatal).
    pub job_name_errors: u64,
    pub elapsed_seconds: f64,
}

#[derive(Debug)]
pub enum PipelineError {
    Corpus(CorpusError),
    /// Reading a matched job file failed. Per-job in relaxed mode.
    JobIo {
        path: PathBuf,
        source: std::io::Error,
    },
    /// Record assembly failed in strict mode.
    Assembly {
        job_id: String,
        source: AssemblyError,
    },
    /// A projection rejected a record in strict mode.
    Projection(ProjectionError),
    /// The sink failed; always fatal, delivery is already best-effort.
    Sink(std::io::Error),
}

impl std::fmt::Display for PipelineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineError::Corpus(e) => write!(f, "{e}"),
            PipelineError::JobIo { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            PipelineError::Assembly { job_id, source } => {
                write!(f, "failed to assemble job {job_id}: {source}")
            }
            PipelineError::Projection(e) => write!(f, "{e}"),
            PipelineError::Sink(e) => write!(f, "sink error: {e}"),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Corpus(e) => Some(e),
            PipelineError::JobIo { source, .. } => Some(source),
            PipelineError::Assembly { source, .. } => Some(source),
            PipelineError::Projection(e) => Some(e),
            PipelineError::Sink(e) => Some(e),
        }
    }
}

impl From<CorpusError> for PipelineError {
    fn from(e: CorpusError) -> Self {
        PipelineError::Corpus(e)
    }
}

/// Run the whole batch: discovery, per-job assembly, aggregation, emission.
pub fn run(
    config: &AnalyzerConfig,
    sink: &mut dyn MetricsEmitter,
) -> Result<RunStats, PipelineError> {
    let start = Instant::now();
    let strict = config.corpus.strict;
    let runtime_opts = config.runtime_parse_options();
    let assemble_opts = config.assemble_options();

    let scan = scan_corpus(&config.corpus.root, &config.corpus_options())?;
    let mut stats = RunStats {
        history_errors: scan.missing_matches,
        ..Default::default()
    };
    tracing::info!(pairs = scan.pairs.len(), "matched job pairs");

    let mut aggregations: Vec<Aggregation> = config
        .grouping_specs()
        .into_iter()
        .map(Aggregation::new)
        .collect();

    for pair in &scan.pairs {
        let runtime_text = match read_job_file(&pair.runtime_path, strict, &mut stats)? {
            Some(t) => t,
            None => continue,
        };
        let config_text = match read_job_file(&pair.config_path, strict, &mut stats)? {
            Some(t) => t,
            None => continue,
        };

        let runtime = parse_runtime_log(&runtime_text, &runtime_opts);
        if runtime.name_parse_failed {
            stats.job_name_errors += 1;
        }

        let config_name = pair
            .config_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let config_fields =
            parse_config_doc(&config_name, &config_text).map_err(CorpusError::from)?;

        let record = match assemble_record(runtime.fields, config_fields, &assemble_opts) {
            Ok(r) => r,
            Err(e) if strict => {
                return Err(PipelineError::Assembly {
                    job_id: pair.job_id.clone(),
                    source: e,
                });
            }
            Err(e) => {
                tracing::warn!(job_id = %pair.job_id, error = %e, "skipping job");
                stats.job_errors += 1;
                continue;
            }
        };

        for agg in &mut aggregations {
            match agg.ingest(&record) {
                Ok(()) => {}
                Err(e) if strict => return Err(PipelineError::Projection(e)),
                Err(e) => {
                    tracing::warn!(job_id = %pair.job_id, error = %e, "skipping record for projection");
                    stats.job_errors += 1;
                }
            }
        }
        stats.jobs_aggregated += 1;
    }

    let prefix = &config.sink.prefix;
    for agg in &aggregations {
        sink.begin_projection(agg.spec()).map_err(PipelineError::Sink)?;
        for triple in agg.flatten(prefix) {
            sink.emit_projection(agg.spec(), &triple.name, triple.value, triple.time_bucket)
                .map_err(PipelineError::Sink)?;
        }
        sink.end_projection(agg.spec()).map_err(PipelineError::Sink)?;
    }

    stats.elapsed_seconds = start.elapsed().as_secs_f64();
    let now = chrono::Utc::now().timestamp();
    sink.emit(&format!("{prefix}stats.elapsed_seconds"), stats.elapsed_seconds, now)
        .map_err(PipelineError::Sink)?;
    sink.emit(&format!("{prefix}stats.job_errors"), stats.job_errors as f64, now)
        .map_err(PipelineError::Sink)?;
    sink.emit(&format!("{prefix}stats.history_errors"), stats.history_errors as f64, now)
        .map_err(PipelineError::Sink)?;
    sink.emit(
        &format!("{prefix}stats.job_name_errors"),
        stats.job_name_errors as f64,
        now,
    )
    .map_err(PipelineError::Sink)?;
    sink.finalize().map_err(PipelineError::Sink)?;

    Ok(stats)
}

/// Read one matched job file. Relaxed mode treats a read failure as a per-job
/// error: counted, logged, and the job skipped.
fn read_job_file(
    path: &std::path::Path,
    strict: bool,
    stats: &mut RunStats,
) -> Result<Option<String>, PipelineError> {
    match std::fs::read_to_string(path) {
        Ok(t) => Ok(Some(t)),
        Err(e) if strict => Err(PipelineError::JobIo {
            path: path.to_path_buf(),
            source: e,
        }),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read job file, skipping job");
            stats.job_errors += 1;
            Ok(None)
        }
    }
}
