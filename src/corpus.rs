//! History-corpus discovery: walk the on-disk tree, split files into config
//! documents and runtime-log candidates, and pair them by job id.
//!
//! Pairing is O(config × runtime) in file counts. The corpus is bounded by
//! retention policy and this is not a hot path, so no index is built.

use crate::config_doc::{parse_config_filename, ConfigDocError};
use std::fs;
use std::path::{Path, PathBuf};

/// Checksum sidecar files are never runtime-log candidates.
const CHECKSUM_SUFFIX: &str = ".crc";

/// Errors from corpus discovery and matching.
#[derive(Debug)]
pub enum CorpusError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    /// A config filename the layout parser cannot navigate. Always fatal.
    FilenameFormat(ConfigDocError),
    /// No runtime file matched a config file's job id. Fatal in strict mode.
    MissingMatch { config: PathBuf, job_id: String },
}

impl std::fmt::Display for CorpusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorpusError::Io { path, source } => {
                write!(f, "failed to read {}: {source}", path.display())
            }
            CorpusError::FilenameFormat(e) => write!(f, "{e}"),
            CorpusError::MissingMatch { config, job_id } => {
                write!(
                    f,
                    "no runtime file matches job id {job_id} (config file {})",
                    config.display()
                )
            }
        }
    }
}

impl std::error::Error for CorpusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CorpusError::Io { source, .. } => Some(source),
            CorpusError::FilenameFormat(e) => Some(e),
            CorpusError::MissingMatch { .. } => None,
        }
    }
}

impl From<ConfigDocError> for CorpusError {
    fn from(e: ConfigDocError) -> Self {
        CorpusError::FilenameFormat(e)
    }
}

#[derive(Debug, Clone)]
pub struct CorpusOptions {
    /// Filenames ending in this suffix are config documents.
    pub config_suffix: String,
    /// Fail the run on the first unmatched config file instead of skipping.
    pub strict: bool,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        CorpusOptions {
            config_suffix: "_conf.xml".to_string(),
            strict: false,
        }
    }
}

/// One matched (config, runtime) pair, ready for parsing and assembly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchedPair {
    pub job_id: String,
    pub config_path: PathBuf,
    pub runtime_path: PathBuf,
}

/// Result of a corpus scan: the matched pairs plus the count of config files
/// that had no runtime match (relaxed mode only; strict mode fails instead).
#[derive(Debug, Default)]
pub struct CorpusScan {
    pub pairs: Vec<MatchedPair>,
    pub missing_matches: u64,
}

/// Walk the history root and pair every config file with a runtime file whose
/// name contains its job id. Candidates are sorted by filename so selection
/// among multiple matches is deterministic (lexicographically first).
pub fn scan_corpus(root: &Path, opts: &CorpusOptions) -> Result<CorpusScan, CorpusError> {
    let mut files = Vec::new();
    collect_files(root, &mut files)?;

    let mut config_files = Vec::new();
    let mut runtime_files = Vec::new();
    for path in files {
        let name = match path.file_name() {
            Some(n) => n.to_string_lossy().into_owned(),
            None => continue,
        };
        if name.ends_with(&opts.config_suffix) {
            config_files.push((path, name));
        } else if !name.ends_with(CHECKSUM_SUFFIX) {
            runtime_files.push((path, name));
        }
    }
    config_files.sort_by(|a, b| a.1.cmp(&b.1));
    runtime_files.sort_by(|a, b| a.1.cmp(&b.1));
    tracing::debug!(
        config_files = config_files.len(),
        runtime_candidates = runtime_files.len(),
        "corpus scan complete"
    );

    let mut scan = CorpusScan::default();
    for (config_path, config_name) in config_files {
        let identity = parse_config_filename(&config_name)?;
        let matched = runtime_files
            .iter()
            .find(|(_, name)| name.contains(&identity.job_id));
        match matched {
            Some((runtime_path, _)) => scan.pairs.push(MatchedPair {
                job_id: identity.job_id,
                config_path,
                runtime_path: runtime_path.clone(),
            }),
            None if opts.strict => {
                return Err(CorpusError::MissingMatch {
                    config: config_path,
                    job_id: identity.job_id,
                });
            }
            None => {
                tracing::warn!(
                    job_id = %identity.job_id,
                    config = %config_path.display(),
                    "no runtime file for config file, skipping job"
                );
                scan.missing_matches += 1;
            }
        }
    }
    Ok(scan)
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), CorpusError> {
    let entries = fs::read_dir(dir).map_err(|e| CorpusError::Io {
        path: dir.to_path_buf(),
        source: e,
    })?;
    for entry in entries {
        let entry = entry.map_err(|e| CorpusError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let path = entry.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}
