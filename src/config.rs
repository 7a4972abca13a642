use crate::aggregate::GroupingSpec;
use crate::assemble::AssembleOptions;
use crate::corpus::CorpusOptions;
use crate::runtime_log::RuntimeParseOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration loaded from jobtrawl.toml. CLI flags override
/// individual fields after loading.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub corpus: CorpusSection,
    pub bucket: BucketSection,
    pub job_name: JobNameSection,
    pub sink: SinkConfig,
    /// Aggregation dimensions: each entry is an ordered list of field names.
    pub projections: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CorpusSection {
    /// Root of the job-history tree.
    pub root: PathBuf,
    /// Filenames ending in this suffix are config documents.
    pub config_suffix: String,
    /// Fail fast on per-job errors instead of skip-and-count.
    pub strict: bool,
}

impl Default for CorpusSection {
    fn default() -> Self {
        CorpusSection {
            root: PathBuf::from("."),
            config_suffix: "_conf.xml".to_string(),
            strict: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct BucketSection {
    /// Record field whose value positions a job in time.
    pub field: String,
    /// Bucket width in seconds.
    pub interval_seconds: u64,
}

impl Default for BucketSection {
    fn default() -> Self {
        BucketSection {
            field: "SUBMIT_TIME".to_string(),
            interval_seconds: 60,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct JobNameSection {
    /// Extract key/value metadata embedded in job names.
    pub extract_metadata: bool,
    /// Separator between metadata pairs inside a job name.
    pub separator: String,
    /// Extracted values longer than this become the literal `toolong`.
    pub max_value_len: usize,
}

impl Default for JobNameSection {
    fn default() -> Self {
        JobNameSection {
            extract_metadata: false,
            separator: "||".to_string(),
            max_value_len: 64,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Sink selection: console, json, or graphite.
    pub kind: String,
    /// Prefix prepended to every emitted metric name.
    pub prefix: String,
    pub graphite_host: String,
    pub graphite_port: u16,
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig {
            kind: "console".to_string(),
            prefix: "jobs.".to_string(),
            graphite_host: "127.0.0.1".to_string(),
            graphite_port: 2003,
        }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        message: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config file {}: {source}", path.display())
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config file {}: {source}", path.display())
            }
            ConfigError::Invalid { message } => write!(f, "invalid configuration: {message}"),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<AnalyzerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
        path: path.to_path_buf(),
        source: e,
    })?;
    toml::from_str(&text).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        source: e,
    })
}

impl AnalyzerConfig {
    /// Check cross-field constraints after CLI overrides are applied.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.projections.is_empty() {
            return Err(ConfigError::Invalid {
                message: "at least one projection is required".to_string(),
            });
        }
        if self.projections.iter().any(|p| p.is_empty()) {
            return Err(ConfigError::Invalid {
                message: "projections must name at least one field".to_string(),
            });
        }
        if self.bucket.interval_seconds == 0 {
            return Err(ConfigError::Invalid {
                message: "bucket interval must be at least 1 second".to_string(),
            });
        }
        if self.job_name.extract_metadata && self.job_name.separator.is_empty() {
            return Err(ConfigError::Invalid {
                message: "job-name separator must be non-empty when extraction is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }

    pub fn runtime_parse_options(&self) -> RuntimeParseOptions {
        RuntimeParseOptions {
            extract_name_metadata: self.job_name.extract_metadata,
            name_separator: self.job_name.separator.clone(),
            max_value_len: self.job_name.max_value_len,
        }
    }

    pub fn assemble_options(&self) -> AssembleOptions {
        AssembleOptions {
            bucket_field: self.bucket.field.clone(),
            bucket_interval: self.bucket.interval_seconds,
        }
    }

    pub fn corpus_options(&self) -> CorpusOptions {
        CorpusOptions {
            config_suffix: self.corpus.config_suffix.clone(),
            strict: self.corpus.strict,
        }
    }

    pub fn grouping_specs(&self) -> Vec<GroupingSpec> {
        self.projections
            .iter()
            .map(|fields| GroupingSpec::new(fields.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.bucket.field, "SUBMIT_TIME");
        assert_eq!(config.bucket.interval_seconds, 60);
        assert_eq!(config.corpus.config_suffix, "_conf.xml");
        assert_eq!(config.sink.kind, "console");
        assert!(!config.corpus.strict);
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            projections = [["USER"], ["USER", "QUEUE"]]

            [corpus]
            root = "/data/history"
            strict = true

            [bucket]
            field = "FINISH_TIME"
            interval_seconds = 300

            [job_name]
            extract_metadata = true
            separator = "||"
            max_value_len = 32

            [sink]
            kind = "graphite"
            prefix = "prod.jobs."
            graphite_host = "metrics.internal"
        "#;
        let config: AnalyzerConfig = toml::from_str(text).unwrap();
        assert_eq!(config.projections.len(), 2);
        assert_eq!(config.corpus.root, PathBuf::from("/data/history"));
        assert!(config.corpus.strict);
        assert_eq!(config.bucket.field, "FINISH_TIME");
        assert_eq!(config.bucket.interval_seconds, 300);
        assert!(config.job_name.extract_metadata);
        assert_eq!(config.sink.kind, "graphite");
        assert_eq!(config.sink.graphite_port, 2003);
        config.validate().unwrap();
    }

    #[test]
    fn test_validate_requires_projections() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = AnalyzerConfig {
            projections: vec![vec!["USER".to_string()]],
            ..Default::default()
        };
        config.bucket.interval_seconds = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_separator() {
        let mut config = AnalyzerConfig {
            projections: vec![vec!["USER".to_string()]],
            ..Default::default()
        };
        config.job_name.extract_metadata = true;
        config.job_name.separator = String::new();
        assert!(config.validate().is_err());
    }
}
