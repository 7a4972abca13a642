//! Group-by aggregation: fold a stream of job records into summed metrics
//! keyed by (time-bucket, grouping-key), then flatten each bucket into
//! (metric-name, value, time-bucket) triples for the sink.
//!
//! The only reduction is addition, so ingestion order never changes the final
//! sums and a parallel ingest only has to serialize bucket updates.

use crate::assemble::{FieldValue, JobRecord, TIME_MARKER};
use std::collections::BTreeMap;

/// Key component for a grouping field absent from a record.
pub const VALUE_UNKNOWN: &str = "value-unknown";
/// Metric-name segment for a blank value.
pub const EMPTY_VALUE: &str = "empty-value";

/// An ordered list of field names defining one aggregation dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupingSpec {
    pub fields: Vec<String>,
}

impl GroupingSpec {
    pub fn new(fields: Vec<String>) -> Self {
        GroupingSpec { fields }
    }

    /// Human-readable label, used in logs and by sinks.
    pub fn label(&self) -> String {
        self.fields.join(",")
    }
}

/// Errors raised while projecting a record onto a grouping spec. Relaxed mode
/// skips the record for that projection; strict mode fails the run.
#[derive(Debug)]
pub enum ProjectionError {
    /// TIME_BUCKET is missing or non-numeric on the record.
    TimeBucket { spec: String },
}

impl std::fmt::Display for ProjectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProjectionError::TimeBucket { spec } => {
                write!(f, "record has no numeric TIME_BUCKET (projection {spec})")
            }
        }
    }
}

impl std::error::Error for ProjectionError {}

/// One flattened metric, ready to emit.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTriple {
    pub name: String,
    pub value: f64,
    pub time_bucket: i64,
}

/// Running sums for one grouping spec. Buckets are created lazily on the
/// first record that maps to them, grow monotonically, and are never merged
/// across (time-bucket, key) identities. BTreeMaps keep flatten output
/// deterministic.
#[derive(Debug)]
pub struct Aggregation {
    spec: GroupingSpec,
    buckets: BTreeMap<(i64, Vec<String>), BTreeMap<String, f64>>,
}

impl Aggregation {
    pub fn new(spec: GroupingSpec) -> Self {
        Aggregation {
            spec,
            buckets: BTreeMap::new(),
        }
    }

    pub fn spec(&self) -> &GroupingSpec {
        &self.spec
    }

    /// Fold one record into its bucket. The grouping key substitutes
    /// `value-unknown` for absent fields — absence is not an error.
    pub fn ingest(&mut self, record: &JobRecord) -> Result<(), ProjectionError> {
        let key: Vec<String> = self
            .spec
            .fields
            .iter()
            .map(|f| {
                record
                    .get(f)
                    .map(FieldValue::render)
                    .unwrap_or_else(|| VALUE_UNKNOWN.to_string())
            })
            .collect();

        let time_bucket = record
            .num("TIME_BUCKET")
            .ok_or_else(|| ProjectionError::TimeBucket {
                spec: self.spec.label(),
            })? as i64;

        let sums = self.buckets.entry((time_bucket, key)).or_default();
        for (name, value) in &record.fields {
            // Timestamps and the bucket itself are positions in time, not
            // summable quantities; text fields have nothing to sum.
            if name.contains(TIME_MARKER) || name == "TIME_BUCKET" {
                continue;
            }
            if let FieldValue::Num(n) = value {
                *sums.entry(name.clone()).or_insert(0.0) += n;
            }
        }
        Ok(())
    }

    /// Flatten every bucket into metric triples:
    /// `<prefix><specFields>.<keyValues>.<metricName>.value`, each segment
    /// normalized for the sink's name syntax.
    pub fn flatten(&self, prefix: &str) -> Vec<MetricTriple> {
        let spec_part: Vec<String> = self.spec.fields.iter().map(|f| normalize(f)).collect();
        let spec_part = spec_part.join(".");

        let mut out = Vec::new();
        for ((time_bucket, key), sums) in &self.buckets {
            let key_part: Vec<String> = key.iter().map(|v| normalize(v)).collect();
            let key_part = key_part.join(".");
            for (metric, value) in sums {
                out.push(MetricTriple {
                    name: format!("{prefix}{spec_part}.{key_part}.{}.value", normalize(metric)),
                    value: *value,
                    time_bucket: *time_bucket,
                });
            }
        }
        out
    }
}

/// Trim whitespace, map blank to `empty-value`, and replace the characters
/// that collide with the sink's name-delimiter syntax.
fn normalize(segment: &str) -> String {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return EMPTY_VALUE.to_string();
    }
    trimmed.replace(['$', ','], "_")
}
