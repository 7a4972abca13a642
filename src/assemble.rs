//! Record assembly: merge one job's runtime and config field maps into a
//! single typed record, convert units, and compute derived timing metrics.

use std::collections::HashMap;

/// Fields whose name contains this substring hold millisecond timestamps in
/// the source and are expressed in seconds after assembly.
pub const TIME_MARKER: &str = "_TIME";

/// A record value: a finite number, or opaque text.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Num(f64),
    Text(String),
}

impl FieldValue {
    /// Classify raw text: anything that parses as a finite decimal number
    /// becomes numeric, everything else stays text.
    pub fn from_text(raw: String) -> FieldValue {
        match raw.parse::<f64>() {
            Ok(n) if n.is_finite() => FieldValue::Num(n),
            _ => FieldValue::Text(raw),
        }
    }

    pub fn as_num(&self) -> Option<f64> {
        match self {
            FieldValue::Num(n) => Some(*n),
            FieldValue::Text(_) => None,
        }
    }

    /// Render for use as a grouping-key component.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Num(n) => {
                // Integral values print without a trailing `.0` so keys look
                // like the source text they came from.
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
            FieldValue::Text(t) => t.clone(),
        }
    }
}

/// The merged, fully-typed record for one job. Immutable after assembly;
/// discarded after aggregation.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub fields: HashMap<String, FieldValue>,
}

impl JobRecord {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn num(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_num)
    }
}

/// Errors from record assembly. Per-job: relaxed mode counts and skips,
/// strict mode aborts the run.
#[derive(Debug)]
pub enum AssemblyError {
    /// A field required for the derived timing metrics or the time bucket is
    /// missing or non-numeric.
    RequiredField { field: String },
}

impl std::fmt::Display for AssemblyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AssemblyError::RequiredField { field } => {
                write!(f, "required field {field} is missing or non-numeric")
            }
        }
    }
}

impl std::error::Error for AssemblyError {}

/// Time-bucket parameters, threaded from configuration.
#[derive(Debug, Clone)]
pub struct AssembleOptions {
    /// Record field whose value positions the job in time.
    pub bucket_field: String,
    /// Bucket width in seconds.
    pub bucket_interval: u64,
}

impl Default for AssembleOptions {
    fn default() -> Self {
        AssembleOptions {
            bucket_field: "SUBMIT_TIME".to_string(),
            bucket_interval: 60,
        }
    }
}

/// Merge runtime and config fields into one record. Config wins on key
/// collision. Values are typed, millisecond time fields become seconds, and
/// the derived metrics and time bucket are computed.
pub fn assemble_record(
    runtime_fields: HashMap<String, String>,
    config_fields: HashMap<String, String>,
    opts: &AssembleOptions,
) -> Result<JobRecord, AssemblyError> {
    let mut fields: HashMap<String, FieldValue> = HashMap::new();
    for (key, raw) in runtime_fields.into_iter().chain(config_fields) {
        let mut value = FieldValue::from_text(raw);
        if key.contains(TIME_MARKER) {
            if let FieldValue::Num(n) = value {
                value = FieldValue::Num(n / 1000.0);
            }
        }
        fields.insert(key, value);
    }

    let mut record = JobRecord { fields };

    let submit = require_num(&record, "SUBMIT_TIME")?;
    let launch = require_num(&record, "LAUNCH_TIME")?;
    let finish = require_num(&record, "FINISH_TIME")?;
    record
        .fields
        .insert("LAUNCH_LATENCY".to_string(), FieldValue::Num(launch - submit));
    record
        .fields
        .insert("TOTAL_DURATION".to_string(), FieldValue::Num(finish - submit));
    record
        .fields
        .insert("ACTUAL_DURATION".to_string(), FieldValue::Num(finish - launch));

    let anchor = require_num(&record, &opts.bucket_field)?;
    let interval = opts.bucket_interval as f64;
    let bucket = ((anchor / interval).floor() * interval).trunc() as i64;
    record
        .fields
        .insert("TIME_BUCKET".to_string(), FieldValue::Num(bucket as f64));

    Ok(record)
}

fn require_num(record: &JobRecord, field: &str) -> Result<f64, AssemblyError> {
    record.num(field).ok_or_else(|| AssemblyError::RequiredField {
        field: field.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timing_fields(submit_ms: u64, launch_ms: u64, finish_ms: u64) -> HashMap<String, String> {
        HashMap::from([
            ("SUBMIT_TIME".to_string(), submit_ms.to_string()),
            ("LAUNCH_TIME".to_string(), launch_ms.to_string()),
            ("FINISH_TIME".to_string(), finish_ms.to_string()),
        ])
    }

    #[test]
    fn test_derived_metrics() {
        let record =
            assemble_record(timing_fields(10_000, 15_000, 45_000), HashMap::new(), &Default::default())
                .unwrap();
        assert_eq!(record.num("SUBMIT_TIME"), Some(10.0));
        assert_eq!(record.num("LAUNCH_LATENCY"), Some(5.0));
        assert_eq!(record.num("TOTAL_DURATION"), Some(35.0));
        assert_eq!(record.num("ACTUAL_DURATION"), Some(30.0));
    }

    #[test]
    fn test_duration_identity() {
        // ACTUAL_DURATION == TOTAL_DURATION - LAUNCH_LATENCY for any ordered
        // timestamps.
        for (s, l, f) in [(0, 0, 0), (1_000, 2_000, 3_000), (5_000, 5_000, 90_000)] {
            let record =
                assemble_record(timing_fields(s, l, f), HashMap::new(), &Default::default())
                    .unwrap();
            let total = record.num("TOTAL_DURATION").unwrap();
            let latency = record.num("LAUNCH_LATENCY").unwrap();
            let actual = record.num("ACTUAL_DURATION").unwrap();
            assert_eq!(actual, total - latency);
        }
    }

    #[test]
    fn test_time_bucket_floors() {
        // 119s buckets to 60, 120s to 120: floor-then-scale, never rounds up.
        let record =
            assemble_record(timing_fields(119_000, 119_000, 119_000), HashMap::new(), &Default::default())
                .unwrap();
        assert_eq!(record.num("TIME_BUCKET"), Some(60.0));

        let record =
            assemble_record(timing_fields(120_000, 120_000, 120_000), HashMap::new(), &Default::default())
                .unwrap();
        assert_eq!(record.num("TIME_BUCKET"), Some(120.0));
    }

    #[test]
    fn test_config_wins_on_collision() {
        let mut runtime = timing_fields(1_000, 2_000, 3_000);
        runtime.insert("USER".to_string(), "from-runtime".to_string());
        let config = HashMap::from([("USER".to_string(), "from-config".to_string())]);
        let record = assemble_record(runtime, config, &Default::default()).unwrap();
        assert_eq!(
            record.get("USER"),
            Some(&FieldValue::Text("from-config".to_string()))
        );
    }

    #[test]
    fn test_missing_timing_field_fails() {
        let mut fields = timing_fields(1_000, 2_000, 3_000);
        fields.remove("LAUNCH_TIME");
        let err = assemble_record(fields, HashMap::new(), &Default::default()).unwrap_err();
        let AssemblyError::RequiredField { field } = err;
        assert_eq!(field, "LAUNCH_TIME");
    }

    #[test]
    fn test_non_numeric_timing_field_fails() {
        let mut fields = timing_fields(1_000, 2_000, 3_000);
        fields.insert("FINISH_TIME".to_string(), "never".to_string());
        assert!(assemble_record(fields, HashMap::new(), &Default::default()).is_err());
    }

    #[test]
    fn test_custom_bucket_field() {
        let opts = AssembleOptions {
            bucket_field: "FINISH_TIME".to_string(),
            bucket_interval: 300,
        };
        let record =
            assemble_record(timing_fields(0, 0, 650_000), HashMap::new(), &opts).unwrap();
        assert_eq!(record.num("TIME_BUCKET"), Some(600.0));
    }

    #[test]
    fn test_missing_bucket_field_fails() {
        let opts = AssembleOptions {
            bucket_field: "NO_SUCH_FIELD".to_string(),
            bucket_interval: 60,
        };
        assert!(assemble_record(timing_fields(0, 0, 0), HashMap::new(), &opts).is_err());
    }

    #[test]
    fn test_non_time_field_not_scaled() {
        let mut fields = timing_fields(1_000, 2_000, 3_000);
        fields.insert("CPU_MS".to_string(), "4000".to_string());
        let record = assemble_record(fields, HashMap::new(), &Default::default()).unwrap();
        assert_eq!(record.num("CPU_MS"), Some(4000.0));
    }

    #[test]
    fn test_opaque_text_survives() {
        let mut fields = timing_fields(1_000, 2_000, 3_000);
        fields.insert("QUEUE".to_string(), "etl-batch".to_string());
        let record = assemble_record(fields, HashMap::new(), &Default::default()).unwrap();
        assert_eq!(record.num("QUEUE"), None);
        assert_eq!(
            record.get("QUEUE"),
            Some(&FieldValue::Text("etl-batch".to_string()))
        );
    }
}
