//! Config-document decoding: one job's configuration file (and its filename)
//! into a flat field map.
//!
//! The filename encodes the job identity; the document body is an XML-style
//! property list. Both are recovered with lazy regex scans rather than a full
//! XML parser — the documents are machine-written and regular.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Property key holding the host the job was submitted from.
const SUBMIT_HOST_KEY: &str = "mapreduce.job.submithostname";
/// Sentinel when the submission host property is absent.
const UNKNOWN_HOST: &str = "unknown-host";

static PROPERTY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<property>.*?<name>(.*?)</name>.*?<value>(.*?)</value>.*?</property>")
        .unwrap()
});

/// Errors from config-document decoding.
#[derive(Debug)]
pub enum ConfigDocError {
    /// The filename does not split into the six expected segments. Always
    /// fatal: it means the corpus layout is not one we can navigate.
    FilenameFormat { filename: String, parts: usize },
}

impl std::fmt::Display for ConfigDocError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigDocError::FilenameFormat { filename, parts } => {
                write!(
                    f,
                    "config filename {filename:?} has {parts} underscore-separated parts, expected 6"
                )
            }
        }
    }
}

impl std::error::Error for ConfigDocError {}

/// Identity fields recovered from a config filename of the form
/// `<tracker>_<trackerStartTs>_<ignored>_<jobTs>_<jobNumber>_<ignored>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobIdentity {
    /// `job_<jobTs>_<jobNumber>`, the id runtime filenames are matched against.
    pub job_id: String,
    pub tracker_start_time: String,
    pub job_number: String,
}

/// Split a config filename into its six segments and derive the job identity.
pub fn parse_config_filename(filename: &str) -> Result<JobIdentity, ConfigDocError> {
    let parts: Vec<&str> = filename.split('_').collect();
    if parts.len() != 6 {
        return Err(ConfigDocError::FilenameFormat {
            filename: filename.to_string(),
            parts: parts.len(),
        });
    }
    Ok(JobIdentity {
        job_id: format!("job_{}_{}", parts[3], parts[4]),
        tracker_start_time: parts[1].to_string(),
        job_number: parts[4].to_string(),
    })
}

/// Parse a config document into a flat field map: every property from the
/// body, plus the fields derived from the filename and the submission host.
pub fn parse_config_doc(
    filename: &str,
    body: &str,
) -> Result<HashMap<String, String>, ConfigDocError> {
    let identity = parse_config_filename(filename)?;

    let mut fields: HashMap<String, String> = PROPERTY_RE
        .captures_iter(body)
        .map(|c| (c[1].to_string(), c[2].to_string()))
        .collect();

    let submit_host = fields
        .get(SUBMIT_HOST_KEY)
        .map(|h| h.replace('.', "_"))
        .unwrap_or_else(|| UNKNOWN_HOST.to_string());

    fields.insert("JOB_ID".to_string(), identity.job_id);
    fields.insert("TRACKER_START_TIME".to_string(), identity.tracker_start_time);
    fields.insert("JOB_NUMBER".to_string(), identity.job_number);
    fields.insert("SUBMIT_HOST".to_string(), submit_host);

    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILENAME: &str = "tracker-host_1300276234316_job_201103161430_0001_conf.xml";

    #[test]
    fn test_filename_identity() {
        let id = parse_config_filename(FILENAME).unwrap();
        assert_eq!(id.job_id, "job_201103161430_0001");
        assert_eq!(id.tracker_start_time, "1300276234316");
        assert_eq!(id.job_number, "0001");
    }

    #[test]
    fn test_filename_wrong_part_count() {
        let err = parse_config_filename("only_three_parts").unwrap_err();
        let ConfigDocError::FilenameFormat { parts, .. } = err;
        assert_eq!(parts, 3);
    }

    #[test]
    fn test_property_list() {
        let body = "<configuration>\
            <property><name>mapred.queue.name</name><value>default</value></property>\
            <property><name>user.name</name><value>alice</value></property>\
            </configuration>";
        let fields = parse_config_doc(FILENAME, body).unwrap();
        assert_eq!(fields["mapred.queue.name"], "default");
        assert_eq!(fields["user.name"], "alice");
        assert_eq!(fields["JOB_ID"], "job_201103161430_0001");
        assert_eq!(fields["TRACKER_START_TIME"], "1300276234316");
        assert_eq!(fields["JOB_NUMBER"], "0001");
    }

    #[test]
    fn test_submit_host_dots_replaced() {
        let body = "<property><name>mapreduce.job.submithostname</name>\
            <value>gw01.prod.example.com</value></property>";
        let fields = parse_config_doc(FILENAME, body).unwrap();
        assert_eq!(fields["SUBMIT_HOST"], "gw01_prod_example_com");
    }

    #[test]
    fn test_submit_host_absent() {
        let fields = parse_config_doc(FILENAME, "<configuration></configuration>").unwrap();
        assert_eq!(fields["SUBMIT_HOST"], "unknown-host");
    }

    #[test]
    fn test_empty_body_still_has_derived_fields() {
        let fields = parse_config_doc(FILENAME, "").unwrap();
        assert_eq!(fields.len(), 4);
        assert!(fields.contains_key("JOB_ID"));
    }
}
