//! Nested counter-blob decoding.
//!
//! Runtime logs carry per-job counters as a nested, delimiter-based text blob:
//!
//! ```text
//! {(group)(Group Description)[(counter)(Counter Description)(value)]...}...
//! ```
//!
//! The grammar has no escaping, so field text containing `")("`, `"}"` or `"]"`
//! silently truncates at the first occurrence. That is a limitation of the
//! source format, preserved here rather than fixed.

use regex::Regex;
use std::sync::LazyLock;

/// One counter group: a named collection of counters from a job subsystem.
#[derive(Debug, Clone, PartialEq)]
pub struct CounterGroup {
    pub name: String,
    pub description: String,
    pub counters: Vec<Counter>,
}

/// A single named measurement. The value stays text until record assembly
/// decides whether it is numeric.
#[derive(Debug, Clone, PartialEq)]
pub struct Counter {
    pub name: String,
    pub description: String,
    pub value: String,
}

// Lazy matches keep each field from swallowing the next delimiter. (?s) lets
// descriptions span newlines.
static GROUP_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\{\((.*?)\)\((.*?)\)(.*?)\}").unwrap());
static COUNTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[\((.*?)\)\((.*?)\)\((.*?)\)\]").unwrap());

/// Strip backslashes and replace dots with underscores so names are safe as
/// dotted metric-path segments.
pub fn sanitize_name(name: &str) -> String {
    name.replace('\\', "").replace('.', "_")
}

/// Parse a counter blob into its groups. Pure function: malformed input
/// yields however many well-formed groups were found, possibly zero.
pub fn parse_counter_blob(blob: &str) -> Vec<CounterGroup> {
    GROUP_RE
        .captures_iter(blob)
        .map(|g| {
            let counters = COUNTER_RE
                .captures_iter(&g[3])
                .map(|c| Counter {
                    name: sanitize_name(&c[1]),
                    description: c[2].to_string(),
                    value: c[3].to_string(),
                })
                .collect();
            CounterGroup {
                name: sanitize_name(&g[1]),
                description: g[2].to_string(),
                counters,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_group_two_counters() {
        let blob = "{(g1)(Group One)[(c1)(Counter One)(5)][(c2)(Counter Two)(10)]}";
        let groups = parse_counter_blob(blob);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].name, "g1");
        assert_eq!(groups[0].description, "Group One");
        assert_eq!(groups[0].counters.len(), 2);
        assert_eq!(groups[0].counters[0].name, "c1");
        assert_eq!(groups[0].counters[0].value, "5");
        assert_eq!(groups[0].counters[1].name, "c2");
        assert_eq!(groups[0].counters[1].value, "10");
    }

    #[test]
    fn test_multiple_groups() {
        let blob = "{(a)(A)[(x)(X)(1)]}{(b)(B)[(y)(Y)(2)][(z)(Z)(3)]}";
        let groups = parse_counter_blob(blob);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].name, "a");
        assert_eq!(groups[1].counters.len(), 2);
    }

    #[test]
    fn test_name_sanitization() {
        let blob = r"{(org.apache.Group)(desc)[(File\Read.bytes)(d)(42)]}";
        let groups = parse_counter_blob(blob);
        assert_eq!(groups[0].name, "org_apache_Group");
        assert_eq!(groups[0].counters[0].name, "FileRead_bytes");
    }

    #[test]
    fn test_malformed_blob_yields_nothing() {
        assert!(parse_counter_blob("not a blob at all").is_empty());
        assert!(parse_counter_blob("{(unclosed)(group)").is_empty());
        assert!(parse_counter_blob("").is_empty());
    }

    #[test]
    fn test_group_with_no_counters() {
        let groups = parse_counter_blob("{(empty)(no counters here)}");
        assert_eq!(groups.len(), 1);
        assert!(groups[0].counters.is_empty());
    }

    #[test]
    fn test_description_spanning_newline() {
        let blob = "{(g)(line one\nline two)[(c)(d)(7)]}";
        let groups = parse_counter_blob(blob);
        assert_eq!(groups[0].description, "line one\nline two");
        assert_eq!(groups[0].counters[0].value, "7");
    }
}
