//! Runtime-log decoding: one job's free-form execution record into a flat
//! field map.
//!
//! The source format uses `=` as its key/value separator but allows embedded
//! newlines inside quoted values, so a single-pass tokenizer cannot treat `=`
//! as both structure and content. Parsing is therefore two-phase: first every
//! literal `=` in the file is replaced by a space (lossy — no field content may
//! require a literal `=`), then the result is tokenized as quote-delimited,
//! escape-aware, space-separated fields. The job-name metadata split below
//! relies on that same substitution: user-authored `key=value` syntax inside a
//! job name arrives here as `key value`.

use crate::counters::parse_counter_blob;
use std::collections::HashMap;

/// Replacement for extracted job-name values exceeding the configured maximum.
const TOO_LONG: &str = "toolong";

/// Options threaded from configuration into the parser. Owning them here keeps
/// the `=`-to-space coupling explicit and testable in isolation.
#[derive(Debug, Clone)]
pub struct RuntimeParseOptions {
    /// Extract key/value metadata embedded in the job name.
    pub extract_name_metadata: bool,
    /// Separator between metadata pairs inside the job name.
    pub name_separator: String,
    /// Extracted values longer than this are replaced by `toolong`.
    pub max_value_len: usize,
}

impl Default for RuntimeParseOptions {
    fn default() -> Self {
        RuntimeParseOptions {
            extract_name_metadata: false,
            name_separator: "||".to_string(),
            max_value_len: 64,
        }
    }
}

/// Flat field map recovered from one runtime log, plus the non-fatal job-name
/// parse flag. Counter fields have already been flattened to dotted keys.
#[derive(Debug, Default)]
pub struct RuntimeFields {
    pub fields: HashMap<String, String>,
    /// Job-name metadata extraction failed for this job. Never aborts assembly.
    pub name_parse_failed: bool,
}

/// Parse one runtime log into its field map.
pub fn parse_runtime_log(source: &str, opts: &RuntimeParseOptions) -> RuntimeFields {
    // Phase 1: the lossy `=` -> space substitution.
    let scratch = source.replace('=', " ");

    // Phase 2: quote-aware tokenization, then pairwise key/value pickup from
    // `Job` lines. Later lines override earlier same-key entries.
    let mut fields: HashMap<String, String> = HashMap::new();
    for tokens in tokenize_lines(&scratch) {
        if tokens.first().map(String::as_str) != Some("Job") {
            continue;
        }
        for pair in tokens[1..].chunks_exact(2) {
            fields.insert(pair[0].clone(), pair[1].clone());
        }
    }

    flatten_counter_fields(&mut fields);

    let mut out = RuntimeFields {
        fields,
        name_parse_failed: false,
    };
    if opts.extract_name_metadata {
        extract_name_metadata(&mut out, opts);
    }

    // A textual status becomes a presence field so aggregation can sum
    // occurrences per status.
    if let Some(status) = out.fields.remove("JOB_STATUS") {
        out.fields.insert(format!("JOB_STATUS.{status}"), "1".to_string());
    }

    out
}

/// Split text into lines of tokens. Tokens are separated by spaces; a `"`
/// toggles quoting (quotes are stripped), and `\` escapes the next character.
/// Quoted tokens may contain spaces and newlines, which is how multi-line
/// field values survive the line split.
fn tokenize_lines(text: &str) -> Vec<Vec<String>> {
    let mut lines = Vec::new();
    let mut line: Vec<String> = Vec::new();
    let mut token = String::new();
    let mut has_token = false;
    let mut in_quotes = false;
    let mut escaped = false;

    for ch in text.chars() {
        if escaped {
            token.push(ch);
            has_token = true;
            escaped = false;
            continue;
        }
        match ch {
            '\\' => escaped = true,
            '"' => {
                in_quotes = !in_quotes;
                // An empty quoted string is still a token.
                has_token = true;
            }
            ' ' if !in_quotes => {
                if has_token {
                    line.push(std::mem::take(&mut token));
                    has_token = false;
                }
            }
            '\n' if !in_quotes => {
                if has_token {
                    line.push(std::mem::take(&mut token));
                    has_token = false;
                }
                if !line.is_empty() {
                    lines.push(std::mem::take(&mut line));
                }
            }
            _ => {
                token.push(ch);
                has_token = true;
            }
        }
    }
    if has_token {
        line.push(token);
    }
    if !line.is_empty() {
        lines.push(line);
    }
    lines
}

/// Replace every field whose name contains `COUNTERS` by one field per
/// (key, group, counter) triple, joined with dots and holding the counter
/// value. The group structure is discarded after flattening.
fn flatten_counter_fields(fields: &mut HashMap<String, String>) {
    let counter_keys: Vec<String> = fields
        .keys()
        .filter(|k| k.contains("COUNTERS"))
        .cloned()
        .collect();
    for key in counter_keys {
        let blob = match fields.remove(&key) {
            Some(b) => b,
            None => continue,
        };
        for group in parse_counter_blob(&blob) {
            for counter in &group.counters {
                fields.insert(
                    format!("{key}.{}.{}", group.name, counter.name),
                    counter.value.clone(),
                );
            }
        }
    }
}

/// Pull key/value metadata out of the job name. All-or-nothing: any pair that
/// does not split as `key value` marks the failure flag and no fields are
/// added. The flag is informational only.
fn extract_name_metadata(out: &mut RuntimeFields, opts: &RuntimeParseOptions) {
    let name = match out.fields.get("JOBNAME") {
        Some(n) => n,
        None => return,
    };
    if name.contains('\n') || name.contains('\t') {
        tracing::debug!("job name contains newline or tab, skipping metadata extraction");
        out.name_parse_failed = true;
        return;
    }

    let mut extracted: Vec<(String, String)> = Vec::new();
    for pair in name.split(opts.name_separator.as_str()) {
        let Some((key, value)) = pair.split_once(' ') else {
            tracing::debug!(pair, "job name pair has no value, skipping metadata extraction");
            out.name_parse_failed = true;
            return;
        };
        let value = if value.len() > opts.max_value_len {
            TOO_LONG.to_string()
        } else {
            value.to_string()
        };
        extracted.push((key.to_string(), value));
    }
    for (key, value) in extracted {
        out.fields.insert(key, value);
    }
}
