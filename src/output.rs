//! Result formatting
//!
//! Each resolved release is printed through a template, or as one JSON
//! object per line with `--json`.
//!
//! # Template syntax
//!
//! - `{field}`: a top-level field of the release, e.g. `{url}` or `{name}`
//! - `{dist_data.percent_installed}`: dotted paths reach into nested objects
//! - `\t`, `\n`, `\\`: tab, newline and backslash
//!
//! Missing fields render as empty text.

use std::io::Write;

use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::survey::types::ResolvedInstallation;
use crate::survey::{ModuleStatus, SurveyReport};

pub const DEFAULT_TEMPLATE: &str = "{url}";

#[derive(Debug, Error)]
pub enum OutputError {
    #[error("Failed to write output: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize release: {0}")]
    Json(#[from] serde_json::Error),
}

/// A segment of a parsed template
#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    Literal(String),
    /// Field path split on `.`
    Field(Vec<String>),
}

/// Parse a template, resolving escapes in literal text.
///
/// An unterminated `{` is kept as literal text.
pub fn parse_template(input: &str) -> Vec<Segment> {
    let mut segments = Vec::new();
    let mut chars = input.chars().peekable();
    let mut literal = String::new();

    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('t') => literal.push('\t'),
                Some('n') => literal.push('\n'),
                Some('\\') => literal.push('\\'),
                Some(other) => {
                    literal.push('\\');
                    literal.push(other);
                }
                None => literal.push('\\'),
            },
            '{' => {
                let mut name = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c);
                }

                if !closed {
                    literal.push('{');
                    literal.push_str(&name);
                    continue;
                }

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(
                    name.trim().split('.').map(str::to_string).collect(),
                ));
            }
            _ => literal.push(c),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }

    segments
}

#[derive(Debug, Clone, PartialEq)]
pub struct Formatter {
    segments: Vec<Segment>,
}

impl Formatter {
    pub fn new(template: &str) -> Self {
        Self {
            segments: parse_template(template),
        }
    }

    pub fn render(&self, installation: &ResolvedInstallation) -> Result<String, OutputError> {
        let value = serde_json::to_value(installation)?;
        Ok(self.render_value(&value))
    }

    fn render_value(&self, value: &Value) -> String {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Literal(text) => text.clone(),
                Segment::Field(path) => lookup(value, path).map(scalar_text).unwrap_or_default(),
            })
            .collect()
    }
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutputMode {
    Template(Formatter),
    Json,
}

fn lookup<'a>(value: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(value, |current, key| match current {
        Value::Object(map) => map.get(key),
        Value::Array(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(scalar_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Write every resolved release, one line each
pub fn write_report<W: Write>(
    out: &mut W,
    report: &SurveyReport,
    mode: &OutputMode,
) -> Result<(), OutputError> {
    for installation in &report.releases {
        match mode {
            OutputMode::Template(formatter) => {
                writeln!(out, "{}", formatter.render(installation)?)?;
            }
            OutputMode::Json => {
                serde_json::to_writer(&mut *out, installation)?;
                writeln!(out)?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

/// Log a warning for every module the survey could not attribute to a release
pub fn warn_unresolved(report: &SurveyReport) {
    let mut count = 0;

    for finding in report.unresolved() {
        count += 1;
        let version = finding.version.as_deref().unwrap_or("undef");
        match finding.status {
            ModuleStatus::NoCandidates => {
                let flag = finding.flag.map(|f| f.as_str()).unwrap_or("no_candidates");
                warn!("{} {}: {}", finding.module, version, flag);
            }
            ModuleStatus::Unresolvable => warn!(
                "{} {}: unversioned and matches {}",
                finding.module,
                version,
                finding.releases.join(", ")
            ),
            ModuleStatus::Failed => warn!(
                "{} {}: {}",
                finding.module,
                version,
                finding.error.as_deref().unwrap_or("lookup failed")
            ),
            ModuleStatus::Resolved => {}
        }
    }

    if count > 0 {
        warn!("{} of {} modules were not resolved", count, report.findings.len());
    }
}
