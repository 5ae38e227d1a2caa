//! Canonical Perl version type
//!
//! The package index stores module versions in whichever encoding the author
//! happened to use (`1.23`, `v1.230.0`, `1.230`), so versions are parsed into
//! one comparable component vector and every comparison goes through it.
//!
//! Parsing follows the lax rules of Perl's `version.pm`:
//! - dotted-decimal: a leading `v` or two or more dots (`v1.2.3`, `1.2.3`)
//! - decimal: at most one dot; the fraction is split into groups of three
//!   digits (`1.0203` -> `v1.20.300`)
//! - underscores mark developer releases and are ignored for ordering

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid Perl version: {0:?}")]
pub struct VersionParseError(pub String);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerlVersion {
    raw: String,
    parts: Vec<u64>,
    alpha: bool,
}

impl PerlVersion {
    pub fn parse(input: &str) -> Result<Self, VersionParseError> {
        let raw = input.trim();
        let err = || VersionParseError(input.to_string());

        if raw.is_empty() || raw == "undef" {
            return Err(err());
        }

        let alpha = raw.contains('_');
        let cleaned = raw.replace('_', "");

        let parts = if let Some(dotted) = cleaned.strip_prefix('v') {
            parse_dotted(dotted).ok_or_else(err)?
        } else if cleaned.matches('.').count() >= 2 {
            parse_dotted(&cleaned).ok_or_else(err)?
        } else {
            parse_decimal(&cleaned).ok_or_else(err)?
        };

        Ok(Self {
            raw: raw.to_string(),
            parts,
            alpha,
        })
    }

    /// The version assumed for modules that declare none
    pub fn zero() -> Self {
        Self {
            raw: "0".to_string(),
            parts: vec![0],
            alpha: false,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_alpha(&self) -> bool {
        self.alpha
    }

    /// Dotted-decimal form with at least three components, e.g. `v1.230.0`
    pub fn normal(&self) -> String {
        let mut parts = self.parts.clone();
        while parts.len() < 3 {
            parts.push(0);
        }
        let joined: Vec<String> = parts.iter().map(u64::to_string).collect();
        format!("v{}", joined.join("."))
    }

    /// Decimal form with three digits per component, e.g. `1.002003`
    pub fn numify(&self) -> String {
        let (first, rest) = self.parts.split_first().unwrap_or((&0, &[]));
        if rest.is_empty() {
            return format!("{}.000", first);
        }
        let fraction: String = rest.iter().map(|p| format!("{:03}", p)).collect();
        format!("{}.{}", first, fraction)
    }

    /// All encodings the index may have stored this version under.
    ///
    /// A hit on any of them is a match: raw text, normal form and numified form.
    pub fn query_variants(&self) -> Vec<String> {
        let mut variants = vec![self.raw.clone()];
        for candidate in [self.normal(), self.numify()] {
            if !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }
        variants
    }

    /// Components with trailing zeros removed, so `1.2` and `1.200` compare equal
    fn significant(&self) -> &[u64] {
        let end = self
            .parts
            .iter()
            .rposition(|p| *p != 0)
            .map(|i| i + 1)
            .unwrap_or(0);
        &self.parts[..end]
    }
}

fn parse_dotted(body: &str) -> Option<Vec<u64>> {
    body.split('.')
        .map(|component| {
            if component.is_empty() || !component.bytes().all(|b| b.is_ascii_digit()) {
                None
            } else {
                component.parse().ok()
            }
        })
        .collect()
}

fn parse_decimal(body: &str) -> Option<Vec<u64>> {
    let (integer, fraction) = match body.split_once('.') {
        Some((i, f)) => (i, f),
        None => (body, ""),
    };

    if integer.is_empty() && fraction.is_empty() {
        return None;
    }
    if !integer.bytes().chain(fraction.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    let mut parts = vec![if integer.is_empty() {
        0
    } else {
        integer.parse().ok()?
    }];

    let mut padded = fraction.to_string();
    while padded.len() % 3 != 0 {
        padded.push('0');
    }
    for chunk in padded.as_bytes().chunks(3) {
        let group = std::str::from_utf8(chunk).ok()?;
        parts.push(group.parse().ok()?);
    }

    Some(parts)
}

impl PartialEq for PerlVersion {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for PerlVersion {}

impl Hash for PerlVersion {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl PartialOrd for PerlVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PerlVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for PerlVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl FromStr for PerlVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PerlVersion {
    type Error = VersionParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PerlVersion> for String {
    fn from(value: PerlVersion) -> Self {
        value.raw
    }
}

/// Compare a parsed local version against a version string reported by the index.
///
/// Unparseable index versions only match when the text is identical.
pub fn matches_reported(local: Option<&PerlVersion>, reported: Option<&str>) -> bool {
    match (local, reported) {
        (None, None) => true,
        (Some(local), Some(reported)) => match PerlVersion::parse(reported) {
            Ok(parsed) => *local == parsed,
            Err(_) => local.as_str() == reported.trim(),
        },
        _ => false,
    }
}
