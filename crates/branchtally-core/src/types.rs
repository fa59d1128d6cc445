use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TallyError;

/// Author placeholder used when the source cannot resolve a login.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// One commit as observed on one branch.
///
/// The same commit reachable from several branches yields one record per
/// branch, identical except for `branch`.
///
/// # Examples
///
/// ```
/// use branchtally_core::CommitRecord;
/// use chrono::{TimeZone, Utc};
///
/// let record = CommitRecord {
///     commit_hash: "9fceb02d0ae598e95dc970b74767f19372d61af8".into(),
///     tree_hash: "4b825dc642cb6eb9a060e54bf8d69288fbee4904".into(),
///     author: "alice".into(),
///     message: "fix: auth bug".into(),
///     timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
///     parent_count: 1,
///     branch: "main".into(),
/// };
/// assert_eq!(record.author, "alice");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    /// Full commit object id.
    pub commit_hash: String,
    /// Id of the tree the commit produces.
    pub tree_hash: String,
    /// Author login, or [`UNKNOWN_AUTHOR`].
    pub author: String,
    /// Full commit message, possibly multi-line.
    pub message: String,
    /// Author date.
    pub timestamp: DateTime<Utc>,
    /// Number of parent commits.
    pub parent_count: usize,
    /// Branch this record was observed on.
    pub branch: String,
}

/// How two commit records are judged to be the same logical change.
///
/// Chosen once per run.
///
/// # Examples
///
/// ```
/// use branchtally_core::IdentityPolicy;
///
/// let policy: IdentityPolicy = "hash".parse().unwrap();
/// assert_eq!(policy, IdentityPolicy::Hash);
/// assert_eq!(IdentityPolicy::default(), IdentityPolicy::Content);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityPolicy {
    /// `(author, message, tree)`: survives rebases and cherry-picks.
    #[default]
    Content,
    /// `(author, message, commit)`: only the same commit object collapses.
    Hash,
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityPolicy::Content => write!(f, "content"),
            IdentityPolicy::Hash => write!(f, "hash"),
        }
    }
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "content" | "tree" => Ok(IdentityPolicy::Content),
            "hash" | "sha" => Ok(IdentityPolicy::Hash),
            other => Err(format!("unknown identity policy: {other}")),
        }
    }
}

/// A named time window. `start` is inclusive, `end` exclusive; either may
/// be open.
///
/// # Examples
///
/// ```
/// use branchtally_core::TimeRange;
/// use chrono::{TimeZone, Utc};
///
/// let q1 = TimeRange::parse("Q1", Some("2024-01-01"), Some("2024-04-01")).unwrap();
/// assert!(q1.contains(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()));
/// assert!(!q1.contains(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    /// Display name used in reports and exports.
    pub name: String,
    /// Inclusive lower bound.
    pub start: Option<DateTime<Utc>>,
    /// Exclusive upper bound.
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    /// Name of the implicit unbounded range.
    pub const ALL_TIME: &'static str = "All Time";

    /// The unbounded range.
    pub fn all_time() -> Self {
        Self {
            name: Self::ALL_TIME.into(),
            start: None,
            end: None,
        }
    }

    /// Build a range from textual bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::InvalidTimeRange`] if a bound does not parse or
    /// `start` is not before `end`.
    pub fn parse(name: &str, start: Option<&str>, end: Option<&str>) -> Result<Self, TallyError> {
        let start = start.map(parse_bound).transpose()?;
        let end = end.map(parse_bound).transpose()?;
        if let (Some(s), Some(e)) = (start, end) {
            if s >= e {
                return Err(TallyError::InvalidTimeRange(format!(
                    "'{name}': start {s} is not before end {e}"
                )));
            }
        }
        Ok(Self {
            name: name.to_string(),
            start,
            end,
        })
    }

    /// Whether `ts` falls inside the window.
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts < e)
    }

    /// Whether neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

impl Default for TimeRange {
    fn default() -> Self {
        Self::all_time()
    }
}

/// Parse a date or date-time. Values without an offset are taken as UTC.
fn parse_bound(raw: &str) -> Result<DateTime<Utc>, TallyError> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Ok(dt.with_timezone(&Utc));
    }
    // `%.f` also matches a missing fraction.
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(TallyError::InvalidTimeRange(format!(
        "cannot parse date '{raw}'"
    )))
}

/// Output format for rendered results.
///
/// # Examples
///
/// ```
/// use branchtally_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}
