use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TallyError;
use crate::types::{IdentityPolicy, TimeRange};

/// Top-level configuration loaded from `.branchtally.toml`.
///
/// Supports layered resolution: CLI flags > env vars > local config > defaults.
///
/// # Examples
///
/// ```
/// use branchtally_core::TallyConfig;
///
/// let config = TallyConfig::default();
/// assert!(config.exclude_merge_commits);
/// assert_eq!(config.github.per_page, 100);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TallyConfig {
    /// Organization owning bare repository names.
    pub organization: Option<String>,
    /// Repositories to analyze, as `repo` or `owner/repo`.
    #[serde(default)]
    pub repositories: Vec<String>,
    /// Branches to analyze, in processing order. Empty means all branches.
    #[serde(default)]
    pub branches: Vec<String>,
    /// Drop merge commits before counting (default: true).
    #[serde(default = "default_exclude_merge_commits")]
    pub exclude_merge_commits: bool,
    /// Commit identity policy (default: content).
    #[serde(default)]
    pub identity: IdentityPolicy,
    /// Named time windows; none means a single "All Time" run.
    #[serde(default)]
    pub time_ranges: Vec<TimeRangeConfig>,
    /// GitHub access settings.
    #[serde(default)]
    pub github: GitHubConfig,
    /// Calibration of the suspicious-pattern heuristics.
    #[serde(default)]
    pub patterns: PatternConfig,
}

fn default_exclude_merge_commits() -> bool {
    true
}

impl Default for TallyConfig {
    fn default() -> Self {
        Self {
            organization: None,
            repositories: Vec::new(),
            branches: Vec::new(),
            exclude_merge_commits: default_exclude_merge_commits(),
            identity: IdentityPolicy::default(),
            time_ranges: Vec::new(),
            github: GitHubConfig::default(),
            patterns: PatternConfig::default(),
        }
    }
}

impl TallyConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::FileNotFound`] if the file does not exist,
    /// [`TallyError::Io`] if it cannot be read, or [`TallyError::Toml`] if
    /// the content is not valid TOML.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use branchtally_core::TallyConfig;
    /// use std::path::Path;
    ///
    /// let config = TallyConfig::from_file(Path::new(".branchtally.toml")).unwrap();
    /// ```
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        if !path.exists() {
            return Err(TallyError::FileNotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use branchtally_core::TallyConfig;
    ///
    /// let toml = r#"
    /// organization = "acme"
    /// repositories = ["api"]
    /// "#;
    /// let config = TallyConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.organization.as_deref(), Some("acme"));
    /// ```
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Resolve the configured time ranges, or the single unbounded range
    /// when none are configured.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::InvalidTimeRange`] for the first range whose
    /// bounds are malformed.
    pub fn resolved_time_ranges(&self) -> crate::Result<Vec<TimeRange>> {
        if self.time_ranges.is_empty() {
            return Ok(vec![TimeRange::all_time()]);
        }
        self.time_ranges.iter().map(TimeRangeConfig::resolve).collect()
    }
}

/// A `[[time_ranges]]` entry as written in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRangeConfig {
    /// Display name (default: "Unnamed Range").
    #[serde(default = "default_range_name")]
    pub name: String,
    /// Inclusive start, e.g. `"2024-01-01"`.
    pub start_date: Option<String>,
    /// Exclusive end, e.g. `"2024-04-01"`.
    pub end_date: Option<String>,
}

fn default_range_name() -> String {
    "Unnamed Range".into()
}

impl TimeRangeConfig {
    /// Parse the textual bounds.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::InvalidTimeRange`] if a bound is malformed.
    pub fn resolve(&self) -> crate::Result<TimeRange> {
        TimeRange::parse(
            &self.name,
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )
    }
}

/// GitHub access configuration.
///
/// # Examples
///
/// ```
/// use branchtally_core::GitHubConfig;
///
/// let config = GitHubConfig::default();
/// assert!(config.token.is_none());
/// assert_eq!(config.concurrency, 4);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// Personal access token. `GITHUB_TOKEN` / `GH_TOKEN` take precedence.
    pub token: Option<String>,
    /// Page size for list endpoints (default: 100, the API maximum).
    #[serde(default = "default_per_page")]
    pub per_page: u8,
    /// Branches fetched concurrently (default: 4).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_per_page() -> u8 {
    100
}

fn default_concurrency() -> usize {
    4
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            per_page: default_per_page(),
            concurrency: default_concurrency(),
        }
    }
}

/// Thresholds for the suspicious-pattern heuristics.
///
/// The defaults are calibration values without a documented statistical
/// basis; they are kept overridable rather than tuned.
///
/// # Examples
///
/// ```
/// use branchtally_core::PatternConfig;
///
/// let config = PatternConfig::default();
/// assert_eq!(config.max_commits_per_day, 20.0);
/// assert_eq!(config.min_gap_seconds, 60.0);
/// assert_eq!(config.uniform_variance, 100.0);
/// assert_eq!(config.min_branches_for_uniformity, 10);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Flag when average commits per day exceeds this (default: 20).
    #[serde(default = "default_max_commits_per_day")]
    pub max_commits_per_day: f64,
    /// Flag when the shortest gap between commits is below this (default: 60s).
    #[serde(default = "default_min_gap_seconds")]
    pub min_gap_seconds: f64,
    /// Flag a branch spread whose variance is below this (default: 100).
    #[serde(default = "default_uniform_variance")]
    pub uniform_variance: f64,
    /// Only test uniformity above this many branches (default: 10).
    #[serde(default = "default_min_branches_for_uniformity")]
    pub min_branches_for_uniformity: usize,
}

fn default_max_commits_per_day() -> f64 {
    20.0
}

fn default_min_gap_seconds() -> f64 {
    60.0
}

fn default_uniform_variance() -> f64 {
    100.0
}

fn default_min_branches_for_uniformity() -> usize {
    10
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            max_commits_per_day: default_max_commits_per_day(),
            min_gap_seconds: default_min_gap_seconds(),
            uniform_variance: default_uniform_variance(),
            min_branches_for_uniformity: default_min_branches_for_uniformity(),
        }
    }
}
