//! Suspicious contribution patterns for a single author.
//!
//! Computes message repetition, commit cadence, and branch spread over one
//! author's raw commit list and checks them against the thresholds in
//! [`PatternConfig`]. A triggered flag signals correlation, not proof; an
//! empty flag list means no indicators were found.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use branchtally_core::{CommitRecord, PatternConfig};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

/// Commit cadence statistics.
///
/// Gap statistics are `None` with fewer than two commits.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeAnalysis {
    /// Commits analyzed.
    pub total_commits: usize,
    /// Whole days between the first and last commit.
    pub time_span_days: i64,
    /// `total_commits / (time_span_days + 1)`.
    pub avg_commits_per_day: f64,
    /// Shortest gap between consecutive commits, in seconds.
    pub min_time_diff_seconds: Option<f64>,
    /// Longest gap between consecutive commits, in seconds.
    pub max_time_diff_seconds: Option<f64>,
    /// Mean gap between consecutive commits, in seconds.
    pub avg_time_diff_seconds: Option<f64>,
}

/// A triggered heuristic.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::patterns::SuspicionFlag;
///
/// let flag = SuspicionFlag::ShortCommitGap { seconds: 4.0 };
/// assert_eq!(flag.to_string(), "Very short time between commits: 4.0 seconds");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase", tag = "kind")]
pub enum SuspicionFlag {
    /// Some messages occur more than once.
    DuplicateMessages {
        /// Sum of `occurrences - 1` over repeated messages.
        count: usize,
    },
    /// Average daily rate above the threshold.
    HighDailyRate {
        /// Average commits per day.
        per_day: f64,
    },
    /// Two commits closer together than the threshold.
    ShortCommitGap {
        /// Shortest gap, in seconds.
        seconds: f64,
    },
    /// Many branches with nearly identical commit counts.
    UniformBranchSpread {
        /// Distinct branches touched.
        branches: usize,
        /// Population variance of per-branch counts.
        variance: f64,
    },
}

impl fmt::Display for SuspicionFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuspicionFlag::DuplicateMessages { count } => {
                write!(f, "{count} duplicate commit messages found")
            }
            SuspicionFlag::HighDailyRate { per_day } => {
                write!(f, "Very high daily commit rate: {per_day:.1} commits/day")
            }
            SuspicionFlag::ShortCommitGap { seconds } => {
                write!(f, "Very short time between commits: {seconds:.1} seconds")
            }
            SuspicionFlag::UniformBranchSpread { branches, variance } => write!(
                f,
                "Suspiciously uniform distribution across {branches} branches (variance {variance:.1})"
            ),
        }
    }
}

/// Pattern analysis of one author's commits.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::patterns::analyze;
/// use branchtally_core::PatternConfig;
///
/// let report = analyze("alice", &[], &PatternConfig::default());
/// assert_eq!(report.total_commits, 0);
/// assert!(report.flags.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatternReport {
    /// Author investigated.
    pub user: String,
    /// Records analyzed.
    pub total_commits: usize,
    /// Distinct branches among the records.
    pub branches_contributed: usize,
    /// Messages occurring more than once, with their counts.
    pub duplicate_messages: BTreeMap<String, usize>,
    /// Sum of `count - 1` over `duplicate_messages`.
    pub total_duplicates: usize,
    /// Cadence statistics.
    pub time_analysis: TimeAnalysis,
    /// Records per branch.
    pub branch_distribution: BTreeMap<String, usize>,
    /// Population variance of per-branch counts, only computed above the
    /// uniformity branch threshold.
    pub branch_variance: Option<f64>,
    /// Commits per UTC hour of day (0-23).
    pub hour_distribution: BTreeMap<u32, usize>,
    /// Commits per weekday, 0 = Monday.
    pub day_distribution: BTreeMap<u32, usize>,
    /// Every triggered heuristic.
    pub flags: Vec<SuspicionFlag>,
}

impl PatternReport {
    /// Whether any heuristic fired.
    pub fn is_suspicious(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Branches by commit count (descending), then name.
    pub fn top_branches(&self, limit: usize) -> Vec<(&str, usize)> {
        let mut branches: Vec<(&str, usize)> = self
            .branch_distribution
            .iter()
            .map(|(b, c)| (b.as_str(), *c))
            .collect();
        branches.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        branches.truncate(limit);
        branches
    }
}

/// Analyze one author's commits.
///
/// Records are taken as given: no deduplication and no merge exclusion.
///
/// # Examples
///
/// ```
/// use branchtally_core::{CommitRecord, PatternConfig};
/// use branchtally_gitpulse::patterns::{analyze, SuspicionFlag};
/// use chrono::{TimeZone, Utc};
///
/// let at = |secs: i64| CommitRecord {
///     commit_hash: format!("c{secs}"),
///     tree_hash: format!("t{secs}"),
///     author: "alice".into(),
///     message: format!("change {secs}"),
///     timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
///     parent_count: 1,
///     branch: "main".into(),
/// };
/// let report = analyze("alice", &[at(0), at(10)], &PatternConfig::default());
/// assert_eq!(report.time_analysis.min_time_diff_seconds, Some(10.0));
/// assert_eq!(report.flags, vec![SuspicionFlag::ShortCommitGap { seconds: 10.0 }]);
/// ```
pub fn analyze(user: &str, commits: &[CommitRecord], thresholds: &PatternConfig) -> PatternReport {
    let (duplicate_messages, total_duplicates) = duplicate_messages(commits);
    let time_analysis = time_analysis(commits);

    let mut branch_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut hour_distribution: BTreeMap<u32, usize> = BTreeMap::new();
    let mut day_distribution: BTreeMap<u32, usize> = BTreeMap::new();
    for commit in commits {
        *branch_distribution.entry(commit.branch.clone()).or_default() += 1;
        *hour_distribution.entry(commit.timestamp.hour()).or_default() += 1;
        *day_distribution
            .entry(commit.timestamp.weekday().num_days_from_monday())
            .or_default() += 1;
    }

    let branch_variance = if branch_distribution.len() > thresholds.min_branches_for_uniformity {
        population_variance(branch_distribution.values().copied())
    } else {
        None
    };

    let mut flags = Vec::new();
    if total_duplicates > 0 {
        flags.push(SuspicionFlag::DuplicateMessages {
            count: total_duplicates,
        });
    }
    if time_analysis.avg_commits_per_day > thresholds.max_commits_per_day {
        flags.push(SuspicionFlag::HighDailyRate {
            per_day: time_analysis.avg_commits_per_day,
        });
    }
    if let Some(seconds) = time_analysis.min_time_diff_seconds {
        if seconds < thresholds.min_gap_seconds {
            flags.push(SuspicionFlag::ShortCommitGap { seconds });
        }
    }
    if let Some(variance) = branch_variance {
        if variance < thresholds.uniform_variance {
            flags.push(SuspicionFlag::UniformBranchSpread {
                branches: branch_distribution.len(),
                variance,
            });
        }
    }

    PatternReport {
        user: user.to_string(),
        total_commits: commits.len(),
        branches_contributed: branch_distribution.len(),
        duplicate_messages,
        total_duplicates,
        time_analysis,
        branch_distribution,
        branch_variance,
        hour_distribution,
        day_distribution,
        flags,
    }
}

fn duplicate_messages(commits: &[CommitRecord]) -> (BTreeMap<String, usize>, usize) {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for commit in commits {
        *counts.entry(commit.message.as_str()).or_default() += 1;
    }
    let repeated: BTreeMap<String, usize> = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(message, count)| (message.to_string(), count))
        .collect();
    let total = repeated.values().map(|count| count - 1).sum();
    (repeated, total)
}

fn time_analysis(commits: &[CommitRecord]) -> TimeAnalysis {
    let mut times: Vec<_> = commits.iter().map(|c| c.timestamp).collect();
    times.sort();

    let (Some(first), Some(last)) = (times.first(), times.last()) else {
        return TimeAnalysis::default();
    };

    let time_span_days = (*last - *first).num_days();
    // The +1 keeps a same-day burst finite: 25 commits in one day is 25/day.
    let avg_commits_per_day = commits.len() as f64 / (time_span_days + 1) as f64;

    let gaps: Vec<f64> = times
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).num_milliseconds() as f64 / 1000.0)
        .collect();
    let (min, max, avg) = if gaps.is_empty() {
        (None, None, None)
    } else {
        let min = gaps.iter().copied().fold(f64::INFINITY, f64::min);
        let max = gaps.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let avg = gaps.iter().sum::<f64>() / gaps.len() as f64;
        (Some(min), Some(max), Some(avg))
    };

    TimeAnalysis {
        total_commits: commits.len(),
        time_span_days,
        avg_commits_per_day,
        min_time_diff_seconds: min,
        max_time_diff_seconds: max,
        avg_time_diff_seconds: avg,
    }
}

/// Population variance; `None` for an empty sequence.
fn population_variance(values: impl Iterator<Item = usize> + Clone) -> Option<f64> {
    let n = values.clone().count();
    if n == 0 {
        return None;
    }
    let mean = values.clone().sum::<usize>() as f64 / n as f64;
    let sum_sq: f64 = values.map(|v| (v as f64 - mean).powi(2)).sum();
    Some(sum_sq / n as f64)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    const BASE: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z, a Monday

    fn commit(message: &str, branch: &str, offset_secs: i64) -> CommitRecord {
        CommitRecord {
            commit_hash: format!("c{offset_secs}-{branch}"),
            tree_hash: format!("t{offset_secs}"),
            author: "mallory".into(),
            message: message.into(),
            timestamp: Utc.timestamp_opt(BASE + offset_secs, 0).unwrap(),
            parent_count: 1,
            branch: branch.into(),
        }
    }

    #[test]
    fn empty_history_is_all_zero_and_unflagged() {
        let report = analyze("mallory", &[], &PatternConfig::default());
        assert_eq!(report.total_commits, 0);
        assert_eq!(report.branches_contributed, 0);
        assert_eq!(report.time_analysis, TimeAnalysis::default());
        assert_eq!(report.time_analysis.avg_commits_per_day, 0.0);
        assert!(report.branch_variance.is_none());
        assert!(report.flags.is_empty());
        assert!(!report.is_suspicious());
    }

    #[test]
    fn single_commit_has_no_gaps_and_no_flags() {
        let report = analyze("mallory", &[commit("init", "main", 0)], &PatternConfig::default());
        assert_eq!(report.time_analysis.time_span_days, 0);
        assert_eq!(report.time_analysis.avg_commits_per_day, 1.0);
        assert!(report.time_analysis.min_time_diff_seconds.is_none());
        assert!(report.flags.is_empty());
    }

    #[test]
    fn twenty_five_commits_in_one_day_is_high_rate() {
        let commits: Vec<_> = (0..25)
            .map(|i| commit(&format!("change {i}"), "main", i * 3_000))
            .collect();
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.time_analysis.time_span_days, 0);
        assert!((report.time_analysis.avg_commits_per_day - 25.0).abs() < f64::EPSILON);
        assert_eq!(
            report.flags,
            vec![SuspicionFlag::HighDailyRate { per_day: 25.0 }]
        );
    }

    #[test]
    fn ten_second_gap_is_flagged() {
        let commits = vec![commit("a", "main", 0), commit("b", "main", 10)];
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.time_analysis.min_time_diff_seconds, Some(10.0));
        assert_eq!(report.time_analysis.max_time_diff_seconds, Some(10.0));
        assert_eq!(report.time_analysis.avg_time_diff_seconds, Some(10.0));
        assert_eq!(report.flags, vec![SuspicionFlag::ShortCommitGap { seconds: 10.0 }]);
    }

    #[test]
    fn gaps_are_computed_on_sorted_timestamps() {
        let commits = vec![
            commit("c", "main", 7_200),
            commit("a", "main", 0),
            commit("b", "main", 3_600),
        ];
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.time_analysis.min_time_diff_seconds, Some(3_600.0));
        assert_eq!(report.time_analysis.max_time_diff_seconds, Some(3_600.0));
        assert!(report.flags.is_empty());
    }

    #[test]
    fn duplicate_messages_count_extra_occurrences() {
        let commits = vec![
            commit("update", "main", 0),
            commit("update", "main", 86_400),
            commit("update", "dev", 2 * 86_400),
            commit("fix", "main", 3 * 86_400),
            commit("fix", "dev", 4 * 86_400),
            commit("unique", "main", 5 * 86_400),
        ];
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.duplicate_messages.len(), 2);
        assert_eq!(report.duplicate_messages["update"], 3);
        assert_eq!(report.duplicate_messages["fix"], 2);
        assert_eq!(report.total_duplicates, 3);
        assert_eq!(report.flags, vec![SuspicionFlag::DuplicateMessages { count: 3 }]);
    }

    #[test]
    fn span_and_rate_use_whole_days() {
        // 4 commits over 2.5 days: span 2, rate 4 / 3
        let commits = vec![
            commit("a", "main", 0),
            commit("b", "main", 86_400),
            commit("c", "main", 2 * 86_400),
            commit("d", "main", 2 * 86_400 + 43_200),
        ];
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.time_analysis.time_span_days, 2);
        assert!((report.time_analysis.avg_commits_per_day - 4.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn uniform_spread_over_many_branches_is_flagged() {
        let commits: Vec<_> = (0..12)
            .map(|i| commit(&format!("seed {i}"), &format!("branch-{i:02}"), i * 86_400))
            .collect();
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.branches_contributed, 12);
        assert_eq!(report.branch_variance, Some(0.0));
        assert!(report
            .flags
            .contains(&SuspicionFlag::UniformBranchSpread { branches: 12, variance: 0.0 }));
    }

    #[test]
    fn ten_branches_is_not_enough_for_uniformity() {
        let commits: Vec<_> = (0..10)
            .map(|i| commit(&format!("seed {i}"), &format!("branch-{i}"), i * 86_400))
            .collect();
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert!(report.branch_variance.is_none());
        assert!(report.flags.is_empty());
    }

    #[test]
    fn skewed_spread_is_not_uniform() {
        let mut commits: Vec<_> = (0..11)
            .map(|i| commit(&format!("seed {i}"), &format!("branch-{i:02}"), i * 86_400))
            .collect();
        // 40 more commits on one branch, an hour apart
        for i in 0..40 {
            commits.push(commit(&format!("work {i}"), "branch-00", 20 * 86_400 + i * 3_600));
        }
        let report = analyze("mallory", &commits, &PatternConfig::default());
        let variance = report.branch_variance.unwrap();
        assert!(variance >= 100.0, "variance was {variance}");
        assert!(!report
            .flags
            .iter()
            .any(|f| matches!(f, SuspicionFlag::UniformBranchSpread { .. })));
    }

    #[test]
    fn thresholds_are_overridable() {
        let commits = vec![commit("a", "main", 0), commit("b", "main", 90)];
        let strict = PatternConfig {
            min_gap_seconds: 120.0,
            max_commits_per_day: 1.5,
            ..PatternConfig::default()
        };
        let report = analyze("mallory", &commits, &strict);
        assert_eq!(
            report.flags,
            vec![
                SuspicionFlag::HighDailyRate { per_day: 2.0 },
                SuspicionFlag::ShortCommitGap { seconds: 90.0 },
            ]
        );
        assert!(analyze("mallory", &commits, &PatternConfig::default())
            .flags
            .is_empty());
    }

    #[test]
    fn hour_and_weekday_histograms() {
        let commits = vec![
            commit("a", "main", 9 * 3_600),           // Monday 09:00
            commit("b", "main", 9 * 3_600 + 1_800),   // Monday 09:30
            commit("c", "main", 86_400 + 23 * 3_600), // Tuesday 23:00
        ];
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.hour_distribution[&9], 2);
        assert_eq!(report.hour_distribution[&23], 1);
        assert_eq!(report.day_distribution[&0], 2);
        assert_eq!(report.day_distribution[&1], 1);
    }

    #[test]
    fn top_branches_orders_by_count() {
        let commits = vec![
            commit("a", "dev", 0),
            commit("b", "main", 100),
            commit("c", "main", 200),
            commit("d", "feature", 300),
        ];
        let report = analyze("mallory", &commits, &PatternConfig::default());
        assert_eq!(report.top_branches(2), vec![("main", 2), ("dev", 1)]);
    }

    #[test]
    fn population_variance_matches_hand_computation() {
        assert_eq!(population_variance(std::iter::empty()), None);
        assert_eq!(population_variance([5usize].into_iter()), Some(0.0));
        // mean 5, deviations 3,1,1,1,0,0,2,4 -> squares sum 32, /8 = 4
        let v = population_variance([2usize, 4, 4, 4, 5, 5, 7, 9].into_iter()).unwrap();
        assert!((v - 4.0).abs() < f64::EPSILON);
    }
}
