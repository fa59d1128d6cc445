//! Cross-branch commit aggregation.
//!
//! Folds per-branch commit streams into per-author statistics. Each unique
//! commit (by [`CommitIdentityKey`]) is credited to the first branch, in
//! processing order, that contributes it. Reordering branches changes which
//! branch gets the credit for shared commits but never the unique counts.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use branchtally_core::{CommitRecord, IdentityPolicy, TallyError, TimeRange};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::identity::{identity_key, CommitIdentityKey};
use crate::merge::is_merge;

/// Options fixed for one aggregation run.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::aggregate::AggregateOptions;
/// use branchtally_core::IdentityPolicy;
///
/// let opts = AggregateOptions::default();
/// assert!(opts.exclude_merges);
/// assert_eq!(opts.identity, IdentityPolicy::Content);
/// assert!(opts.time_range.is_unbounded());
/// ```
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    /// Drop merge commits before counting (default: true).
    pub exclude_merges: bool,
    /// Identity policy for deduplication (default: content).
    pub identity: IdentityPolicy,
    /// Only count records inside this window (default: unbounded).
    pub time_range: TimeRange,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            exclude_merges: true,
            identity: IdentityPolicy::default(),
            time_range: TimeRange::all_time(),
        }
    }
}

/// Per-author statistics.
///
/// `total_commits` counts every record (duplicates across branches
/// included); `unique_commits` counts identity keys first seen for this
/// author.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::aggregate::UserStats;
///
/// let stats = UserStats::default();
/// assert_eq!(stats.total_commits, 0);
/// assert!(stats.first_commit_at.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    /// Records attributed to the author, before deduplication.
    pub total_commits: u64,
    /// Distinct identity keys first attributed to the author.
    pub unique_commits: u64,
    /// Branches with at least one of the author's records.
    pub branches_touched: BTreeSet<String>,
    /// Records per branch, before deduplication.
    pub commits_by_branch: BTreeMap<String, u64>,
    /// First-seen unique commits credited to each branch.
    pub unique_commits_by_branch: BTreeMap<String, u64>,
    /// Earliest author date seen.
    pub first_commit_at: Option<DateTime<Utc>>,
    /// Latest author date seen.
    pub last_commit_at: Option<DateTime<Utc>>,
}

impl UserStats {
    fn observe(&mut self, branch: &str, timestamp: DateTime<Utc>) {
        self.total_commits += 1;
        if !self.branches_touched.contains(branch) {
            self.branches_touched.insert(branch.to_string());
        }
        *self
            .commits_by_branch
            .entry(branch.to_string())
            .or_default() += 1;
        if self.first_commit_at.map_or(true, |first| timestamp < first) {
            self.first_commit_at = Some(timestamp);
        }
        if self.last_commit_at.map_or(true, |last| timestamp > last) {
            self.last_commit_at = Some(timestamp);
        }
    }

    fn credit_unique(&mut self, branch: &str) {
        self.unique_commits += 1;
        *self
            .unique_commits_by_branch
            .entry(branch.to_string())
            .or_default() += 1;
    }

    /// Share of this author's unique commits credited to `branch`, in percent.
    pub fn unique_share(&self, branch: &str) -> f64 {
        if self.unique_commits == 0 {
            return 0.0;
        }
        let credited = self.unique_commits_by_branch.get(branch).copied().unwrap_or(0);
        credited as f64 / self.unique_commits as f64 * 100.0
    }
}

/// Result of one aggregation run.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::aggregate::{aggregate, AggregateOptions};
/// use branchtally_core::CommitRecord;
///
/// let result = aggregate(
///     &[],
///     |_branch: &str| Ok::<_, branchtally_core::TallyError>(Vec::<CommitRecord>::new()),
///     &AggregateOptions::default(),
/// );
/// assert_eq!(result.unique_commits, 0);
/// assert!(result.user_stats.is_empty());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateResult {
    /// Distinct identity keys across all authors.
    pub unique_commits: usize,
    /// Branches processed, failed ones included.
    pub total_branches: usize,
    /// Statistics keyed by author.
    pub user_stats: BTreeMap<String, UserStats>,
    /// Records dropped as merge commits.
    pub merges_excluded: usize,
    /// Records dropped by the time window.
    pub out_of_range: usize,
    /// Branches whose commit stream could not be fetched, in processing order.
    pub failed_branches: Vec<String>,
}

impl AggregateResult {
    /// Authors ordered by unique commits (descending), then name.
    pub fn ranked_users(&self) -> Vec<(&str, &UserStats)> {
        let mut users: Vec<(&str, &UserStats)> = self
            .user_stats
            .iter()
            .map(|(name, stats)| (name.as_str(), stats))
            .collect();
        users.sort_by(|a, b| {
            b.1.unique_commits
                .cmp(&a.1.unique_commits)
                .then_with(|| a.0.cmp(b.0))
        });
        users
    }

    /// Number of authors with at least one counted record.
    pub fn active_contributors(&self) -> usize {
        self.user_stats.len()
    }
}

/// What one branch contributed to the fold.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchSummary {
    /// Records counted toward `total_commits`.
    pub counted: usize,
    /// Records whose identity key was new.
    pub new_unique: usize,
    /// Records dropped as merges.
    pub merges_excluded: usize,
    /// Records dropped by the time window.
    pub out_of_range: usize,
}

/// Incremental aggregation state for one run.
///
/// Branches must be fed in processing order; the state is owned by a single
/// writer.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::aggregate::{Aggregator, AggregateOptions};
///
/// let mut agg = Aggregator::new(AggregateOptions::default());
/// agg.ingest_branch("main", Vec::new());
/// let result = agg.finish();
/// assert_eq!(result.total_branches, 1);
/// ```
#[derive(Debug)]
pub struct Aggregator {
    options: AggregateOptions,
    seen: HashSet<CommitIdentityKey>,
    result: AggregateResult,
}

impl Aggregator {
    /// Start an empty run.
    pub fn new(options: AggregateOptions) -> Self {
        Self {
            options,
            seen: HashSet::new(),
            result: AggregateResult::default(),
        }
    }

    /// Fold one branch's records, in the order given.
    pub fn ingest_branch<I>(&mut self, branch: &str, records: I) -> BranchSummary
    where
        I: IntoIterator<Item = CommitRecord>,
    {
        self.result.total_branches += 1;
        let mut summary = BranchSummary::default();

        for record in records {
            if !self.options.time_range.contains(record.timestamp) {
                summary.out_of_range += 1;
                continue;
            }
            if self.options.exclude_merges && is_merge(record.parent_count, &record.message) {
                summary.merges_excluded += 1;
                continue;
            }

            let key = identity_key(&record, self.options.identity);
            let stats = self
                .result
                .user_stats
                .entry(record.author.clone())
                .or_default();
            stats.observe(branch, record.timestamp);
            summary.counted += 1;

            if self.seen.insert(key) {
                stats.credit_unique(branch);
                summary.new_unique += 1;
            }
        }

        self.result.merges_excluded += summary.merges_excluded;
        self.result.out_of_range += summary.out_of_range;
        if summary.merges_excluded > 0 {
            debug!(branch, excluded = summary.merges_excluded, "excluded merge commits");
        }
        debug!(
            branch,
            counted = summary.counted,
            new_unique = summary.new_unique,
            "branch aggregated"
        );
        summary
    }

    /// Record a branch whose commit stream could not be obtained. It
    /// contributes no records; the run continues.
    pub fn record_failure(&mut self, branch: &str, error: &TallyError) {
        warn!(branch, error = %error, "skipping branch");
        self.result.total_branches += 1;
        self.result.failed_branches.push(branch.to_string());
    }

    /// Close the run and return its statistics.
    pub fn finish(mut self) -> AggregateResult {
        self.result.unique_commits = self.seen.len();
        self.result
    }
}

/// Aggregate commits across `branches`, processed in the given order.
///
/// `provider` yields the commit stream of one branch; a provider error
/// makes that branch contribute nothing and is listed in
/// [`AggregateResult::failed_branches`].
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::aggregate::{aggregate, AggregateOptions};
/// use branchtally_core::{CommitRecord, TallyError};
/// use chrono::Utc;
///
/// let commit = |branch: &str| CommitRecord {
///     commit_hash: "c1".into(),
///     tree_hash: "t1".into(),
///     author: "alice".into(),
///     message: "fix bug".into(),
///     timestamp: Utc::now(),
///     parent_count: 1,
///     branch: branch.into(),
/// };
/// let branches = vec!["main".to_string(), "dev".to_string()];
/// let result = aggregate(
///     &branches,
///     |b: &str| Ok::<_, TallyError>(vec![commit(b)]),
///     &AggregateOptions::default(),
/// );
/// let alice = &result.user_stats["alice"];
/// assert_eq!(result.unique_commits, 1);
/// assert_eq!(alice.total_commits, 2);
/// assert_eq!(alice.unique_commits_by_branch["main"], 1);
/// ```
pub fn aggregate<F, I>(branches: &[String], mut provider: F, options: &AggregateOptions) -> AggregateResult
where
    F: FnMut(&str) -> Result<I, TallyError>,
    I: IntoIterator<Item = CommitRecord>,
{
    let mut aggregator = Aggregator::new(options.clone());
    for branch in branches {
        match provider(branch) {
            Ok(records) => {
                aggregator.ingest_branch(branch, records);
            }
            Err(e) => aggregator.record_failure(branch, &e),
        }
    }
    aggregator.finish()
}
