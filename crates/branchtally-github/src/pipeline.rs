//! Concurrent branch fetching folded in deterministic order.
//!
//! Branch streams are fetched up to `concurrency` at a time, but results
//! are consumed strictly in branch order, so first-seen credit is the same
//! as a sequential run.

use std::future::Future;

use branchtally_core::{CommitRecord, TallyError};
use branchtally_gitpulse::aggregate::{AggregateOptions, AggregateResult, Aggregator, BranchSummary};
use futures::stream::{self, StreamExt};
use tracing::warn;

use crate::client::{GitHubClient, RepoRef};

/// Aggregate `branches` with a concurrent fetcher.
///
/// `on_branch` is called once per branch, in order, after it has been
/// folded; `None` means the fetch failed.
///
/// # Examples
///
/// ```
/// use branchtally_core::{CommitRecord, TallyError};
/// use branchtally_gitpulse::aggregate::AggregateOptions;
/// use branchtally_github::pipeline::tally_branches;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let branches = vec!["main".to_string()];
/// let result = tally_branches(
///     &branches,
///     4,
///     AggregateOptions::default(),
///     |_branch| async { Ok::<Vec<CommitRecord>, TallyError>(Vec::new()) },
///     |_, _| {},
/// )
/// .await;
/// assert_eq!(result.total_branches, 1);
/// # }
/// ```
pub async fn tally_branches<F, Fut, P>(
    branches: &[String],
    concurrency: usize,
    options: AggregateOptions,
    mut fetch: F,
    mut on_branch: P,
) -> AggregateResult
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<CommitRecord>, TallyError>>,
    P: FnMut(&str, Option<&BranchSummary>),
{
    let mut aggregator = Aggregator::new(options);
    let mut fetched = stream::iter(branches.iter().cloned())
        .map(|branch| {
            let pending = fetch(branch.clone());
            async move { (branch, pending.await) }
        })
        .buffered(concurrency.max(1));

    while let Some((branch, outcome)) = fetched.next().await {
        match outcome {
            Ok(records) => {
                let summary = aggregator.ingest_branch(&branch, records);
                on_branch(&branch, Some(&summary));
            }
            Err(e) => {
                aggregator.record_failure(&branch, &e);
                on_branch(&branch, None);
            }
        }
    }
    aggregator.finish()
}

/// Every record authored by `user` across `branches`, without
/// deduplication, in branch order. Failing branches are skipped.
pub async fn collect_user_commits<F, Fut>(
    branches: &[String],
    concurrency: usize,
    user: &str,
    mut fetch: F,
) -> Vec<CommitRecord>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = Result<Vec<CommitRecord>, TallyError>>,
{
    let mut fetched = stream::iter(branches.iter().cloned())
        .map(|branch| {
            let pending = fetch(branch.clone());
            async move { (branch, pending.await) }
        })
        .buffered(concurrency.max(1));

    let mut commits = Vec::new();
    while let Some((branch, outcome)) = fetched.next().await {
        match outcome {
            Ok(records) => commits.extend(records.into_iter().filter(|c| c.author == user)),
            Err(e) => warn!(branch = %branch, error = %e, "skipping branch"),
        }
    }
    commits
}

impl GitHubClient {
    /// Aggregate the given branches of `repo`.
    pub async fn tally_repository<P>(
        &self,
        repo: &RepoRef,
        branches: &[String],
        concurrency: usize,
        options: AggregateOptions,
        on_branch: P,
    ) -> AggregateResult
    where
        P: FnMut(&str, Option<&BranchSummary>),
    {
        let range = options.time_range.clone();
        let range = &range;
        tally_branches(
            branches,
            concurrency,
            options,
            move |branch| async move { self.branch_commits(repo, &branch, range).await },
            on_branch,
        )
        .await
    }

    /// Every commit by `user` on the given branches of `repo`.
    pub async fn user_commits(
        &self,
        repo: &RepoRef,
        branches: &[String],
        concurrency: usize,
        user: &str,
    ) -> Vec<CommitRecord> {
        let all_time = branchtally_core::TimeRange::all_time();
        let all_time = &all_time;
        collect_user_commits(branches, concurrency, user, move |branch| async move {
            self.branch_commits(repo, &branch, all_time).await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;

    fn record(author: &str, message: &str, tree: &str) -> CommitRecord {
        CommitRecord {
            commit_hash: format!("{author}-{message}-{tree}"),
            tree_hash: tree.into(),
            author: author.into(),
            message: message.into(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            parent_count: 1,
            branch: String::new(),
        }
    }

    fn streams() -> HashMap<String, Vec<CommitRecord>> {
        let mut m = HashMap::new();
        m.insert(
            "main".to_string(),
            vec![record("alice", "fix bug", "t1"), record("bob", "docs", "t4")],
        );
        m.insert(
            "dev".to_string(),
            vec![record("alice", "fix bug", "t1"), record("alice", "add feature", "t2")],
        );
        m.insert("hotfix".to_string(), vec![record("carol", "patch", "t3")]);
        m
    }

    /// Earlier branches sleep longer, so completion order is reversed.
    async fn slow_fetch(
        streams: &HashMap<String, Vec<CommitRecord>>,
        order: &[String],
        branch: String,
    ) -> Result<Vec<CommitRecord>, TallyError> {
        let pos = order.iter().position(|b| *b == branch).unwrap_or(0);
        let delay = (order.len() - pos) as u64 * 15;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        streams
            .get(&branch)
            .cloned()
            .ok_or_else(|| TallyError::GitHub(format!("404 for {branch}")))
    }

    #[tokio::test]
    async fn credit_follows_branch_order_not_completion_order() {
        let streams = streams();
        let order: Vec<String> = vec!["main".into(), "dev".into(), "hotfix".into()];
        let mut visited = Vec::new();

        let result = tally_branches(
            &order,
            3,
            AggregateOptions::default(),
            |b| slow_fetch(&streams, &order, b),
            |b, _| visited.push(b.to_string()),
        )
        .await;

        assert_eq!(visited, order);
        assert_eq!(result.unique_commits, 4);
        let alice = &result.user_stats["alice"];
        assert_eq!(alice.total_commits, 3);
        assert_eq!(alice.unique_commits, 2);
        assert_eq!(alice.unique_commits_by_branch["main"], 1);
        assert_eq!(alice.unique_commits_by_branch["dev"], 1);
    }

    #[tokio::test]
    async fn concurrency_does_not_change_the_result() {
        let streams = streams();
        let order: Vec<String> = vec!["dev".into(), "hotfix".into(), "main".into()];

        let sequential = tally_branches(
            &order,
            1,
            AggregateOptions::default(),
            |b| slow_fetch(&streams, &order, b),
            |_, _| {},
        )
        .await;
        let concurrent = tally_branches(
            &order,
            8,
            AggregateOptions::default(),
            |b| slow_fetch(&streams, &order, b),
            |_, _| {},
        )
        .await;

        assert_eq!(sequential, concurrent);
        assert_eq!(sequential.user_stats["alice"].unique_commits_by_branch["dev"], 2);
    }

    #[tokio::test]
    async fn failed_fetch_is_recorded_and_run_continues() {
        let streams = streams();
        let order: Vec<String> = vec!["main".into(), "gone".into(), "dev".into()];
        let mut failures = 0;

        let result = tally_branches(
            &order,
            2,
            AggregateOptions::default(),
            |b| slow_fetch(&streams, &order, b),
            |_, summary| {
                if summary.is_none() {
                    failures += 1;
                }
            },
        )
        .await;

        assert_eq!(failures, 1);
        assert_eq!(result.failed_branches, vec!["gone".to_string()]);
        assert_eq!(result.total_branches, 3);
        assert_eq!(result.user_stats["alice"].unique_commits, 2);
    }

    #[tokio::test]
    async fn fetches_overlap_up_to_the_limit() {
        let order: Vec<String> = (0..6).map(|i| format!("b{i}")).collect();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        tally_branches(
            &order,
            3,
            AggregateOptions::default(),
            |_| {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                async move {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok::<Vec<CommitRecord>, TallyError>(Vec::new())
                }
            },
            |_, _| {},
        )
        .await;

        let peak = peak.load(Ordering::SeqCst);
        assert!(peak > 1, "fetches never overlapped");
        assert!(peak <= 3, "more than 3 fetches in flight: {peak}");
    }

    #[tokio::test]
    async fn user_commits_skip_failures_and_keep_duplicates() {
        let streams = streams();
        let order: Vec<String> = vec!["main".into(), "missing".into(), "dev".into()];

        let commits =
            collect_user_commits(&order, 2, "alice", |b| slow_fetch(&streams, &order, b)).await;

        assert_eq!(commits.len(), 3);
        assert!(commits.iter().all(|c| c.author == "alice"));
        assert_eq!(commits[0].message, "fix bug");
        assert_eq!(commits[2].message, "add feature");
    }
}
