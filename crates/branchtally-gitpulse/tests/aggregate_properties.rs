use std::collections::BTreeMap;

use branchtally_core::{CommitRecord, IdentityPolicy, TallyError};
use branchtally_gitpulse::aggregate::{aggregate, AggregateOptions, AggregateResult};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;

const AUTHORS: &[&str] = &["alice", "bob", "carol"];
const MESSAGES: &[&str] = &["fix bug", "add feature", "Merge branch 'x'", "refactor"];

fn record_strategy() -> impl Strategy<Value = CommitRecord> {
    (0..AUTHORS.len(), 0..MESSAGES.len(), 0u8..4, 0u8..6, 1usize..3, 0i64..100_000).prop_map(
        |(author, message, tree, hash, parents, ts)| CommitRecord {
            commit_hash: format!("c{hash}"),
            tree_hash: format!("t{tree}"),
            author: AUTHORS[author].to_string(),
            message: MESSAGES[message].to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000 + ts, 0).unwrap(),
            parent_count: parents,
            branch: String::new(),
        },
    )
}

fn streams_strategy() -> impl Strategy<Value = BTreeMap<String, Vec<CommitRecord>>> {
    prop::collection::btree_map(
        "[a-e]{1,3}",
        prop::collection::vec(record_strategy(), 0..12),
        0..5,
    )
}

fn options_strategy() -> impl Strategy<Value = AggregateOptions> {
    (any::<bool>(), any::<bool>()).prop_map(|(exclude_merges, hash)| AggregateOptions {
        exclude_merges,
        identity: if hash {
            IdentityPolicy::Hash
        } else {
            IdentityPolicy::Content
        },
        ..AggregateOptions::default()
    })
}

fn run(
    order: &[String],
    streams: &BTreeMap<String, Vec<CommitRecord>>,
    options: &AggregateOptions,
) -> AggregateResult {
    aggregate(
        order,
        |b: &str| {
            streams
                .get(b)
                .cloned()
                .ok_or_else(|| TallyError::GitHub(format!("unknown branch {b}")))
        },
        options,
    )
}

proptest! {
    #[test]
    fn per_user_invariants_hold(streams in streams_strategy(), options in options_strategy()) {
        let order: Vec<String> = streams.keys().cloned().collect();
        let result = run(&order, &streams, &options);

        let mut unique_sum = 0u64;
        for stats in result.user_stats.values() {
            prop_assert!(stats.unique_commits <= stats.total_commits);
            prop_assert_eq!(stats.unique_commits_by_branch.values().sum::<u64>(), stats.unique_commits);
            prop_assert_eq!(stats.commits_by_branch.values().sum::<u64>(), stats.total_commits);
            for (branch, count) in &stats.commits_by_branch {
                prop_assert!(*count > 0);
                prop_assert!(stats.branches_touched.contains(branch));
            }
            prop_assert_eq!(stats.branches_touched.len(), stats.commits_by_branch.len());
            if let (Some(first), Some(last)) = (stats.first_commit_at, stats.last_commit_at) {
                prop_assert!(first <= last);
            }
            unique_sum += stats.unique_commits;
        }
        prop_assert_eq!(unique_sum as usize, result.unique_commits);
    }

    #[test]
    fn branch_order_changes_credit_not_counts(
        streams in streams_strategy(),
        options in options_strategy(),
    ) {
        let order: Vec<String> = streams.keys().cloned().collect();
        let reversed: Vec<String> = order.iter().rev().cloned().collect();
        let forward = run(&order, &streams, &options);
        let backward = run(&reversed, &streams, &options);

        prop_assert_eq!(forward.unique_commits, backward.unique_commits);
        prop_assert_eq!(forward.user_stats.len(), backward.user_stats.len());
        for (user, stats) in &forward.user_stats {
            let other = &backward.user_stats[user];
            prop_assert_eq!(stats.unique_commits, other.unique_commits);
            prop_assert_eq!(stats.total_commits, other.total_commits);
            prop_assert_eq!(&stats.commits_by_branch, &other.commits_by_branch);
        }
    }

    #[test]
    fn aggregation_is_idempotent(streams in streams_strategy(), options in options_strategy()) {
        let order: Vec<String> = streams.keys().cloned().collect();
        prop_assert_eq!(run(&order, &streams, &options), run(&order, &streams, &options));
    }
}

#[test]
fn shared_commit_is_credited_to_whichever_branch_runs_first() {
    let shared = CommitRecord {
        commit_hash: "x".into(),
        tree_hash: "tx".into(),
        author: "alice".into(),
        message: "shared change".into(),
        timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
        parent_count: 1,
        branch: String::new(),
    };
    let mut streams = BTreeMap::new();
    streams.insert("A".to_string(), vec![shared.clone()]);
    streams.insert("B".to_string(), vec![shared]);

    let ab = run(&["A".into(), "B".into()], &streams, &AggregateOptions::default());
    let ba = run(&["B".into(), "A".into()], &streams, &AggregateOptions::default());

    assert_eq!(ab.user_stats["alice"].unique_commits_by_branch["A"], 1);
    assert!(!ab.user_stats["alice"].unique_commits_by_branch.contains_key("B"));
    assert_eq!(ba.user_stats["alice"].unique_commits_by_branch["B"], 1);
    assert!(!ba.user_stats["alice"].unique_commits_by_branch.contains_key("A"));
    assert_eq!(ab.unique_commits, 1);
    assert_eq!(ba.unique_commits, 1);
}
