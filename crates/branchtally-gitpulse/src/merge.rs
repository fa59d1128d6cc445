//! Merge commit classification.
//!
//! A commit with more than one parent is always a merge. Single-parent
//! commits are classified by message keywords, which catches squash and
//! rebase-style merges at the cost of occasional false positives such as
//! "fix the merged config loader".

/// Lower-case message fragments that mark a commit as a merge.
pub const MERGE_MESSAGE_MARKERS: &[&str] = &[
    "merge pull request",
    "merge branch",
    "merge remote",
    "merge from",
    "merge into",
    "merge:",
    "merged",
    "merging",
];

/// Whether a commit should be treated as a merge.
///
/// # Examples
///
/// ```
/// use branchtally_gitpulse::merge::is_merge;
///
/// assert!(is_merge(2, "anything"));
/// assert!(is_merge(1, "Merge pull request #42 from octo/feature"));
/// assert!(!is_merge(1, "fix: auth bug"));
/// ```
pub fn is_merge(parent_count: usize, message: &str) -> bool {
    if parent_count > 1 {
        return true;
    }
    let message = message.to_lowercase();
    MERGE_MESSAGE_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
