//! Commit identity keys for cross-branch deduplication.

use branchtally_core::{CommitRecord, IdentityPolicy};

/// Key deciding whether two records are the same logical commit.
///
/// `object` is the tree id under [`IdentityPolicy::Content`] and the commit
/// id under [`IdentityPolicy::Hash`]. Messages are compared byte for byte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommitIdentityKey {
    /// Commit author.
    pub author: String,
    /// Full commit message.
    pub message: String,
    /// Tree or commit id, depending on policy.
    pub object: String,
}

/// Derive the identity key of `record` under `policy`.
///
/// # Examples
///
/// ```
/// use branchtally_core::{CommitRecord, IdentityPolicy};
/// use branchtally_gitpulse::identity::identity_key;
/// use chrono::Utc;
///
/// let record = CommitRecord {
///     commit_hash: "c1".into(),
///     tree_hash: "t1".into(),
///     author: "alice".into(),
///     message: "fix bug".into(),
///     timestamp: Utc::now(),
///     parent_count: 1,
///     branch: "main".into(),
/// };
/// assert_eq!(identity_key(&record, IdentityPolicy::Content).object, "t1");
/// assert_eq!(identity_key(&record, IdentityPolicy::Hash).object, "c1");
/// ```
pub fn identity_key(record: &CommitRecord, policy: IdentityPolicy) -> CommitIdentityKey {
    let object = match policy {
        IdentityPolicy::Content => &record.tree_hash,
        IdentityPolicy::Hash => &record.commit_hash,
    };
    CommitIdentityKey {
        author: record.author.clone(),
        message: record.message.clone(),
        object: object.clone(),
    }
}
