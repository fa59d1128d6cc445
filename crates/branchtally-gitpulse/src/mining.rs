//! Local commit streams via git2.
//!
//! Lists the local and remote-tracking branches of a repository and walks
//! each branch tip,
//! producing one [`CommitRecord`] per reachable commit.

use std::path::Path;

use branchtally_core::{CommitRecord, Result, TallyError, TimeRange, UNKNOWN_AUTHOR};
use chrono::{DateTime, Utc};
use git2::{BranchType, Repository, Sort};
use tracing::debug;

/// A repository opened for branch mining.
pub struct LocalRepository {
    repo: Repository,
}

impl LocalRepository {
    /// Open the repository at `path` (or the one containing it).
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Git`] if no repository can be found.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use branchtally_gitpulse::mining::LocalRepository;
    ///
    /// let repo = LocalRepository::open(Path::new(".")).unwrap();
    /// for branch in repo.branches().unwrap() {
    ///     println!("{branch}");
    /// }
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)
            .map_err(|e| TallyError::Git(format!("failed to open repository: {e}")))?;
        Ok(Self { repo })
    }

    /// Branch names in processing order.
    ///
    /// Local branches come first, sorted, followed by remote-tracking
    /// branches (`origin/feature`) that have no local branch of the same
    /// name. `main` (or else `master`) leads, local or remote.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Git`] if the branch list cannot be read.
    pub fn branches(&self) -> Result<Vec<String>> {
        let mut local = self.branch_names(BranchType::Local)?;
        local.sort();

        let mut remote: Vec<String> = self
            .branch_names(BranchType::Remote)?
            .into_iter()
            .filter(|name| !name.ends_with("/HEAD"))
            .filter(|name| match name.split_once('/') {
                Some((_, short)) => !local.iter().any(|l| l == short),
                None => true,
            })
            .collect();
        remote.sort();

        let local_count = local.len();
        let mut names = local;
        names.extend(remote);

        // Slashes in local names are part of the name, not a remote prefix.
        let primary = ["main", "master"].into_iter().find_map(|primary| {
            names.iter().enumerate().position(|(idx, n)| {
                n.as_str() == primary
                    || (idx >= local_count
                        && n.split_once('/').is_some_and(|(_, short)| short == primary))
            })
        });
        if let Some(idx) = primary {
            let name = names.remove(idx);
            names.insert(0, name);
        }
        Ok(names)
    }

    fn branch_names(&self, kind: BranchType) -> Result<Vec<String>> {
        let branches = self
            .repo
            .branches(Some(kind))
            .map_err(|e| TallyError::Git(format!("failed to list branches: {e}")))?;

        let mut names = Vec::new();
        for (branch, _) in branches.flatten() {
            if let Ok(Some(name)) = branch.name() {
                names.push(name.to_string());
            }
        }
        Ok(names)
    }

    /// Commits reachable from `branch`, newest first, restricted to `range`.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Git`] if the branch cannot be resolved or walked.
    pub fn branch_commits(
        &self,
        branch: &str,
        range: &TimeRange,
    ) -> Result<Vec<CommitRecord>> {
        let reference = self
            .repo
            .resolve_reference_from_short_name(branch)
            .map_err(|e| TallyError::Git(format!("failed to resolve branch '{branch}': {e}")))?;
        let oid = reference
            .target()
            .ok_or_else(|| TallyError::Git(format!("branch '{branch}' has no target")))?;

        let mut revwalk = self
            .repo
            .revwalk()
            .map_err(|e| TallyError::Git(format!("failed to create revwalk: {e}")))?;
        revwalk.set_sorting(Sort::TIME).ok();
        revwalk
            .push(oid)
            .map_err(|e| TallyError::Git(format!("failed to push oid: {e}")))?;

        let mut commits = Vec::new();
        for oid_result in revwalk {
            let oid = oid_result.map_err(|e| TallyError::Git(format!("revwalk error: {e}")))?;
            let commit = self
                .repo
                .find_commit(oid)
                .map_err(|e| TallyError::Git(format!("failed to find commit: {e}")))?;

            let author = commit.author();
            // Author date, not committer date: rebases keep it stable.
            let Some(timestamp) = DateTime::<Utc>::from_timestamp(author.when().seconds(), 0)
            else {
                debug!(branch, commit = %oid, "skipping commit with unrepresentable date");
                continue;
            };
            if !range.contains(timestamp) {
                continue;
            }

            // Raw bytes: non-UTF-8 names and messages must stay distinct.
            let name = String::from_utf8_lossy(author.name_bytes());
            let name = name.trim();
            commits.push(CommitRecord {
                commit_hash: oid.to_string(),
                tree_hash: commit.tree_id().to_string(),
                author: if name.is_empty() {
                    UNKNOWN_AUTHOR.to_string()
                } else {
                    name.to_string()
                },
                message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
                timestamp,
                parent_count: commit.parent_count(),
                branch: branch.to_string(),
            });
        }

        debug!(branch, commits = commits.len(), "walked branch");
        Ok(commits)
    }

    /// Every record authored by `user` on `branches`, without deduplication.
    ///
    /// Branches that fail to resolve are skipped.
    pub fn user_commits(&self, branches: &[String], user: &str) -> Vec<CommitRecord> {
        let all_time = TimeRange::all_time();
        let mut commits = Vec::new();
        for branch in branches {
            match self.branch_commits(branch, &all_time) {
                Ok(records) => commits.extend(records.into_iter().filter(|c| c.author == user)),
                Err(e) => tracing::warn!(branch = %branch, error = %e, "skipping branch"),
            }
        }
        commits
    }
}
