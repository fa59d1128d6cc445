use std::fmt;

use branchtally_core::{CommitRecord, TallyError, TimeRange, UNKNOWN_AUTHOR};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Deserialize;
use tracing::{debug, warn};

/// A GitHub repository, `owner/name`.
///
/// # Examples
///
/// ```
/// use branchtally_github::client::RepoRef;
///
/// let repo = RepoRef::parse("api", Some("acme")).unwrap();
/// assert_eq!(repo.to_string(), "acme/api");
///
/// let repo = RepoRef::parse("octo/web", Some("acme")).unwrap();
/// assert_eq!(repo.owner, "octo");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    /// User or organization.
    pub owner: String,
    /// Repository name.
    pub name: String,
}

impl RepoRef {
    /// Parse `owner/name`, or a bare `name` owned by `default_owner`.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Config`] if the reference is malformed or a bare
    /// name has no owner to fall back on.
    pub fn parse(reference: &str, default_owner: Option<&str>) -> Result<Self, TallyError> {
        let reference = reference.trim();
        let (owner, name) = match reference.split_once('/') {
            Some((owner, name)) => (owner.to_string(), name.to_string()),
            None => {
                let Some(owner) = default_owner else {
                    return Err(TallyError::Config(format!(
                        "repository '{reference}' has no owner; use owner/repo or set an organization"
                    )));
                };
                (owner.to_string(), reference.to_string())
            }
        };
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(TallyError::Config(format!(
                "invalid repository reference '{reference}', expected owner/repo"
            )));
        }
        Ok(Self { owner, name })
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// GitHub REST client producing per-branch commit streams.
pub struct GitHubClient {
    octocrab: octocrab::Octocrab,
    per_page: u8,
}

impl GitHubClient {
    /// Create a client from an explicit token or the `GITHUB_TOKEN` /
    /// `GH_TOKEN` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::Config`] if no token is available, or
    /// [`TallyError::GitHub`] if the client cannot be built.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use branchtally_github::client::GitHubClient;
    ///
    /// let client = GitHubClient::new(Some("ghp_xxxx"), 100).unwrap();
    /// ```
    pub fn new(token: Option<&str>, per_page: u8) -> Result<Self, TallyError> {
        let token = resolve_token(token)?;
        let octocrab = octocrab::Octocrab::builder()
            .personal_token(token)
            .build()
            .map_err(|e| TallyError::GitHub(format!("failed to create GitHub client: {e}")))?;

        Ok(Self {
            octocrab,
            per_page: per_page.clamp(1, 100),
        })
    }

    /// Check that the repository exists and the token can read it.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::GitHub`] on authentication or not-found errors.
    pub async fn verify_repository(&self, repo: &RepoRef) -> Result<(), TallyError> {
        let route = format!("/repos/{}/{}", repo.owner, repo.name);
        let _repo: IgnoredAny = self
            .octocrab
            .get(route, None::<&()>)
            .await
            .map_err(|e| TallyError::GitHub(format!("cannot access {repo}: {e}")))?;
        Ok(())
    }

    /// All branch names of `repo`, in API order.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::GitHub`] on network or API errors.
    pub async fn list_branches(&self, repo: &RepoRef) -> Result<Vec<String>, TallyError> {
        let route = format!("/repos/{}/{}/branches", repo.owner, repo.name);
        let items: Vec<BranchItem> = self.paginate(&route, Vec::new()).await?;
        debug!(repo = %repo, branches = items.len(), "listed branches");
        Ok(items.into_iter().map(|b| b.name).collect())
    }

    /// Commits reachable from `branch`, newest first, restricted to `range`.
    ///
    /// Bounds are pushed to the API; the exclusive end is re-checked locally
    /// because the API treats `until` as inclusive.
    ///
    /// # Errors
    ///
    /// Returns [`TallyError::GitHub`] on network or API errors.
    pub async fn branch_commits(
        &self,
        repo: &RepoRef,
        branch: &str,
        range: &TimeRange,
    ) -> Result<Vec<CommitRecord>, TallyError> {
        let route = format!("/repos/{}/{}/commits", repo.owner, repo.name);
        let items: Vec<CommitItem> = self
            .paginate(&route, commit_filters(branch, range))
            .await?;

        let records: Vec<CommitRecord> = items
            .into_iter()
            .filter_map(|item| item.into_record(branch))
            .filter(|record| range.contains(record.timestamp))
            .collect();
        debug!(repo = %repo, branch, commits = records.len(), "fetched branch");
        Ok(records)
    }

    async fn paginate<T: DeserializeOwned>(
        &self,
        route: &str,
        filters: Vec<(&'static str, String)>,
    ) -> Result<Vec<T>, TallyError> {
        let mut out = Vec::new();
        let mut page = 1u32;
        loop {
            let mut params = filters.clone();
            params.push(("per_page", self.per_page.to_string()));
            params.push(("page", page.to_string()));

            let items: Vec<T> = self
                .octocrab
                .get(route, Some(&params))
                .await
                .map_err(|e| TallyError::GitHub(format!("GET {route} page {page}: {e}")))?;
            let count = items.len();
            out.extend(items);
            if count < self.per_page as usize {
                break;
            }
            page += 1;
        }
        Ok(out)
    }
}

/// Token from `GITHUB_TOKEN`, else `GH_TOKEN`. Blank values count as unset.
pub fn env_token() -> Option<String> {
    first_token(["GITHUB_TOKEN", "GH_TOKEN"].iter().map(|var| std::env::var(var).ok()))
}

/// First candidate that is not blank, trimmed.
///
/// # Examples
///
/// ```
/// use branchtally_github::client::first_token;
///
/// let token = first_token([Some(String::new()), None, Some(" ghp_abc ".into())]);
/// assert_eq!(token.as_deref(), Some("ghp_abc"));
/// ```
pub fn first_token(candidates: impl IntoIterator<Item = Option<String>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

fn resolve_token(explicit: Option<&str>) -> Result<String, TallyError> {
    let token = match explicit {
        Some(t) => t.trim().to_string(),
        None => env_token().ok_or_else(|| {
            TallyError::Config(
                "GITHUB_TOKEN not set. Pass --github-token or set GITHUB_TOKEN env var".into(),
            )
        })?,
    };
    if token.is_empty() {
        return Err(TallyError::Config("GitHub token is empty".into()));
    }
    Ok(token)
}

fn commit_filters(branch: &str, range: &TimeRange) -> Vec<(&'static str, String)> {
    let mut filters = vec![("sha", branch.to_string())];
    if let Some(start) = range.start {
        filters.push(("since", start.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    if let Some(end) = range.end {
        filters.push(("until", end.to_rfc3339_opts(SecondsFormat::Secs, true)));
    }
    filters
}

#[derive(Debug, Deserialize)]
struct BranchItem {
    name: String,
}

/// One entry of `GET /repos/{owner}/{repo}/commits`.
#[derive(Debug, Deserialize)]
struct CommitItem {
    sha: String,
    /// Platform account; null when the email maps to no user.
    author: Option<AccountItem>,
    commit: CommitDetail,
    #[serde(default)]
    parents: Vec<IgnoredAny>,
}

#[derive(Debug, Deserialize)]
struct AccountItem {
    login: String,
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    message: String,
    author: Option<GitActor>,
    tree: TreeItem,
}

#[derive(Debug, Deserialize)]
struct GitActor {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    sha: String,
}

impl CommitItem {
    /// Records without an author date cannot be attributed and are dropped.
    fn into_record(self, branch: &str) -> Option<CommitRecord> {
        let Some(timestamp) = self.commit.author.and_then(|a| a.date) else {
            warn!(branch, commit = %self.sha, "dropping commit without author date");
            return None;
        };
        Some(CommitRecord {
            commit_hash: self.sha,
            tree_hash: self.commit.tree.sha,
            author: self
                .author
                .map(|a| a.login)
                .unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
            message: self.commit.message,
            timestamp,
            parent_count: self.parents.len(),
            branch: branch.to_string(),
        })
    }
}
