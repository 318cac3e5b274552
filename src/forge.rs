use std::fmt;

use async_trait::async_trait;
use thiserror::Error;

/// A repository on the code host, identified by owner and name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One entry of a repository tree listing.
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub path: String,
    pub kind: TreeEntryKind,
    pub sha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TreeEntryKind {
    Blob,
    Tree,
    Other,
}

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("request to code host failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("fork of {0} did not become visible in time")]
    ForkUnavailable(String),

    #[error("unexpected response from code host: {0}")]
    Protocol(String),
}

/// The code-hosting collaborator, reduced to the calls the assistant needs.
///
/// Implementations do I/O; everything else in this crate is synchronous
/// computation over values it owns.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Default branch name and the SHA of its tip commit.
    async fn default_branch_tip(&self, repo: &RepoId) -> Result<(String, String), ForgeError>;

    /// Root tree listing at the given commit.
    async fn tree(&self, repo: &RepoId, sha: &str) -> Result<Vec<TreeEntry>, ForgeError>;

    /// Decoded text contents of a file on the default branch.
    async fn fetch_file(&self, repo: &RepoId, path: &str) -> Result<String, ForgeError>;

    /// Forks the repository into the authenticated account. Idempotent:
    /// returns the existing fork if one is already there.
    async fn fork(&self, repo: &RepoId) -> Result<RepoId, ForgeError>;

    async fn create_branch(&self, repo: &RepoId, branch: &str, sha: &str)
        -> Result<(), ForgeError>;

    /// Commits new contents for `path` on `branch`.
    async fn update_file(
        &self,
        repo: &RepoId,
        path: &str,
        contents: &str,
        message: &str,
        branch: &str,
    ) -> Result<(), ForgeError>;

    /// Opens a pull request against `base` and returns its URL. `head` is
    /// in `owner:branch` form.
    async fn open_pull_request(
        &self,
        base: &RepoId,
        title: &str,
        body: &str,
        head: &str,
        base_branch: &str,
    ) -> Result<String, ForgeError>;
}
