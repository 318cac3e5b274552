use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::forge::{Forge, ForgeError, RepoId, TreeEntry, TreeEntryKind};

const DEFAULT_API_ROOT: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("rtd-config-assistant/", env!("CARGO_PKG_VERSION"));

// Forked repositories become visible asynchronously; poll a few times
// before giving up.
const FORK_VISIBILITY_ATTEMPTS: u32 = 10;
const FORK_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct RepoResponse {
    name: String,
    owner: OwnerResponse,
    default_branch: String,
}

#[derive(Debug, Deserialize)]
struct OwnerResponse {
    login: String,
}

#[derive(Debug, Deserialize)]
struct BranchResponse {
    commit: CommitRef,
}

#[derive(Debug, Deserialize)]
struct CommitRef {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
}

#[derive(Debug, Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ContentsResponse {
    content: String,
    sha: String,
}

#[derive(Debug, Deserialize)]
struct PullResponse {
    html_url: String,
}

/// GitHub REST implementation of the [`Forge`] boundary.
pub struct GitHubForge {
    client: reqwest::Client,
    api_root: String,
    token: String,
}

impl GitHubForge {
    pub fn new(token: impl Into<String>) -> Self {
        Self::with_api_root(DEFAULT_API_ROOT, token)
    }

    pub fn with_api_root(api_root: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_root: api_root.into(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_root, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .header(reqwest::header::ACCEPT, "application/vnd.github+json")
    }

    async fn get_repo(&self, repo: &RepoId) -> Result<RepoResponse, ForgeError> {
        let response = self
            .request(reqwest::Method::GET, &format!("/repos/{repo}"))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ForgeError::NotFound {
                resource: format!("repository {repo}"),
            });
        }
        Ok(response.error_for_status()?.json().await?)
    }

    async fn get_contents(&self, repo: &RepoId, path: &str) -> Result<ContentsResponse, ForgeError> {
        let response = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{repo}/contents/{path}"),
            )
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ForgeError::NotFound {
                resource: format!("{repo}:{path}"),
            });
        }
        Ok(response.error_for_status()?.json().await?)
    }
}

/// Decodes a contents-API blob: base64 text wrapped with newlines.
pub(crate) fn decode_blob(content: &str) -> Result<String, ForgeError> {
    let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = BASE64
        .decode(compact.as_bytes())
        .map_err(|err| ForgeError::Protocol(format!("blob is not valid base64: {err}")))?;
    String::from_utf8(bytes)
        .map_err(|err| ForgeError::Protocol(format!("blob is not valid UTF-8: {err}")))
}

#[async_trait]
impl Forge for GitHubForge {
    async fn default_branch_tip(&self, repo: &RepoId) -> Result<(String, String), ForgeError> {
        let repository = self.get_repo(repo).await?;
        let branch: BranchResponse = self
            .request(
                reqwest::Method::GET,
                &format!("/repos/{repo}/branches/{}", repository.default_branch),
            )
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok((repository.default_branch, branch.commit.sha))
    }

    async fn tree(&self, repo: &RepoId, sha: &str) -> Result<Vec<TreeEntry>, ForgeError> {
        let response: TreeResponse = self
            .request(reqwest::Method::GET, &format!("/repos/{repo}/git/trees/{sha}"))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response
            .tree
            .into_iter()
            .map(|item| TreeEntry {
                path: item.path,
                kind: match item.kind.as_str() {
                    "blob" => TreeEntryKind::Blob,
                    "tree" => TreeEntryKind::Tree,
                    _ => TreeEntryKind::Other,
                },
                sha: item.sha,
            })
            .collect())
    }

    async fn fetch_file(&self, repo: &RepoId, path: &str) -> Result<String, ForgeError> {
        let contents = self.get_contents(repo, path).await?;
        decode_blob(&contents.content)
    }

    async fn fork(&self, repo: &RepoId) -> Result<RepoId, ForgeError> {
        // GitHub answers 202 and creates the fork in the background.
        let response: RepoResponse = self
            .request(reqwest::Method::POST, &format!("/repos/{repo}/forks"))
            .json(&json!({}))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        let fork = RepoId::new(response.owner.login, response.name);

        for attempt in 1..=FORK_VISIBILITY_ATTEMPTS {
            match self.get_repo(&fork).await {
                Ok(_) => {
                    info!(fork = %fork, "fork is visible");
                    return Ok(fork);
                }
                Err(ForgeError::NotFound { .. }) => {
                    debug!(fork = %fork, attempt, "fork not visible yet");
                    tokio::time::sleep(FORK_POLL_INTERVAL).await;
                }
                Err(err) => return Err(err),
            }
        }
        Err(ForgeError::ForkUnavailable(repo.full_name()))
    }

    async fn create_branch(
        &self,
        repo: &RepoId,
        branch: &str,
        sha: &str,
    ) -> Result<(), ForgeError> {
        self.request(reqwest::Method::POST, &format!("/repos/{repo}/git/refs"))
            .json(&json!({
                "ref": format!("refs/heads/{branch}"),
                "sha": sha,
            }))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn update_file(
        &self,
        repo: &RepoId,
        path: &str,
        contents: &str,
        message: &str,
        branch: &str,
    ) -> Result<(), ForgeError> {
        // The contents API wants the current blob SHA for an update.
        let current = self.get_contents(repo, path).await?;
        self.request(
            reqwest::Method::PUT,
            &format!("/repos/{repo}/contents/{path}"),
        )
        .json(&json!({
            "message": message,
            "content": BASE64.encode(contents.as_bytes()),
            "sha": current.sha,
            "branch": branch,
        }))
        .send()
        .await?
        .error_for_status()?;
        Ok(())
    }

    async fn open_pull_request(
        &self,
        base: &RepoId,
        title: &str,
        body: &str,
        head: &str,
        base_branch: &str,
    ) -> Result<String, ForgeError> {
        let response: PullResponse = self
            .request(reqwest::Method::POST, &format!("/repos/{base}/pulls"))
            .json(&json!({
                "title": title,
                "body": body,
                "head": head,
                "base": base_branch,
            }))
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(response.html_url)
    }
}
