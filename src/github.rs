//! GitHub collaborator: pull-request metadata and diff text
//!
//! Two authenticated GETs, nothing more. All review logic lives in the
//! engine; this module only fetches.

use serde::Deserialize;

use crate::error::ReviewError;

const USER_AGENT: &str = concat!("revq/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Deserialize)]
pub struct PullRequest {
    pub title: String,
    pub user: Author,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Author {
    pub login: String,
}

pub struct GitHubClient {
    client: reqwest::Client,
    token: String,
    api_url: String,
}

impl GitHubClient {
    pub fn new(token: impl Into<String>, api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_url: api_url.into(),
        }
    }

    /// Fetch pull-request metadata (title, author) for display
    pub async fn fetch_pull_request(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<PullRequest, ReviewError> {
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.api_url);
        let response = self
            .get(&url, "application/vnd.github.v3+json")
            .await?;
        Ok(response.json().await?)
    }

    /// Fetch the raw diff text for a pull request
    pub async fn fetch_diff(
        &self,
        owner: &str,
        repo: &str,
        number: u64,
    ) -> Result<String, ReviewError> {
        let url = format!("{}/repos/{owner}/{repo}/pulls/{number}", self.api_url);
        let response = self.get(&url, "application/vnd.github.v3.diff").await?;
        Ok(response.text().await?)
    }

    async fn get(&self, url: &str, accept: &str) -> Result<reqwest::Response, ReviewError> {
        let response = self
            .client
            .get(url)
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", accept)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ReviewError::RemoteService {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }
}
