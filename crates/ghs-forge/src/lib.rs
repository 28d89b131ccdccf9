//! GitHub API client for GHS: contributor listings, user profiles, and the
//! rate-limit diagnostic endpoint.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use ghs_core::{languages_from_repos, ContributorIdentity, Profile, ValidationError};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::debug;

pub const CRATE_NAME: &str = "ghs-forge";

pub const API_BASE: &str = "https://api.github.com";

/// Contributor listings read only the first page, by design; repositories
/// with more contributors lose entries beyond it.
pub const CONTRIBUTORS_PAGE_SIZE: usize = 100;

const ACCEPT_HEADER: &str = "application/vnd.github.v3+json";

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub user_agent: String,
    /// Bearer token; absent still permits unauthenticated calls at lower
    /// rate limits.
    pub token: Option<String>,
    pub concurrency: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE.to_string(),
            timeout: Duration::from_secs(20),
            user_agent: "ghs-bot/0.1".to_string(),
            token: None,
            concurrency: 8,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("http status {status} for {url}")]
    HttpStatus { status: u16, url: String },
}

/// A single profile fetch can fail in transit or at validation; either way
/// the caller skips that login.
#[derive(Debug, Error)]
pub enum ForgeError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RateLimitCore {
    pub limit: i64,
    pub remaining: i64,
    pub used: i64,
    /// Unix epoch seconds.
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
struct RateLimitResources {
    core: RateLimitCore,
}

#[derive(Debug, Deserialize)]
struct RateLimitResponse {
    resources: RateLimitResources,
}

/// Seam between the fetch workflow and the live API; stubbed in workflow
/// tests.
#[async_trait]
pub trait Forge: Send + Sync {
    /// First page of a repository's contributor listing.
    async fn contributors(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Vec<ContributorIdentity>, FetchError>;

    /// Full profile: user record plus the language set derived from the
    /// user's repositories.
    async fn fetch_profile(&self, login: &str) -> Result<Profile, ForgeError>;
}

#[derive(Debug)]
pub struct ForgeClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    limit: Semaphore,
}

impl ForgeClient {
    pub fn new(config: ForgeConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .context("building reqwest client")?;
        Ok(Self {
            client,
            base_url: config.base_url,
            token: config.token,
            limit: Semaphore::new(config.concurrency.max(1)),
        })
    }

    async fn get<T: DeserializeOwned>(&self, url: String) -> Result<T, FetchError> {
        let _permit = self.limit.acquire().await.expect("semaphore not closed");
        debug!(%url, "forge request");

        let mut request = self.client.get(&url).header("Accept", ACCEPT_HEADER);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.as_u16(),
                url: response.url().to_string(),
            });
        }
        Ok(response.json().await?)
    }

    /// Current core rate-limit numbers — diagnostic only, never enforced.
    pub async fn rate_limit(&self) -> Result<RateLimitCore, FetchError> {
        let payload: RateLimitResponse = self.get(format!("{}/rate_limit", self.base_url)).await?;
        Ok(payload.resources.core)
    }
}

#[async_trait]
impl Forge for ForgeClient {
    async fn contributors(
        &self,
        org: &str,
        repo: &str,
    ) -> Result<Vec<ContributorIdentity>, FetchError> {
        let url = contributors_url(&self.base_url, org, repo);
        self.get(url).await
    }

    async fn fetch_profile(&self, login: &str) -> Result<Profile, ForgeError> {
        let user: JsonValue = self.get(format!("{}/users/{login}", self.base_url)).await?;
        let repos: Vec<JsonValue> = self
            .get(format!("{}/users/{login}/repos", self.base_url))
            .await?;
        let languages = languages_from_repos(&repos);
        Ok(Profile::from_raw(&user, languages)?)
    }
}

fn contributors_url(base_url: &str, org: &str, repo: &str) -> String {
    format!("{base_url}/repos/{org}/{repo}/contributors?per_page={CONTRIBUTORS_PAGE_SIZE}")
}
