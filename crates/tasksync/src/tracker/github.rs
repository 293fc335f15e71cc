//! GitHub REST API tracker.
//!
//! Error responses are turned into [`TrackerError`] values carrying the
//! status, the API message and the rate-limit headers; transport failures
//! become [`Error::Network`]. Neither is retried here: callers wrap each
//! call in the retry executor.

use super::IssueTracker;
use crate::domain::{IssueNumber, IssueState, NewRemoteIssue, RemoteIssue, StateFilter};
use crate::error::{Error, Result, TrackerError};
use crate::render::parse_sub_issue_comment;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

/// Public GitHub API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const PAGE_SIZE: usize = 100;
const API_VERSION: &str = "2022-11-28";

#[derive(Debug, Deserialize)]
struct ApiLabel {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ApiIssue {
    id: u64,
    number: u64,
    title: String,
    #[serde(default)]
    body: Option<String>,
    state: String,
    #[serde(default)]
    labels: Vec<ApiLabel>,
    #[serde(default)]
    pull_request: Option<serde_json::Value>,
}

impl From<ApiIssue> for RemoteIssue {
    fn from(issue: ApiIssue) -> Self {
        Self {
            id: issue.id,
            number: IssueNumber(issue.number),
            title: issue.title,
            body: issue.body.unwrap_or_default(),
            state: if issue.state == "closed" {
                IssueState::Closed
            } else {
                IssueState::Open
            },
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    #[serde(default)]
    body: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Tracker backed by a GitHub repository.
#[derive(Debug, Clone)]
pub struct GitHubTracker {
    client: Client,
    api_url: Url,
    owner: String,
    repo: String,
    token: String,
}

impl GitHubTracker {
    /// Create a tracker for `repository` (`owner/name`).
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the repository name or API URL is
    /// malformed, or the HTTP client cannot be built.
    pub fn new(api_url: &str, repository: &str, token: impl Into<String>) -> Result<Self> {
        let (owner, repo) = repository
            .split_once('/')
            .filter(|(o, r)| !o.is_empty() && !r.is_empty() && !r.contains('/'))
            .ok_or_else(|| {
                Error::Config(format!("repository must be 'owner/name', got '{repository}'"))
            })?;

        let api_url = Url::parse(api_url)
            .map_err(|e| Error::Config(format!("invalid API URL '{api_url}': {e}")))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_url,
            owner: owner.to_string(),
            repo: repo.to_string(),
            token: token.into(),
        })
    }

    /// `<api>/repos/<owner>/<repo>/<segments...>`, each segment escaped.
    fn repo_url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config(format!("API URL '{}' cannot be a base", self.api_url)))?
            .pop_if_empty()
            .extend(["repos", self.owner.as_str(), self.repo.as_str()])
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .header(USER_AGENT, concat!("tasksync/", env!("CARGO_PKG_VERSION")))
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| Error::Network(e.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
        self.send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| Error::Network(format!("failed to decode response: {e}")))
    }

    /// Every page of a list endpoint under the repository.
    async fn get_pages<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut page = 1usize;
        loop {
            let url = self.repo_url(segments)?;
            let query = [("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())];
            let batch: Vec<T> = self.send_json(self.client.get(url).query(&query)).await?;
            let count = batch.len();
            items.extend(batch);
            if count < PAGE_SIZE {
                return Ok(items);
            }
            page += 1;
        }
    }
}

async fn error_from_response(response: Response) -> Error {
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or(text);

    let mut error = TrackerError::status(status, message);
    error.retry_after = header_u64(&headers, "retry-after").map(Duration::from_secs);
    if header_u64(&headers, "x-ratelimit-remaining") == Some(0) {
        error.rate_limit_reset = header_u64(&headers, "x-ratelimit-reset")
            .and_then(|epoch| i64::try_from(epoch).ok())
            .and_then(|epoch| DateTime::<Utc>::from_timestamp(epoch, 0));
    }
    debug!(status, message = %error.message, "Tracker returned an error response");
    error.into()
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl IssueTracker for GitHubTracker {
    async fn get_issue(&self, number: IssueNumber) -> Result<RemoteIssue> {
        let url = self.repo_url(&["issues", &number.get().to_string()])?;
        let issue: ApiIssue = self.send_json(self.client.get(url)).await?;
        Ok(issue.into())
    }

    async fn create_issue(&self, issue: NewRemoteIssue) -> Result<RemoteIssue> {
        let url = self.repo_url(&["issues"])?;
        let payload = json!({
            "title": issue.title,
            "body": issue.body,
            "labels": issue.labels,
        });
        let created: ApiIssue = self.send_json(self.client.post(url).json(&payload)).await?;
        Ok(created.into())
    }

    async fn update_issue_body(&self, number: IssueNumber, body: &str) -> Result<RemoteIssue> {
        let url = self.repo_url(&["issues", &number.get().to_string()])?;
        let updated: ApiIssue = self
            .send_json(self.client.patch(url).json(&json!({ "body": body })))
            .await?;
        Ok(updated.into())
    }

    async fn add_label(&self, number: IssueNumber, label: &str) -> Result<()> {
        let url = self.repo_url(&["issues", &number.get().to_string(), "labels"])?;
        self.send(self.client.post(url).json(&json!({ "labels": [label] })))
            .await?;
        Ok(())
    }

    async fn remove_label(&self, number: IssueNumber, label: &str) -> Result<()> {
        let url = self.repo_url(&["issues", &number.get().to_string(), "labels", label])?;
        match self.send(self.client.delete(url)).await {
            Ok(_) => Ok(()),
            // Label was not on the issue
            Err(Error::Tracker(e)) if e.status == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn create_comment(&self, number: IssueNumber, body: &str) -> Result<()> {
        let url = self.repo_url(&["issues", &number.get().to_string(), "comments"])?;
        self.send(self.client.post(url).json(&json!({ "body": body })))
            .await?;
        Ok(())
    }

    async fn list_issues(
        &self,
        state: StateFilter,
        label: Option<&str>,
    ) -> Result<Vec<RemoteIssue>> {
        let mut issues = Vec::new();
        let mut page = 1usize;
        loop {
            let url = self.repo_url(&["issues"])?;
            let mut query = vec![
                ("state", state.as_str().to_string()),
                ("per_page", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(label) = label {
                query.push(("labels", label.to_string()));
            }

            let batch: Vec<ApiIssue> = self.send_json(self.client.get(url).query(&query)).await?;
            let count = batch.len();
            issues.extend(
                batch
                    .into_iter()
                    .filter(|issue| issue.pull_request.is_none())
                    .map(RemoteIssue::from),
            );
            if count < PAGE_SIZE {
                break;
            }
            page += 1;
        }
        debug!(count = issues.len(), state = state.as_str(), "Listed issues");
        Ok(issues)
    }

    async fn add_sub_issue(&self, parent: IssueNumber, child: &RemoteIssue) -> Result<()> {
        let url = self.repo_url(&["issues", &parent.get().to_string(), "sub_issues"])?;
        self.send(self.client.post(url).json(&json!({ "sub_issue_id": child.id })))
            .await?;
        Ok(())
    }

    async fn linked_children(&self, parent: IssueNumber) -> Result<Vec<IssueNumber>> {
        let number = parent.get().to_string();
        let mut children: Vec<IssueNumber> = match self
            .get_pages::<ApiIssue>(&["issues", &number, "sub_issues"])
            .await
        {
            Ok(issues) => issues.into_iter().map(|i| IssueNumber(i.number)).collect(),
            // Sub-issues disabled for the repository
            Err(Error::Tracker(e)) if e.status == Some(StatusCode::NOT_FOUND.as_u16()) => Vec::new(),
            Err(e) => return Err(e),
        };

        let comments: Vec<ApiComment> = self.get_pages(&["issues", &number, "comments"]).await?;
        children.extend(
            comments
                .iter()
                .filter_map(|c| c.body.as_deref().and_then(parse_sub_issue_comment)),
        );
        debug!(parent = %parent, children = children.len(), "Listed linked children");
        Ok(children)
    }

    async fn supports_sub_issues(&self) -> Result<bool> {
        let url = self.repo_url(&["issues"])?;
        let sample: Vec<ApiIssue> = self
            .send_json(
                self.client
                    .get(url)
                    .query(&[("state", "all"), ("per_page", "1")]),
            )
            .await?;
        let Some(issue) = sample.first() else {
            // Nothing to check against; native calls fall back per link.
            return Ok(true);
        };

        let url = self.repo_url(&["issues", &issue.number.to_string(), "sub_issues"])?;
        match self.send(self.client.get(url)).await {
            Ok(_) => Ok(true),
            Err(Error::Tracker(e)) if e.status == Some(StatusCode::NOT_FOUND.as_u16()) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
