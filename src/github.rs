//! GitHub REST client for pull request comments.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::json;

use crate::error::PublishError;

/// Comments fetched per page when scanning for an earlier report.
pub const COMMENTS_PAGE_SIZE: u32 = 100;

const USER_AGENT: &str = "dblint-gate/0.1";
const API_VERSION: &str = "2022-11-28";

/// One comment on the pull request conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct IssueComment {
    pub id: u64,
    #[serde(default)]
    pub body: Option<String>,
}

/// Review platform operations needed to keep one findings comment per
/// pull request.
#[async_trait]
pub trait ReviewPlatform: Send + Sync {
    /// Lists one page of conversation comments, oldest first.
    async fn list_comments(
        &self,
        pr_number: u64,
        page: u32,
    ) -> Result<Vec<IssueComment>, PublishError>;

    /// Creates a comment and returns its identifier.
    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<u64, PublishError>;

    /// Replaces the body of an existing comment.
    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<(), PublishError>;
}

/// [`ReviewPlatform`] backed by the GitHub REST API.
pub struct GitHubClient {
    client: Client,
    api_url: String,
    repository: String,
    token: String,
}

impl GitHubClient {
    pub fn new(
        api_url: impl Into<String>,
        repository: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, PublishError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            repository: repository.into(),
            token: token.into(),
        })
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("User-Agent", USER_AGENT)
            .header("X-GitHub-Api-Version", API_VERSION)
            .header("Authorization", format!("Bearer {}", self.token))
    }

    async fn check(response: Response) -> Result<Response, PublishError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "<no body>".to_string());
        Err(PublishError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl ReviewPlatform for GitHubClient {
    async fn list_comments(
        &self,
        pr_number: u64,
        page: u32,
    ) -> Result<Vec<IssueComment>, PublishError> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments?per_page={}&page={}",
            self.api_url, self.repository, pr_number, COMMENTS_PAGE_SIZE, page
        );
        let response = self
            .request(Method::GET, url)
            .send()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;
        let response = Self::check(response).await?;
        response
            .json::<Vec<IssueComment>>()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))
    }

    async fn create_comment(&self, pr_number: u64, body: &str) -> Result<u64, PublishError> {
        let url = format!(
            "{}/repos/{}/issues/{}/comments",
            self.api_url, self.repository, pr_number
        );
        let response = self
            .request(Method::POST, url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;
        let response = Self::check(response).await?;
        let comment: IssueComment = response
            .json()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Ok(comment.id)
    }

    async fn update_comment(&self, comment_id: u64, body: &str) -> Result<(), PublishError> {
        let url = format!(
            "{}/repos/{}/issues/comments/{}",
            self.api_url, self.repository, comment_id
        );
        let response = self
            .request(Method::PATCH, url)
            .json(&json!({ "body": body }))
            .send()
            .await
            .map_err(|e| PublishError::Http(e.to_string()))?;
        Self::check(response).await?;
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_comment_deserializes_optional_body() {
        let comment: IssueComment = serde_json::from_str(r#"{"id": 7, "body": "hello"}"#).unwrap();
        assert_eq!(comment.id, 7);
        assert_eq!(comment.body.as_deref(), Some("hello"));

        let no_body: IssueComment = serde_json::from_str(r#"{"id": 8}"#).unwrap();
        assert!(no_body.body.is_none());

        let null_body: IssueComment = serde_json::from_str(r#"{"id": 9, "body": null}"#).unwrap();
        assert!(null_body.body.is_none());
    }

    #[test]
    fn test_client_normalizes_api_url() {
        let client =
            GitHubClient::new("https://api.github.com/", "acme/widgets", "token").unwrap();
        assert_eq!(client.api_url, "https://api.github.com");
    }
}
