use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use crate::case::model::{CreatedIssue, ProjectKey};
use crate::config::JiraConfig;
use crate::http::{ApiClient, BasicAuth, Endpoint, HttpError, HttpMethod, HttpRequest, ReqBody, ReqParam};
use crate::jira::model::{IssueLink, NewTestIssue, ProjectResponse, SearchRequest, SearchResponse};

const SEARCH_PAGE_SIZE: u32 = 50;

/// The calls this service makes against the issue tracker.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// One page of results. `page_token` is `None` for the first page.
    async fn search(&self, jql: &str, page_token: Option<&str>) -> Result<SearchResponse, HttpError>;

    async fn create_issue(&self, issue: &NewTestIssue) -> Result<CreatedIssue, HttpError>;

    /// Numeric project id the step service expects for `project_key`.
    async fn project_id(&self, project_key: &ProjectKey) -> Result<String, HttpError>;

    async fn link_issues(&self, link: &IssueLink) -> Result<(), HttpError>;
}

pub struct JiraClient {
    api_client: Arc<ApiClient>,
    base_url: String,
    auth: BasicAuth,
}

impl JiraClient {
    pub fn new(api_client: Arc<ApiClient>, config: &JiraConfig) -> Self {
        Self {
            api_client,
            base_url: config.base_url.clone(),
            auth: BasicAuth {
                username: config.email.clone(),
                password: SecretString::from(config.api_token.expose_secret().to_owned()),
            },
        }
    }

    async fn send(&self, endpoint: Endpoint, body: ReqBody) -> Result<Value, HttpError> {
        let request = HttpRequest::new(endpoint, body).with_basic_auth(&self.auth);
        let result = self.api_client.execute(request).await?;
        debug!("jira responded with {}", result.status_code);
        Ok(result.into_value())
    }

    async fn send_for<T: DeserializeOwned>(&self, endpoint: Endpoint, body: ReqBody) -> Result<T, HttpError> {
        let value = self.send(endpoint, body).await?;
        serde_json::from_value(value).map_err(|e| HttpError::Decode(e.to_string()))
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn search(&self, jql: &str, page_token: Option<&str>) -> Result<SearchResponse, HttpError> {
        debug!("jql: {}, page token: {:?}", jql, page_token);
        let endpoint = Endpoint::new(HttpMethod::POST, &self.base_url, "/rest/api/3/search/jql", vec![], vec![]);
        let request = SearchRequest {
            jql: jql.to_string(),
            fields: vec!["summary".to_string()],
            max_results: SEARCH_PAGE_SIZE,
            next_page_token: page_token.map(str::to_string),
        };
        let body = serde_json::to_value(&request).map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        self.send_for(endpoint, ReqBody::new(body)).await
    }

    async fn create_issue(&self, issue: &NewTestIssue) -> Result<CreatedIssue, HttpError> {
        let endpoint = Endpoint::new(HttpMethod::POST, &self.base_url, "/rest/api/3/issue", vec![], vec![]);
        self.send_for(endpoint, ReqBody::new(issue.to_body())).await
    }

    async fn project_id(&self, project_key: &ProjectKey) -> Result<String, HttpError> {
        let endpoint = Endpoint::new(
            HttpMethod::GET,
            &self.base_url,
            "/rest/api/3/project/:projectKey",
            vec![ReqParam::new(":projectKey", project_key.as_str())],
            vec![],
        );
        let project: ProjectResponse = self.send_for(endpoint, ReqBody::empty()).await?;
        Ok(project.id)
    }

    async fn link_issues(&self, link: &IssueLink) -> Result<(), HttpError> {
        let endpoint = Endpoint::new(HttpMethod::POST, &self.base_url, "/rest/api/3/issueLink", vec![], vec![]);
        self.send(endpoint, ReqBody::new(link.to_body())).await?;
        Ok(())
    }
}
