use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use thiserror::Error;

use crate::case::model::TestStep;
use crate::config::ZephyrConfig;
use crate::http::{ApiClient, Endpoint, HttpError, HttpMethod, HttpRequest, ReqBody, ReqParam};
use crate::zephyr::signer::{RequestSigner, SignError};

pub const TEST_STEP_PATH: &str = "/connect/public/rest/api/1.0/teststep/:issueId";

#[derive(Debug, Clone, Error)]
pub enum StepError {
    #[error(transparent)]
    Sign(#[from] SignError),
    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Storage of structured steps for a test issue.
#[async_trait]
pub trait StepStore: Send + Sync {
    async fn create_step(&self, issue_id: &str, project_id: &str, step: &TestStep) -> Result<(), StepError>;
}

pub struct ZephyrClient {
    api_client: Arc<ApiClient>,
    base_url: String,
    signer: RequestSigner,
}

impl ZephyrClient {
    pub fn new(api_client: Arc<ApiClient>, config: &ZephyrConfig) -> Self {
        Self {
            api_client,
            base_url: config.base_url.clone(),
            signer: RequestSigner::new(
                config.access_key.clone(),
                SecretString::from(config.secret_key.expose_secret().to_owned()),
            ),
        }
    }
}

/// The one descriptor that is both signed and sent for a step creation.
pub fn step_endpoint(base_url: &str, issue_id: &str, project_id: &str) -> Endpoint {
    Endpoint::new(
        HttpMethod::POST,
        base_url,
        TEST_STEP_PATH,
        vec![ReqParam::new(":issueId", issue_id)],
        vec![ReqParam::new("projectId", project_id)],
    )
}

#[async_trait]
impl StepStore for ZephyrClient {
    async fn create_step(&self, issue_id: &str, project_id: &str, step: &TestStep) -> Result<(), StepError> {
        let endpoint = self
            .signer
            .authorize(step_endpoint(&self.base_url, issue_id, project_id))?;
        let body = serde_json::to_value(step).map_err(|e| HttpError::InvalidRequest(e.to_string()))?;
        self.api_client
            .execute(HttpRequest::new(endpoint, ReqBody::new(body)))
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::zephyr::signer::canonical_request;

    #[test]
    fn signed_and_sent_forms_agree() {
        let endpoint = step_endpoint("https://prod-api.zephyr4jiracloud.com/", "12345", "10001");
        assert_eq!(
            canonical_request(&endpoint),
            "POST&/connect/public/rest/api/1.0/teststep/12345&projectId=10001"
        );
        assert_eq!(
            endpoint.to_url(),
            "https://prod-api.zephyr4jiracloud.com/connect/public/rest/api/1.0/teststep/12345?projectId=10001"
        );
    }
}
