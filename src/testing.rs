//! Recording fakes of the two external services.

use async_trait::async_trait;
use secrecy::SecretString;
use serde_json::json;
use std::sync::{Arc, Mutex};

use crate::case::model::{CreatedIssue, ProjectKey, TestStep};
use crate::case::service::BatchOrchestrator;
use crate::config::{FailurePolicy, JiraConfig};
use crate::http::{HttpError, StatusError};
use crate::jira::client::IssueTracker;
use crate::jira::model::{IssueLink, IssueSummary, NewTestIssue, SearchResponse, SummaryFields};
use crate::jira::service::TestIssueOperations;
use crate::zephyr::client::{StepError, StepStore};
use crate::zephyr::service::StepPublisher;

pub fn jira_config() -> JiraConfig {
    JiraConfig::builder()
        .base_url("https://jira.test")
        .email("bot@jira.test")
        .api_token(SecretString::from("token".to_string()))
        .build()
}

pub fn orchestrator(
    tracker: Arc<FakeTracker>,
    store: Arc<FakeStepStore>,
    failure_policy: FailurePolicy,
) -> BatchOrchestrator {
    BatchOrchestrator::new(
        TestIssueOperations::new(tracker, &jira_config()),
        StepPublisher::new(store),
        failure_policy,
    )
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrackerCall {
    Search(String),
    Create(NewTestIssue),
    ProjectId(String),
    Link(IssueLink),
}

struct ExistingIssue {
    requirement_id: String,
    key: String,
    summary: String,
}

/// Issue tracker that keeps every call. Search returns every known issue
/// linked to the requirement named in the query, whatever its summary, the
/// way a loose text match would. With a page size set, results come in pages
/// whose token is the offset of the next page.
#[derive(Default)]
pub struct FakeTracker {
    existing: Vec<ExistingIssue>,
    failing_create: Option<String>,
    page_size: Option<usize>,
    calls: Mutex<Vec<TrackerCall>>,
    search_offsets: Mutex<Vec<Option<usize>>>,
}

impl FakeTracker {
    pub fn with_existing(mut self, requirement_id: &str, key: &str, summary: &str) -> Self {
        self.existing.push(ExistingIssue {
            requirement_id: requirement_id.to_string(),
            key: key.to_string(),
            summary: summary.to_string(),
        });
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }

    /// Offset requested by each search call, `None` for a first page.
    pub fn search_pages(&self) -> Vec<Option<usize>> {
        self.search_offsets.lock().unwrap().clone()
    }

    pub fn failing_create_for(mut self, summary: &str) -> Self {
        self.failing_create = Some(summary.to_string());
        self
    }

    pub fn calls(&self) -> Vec<TrackerCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, TrackerCall::Create(_)))
            .count()
    }

    pub fn searched_for(&self, name: &str) -> bool {
        self.calls()
            .iter()
            .any(|c| matches!(c, TrackerCall::Search(jql) if jql.contains(name)))
    }

    fn record(&self, call: TrackerCall) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl IssueTracker for FakeTracker {
    async fn search(&self, jql: &str, page_token: Option<&str>) -> Result<SearchResponse, HttpError> {
        self.record(TrackerCall::Search(jql.to_string()));
        let offset = page_token.map(|token| token.parse::<usize>().unwrap());
        self.search_offsets.lock().unwrap().push(offset);

        let matches: Vec<IssueSummary> = self
            .existing
            .iter()
            .filter(|issue| jql.contains(&format!("linkedIssues(\"{}\")", issue.requirement_id)))
            .map(|issue| IssueSummary {
                key: issue.key.clone(),
                fields: SummaryFields {
                    summary: issue.summary.clone(),
                },
            })
            .collect();
        let start = offset.unwrap_or(0);
        let end = match self.page_size {
            Some(size) => (start + size).min(matches.len()),
            None => matches.len(),
        };
        let is_last = end >= matches.len();
        Ok(SearchResponse {
            issues: matches[start.min(end)..end].to_vec(),
            next_page_token: (!is_last).then(|| end.to_string()),
            is_last: Some(is_last),
        })
    }

    async fn create_issue(&self, issue: &NewTestIssue) -> Result<CreatedIssue, HttpError> {
        let sequence = self.create_calls();
        self.record(TrackerCall::Create(issue.clone()));
        if self.failing_create.as_deref() == Some(issue.summary.as_str()) {
            return Err(HttpError::Status(
                400,
                StatusError::ClientError(json!({ "errorMessages": [format!("cannot create {}", issue.summary)] })),
            ));
        }
        Ok(CreatedIssue {
            key: format!("{}-{}", issue.project_key, 100 + sequence),
            id: (10100 + sequence).to_string(),
        })
    }

    async fn project_id(&self, project_key: &ProjectKey) -> Result<String, HttpError> {
        self.record(TrackerCall::ProjectId(project_key.to_string()));
        Ok("20000".to_string())
    }

    async fn link_issues(&self, link: &IssueLink) -> Result<(), HttpError> {
        self.record(TrackerCall::Link(link.clone()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeStepStore {
    failing_step: Option<String>,
    calls: Mutex<Vec<(String, String, TestStep)>>,
}

impl FakeStepStore {
    pub fn failing_on(step: &str) -> Self {
        Self {
            failing_step: Some(step.to_string()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(String, String, TestStep)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl StepStore for FakeStepStore {
    async fn create_step(&self, issue_id: &str, project_id: &str, step: &TestStep) -> Result<(), StepError> {
        self.calls
            .lock()
            .unwrap()
            .push((issue_id.to_string(), project_id.to_string(), step.clone()));
        if self.failing_step.as_deref() == Some(step.step.as_str()) {
            return Err(StepError::Http(HttpError::Status(
                401,
                StatusError::ClientError(json!({ "message": "unauthorized" })),
            )));
        }
        Ok(())
    }
}
