use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::case::model::{
    BatchResult, CreatedIssue, InvalidReason, ItemOutcome, ItemStatus, ProjectKey, TestCaseRequest, ValidTestCase,
};
use crate::case::steps::format_steps;
use crate::config::FailurePolicy;
use crate::http::HttpError;
use crate::jira::service::TestIssueOperations;
use crate::zephyr::client::StepError;
use crate::zephyr::service::StepPublisher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Search,
    CreateIssue,
    ProjectLookup,
    Link,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Search => "duplicate search",
            Stage::CreateIssue => "issue creation",
            Stage::ProjectLookup => "project lookup",
            Stage::Link => "requirement link",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    #[error("{0} failed: {1}")]
    Tracker(Stage, #[source] HttpError),
    #[error("step publication failed: {0}")]
    Steps(#[from] StepError),
}

impl PipelineError {
    /// What the caller gets to see: the upstream error body when there is
    /// one, the message otherwise.
    pub fn payload(&self) -> Value {
        match self {
            PipelineError::Tracker(_, error) => error.payload(),
            PipelineError::Steps(StepError::Http(error)) => error.payload(),
            PipelineError::Steps(error @ StepError::Sign(_)) => Value::String(error.to_string()),
        }
    }
}

enum Processed {
    Created(CreatedIssue),
    Duplicate(String),
}

/// Runs a batch strictly in input order, one test case at a time.
#[derive(Clone)]
pub struct BatchOrchestrator {
    issues: TestIssueOperations,
    steps: StepPublisher,
    failure_policy: FailurePolicy,
}

impl BatchOrchestrator {
    pub fn new(issues: TestIssueOperations, steps: StepPublisher, failure_policy: FailurePolicy) -> Self {
        Self {
            issues,
            steps,
            failure_policy,
        }
    }

    pub async fn run(&self, items: Vec<Value>) -> Result<BatchResult, PipelineError> {
        let span = info_span!("batch", batch_id = %Uuid::new_v4(), size = items.len());
        self.run_items(items).instrument(span).await
    }

    async fn run_items(&self, items: Vec<Value>) -> Result<BatchResult, PipelineError> {
        let keep_details = self.failure_policy == FailurePolicy::Isolate;
        let mut result = BatchResult::default();
        // project ids do not change within a request
        let mut project_ids: HashMap<ProjectKey, String> = HashMap::new();

        for (index, item) in items.into_iter().enumerate() {
            let test_case = match decode(item) {
                Ok(test_case) => test_case,
                Err(reason) => {
                    warn!("skipping item {}: {}", index, reason);
                    result.record(
                        ItemOutcome {
                            index,
                            name: None,
                            status: ItemStatus::Skipped,
                            key: None,
                            reason: Some(Value::String(reason.to_string())),
                        },
                        keep_details,
                    );
                    continue;
                }
            };

            let name = Some(test_case.name.clone());
            let outcome = match self.process(&test_case, &mut project_ids).await {
                Ok(Processed::Created(issue)) => {
                    info!("created {} for {}", issue.key, test_case.requirement_id);
                    ItemOutcome {
                        index,
                        name,
                        status: ItemStatus::Created,
                        key: Some(issue.key),
                        reason: None,
                    }
                }
                Ok(Processed::Duplicate(existing)) => {
                    info!("{:?} already exists as {}, skipping", test_case.name, existing);
                    ItemOutcome {
                        index,
                        name,
                        status: ItemStatus::Skipped,
                        key: Some(existing),
                        reason: Some(Value::String("duplicate".to_string())),
                    }
                }
                Err(err) if self.failure_policy == FailurePolicy::FailFast => {
                    error!("aborting batch at item {}: {}", index, err);
                    return Err(err);
                }
                Err(err) => {
                    error!("item {} failed: {}", index, err);
                    ItemOutcome {
                        index,
                        name,
                        status: ItemStatus::Failed,
                        key: None,
                        reason: Some(err.payload()),
                    }
                }
            };
            result.record(outcome, keep_details);
        }

        info!("batch done: created={} skipped={}", result.created, result.skipped);
        Ok(result)
    }

    async fn process(
        &self,
        test_case: &ValidTestCase,
        project_ids: &mut HashMap<ProjectKey, String>,
    ) -> Result<Processed, PipelineError> {
        if let Some(existing) = self
            .issues
            .find_duplicate(&test_case.project_key, &test_case.requirement_id, &test_case.name)
            .await
            .map_err(|e| PipelineError::Tracker(Stage::Search, e))?
        {
            return Ok(Processed::Duplicate(existing));
        }

        let issue = self
            .issues
            .create(test_case)
            .await
            .map_err(|e| PipelineError::Tracker(Stage::CreateIssue, e))?;

        let steps = format_steps(test_case.steps.as_ref(), test_case.expected_result.as_deref());
        if !steps.is_empty() {
            let project_id = match project_ids.get(&test_case.project_key) {
                Some(id) => id.clone(),
                None => {
                    let id = self
                        .issues
                        .project_id(&test_case.project_key)
                        .await
                        .map_err(|e| PipelineError::Tracker(Stage::ProjectLookup, e))?;
                    project_ids.insert(test_case.project_key.clone(), id.clone());
                    id
                }
            };
            self.steps.publish(&issue.id, &project_id, &steps).await?;
        }

        self.issues
            .link_to_requirement(&issue.key, &test_case.requirement_id)
            .await
            .map_err(|e| PipelineError::Tracker(Stage::Link, e))?;

        Ok(Processed::Created(issue))
    }
}

fn decode(item: Value) -> Result<ValidTestCase, InvalidReason> {
    if !item.is_object() {
        return Err(InvalidReason::NotAnObject);
    }
    let request: TestCaseRequest =
        serde_json::from_value(item).map_err(|e| InvalidReason::Malformed(e.to_string()))?;
    request.validate()
}
