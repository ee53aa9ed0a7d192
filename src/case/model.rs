use bon::Builder;
use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;

/// One item of the incoming batch, as sent by the caller.
///
/// Every field is optional at this level so that a single malformed item
/// never fails decoding of the whole batch; `validate` decides whether the
/// item may go anywhere near an external service.
#[derive(Deserialize, Clone, Debug, Default, Builder)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseRequest {
    #[builder(into)]
    pub requirement_id: Option<String>,
    #[builder(into)]
    pub name: Option<String>,
    #[builder(into)]
    pub objective: Option<String>,
    #[builder(into)]
    pub priority: Option<String>,
    #[serde(default, deserialize_with = "lenient_steps")]
    pub steps: Option<StepsInput>,
    #[builder(into)]
    pub expected_result: Option<String>,
}

/// A step list as the caller may provide it.
#[derive(Clone, Debug, PartialEq)]
pub enum StepsInput {
    Structured(Vec<TestStep>),
    FreeText(String),
}

/// A string is free text and an array must decode as steps. Anything else is
/// treated as "no steps".
fn lenient_steps<'de, D>(deserializer: D) -> Result<Option<StepsInput>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    match value {
        Some(Value::String(text)) => Ok(Some(StepsInput::FreeText(text))),
        Some(value @ Value::Array(_)) => serde_json::from_value::<Vec<TestStep>>(value)
            .map(|steps| Some(StepsInput::Structured(steps)))
            .map_err(|e| de::Error::custom(format!("steps: {}", e))),
        _ => Ok(None),
    }
}

/// `null` reads as empty, numbers and booleans as their JSON text.
fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(String::new()),
        Some(Value::String(text)) => Ok(text),
        Some(scalar @ (Value::Number(_) | Value::Bool(_))) => Ok(scalar.to_string()),
        Some(other) => Err(de::Error::custom(format!("expected text, found {}", other))),
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct TestStep {
    pub step: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub data: String,
    #[serde(default, deserialize_with = "lenient_text")]
    pub result: String,
}

impl TestStep {
    pub fn new(step: impl Into<String>, data: impl Into<String>, result: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            data: data.into(),
            result: result.into(),
        }
    }
}

/// Prefix of a requirement key before the first `-`. Opaque.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProjectKey(String);

impl ProjectKey {
    pub fn from_requirement(requirement_id: &str) -> Option<ProjectKey> {
        let (prefix, _) = requirement_id.split_once('-')?;
        if prefix.is_empty() {
            None
        } else {
            Some(ProjectKey(prefix.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A batch item that passed validation.
#[derive(Clone, Debug)]
pub struct ValidTestCase {
    pub requirement_id: String,
    pub project_key: ProjectKey,
    pub name: String,
    pub objective: Option<String>,
    pub priority: Option<String>,
    pub steps: Option<StepsInput>,
    pub expected_result: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InvalidReason {
    MissingRequirementId,
    MissingName,
    MalformedRequirementId,
    NotAnObject,
    Malformed(String),
}

impl fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidReason::MissingRequirementId => f.write_str("missing requirementId"),
            InvalidReason::MissingName => f.write_str("missing name"),
            InvalidReason::MalformedRequirementId => f.write_str("requirementId has no project prefix"),
            InvalidReason::NotAnObject => f.write_str("test case is not an object"),
            InvalidReason::Malformed(detail) => write!(f, "malformed test case: {}", detail),
        }
    }
}

impl TestCaseRequest {
    pub fn validate(self) -> Result<ValidTestCase, InvalidReason> {
        let requirement_id = non_blank(self.requirement_id).ok_or(InvalidReason::MissingRequirementId)?;
        let name = non_blank(self.name).ok_or(InvalidReason::MissingName)?;
        let project_key =
            ProjectKey::from_requirement(&requirement_id).ok_or(InvalidReason::MalformedRequirementId)?;
        Ok(ValidTestCase {
            requirement_id,
            project_key,
            name,
            objective: self.objective,
            priority: self.priority,
            steps: self.steps,
            expected_result: self.expected_result,
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Issue produced by the tracker. `id` is what the step service addresses.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CreatedIssue {
    pub key: String,
    pub id: String,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ItemStatus {
    Created,
    Skipped,
    Failed,
}

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct ItemOutcome {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub status: ItemStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<Value>,
}

/// Tally for one webhook call. Lives only as long as the request.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct BatchResult {
    pub created: usize,
    pub skipped: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<ItemOutcome>,
}

impl BatchResult {
    pub fn record(&mut self, outcome: ItemOutcome, keep_details: bool) {
        match outcome.status {
            ItemStatus::Created => self.created += 1,
            ItemStatus::Skipped => self.skipped += 1,
            ItemStatus::Failed => *self.failed.get_or_insert(0) += 1,
        }
        if keep_details {
            self.results.push(outcome);
        }
    }
}
