use crate::api::{ApiResponse, AppError, AppState};
use crate::case::model::BatchResult;
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

#[derive(Deserialize, Clone, Debug)]
pub struct CreateTestsPayload {
    #[serde(default)]
    pub tests: Option<Value>,
}

#[derive(Serialize, Debug)]
pub struct CreateTestsResponse {
    pub message: String,
    #[serde(flatten)]
    pub result: BatchResult,
}

pub async fn create_tests(
    State(app_state): State<AppState>,
    payload: Result<Json<CreateTestsPayload>, JsonRejection>,
) -> Result<ApiResponse<CreateTestsResponse>, AppError> {
    let Json(payload) = payload.map_err(|rejection| AppError::Validation(rejection.body_text()))?;
    let tests = parse_tests(payload.tests)?;
    info!("received {} test case(s)", tests.len());
    let result = app_state.orchestrator.run(tests).await;
    ApiResponse::from(result.map(|result| CreateTestsResponse {
        message: "Test cases processed".to_string(),
        result,
    }))
}

/// `tests` may be the array itself or a string holding it.
fn parse_tests(tests: Option<Value>) -> Result<Vec<Value>, AppError> {
    let tests = match tests {
        None | Some(Value::Null) => {
            return Err(AppError::Validation("Missing 'tests' in request body".to_string()))
        }
        Some(Value::String(raw)) => serde_json::from_str::<Value>(&raw)
            .map_err(|e| AppError::Validation(format!("'tests' is not valid JSON: {}", e)))?,
        Some(other) => other,
    };
    match tests {
        Value::Array(items) if !items.is_empty() => Ok(items),
        _ => Err(AppError::Validation("'tests' must be a non-empty array".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FailurePolicy;
    use crate::testing::{orchestrator, FakeStepStore, FakeTracker};
    use axum::body::to_bytes;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use serde_json::json;
    use std::sync::Arc;

    fn state(tracker: Arc<FakeTracker>, policy: FailurePolicy) -> AppState {
        AppState {
            orchestrator: Arc::new(orchestrator(tracker, Arc::new(FakeStepStore::default()), policy)),
        }
    }

    async fn call(state: AppState, body: Value) -> (StatusCode, Value) {
        let payload: CreateTestsPayload = serde_json::from_value(body).unwrap();
        let response = create_tests(State(state), Ok(Json(payload))).await.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn tallies_created_and_skipped() {
        let tracker = Arc::new(FakeTracker::default().with_existing("QA-1", "QA-50", "Login test"));
        let (status, body) = call(
            state(tracker.clone(), FailurePolicy::FailFast),
            json!({ "tests": [
                { "requirementId": "QA-1", "name": "Login test" },
                { "requirementId": "QA-1", "name": "Logout test" }
            ]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "message": "Test cases processed", "created": 1, "skipped": 1 })
        );
        assert_eq!(tracker.create_calls(), 1);
    }

    #[tokio::test]
    async fn accepts_tests_as_json_string() {
        let tracker = Arc::new(FakeTracker::default());
        let tests = json!([{ "requirementId": "QA-1", "name": "Login" }]).to_string();
        let (status, body) = call(state(tracker, FailurePolicy::FailFast), json!({ "tests": tests })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(1));
    }

    #[tokio::test]
    async fn rejects_missing_empty_or_unparsable_tests() {
        for body in [
            json!({}),
            json!({ "tests": null }),
            json!({ "tests": [] }),
            json!({ "tests": "[not json" }),
            json!({ "tests": "{\"a\": 1}" }),
            json!({ "tests": 3 }),
        ] {
            let tracker = Arc::new(FakeTracker::default());
            let (status, response) = call(state(tracker.clone(), FailurePolicy::FailFast), body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert!(response["error"].is_string());
            assert!(tracker.calls().is_empty());
        }
    }

    #[tokio::test]
    async fn upstream_failure_is_a_500_with_its_payload() {
        let tracker = Arc::new(FakeTracker::default().failing_create_for("Broken"));
        let (status, body) = call(
            state(tracker, FailurePolicy::FailFast),
            json!({ "tests": [
                { "requirementId": "QA-1", "name": "Fine" },
                { "requirementId": "QA-1", "name": "Broken" }
            ]}),
        )
        .await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": { "errorMessages": ["cannot create Broken"] } }));
    }

    #[tokio::test]
    async fn isolate_policy_reports_per_item_results() {
        let tracker = Arc::new(FakeTracker::default().failing_create_for("Broken"));
        let (status, body) = call(
            state(tracker, FailurePolicy::Isolate),
            json!({ "tests": [
                { "requirementId": "QA-1", "name": "Broken" },
                { "requirementId": "QA-1", "name": "Fine" }
            ]}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["created"], json!(1));
        assert_eq!(body["failed"], json!(1));
        assert_eq!(body["results"][0]["status"], json!("failed"));
        assert_eq!(body["results"][1]["status"], json!("created"));
    }
}
