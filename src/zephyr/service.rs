use std::sync::Arc;
use tracing::debug;

use crate::case::model::TestStep;
use crate::zephyr::client::{StepError, StepStore};

#[derive(Clone)]
pub struct StepPublisher {
    store: Arc<dyn StepStore>,
}

impl StepPublisher {
    pub fn new(store: Arc<dyn StepStore>) -> Self {
        Self { store }
    }

    /// Publishes steps one at a time in list order. A failure stops the
    /// remaining steps; those already published stay.
    pub async fn publish(&self, issue_id: &str, project_id: &str, steps: &[TestStep]) -> Result<usize, StepError> {
        for (i, step) in steps.iter().enumerate() {
            debug!("publishing step {}/{} for issue {}", i + 1, steps.len(), issue_id);
            self.store.create_step(issue_id, project_id, step).await?;
        }
        Ok(steps.len())
    }
}
