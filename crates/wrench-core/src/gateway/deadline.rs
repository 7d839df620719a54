//! Deadline wrapper for executor gateways.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, anyhow};
use async_trait::async_trait;

use super::{ExecutionRequest, ExecutorGateway};

/// Wraps an [`ExecutorGateway`] so that a call taking longer than the
/// deadline fails as a transport fault. The inner future is dropped on
/// expiry.
pub struct DeadlineExecutor {
    inner: Arc<dyn ExecutorGateway>,
    deadline: Duration,
}

impl DeadlineExecutor {
    pub fn new(inner: Arc<dyn ExecutorGateway>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

#[async_trait]
impl ExecutorGateway for DeadlineExecutor {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn execute(&self, request: &ExecutionRequest) -> Result<String> {
        match tokio::time::timeout(self.deadline, self.inner.execute(request)).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    executor = self.inner.name(),
                    step_number = request.step_number,
                    deadline_secs = self.deadline.as_secs_f64(),
                    "executor deadline expired"
                );
                Err(anyhow!(
                    "executor {} did not answer within {:?}",
                    self.inner.name(),
                    self.deadline
                ))
            }
        }
    }
}
