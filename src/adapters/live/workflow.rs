//! In-process adapter for the `StepRunner` port.
//!
//! Steps run inline on the caller's task. Each finished step is appended to
//! an in-memory journal; a step name that already has a journaled output is
//! answered from the journal without running `op` again.

use std::future::Future;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::ports::workflow::StepRunner;

/// One journaled step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    /// Step name passed to `run_step`.
    pub name: String,
    /// Attempts used, including the successful one.
    pub attempts: u32,
    /// Output value on success.
    pub output: Option<Value>,
    /// Error message of the last attempt on failure.
    pub error: Option<String>,
}

/// Runs steps inline, retrying retryable step errors.
pub struct InlineRunner {
    run_id: String,
    step_attempts: u32,
    journal: Mutex<Vec<StepRecord>>,
}

impl InlineRunner {
    /// Creates a runner with a fresh run id. `step_attempts` is clamped to 1.
    #[must_use]
    pub fn new(step_attempts: u32) -> Self {
        Self::with_run_id(Uuid::new_v4().to_string(), step_attempts)
    }

    /// Creates a runner with a fixed run id.
    pub fn with_run_id(run_id: impl Into<String>, step_attempts: u32) -> Self {
        Self {
            run_id: run_id.into(),
            step_attempts: step_attempts.max(1),
            journal: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of the journal in execution order.
    pub fn journal(&self) -> Vec<StepRecord> {
        self.journal.lock().expect("journal lock poisoned").clone()
    }

    fn journaled_output(&self, name: &str) -> Option<Value> {
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.output.clone())
    }

    fn record(&self, record: StepRecord) {
        self.journal
            .lock()
            .expect("journal lock poisoned")
            .push(record);
    }
}

impl StepRunner for InlineRunner {
    fn run_id(&self) -> &str {
        &self.run_id
    }

    async fn run_step<F, Fut>(&self, name: &str, op: F) -> Result<Value, PipelineError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, PipelineError>>,
    {
        if let Some(output) = self.journaled_output(name) {
            debug!(run = %self.run_id, step = name, "step answered from journal");
            return Ok(output);
        }

        let mut attempt = 1;
        loop {
            match op().await {
                Ok(output) => {
                    self.record(StepRecord {
                        name: name.to_string(),
                        attempts: attempt,
                        output: Some(output.clone()),
                        error: None,
                    });
                    return Ok(output);
                }
                Err(e) if e.is_retryable() && attempt < self.step_attempts => {
                    warn!(
                        run = %self.run_id,
                        step = name,
                        attempt,
                        error = %e,
                        "step failed, retrying"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    self.record(StepRecord {
                        name: name.to_string(),
                        attempts: attempt,
                        output: None,
                        error: Some(e.to_string()),
                    });
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use serde_json::json;

    use super::*;
    use crate::error::ModelError;

    #[tokio::test]
    async fn journals_successful_steps() {
        let runner = InlineRunner::with_run_id("run-1", 1);
        let out = runner
            .run_step("prepare", || async {
                Ok::<_, PipelineError>(json!("markup"))
            })
            .await
            .unwrap();

        assert_eq!(out, json!("markup"));
        assert_eq!(runner.run_id(), "run-1");
        let journal = runner.journal();
        assert_eq!(journal.len(), 1);
        assert_eq!(journal[0].name, "prepare");
        assert_eq!(journal[0].attempts, 1);
        assert_eq!(journal[0].output, Some(json!("markup")));
    }

    #[tokio::test]
    async fn retries_retryable_errors_until_success() {
        let runner = InlineRunner::new(3);
        let calls = AtomicU32::new(0);
        let out = runner
            .run_step("generate", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        Err(PipelineError::from(ModelError::Timeout { secs: 1 }))
                    } else {
                        Ok(json!(n))
                    }
                }
            })
            .await
            .unwrap();

        assert_eq!(out, json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(runner.journal()[0].attempts, 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let runner = InlineRunner::new(5);
        let calls = AtomicU32::new(0);
        let err = runner
            .run_step("persist", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<Value, _>(PipelineError::PersistenceRejected {
                        reason: "empty".into(),
                    })
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::PersistenceRejected { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let journal = runner.journal();
        assert!(journal[0].output.is_none());
        assert!(journal[0].error.as_deref().unwrap().contains("empty"));
    }

    #[tokio::test]
    async fn exhausted_retries_return_last_error() {
        let runner = InlineRunner::new(2);
        let calls = AtomicU32::new(0);
        let result = runner
            .run_step("generate", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err::<Value, _>(PipelineError::from(ModelError::Transport {
                        message: "reset".into(),
                    }))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn completed_step_is_not_rerun() {
        let runner = InlineRunner::new(1);
        let calls = AtomicU32::new(0);
        for _ in 0..2 {
            let out = runner
                .run_step("prepare", || {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, PipelineError>(json!("once")) }
                })
                .await
                .unwrap();
            assert_eq!(out, json!("once"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(runner.journal().len(), 1);
    }
}
