//! Workflow engine port: named, journaled steps.

use std::future::Future;

use serde_json::Value;

use crate::error::PipelineError;

/// Executes named pipeline steps on behalf of a hosting workflow engine.
///
/// Step outputs cross the engine boundary as JSON values, the same way a
/// durable engine journals them. The engine owns any retry policy; the
/// pipeline calls [`StepRunner::run_step`] exactly once per stage.
pub trait StepRunner: Send + Sync {
    /// Identifier of the run this runner executes.
    fn run_id(&self) -> &str;

    /// Runs `op` as the step called `name`, returning its journaled output.
    ///
    /// `op` may be invoked more than once if the engine retries the step.
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt when the step does not succeed.
    fn run_step<F, Fut>(
        &self,
        name: &str,
        op: F,
    ) -> impl Future<Output = Result<Value, PipelineError>>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<Value, PipelineError>>;
}
