//! Stage sequencing for one generation run.
//!
//! Each stage runs as a named workflow step whose output is a JSON value.
//! Every stage except revise is fail-closed: the project is marked failed,
//! progress is reset, and the caller receives a [`RunFailure`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use super::colors::{analyze_colors, ColorCache, ColorGuidance, ColorLimits};
use super::continuation::{
    generate_with_continuation, ContinuationPolicy, ModelCall, ProgressSlot,
};
use super::progress::{band, ProgressReporter};
use super::prompt::{initial_messages, PromptLimits};
use super::revision::{revise, RevisionRequest, RevisionStats};
use super::sanitize::sanitize_markup;
use super::types::{
    is_project_path, normalize_path, FileSet, GeneratedFile, GenerationContext, PipelineStage,
    ProjectStatus, Stage,
};
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::error::{ErrorKind, PipelineError, RunFailure};
use crate::ports::store::ProjectStore;
use crate::ports::workflow::StepRunner;

/// How one stage ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StageOutcome {
    /// The stage did its job.
    Completed,
    /// The stage finished with reduced output.
    Degraded {
        /// What went wrong.
        reason: String,
    },
    /// The stage was turned off.
    Skipped,
    /// The stage aborted the run.
    Failed {
        /// Error classification.
        kind: ErrorKind,
        /// Error message.
        message: String,
    },
}

/// One row of the stage-result table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    /// Which stage.
    pub stage: PipelineStage,
    /// How it ended.
    #[serde(flatten)]
    pub outcome: StageOutcome,
}

/// Summary of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Workflow run id.
    pub run_id: String,
    /// Project written to.
    pub project_id: String,
    /// Files handed to the store.
    pub files: Vec<GeneratedFile>,
    /// Stage outcomes in execution order.
    pub stages: Vec<StageReport>,
}

/// Journaled output of the generate step.
#[derive(Debug, Serialize, Deserialize)]
struct GenerateOutput {
    files: Vec<GeneratedFile>,
    attempts: u32,
    degraded: bool,
    guidance: ColorGuidance,
}

/// Journaled output of the revise step.
#[derive(Debug, Serialize, Deserialize)]
struct ReviseOutput {
    files: Vec<GeneratedFile>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    degraded: bool,
}

/// Runs the generation stages for one project through a [`StepRunner`].
pub struct Pipeline<'a, R: StepRunner> {
    services: &'a ServiceContext,
    settings: &'a Settings,
    runner: &'a R,
    colors: ColorCache,
}

impl<'a, R: StepRunner> Pipeline<'a, R> {
    /// Creates a pipeline with a fresh color cache.
    pub fn new(services: &'a ServiceContext, settings: &'a Settings, runner: &'a R) -> Self {
        Self {
            services,
            settings,
            runner,
            colors: ColorCache::new(),
        }
    }

    /// Executes every stage for `ctx`.
    ///
    /// # Errors
    ///
    /// Returns a [`RunFailure`] naming the first fail-closed stage that
    /// failed. By then the project is marked failed with zero progress.
    pub async fn run(&self, ctx: &GenerationContext) -> Result<RunReport, RunFailure> {
        let reporter = ProgressReporter::new(self.services.store.as_ref(), &ctx.project_id);
        let reporter = &reporter;
        let mut stages = Vec::new();
        info!(
            run = self.runner.run_id(),
            project = %ctx.project_id,
            site = %ctx.site_url,
            "starting run"
        );

        let markup = match self
            .runner
            .run_step("prepare", move || self.prepare(ctx, reporter))
            .await
        {
            Ok(value) => value,
            Err(e) => return Err(self.fail(ctx, reporter, PipelineStage::Prepare, e, stages)),
        };
        let markup: String = match decode(markup) {
            Ok(markup) => markup,
            Err(e) => return Err(self.fail(ctx, reporter, PipelineStage::Prepare, e, stages)),
        };
        stages.push(completed(PipelineStage::Prepare));

        let markup = markup.as_str();
        let generated = match self
            .runner
            .run_step("generate", move || self.generate(ctx, markup, reporter))
            .await
        {
            Ok(value) => value,
            Err(e) => return Err(self.fail(ctx, reporter, PipelineStage::Generate, e, stages)),
        };
        let generated: GenerateOutput = match decode(generated) {
            Ok(output) => output,
            Err(e) => return Err(self.fail(ctx, reporter, PipelineStage::Generate, e, stages)),
        };
        stages.push(if generated.degraded {
            degraded(
                PipelineStage::Generate,
                format!(
                    "continuation exhausted after {} attempt(s)",
                    generated.attempts
                ),
            )
        } else {
            completed(PipelineStage::Generate)
        });

        let final_files = if self.settings.generation.enable_revision {
            let input = &generated;
            let revised = self
                .runner
                .run_step("revise", move || self.revise(ctx, input, reporter))
                .await
                .and_then(decode::<ReviseOutput>);
            match revised {
                Ok(revised) => {
                    stages.push(match (&revised.failure, revised.degraded) {
                        (Some(reason), _) => degraded(PipelineStage::Revise, reason.clone()),
                        (None, true) => degraded(
                            PipelineStage::Revise,
                            "revision continuation exhausted".into(),
                        ),
                        (None, false) => completed(PipelineStage::Revise),
                    });
                    files_value(&revised.files)
                }
                Err(e) => {
                    warn!(error = %e, "revise step failed, keeping generated files");
                    stages.push(degraded(PipelineStage::Revise, e.to_string()));
                    files_value(&generated.files)
                }
            }
        } else {
            info!("revision disabled");
            stages.push(StageReport {
                stage: PipelineStage::Revise,
                outcome: StageOutcome::Skipped,
            });
            files_value(&generated.files)
        };

        let final_files = &final_files;
        let persisted = match self
            .runner
            .run_step("persist", move || self.persist(ctx, final_files, reporter))
            .await
        {
            Ok(value) => value,
            Err(e) => return Err(self.fail(ctx, reporter, PipelineStage::Persist, e, stages)),
        };
        let files: Vec<GeneratedFile> = match decode(persisted) {
            Ok(files) => files,
            Err(e) => return Err(self.fail(ctx, reporter, PipelineStage::Persist, e, stages)),
        };
        stages.push(completed(PipelineStage::Persist));

        if let Err(e) = self
            .runner
            .run_step("complete", move || self.complete(ctx, reporter))
            .await
        {
            return Err(self.fail(ctx, reporter, PipelineStage::Complete, e, stages));
        }
        stages.push(completed(PipelineStage::Complete));

        info!(
            run = self.runner.run_id(),
            project = %ctx.project_id,
            files = files.len(),
            "run completed"
        );
        Ok(RunReport {
            run_id: self.runner.run_id().to_string(),
            project_id: ctx.project_id.clone(),
            files,
            stages,
        })
    }

    #[allow(clippy::unused_async)]
    async fn prepare(
        &self,
        ctx: &GenerationContext,
        reporter: &ProgressReporter<'_>,
    ) -> Result<Value, PipelineError> {
        set_status(
            self.services.store.as_ref(),
            &ctx.project_id,
            ProjectStatus::Processing,
        )?;
        reporter.enter(Stage::Preparing);
        let markup = sanitize_markup(&ctx.raw_markup, self.settings.generation.max_markup_chars);
        info!(
            raw = ctx.raw_markup.len(),
            sanitized = markup.len(),
            "markup sanitized"
        );
        reporter.report_within(Stage::Preparing, 1.0);
        Ok(Value::String(markup))
    }

    async fn generate(
        &self,
        ctx: &GenerationContext,
        markup: &str,
        reporter: &ProgressReporter<'_>,
    ) -> Result<Value, PipelineError> {
        let generation = &self.settings.generation;
        reporter.enter(Stage::Generating);

        let limits = ColorLimits {
            max_images: generation.max_color_images,
            concurrency: generation.color_concurrency,
            colors_per_image: generation.colors_per_image,
        };
        let guidance = analyze_colors(
            self.services.images.as_ref(),
            &ctx.images,
            &self.colors,
            limits,
        )
        .await;
        reporter.report_within(Stage::Generating, 0.25);

        let messages = initial_messages(ctx, markup, &guidance, &self.prompt_limits());
        let model = ModelCall::new(self.services.llm.as_ref(), &self.settings.model);
        let policy = ContinuationPolicy {
            max_attempts: generation.max_continuation_attempts,
            accept_diffs: false,
        };
        let slot = ProgressSlot {
            reporter,
            stage: Stage::Continuation,
            band: band(Stage::Continuation),
        };
        let outcome = generate_with_continuation(&model, messages, policy, Some(slot)).await?;

        if outcome.attempts == 0 {
            reporter.report_within(Stage::Generating, 1.0);
        }
        info!(
            files = outcome.files.len(),
            attempts = outcome.attempts,
            "initial generation finished"
        );

        to_value(&GenerateOutput {
            files: outcome.files.to_vec(),
            attempts: outcome.attempts,
            degraded: outcome.degraded,
            guidance,
        })
    }

    async fn revise(
        &self,
        ctx: &GenerationContext,
        generated: &GenerateOutput,
        reporter: &ProgressReporter<'_>,
    ) -> Result<Value, PipelineError> {
        reporter.enter(Stage::Revising);
        let files: FileSet = generated.files.iter().cloned().collect();
        let request = RevisionRequest {
            context: ctx,
            guidance: &generated.guidance,
            limits: self.prompt_limits(),
            max_attempts: self.settings.generation.revision_continuation_attempts,
        };
        let model = ModelCall::new(self.services.llm.as_ref(), &self.settings.model);
        let revision = revise(&model, &request, &files, Some(reporter)).await;
        reporter.report_within(Stage::Revising, 1.0);

        let (failure, degraded) = match &revision.result {
            Ok(RevisionStats { degraded, .. }) => (None, *degraded),
            Err(e) => (Some(e.to_string()), false),
        };
        to_value(&ReviseOutput {
            files: revision.files.to_vec(),
            failure,
            degraded,
        })
    }

    #[allow(clippy::unused_async)]
    async fn persist(
        &self,
        ctx: &GenerationContext,
        files: &Value,
        reporter: &ProgressReporter<'_>,
    ) -> Result<Value, PipelineError> {
        reporter.enter(Stage::Finalizing);
        let stored = persist_files(self.services.store.as_ref(), &ctx.project_id, files)?;
        reporter.report_within(Stage::Finalizing, 1.0);
        to_value(&stored)
    }

    #[allow(clippy::unused_async)]
    async fn complete(
        &self,
        ctx: &GenerationContext,
        reporter: &ProgressReporter<'_>,
    ) -> Result<Value, PipelineError> {
        set_status(
            self.services.store.as_ref(),
            &ctx.project_id,
            ProjectStatus::Completed,
        )?;
        reporter.update(100.0, Some(Stage::Completed));
        Ok(Value::Null)
    }

    fn prompt_limits(&self) -> PromptLimits {
        let generation = &self.settings.generation;
        PromptLimits {
            max_images: generation.max_prompt_images,
            markup_sample_chars: generation.markup_sample_chars,
            max_essential_files: generation.max_essential_files,
            essential_file_chars: generation.essential_file_chars,
        }
    }

    fn fail(
        &self,
        ctx: &GenerationContext,
        reporter: &ProgressReporter<'_>,
        stage: PipelineStage,
        error: PipelineError,
        mut stages: Vec<StageReport>,
    ) -> RunFailure {
        error!(
            run = self.runner.run_id(),
            project = %ctx.project_id,
            %stage,
            error = %error,
            "run failed"
        );
        if let Err(e) = self
            .services
            .store
            .set_status(&ctx.project_id, ProjectStatus::Failed)
        {
            error!(project = %ctx.project_id, error = %e, "failed to mark project failed");
        }
        reporter.fail();
        stages.push(StageReport {
            stage,
            outcome: StageOutcome::Failed {
                kind: error.kind(),
                message: error.to_string(),
            },
        });
        RunFailure {
            stage,
            error,
            stages,
        }
    }
}

/// Validates a journaled file list and hands it to the store.
///
/// The value must be a non-empty JSON array of `{path, content}` objects.
/// Leading `/` and `./` are stripped from paths, and duplicate paths collapse
/// to the last entry. Nothing is written when the
/// value is rejected.
///
/// # Errors
///
/// Returns [`PipelineError::PersistenceRejected`] for an invalid value or a
/// path leaving the project, and
/// [`PipelineError::Store`] if the write fails.
pub fn persist_files(
    store: &dyn ProjectStore,
    project_id: &str,
    files: &Value,
) -> Result<Vec<GeneratedFile>, PipelineError> {
    let Some(items) = files.as_array() else {
        return Err(PipelineError::PersistenceRejected {
            reason: format!("expected a file list, got {}", kind_of(files)),
        });
    };
    if items.is_empty() {
        return Err(PipelineError::PersistenceRejected {
            reason: "file list is empty".into(),
        });
    }
    let files: Vec<GeneratedFile> =
        serde_json::from_value(files.clone()).map_err(|e| PipelineError::PersistenceRejected {
            reason: format!("malformed file entry: {e}"),
        })?;
    let files = files
        .into_iter()
        .map(|file| {
            let path = normalize_path(&file.path);
            if is_project_path(path) {
                Ok(GeneratedFile::new(path, file.content))
            } else {
                Err(PipelineError::PersistenceRejected {
                    reason: format!("file path escapes the project: {:?}", file.path),
                })
            }
        })
        .collect::<Result<FileSet, _>>()?
        .to_vec();

    store
        .append_files(project_id, &files)
        .map_err(|e| PipelineError::Store(e.to_string()))?;
    info!(project = project_id, files = files.len(), "files persisted");
    Ok(files)
}

fn set_status(
    store: &dyn ProjectStore,
    id: &str,
    status: ProjectStatus,
) -> Result<(), PipelineError> {
    store
        .set_status(id, status)
        .map_err(|e| PipelineError::Store(format!("failed to set status {status}: {e}")))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn files_value(files: &[GeneratedFile]) -> Value {
    serde_json::to_value(files).unwrap_or(Value::Null)
}

fn to_value<T: Serialize>(value: &T) -> Result<Value, PipelineError> {
    serde_json::to_value(value).map_err(|e| PipelineError::Journal(e.to_string()))
}

fn decode<T: for<'de> Deserialize<'de>>(value: Value) -> Result<T, PipelineError> {
    serde_json::from_value(value).map_err(|e| PipelineError::Journal(e.to_string()))
}

const fn completed(stage: PipelineStage) -> StageReport {
    StageReport {
        stage,
        outcome: StageOutcome::Completed,
    }
}

const fn degraded(stage: PipelineStage, reason: String) -> StageReport {
    StageReport {
        stage,
        outcome: StageOutcome::Degraded { reason },
    }
}
