//! `sitesmith generate` command.

use std::path::Path;

use tracing::{info, warn};

use crate::adapters::live::images::resolve_image_arg;
use crate::adapters::live::store::FsProjectStore;
use crate::adapters::live::workflow::InlineRunner;
use crate::adapters::memory::MemoryProjectStore;
use crate::cassette::config::CassetteConfig;
use crate::cli::GenerateArgs;
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::error::RunFailure;
use crate::generate::pipeline::{Pipeline, RunReport, StageOutcome, StageReport};
use crate::generate::types::{GenerationContext, ImageRef};
use crate::ports::store::ProjectStore;

/// Records model and image traffic into a session under this directory.
pub const RECORD_ENV: &str = "SITESMITH_RECORD";
/// Replays model and image traffic from a recorded session directory.
pub const REPLAY_ENV: &str = "SITESMITH_REPLAY";

/// Execute the `generate` command.
///
/// Runs the pipeline up to `workflow.max_run_attempts` times while the
/// failure is retryable, then prints the stage table and file list.
///
/// # Errors
///
/// Returns an error string if the input cannot be assembled, the adapters
/// cannot be built, or the final attempt fails.
pub fn run(settings: &Settings, args: &GenerateArgs) -> Result<(), String> {
    let context = build_context(args)?;
    let store: Box<dyn ProjectStore> = if args.dry_run {
        Box::new(MemoryProjectStore::new())
    } else {
        Box::new(FsProjectStore::new(&settings.store.root))
    };

    let (services, session) = if let Some(dir) = std::env::var_os(REPLAY_ENV) {
        let config = CassetteConfig::from_dir(Path::new(&dir));
        (ServiceContext::replaying_from(&config, store)?, None)
    } else if let Some(dir) = std::env::var_os(RECORD_ENV) {
        let (services, session) =
            ServiceContext::recording_in(&settings.model, store, Path::new(&dir))?;
        (services, Some(session))
    } else {
        (ServiceContext::live(&settings.model, store)?, None)
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;
    let result = runtime.block_on(run_with_retry(&services, settings, &context));

    if let Some(session) = session {
        drop(services);
        let dir = session.finish()?;
        eprintln!("Recording saved to: {}", dir.display());
    }

    let report = result.map_err(|failure| {
        print_stages(&failure.stages);
        failure.to_string()
    })?;
    print_report(&report, args.dry_run.then_some("(dry run, nothing stored)"));
    Ok(())
}

/// Runs the pipeline, re-invoking it from scratch on retryable failures.
///
/// Every attempt gets a fresh run id and journal. Regeneration overwrites
/// files by path, so repeated attempts converge on the same project state.
///
/// # Errors
///
/// Returns the failure of the last attempt.
pub async fn run_with_retry(
    services: &ServiceContext,
    settings: &Settings,
    context: &GenerationContext,
) -> Result<RunReport, RunFailure> {
    let max_attempts = settings.workflow.max_run_attempts.max(1);
    let mut attempt = 1;
    loop {
        let runner = InlineRunner::new(settings.workflow.step_attempts);
        match Pipeline::new(services, settings, &runner)
            .run(context)
            .await
        {
            Ok(report) => {
                info!(attempt, run = %report.run_id, "generation finished");
                return Ok(report);
            }
            Err(failure) if failure.error.is_retryable() && attempt < max_attempts => {
                warn!(attempt, max_attempts, error = %failure, "run failed, retrying");
                attempt += 1;
            }
            Err(failure) => return Err(failure),
        }
    }
}

/// Assembles the run input from a JSON bundle or from individual flags.
fn build_context(args: &GenerateArgs) -> Result<GenerationContext, String> {
    let mut context = match &args.bundle {
        Some(path) => read_bundle(path)?,
        None => GenerationContext {
            project_id: args.project_id.clone().unwrap_or_default(),
            site_url: args.site_url.clone().unwrap_or_default(),
            user_prompt: args.prompt.clone(),
            images: args
                .images
                .iter()
                .map(|i| ImageRef::new(i.as_str()))
                .collect(),
            raw_markup: match &args.markup {
                Some(path) => std::fs::read_to_string(path)
                    .map_err(|e| format!("Failed to read markup file {}: {e}", path.display()))?,
                None => String::new(),
            },
        },
    };

    if context.project_id.trim().is_empty() {
        return Err("project id must not be empty".into());
    }
    context.images = context
        .images
        .iter()
        .map(|image| resolve_image_arg(&image.url))
        .collect::<Result<_, _>>()?;
    Ok(context)
}

fn read_bundle(path: &Path) -> Result<GenerationContext, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read bundle {}: {e}", path.display()))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse bundle {}: {e}", path.display()))
}

fn print_stages(stages: &[StageReport]) {
    for report in stages {
        let outcome = match &report.outcome {
            StageOutcome::Completed => "completed".to_string(),
            StageOutcome::Degraded { reason } => format!("degraded: {reason}"),
            StageOutcome::Skipped => "skipped".to_string(),
            StageOutcome::Failed { message, .. } => format!("failed: {message}"),
        };
        println!("{:<10}  {outcome}", report.stage.to_string());
    }
}

fn print_report(report: &RunReport, note: Option<&str>) {
    println!("Run {} for project {}", report.run_id, report.project_id);
    print_stages(&report.stages);
    println!();
    let width = report
        .files
        .iter()
        .map(|f| f.path.len())
        .max()
        .unwrap_or(4)
        .max(4);
    for file in &report.files {
        println!("{:<width$}  {:>8} bytes", file.path, file.content.len());
    }
    println!(
        "\n{} file(s) generated. {}",
        report.files.len(),
        note.unwrap_or("")
    );
}
