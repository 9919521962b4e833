//! Refinement pass over a generated project.
//!
//! Never fails the run: any error is logged and the input files come back
//! unchanged alongside the error.

use tracing::{info, warn};

use super::colors::ColorGuidance;
use super::continuation::{
    generate_with_continuation, ContinuationPolicy, ModelCall, ProgressSlot,
};
use super::progress::{Band, ProgressReporter};
use super::prompt::{revision_messages, PromptLimits};
use super::reconcile::{apply_diffs, merge_overwrites};
use super::types::{FileSet, GenerationContext, Stage};
use crate::error::PipelineError;

/// Sub-range of the revising band used while the model is answering.
const REVISION_CALL_BAND: Band = Band { min: 65, max: 85 };

/// What the revision pass changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RevisionStats {
    /// Diffs that replaced text.
    pub diffs_applied: usize,
    /// Diffs skipped as no-ops.
    pub diffs_skipped: usize,
    /// Full-file writes merged.
    pub files_written: usize,
    /// Continuation ran out of attempts.
    pub degraded: bool,
}

/// Result of [`revise`]: the files to keep and how the pass went.
#[derive(Debug)]
pub struct Revision {
    /// Revised files, or the input files when the pass failed.
    pub files: FileSet,
    /// Stats on success, the swallowed error on failure.
    pub result: Result<RevisionStats, PipelineError>,
}

/// Inputs shared by one revision pass.
pub struct RevisionRequest<'a> {
    /// Run input.
    pub context: &'a GenerationContext,
    /// Color guidance computed during generation.
    pub guidance: &'a ColorGuidance,
    /// Prompt size limits.
    pub limits: PromptLimits,
    /// Continuation turns allowed.
    pub max_attempts: u32,
}

/// Asks the model to refine `files` and reconciles its edits.
///
/// Diffs are applied first, then full-file writes are merged over the result.
pub async fn revise(
    model: &ModelCall<'_>,
    request: &RevisionRequest<'_>,
    files: &FileSet,
    reporter: Option<&ProgressReporter<'_>>,
) -> Revision {
    let messages = revision_messages(request.context, files, request.guidance, &request.limits);
    let policy = ContinuationPolicy {
        max_attempts: request.max_attempts,
        accept_diffs: true,
    };
    let slot = reporter.map(|reporter| ProgressSlot {
        reporter,
        stage: Stage::Revising,
        band: REVISION_CALL_BAND,
    });

    let outcome = match generate_with_continuation(model, messages, policy, slot).await {
        Ok(outcome) => outcome,
        Err(error) => {
            warn!(error = %error, "revision failed, keeping generated files");
            return Revision {
                files: files.clone(),
                result: Err(error),
            };
        }
    };

    let reconciled = apply_diffs(files, &outcome.diffs);
    let overwrites = outcome.files.to_vec();
    let revised = merge_overwrites(&reconciled.files, &overwrites);

    let stats = RevisionStats {
        diffs_applied: reconciled.applied(),
        diffs_skipped: reconciled.outcomes.len() - reconciled.applied(),
        files_written: overwrites.len(),
        degraded: outcome.degraded,
    };
    info!(
        applied = stats.diffs_applied,
        skipped = stats.diffs_skipped,
        written = stats.files_written,
        files = revised.len(),
        "revision merged"
    );
    Revision {
        files: revised,
        result: Ok(stats),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::ModelSettings;
    use crate::error::ModelError;
    use crate::generate::test_support::ScriptedLlm;
    use crate::generate::types::GeneratedFile;

    fn context() -> GenerationContext {
        GenerationContext {
            project_id: "p".into(),
            site_url: "https://example.com".into(),
            user_prompt: None,
            images: Vec::new(),
            raw_markup: String::new(),
        }
    }

    fn base_files() -> FileSet {
        vec![
            GeneratedFile::new("app/page.tsx", "<h1 className=\"text-sm\">Hi</h1>"),
            GeneratedFile::new("app/globals.css", "body { margin: 0 }"),
        ]
        .into_iter()
        .collect()
    }

    async fn run(llm: &ScriptedLlm, files: &FileSet) -> Revision {
        let settings = ModelSettings::default();
        let model = ModelCall::new(llm, &settings);
        let ctx = context();
        let guidance = ColorGuidance::default();
        let request = RevisionRequest {
            context: &ctx,
            guidance: &guidance,
            limits: PromptLimits {
                max_images: 5,
                markup_sample_chars: 1_000,
                max_essential_files: 10,
                essential_file_chars: 1_000,
            },
            max_attempts: 1,
        };
        revise(&model, &request, files, None).await
    }

    #[tokio::test]
    async fn diffs_then_overwrites_are_applied() {
        let llm = ScriptedLlm::new([concat!(
            "<artifact id=\"r\">",
            "<action type=\"diff\" path=\"app/page.tsx\"><old>text-sm</old><new>text-4xl</new></action>",
            "<action type=\"diff\" path=\"app/missing.tsx\"><old>a</old><new>b</new></action>",
            "<action type=\"file\" path=\"components/Nav.tsx\">nav</action>",
            "</artifact>",
        )]);
        let files = base_files();

        let revision = run(&llm, &files).await;

        let stats = revision.result.unwrap();
        assert_eq!(
            stats,
            RevisionStats {
                diffs_applied: 1,
                diffs_skipped: 1,
                files_written: 1,
                degraded: false
            }
        );
        assert_eq!(
            revision.files.get("app/page.tsx").unwrap().content,
            "<h1 className=\"text-4xl\">Hi</h1>"
        );
        assert!(revision.files.get("components/Nav.tsx").is_some());
        assert!(Arc::ptr_eq(
            revision.files.get("app/globals.css").unwrap(),
            files.get("app/globals.css").unwrap()
        ));
    }

    #[tokio::test]
    async fn full_file_write_wins_over_diff_for_same_path() {
        let llm = ScriptedLlm::new([concat!(
            "<artifact id=\"r\">",
            "<action type=\"diff\" path=\"app/page.tsx\"><old>Hi</old><new>Hello</new></action>",
            "<action type=\"file\" path=\"app/page.tsx\">rewritten</action>",
            "</artifact>",
        )]);
        let revision = run(&llm, &base_files()).await;
        assert_eq!(
            revision.files.get("app/page.tsx").unwrap().content,
            "rewritten"
        );
    }

    #[tokio::test]
    async fn model_failure_returns_input_unchanged() {
        let llm = ScriptedLlm::failing(ModelError::Transport {
            message: "reset".into(),
        });
        let files = base_files();
        let revision = run(&llm, &files).await;
        assert!(matches!(revision.result, Err(PipelineError::Model(_))));
        assert_eq!(revision.files, files);
    }

    #[tokio::test]
    async fn unusable_output_returns_input_unchanged() {
        let llm = ScriptedLlm::repeating("Looks great already!");
        let files = base_files();
        let revision = run(&llm, &files).await;
        assert!(matches!(
            revision.result,
            Err(PipelineError::NoFilesExtracted { attempts: 1 })
        ));
        assert_eq!(revision.files, files);
        assert_eq!(llm.call_count(), 2);
    }
}
