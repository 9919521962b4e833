//! Bounded multi-turn continuation of truncated model output.
//!
//! The first turn is judged as a whole. When it lacks files, misses the
//! closing wrapper, or ends inside an action, the controller replays the
//! conversation with [`CONTINUE_DIRECTIVE`] until the output completes or the
//! attempt ceiling is reached. Each turn reparses the stitched transcript so a
//! file cut mid-body is recovered once its tail arrives.

use tracing::{debug, info, warn};

use super::parser::{parse_output, ParsedOutput};
use super::progress::{Band, ProgressReporter};
use super::prompt::CONTINUE_DIRECTIVE;
use super::types::{FileDiff, FileSet, Stage};
use crate::config::ModelSettings;
use crate::error::{ModelError, PipelineError};
use crate::ports::llm::{ChatMessage, CompletionRequest, LlmClient};

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationState {
    /// Before the first model call.
    Initial,
    /// The last output was incomplete.
    NeedsContinuation,
    /// A continuation turn is in flight.
    Continuing {
        /// 1-based continuation attempt.
        attempt: u32,
    },
    /// Output is complete.
    Complete,
    /// Attempts ran out.
    Failed,
}

/// Bounds and acceptance rules for one controller run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationPolicy {
    /// Continuation turns allowed after the first turn.
    pub max_attempts: u32,
    /// Whether diffs count as usable output.
    pub accept_diffs: bool,
}

/// Progress target for continuation turns.
#[derive(Clone, Copy)]
pub struct ProgressSlot<'r, 'a> {
    /// Reporter to write through.
    pub reporter: &'r ProgressReporter<'a>,
    /// Stage label written with each update.
    pub stage: Stage,
    /// Range the attempts are spread across.
    pub band: Band,
}

/// What the controller produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationOutcome {
    /// Files accumulated across all turns.
    pub files: FileSet,
    /// Diffs in document order (empty unless diffs are accepted).
    pub diffs: Vec<FileDiff>,
    /// Continuation turns issued.
    pub attempts: u32,
    /// Set when attempts ran out but some usable output exists.
    pub degraded: bool,
}

/// Issues model calls with fixed sampling settings.
pub struct ModelCall<'a> {
    llm: &'a dyn LlmClient,
    settings: &'a ModelSettings,
}

impl<'a> ModelCall<'a> {
    /// Binds a client to the settings used for every request.
    #[must_use]
    pub fn new(llm: &'a dyn LlmClient, settings: &'a ModelSettings) -> Self {
        Self { llm, settings }
    }

    /// Sends `messages` and returns the response text.
    ///
    /// The call is abandoned after the configured hard timeout.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Timeout`] when the timeout elapses, otherwise the
    /// client's [`ModelError`] unchanged.
    pub async fn send(&self, messages: &[ChatMessage]) -> Result<String, ModelError> {
        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: messages.to_vec(),
            max_tokens: self.settings.max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
        };
        let timeout = self.settings.timeout();
        let response = match tokio::time::timeout(timeout, self.llm.complete(&request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(ModelError::Timeout {
                    secs: timeout.as_secs(),
                })
            }
        };
        debug!(
            prompt_tokens = response.prompt_tokens,
            completion_tokens = response.completion_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            chars = response.text.len(),
            "model call finished"
        );
        Ok(response.text)
    }
}

/// Runs the first turn for `messages` and continues it as needed.
///
/// # Errors
///
/// Returns [`PipelineError::Model`] if any call fails, and
/// [`PipelineError::NoFilesExtracted`] if no usable output was produced.
pub async fn generate_with_continuation(
    model: &ModelCall<'_>,
    messages: Vec<ChatMessage>,
    policy: ContinuationPolicy,
    progress: Option<ProgressSlot<'_, '_>>,
) -> Result<ContinuationOutcome, PipelineError> {
    let mut state = ContinuationState::Initial;
    debug!(?state, "starting generation turn");

    let first = model.send(&messages).await?;
    let mut transcript = messages;
    let mut stitched = first.clone();
    let mut last_turn = first;

    let mut files = FileSet::new();
    let parsed = parse_output(&stitched);
    absorb(&mut files, &parsed);
    let mut diffs = collect_diffs(&parsed, policy);

    state = if needs_more(&parsed, policy) {
        ContinuationState::NeedsContinuation
    } else {
        ContinuationState::Complete
    };

    let mut attempts = 0;
    while state != ContinuationState::Complete && attempts < policy.max_attempts {
        attempts += 1;
        state = ContinuationState::Continuing { attempt: attempts };
        info!(
            attempt = attempts,
            max = policy.max_attempts,
            files = files.len(),
            "continuing truncated output"
        );

        transcript.push(ChatMessage::assistant(std::mem::take(&mut last_turn)));
        transcript.push(ChatMessage::user(CONTINUE_DIRECTIVE));
        let fragment = model.send(&transcript).await?;
        stitched.push_str(&fragment);

        let fragment_parsed = parse_output(&fragment);
        let parsed = parse_output(&stitched);
        let new_files = absorb(&mut files, &parsed);
        let all_diffs = collect_diffs(&parsed, policy);
        let new_diffs = all_diffs.len().saturating_sub(diffs.len());
        diffs = all_diffs;
        last_turn = fragment;

        if let Some(slot) = progress {
            let fraction = f64::from(attempts) / f64::from(policy.max_attempts);
            slot.reporter
                .update(slot.band.at(fraction), Some(slot.stage));
        }

        if fragment_parsed.wrapper_closed || new_files > 0 || new_diffs > 0 {
            state = ContinuationState::Complete;
        }
    }

    let usable = !files.is_empty() || !diffs.is_empty();
    if !usable {
        state = ContinuationState::Failed;
        warn!(?state, attempts, "no files extracted");
        return Err(PipelineError::NoFilesExtracted { attempts });
    }

    let degraded = state != ContinuationState::Complete;
    if degraded {
        warn!(
            attempts,
            files = files.len(),
            "continuation attempts exhausted, keeping partial output"
        );
    }
    Ok(ContinuationOutcome {
        files,
        diffs,
        attempts,
        degraded,
    })
}

fn needs_more(parsed: &ParsedOutput, policy: ContinuationPolicy) -> bool {
    if policy.accept_diffs && parsed.file_count() == 0 && parsed.diffs().next().is_some() {
        return !parsed.wrapper_closed || parsed.unterminated;
    }
    parsed.needs_continuation()
}

/// Upserts parsed files, returning how many paths were new.
fn absorb(files: &mut FileSet, parsed: &ParsedOutput) -> usize {
    parsed
        .files()
        .filter(|file| files.upsert((*file).clone()))
        .count()
}

fn collect_diffs(parsed: &ParsedOutput, policy: ContinuationPolicy) -> Vec<FileDiff> {
    if policy.accept_diffs {
        parsed.diffs().cloned().collect()
    } else {
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryProjectStore, StoreCall};
    use crate::generate::progress::band;
    use crate::generate::test_support::ScriptedLlm;
    use std::time::Duration;

    use crate::ports::llm::{CompletionFuture, CompletionResponse, MessageContent};

    const INITIAL: ContinuationPolicy = ContinuationPolicy {
        max_attempts: 5,
        accept_diffs: false,
    };

    async fn run(
        llm: &ScriptedLlm,
        policy: ContinuationPolicy,
    ) -> Result<ContinuationOutcome, PipelineError> {
        let settings = ModelSettings::default();
        let model = ModelCall::new(llm, &settings);
        generate_with_continuation(&model, vec![ChatMessage::user("go")], policy, None).await
    }

    #[tokio::test]
    async fn complete_first_turn_needs_no_continuation() {
        let llm = ScriptedLlm::new([
            "<artifact id=\"a\"><action type=\"file\" path=\"app/page.tsx\">hi</action></artifact>",
        ]);
        let outcome = run(&llm, INITIAL).await.unwrap();
        assert_eq!(outcome.attempts, 0);
        assert!(!outcome.degraded);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn never_emitting_files_exhausts_five_attempts() {
        let llm = ScriptedLlm::repeating("I am thinking about it.");
        let err = run(&llm, INITIAL).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoFilesExtracted { attempts: 5 }
        ));
        assert_eq!(llm.call_count(), 6);
    }

    #[tokio::test]
    async fn truncated_file_is_stitched_across_turns() {
        let llm = ScriptedLlm::new([
            "<artifact id=\"a\">\n<action type=\"file\" path=\"app/page.tsx\">\nexport default function Page() {\n",
            "  return null;\n}\n</action>\n</artifact>",
        ]);
        let outcome = run(&llm, INITIAL).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert!(!outcome.degraded);
        assert_eq!(
            outcome.files.get("app/page.tsx").unwrap().content,
            "export default function Page() {\n  return null;\n}"
        );

        let requests = llm.requests();
        let last = requests.last().unwrap();
        assert_eq!(last.messages.len(), 3);
        assert_eq!(
            last.messages[2].content,
            MessageContent::Text(CONTINUE_DIRECTIVE.to_string())
        );
    }

    #[tokio::test]
    async fn new_file_in_fragment_completes_without_wrapper() {
        let llm = ScriptedLlm::new([
            "<artifact id=\"a\"><action type=\"file\" path=\"a.ts\">a</action>",
            "<action type=\"file\" path=\"b.ts\">b</action>",
        ]);
        let outcome = run(&llm, INITIAL).await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.files.len(), 2);
        assert!(!outcome.degraded);
    }

    #[tokio::test]
    async fn partial_output_after_cap_is_degraded() {
        let llm =
            ScriptedLlm::new(["<artifact id=\"a\"><action type=\"file\" path=\"a.ts\">a</action>"])
                .then_repeat("still going");
        let outcome = run(
            &llm,
            ContinuationPolicy {
                max_attempts: 2,
                accept_diffs: false,
            },
        )
        .await
        .unwrap();
        assert!(outcome.degraded);
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.files.len(), 1);
    }

    #[tokio::test]
    async fn diffs_count_when_accepted() {
        let llm = ScriptedLlm::new([
            "<artifact id=\"r\"><action type=\"diff\" path=\"a.ts\"><old>a</old><new>b</new></action></artifact>",
        ]);
        let outcome = run(
            &llm,
            ContinuationPolicy {
                max_attempts: 1,
                accept_diffs: true,
            },
        )
        .await
        .unwrap();
        assert_eq!(outcome.attempts, 0);
        assert!(outcome.files.is_empty());
        assert_eq!(outcome.diffs.len(), 1);
    }

    #[tokio::test]
    async fn diffs_are_ignored_for_initial_generation() {
        let llm = ScriptedLlm::repeating(
            "<artifact id=\"r\"><action type=\"diff\" path=\"a.ts\"><old>a</old><new>b</new></action></artifact>",
        );
        let err = run(
            &llm,
            ContinuationPolicy {
                max_attempts: 1,
                accept_diffs: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::NoFilesExtracted { attempts: 1 }
        ));
    }

    #[tokio::test]
    async fn model_errors_propagate() {
        let llm = ScriptedLlm::failing(ModelError::Timeout { secs: 180 });
        let err = run(&llm, INITIAL).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Model(ModelError::Timeout { secs: 180 })
        ));
    }

    struct StallingLlm;

    impl LlmClient for StallingLlm {
        fn complete(&self, _request: &CompletionRequest) -> CompletionFuture<'_> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
                Err::<CompletionResponse, _>(ModelError::format("stalled call returned"))
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_call_hits_the_hard_timeout() {
        let settings = ModelSettings {
            timeout_secs: 2,
            ..ModelSettings::default()
        };
        let model = ModelCall::new(&StallingLlm, &settings);
        let started = tokio::time::Instant::now();

        let err = generate_with_continuation(&model, vec![ChatMessage::user("go")], INITIAL, None)
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PipelineError::Model(ModelError::Timeout { secs: 2 })
        ));
        assert!(started.elapsed() >= Duration::from_secs(2));
        assert!(started.elapsed() < Duration::from_secs(3_600));
    }

    #[tokio::test]
    async fn attempts_report_progress_inside_the_band() {
        let store = MemoryProjectStore::new();
        let reporter = ProgressReporter::new(&store, "p");
        let llm = ScriptedLlm::repeating("nothing yet");
        let settings = ModelSettings::default();
        let model = ModelCall::new(&llm, &settings);
        let slot = ProgressSlot {
            reporter: &reporter,
            stage: Stage::Continuation,
            band: band(Stage::Continuation),
        };

        let _ =
            generate_with_continuation(&model, vec![ChatMessage::user("go")], INITIAL, Some(slot))
                .await;

        let written: Vec<u8> = store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                StoreCall::SetProgress { percent, .. } => Some(percent),
                _ => None,
            })
            .collect();
        assert_eq!(written, [44, 48, 52, 56, 60]);
    }
}
