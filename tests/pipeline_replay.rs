//! End-to-end pipeline runs over recorded cassettes.
//!
//! 1. Build per-port cassettes for the model and the image source.
//! 2. Replay them through `ServiceContext::replaying_from()`.
//! 3. Assert on the stored project, the stage table and determinism.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};

use sitesmith::adapters::memory::MemoryProjectStore;
use sitesmith::adapters::recording::RecordingLlmClient;
use sitesmith::adapters::replaying::ReplayingImageSource;
use sitesmith::cassette::config::{CassetteConfig, IMAGES_CASSETTE, LLM_CASSETTE};
use sitesmith::cassette::recorder::CassetteRecorder;
use sitesmith::cassette::session::RecordingSession;
use sitesmith::commands::generate::run_with_retry;
use sitesmith::config::Settings;
use sitesmith::context::ServiceContext;
use sitesmith::error::ModelError;
use sitesmith::generate::pipeline::StageOutcome;
use sitesmith::generate::types::{GenerationContext, ImageRef, PipelineStage, ProjectStatus};
use sitesmith::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};
use sitesmith::ports::store::ProjectStore;

const PAGE: &str = "<artifact id=\"landing\">\n\
<action type=\"file\" path=\"app/page.tsx\">\nexport default function Page() { return <h1 className=\"text-sm\">Acme</h1>; }\n</action>\n\
<action type=\"file\" path=\"app/globals.css\">\nbody { background: #0f172a; }\n</action>\n\
</artifact>";
const REVISION: &str = "<artifact id=\"fixes\">\n\
<action type=\"diff\" path=\"app/page.tsx\"><old>text-sm</old><new>text-5xl font-bold</new></action>\n\
</artifact>";

fn completion(text: &str) -> Value {
    json!({
        "ok": {
            "text": text,
            "prompt_tokens": 100,
            "completion_tokens": 50,
            "finish_reason": "stop"
        }
    })
}

fn png_base64() -> String {
    let mut buf = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(RgbImage::from_pixel(16, 16, Rgb([15, 23, 42])))
        .write_to(&mut buf, ImageFormat::Png)
        .unwrap();
    STANDARD.encode(buf.into_inner())
}

fn write_cassette(path: &Path, port: &str, method: &str, outputs: Vec<Value>) {
    let mut recorder = CassetteRecorder::new(path, format!("test-{port}"), "test/model");
    for output in outputs {
        recorder.record(port, method, json!({}), output);
    }
    recorder.finish().unwrap();
}

fn context(images: Vec<ImageRef>) -> GenerationContext {
    GenerationContext {
        project_id: "acme".into(),
        site_url: "https://acme.example".into(),
        user_prompt: Some("A bold landing page".into()),
        images,
        raw_markup: "<main><h1>Acme</h1><script>track()</script></main>".into(),
    }
}

fn replaying(dir: &Path, store: &Arc<MemoryProjectStore>) -> ServiceContext {
    ServiceContext::replaying_from(&CassetteConfig::from_dir(dir), Box::new(Arc::clone(store)))
        .unwrap()
}

#[tokio::test]
async fn replayed_run_persists_revised_project() {
    let dir = tempfile::tempdir().unwrap();
    write_cassette(
        &dir.path().join(LLM_CASSETTE),
        "llm",
        "complete",
        vec![completion(PAGE), completion(REVISION)],
    );
    write_cassette(
        &dir.path().join(IMAGES_CASSETTE),
        "images",
        "fetch",
        vec![json!({"ok": png_base64()})],
    );

    let store = Arc::new(MemoryProjectStore::new());
    let services = replaying(dir.path(), &store);
    let ctx = context(vec![ImageRef::new("https://acme.example/shot.png")]);

    let report = run_with_retry(&services, &Settings::default(), &ctx)
        .await
        .unwrap();

    let stages: Vec<PipelineStage> = report.stages.iter().map(|s| s.stage).collect();
    assert_eq!(
        stages,
        vec![
            PipelineStage::Prepare,
            PipelineStage::Generate,
            PipelineStage::Revise,
            PipelineStage::Persist,
            PipelineStage::Complete
        ]
    );
    assert!(report
        .stages
        .iter()
        .all(|s| s.outcome == StageOutcome::Completed));

    let record = store.load("acme").unwrap().unwrap();
    assert_eq!(record.status, ProjectStatus::Completed);
    assert_eq!(record.progress, 100);
    let files = store.load_files("acme").unwrap();
    assert_eq!(files.len(), 2);
    let page = files.iter().find(|f| f.path == "app/page.tsx").unwrap();
    assert!(page.content.contains("text-5xl font-bold"));
    assert!(!page.content.contains("text-sm"));
}

#[tokio::test]
async fn replay_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    write_cassette(
        &dir.path().join(LLM_CASSETTE),
        "llm",
        "complete",
        vec![completion(PAGE), completion(REVISION)],
    );

    let mut outputs = Vec::new();
    for _ in 0..2 {
        let store = Arc::new(MemoryProjectStore::new());
        let services = replaying(dir.path(), &store);
        let report = run_with_retry(&services, &Settings::default(), &context(Vec::new()))
            .await
            .unwrap();
        outputs.push((report.files, report.stages));
    }
    assert_eq!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn retryable_failure_reruns_the_whole_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    write_cassette(
        &dir.path().join(LLM_CASSETTE),
        "llm",
        "complete",
        vec![
            json!({"err": {"kind": "timeout", "secs": 180}}),
            completion(PAGE),
            completion(REVISION),
        ],
    );

    let store = Arc::new(MemoryProjectStore::new());
    let services = replaying(dir.path(), &store);
    let report = run_with_retry(&services, &Settings::default(), &context(Vec::new()))
        .await
        .unwrap();

    assert_eq!(report.files.len(), 2);
    assert_eq!(
        store.load("acme").unwrap().unwrap().status,
        ProjectStatus::Completed
    );
}

#[tokio::test]
async fn exhausted_retries_leave_the_project_failed() {
    let dir = tempfile::tempdir().unwrap();
    let timeout = json!({"err": {"kind": "timeout", "secs": 180}});
    write_cassette(
        &dir.path().join(LLM_CASSETTE),
        "llm",
        "complete",
        vec![timeout.clone(), timeout],
    );

    let mut settings = Settings::default();
    settings.workflow.max_run_attempts = 2;
    let store = Arc::new(MemoryProjectStore::new());
    let services = replaying(dir.path(), &store);
    let failure = run_with_retry(&services, &settings, &context(Vec::new()))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, PipelineStage::Generate);
    assert!(failure.error.is_retryable());
    let record = store.load("acme").unwrap().unwrap();
    assert_eq!((record.status, record.progress), (ProjectStatus::Failed, 0));
    assert!(store.load_files("acme").unwrap().is_empty());
}

/// Answers every completion with a fixed list of texts, in order.
struct CannedLlm(std::sync::Mutex<Vec<&'static str>>);

impl LlmClient for CannedLlm {
    fn complete(&self, _request: &CompletionRequest) -> CompletionFuture<'_> {
        let text = self.0.lock().unwrap().remove(0);
        Box::pin(async move {
            Ok::<_, ModelError>(CompletionResponse {
                text: text.to_string(),
                prompt_tokens: 1,
                completion_tokens: 1,
                finish_reason: Some("stop".into()),
            })
        })
    }
}

#[tokio::test]
async fn recorded_session_replays_to_the_same_files() {
    let base = tempfile::tempdir().unwrap();
    let session = RecordingSession::new_in(base.path(), "test/model").unwrap();

    let recorded_store = Arc::new(MemoryProjectStore::new());
    let recording = ServiceContext::new(
        Box::new(RecordingLlmClient::new(
            Box::new(CannedLlm(std::sync::Mutex::new(vec![PAGE, REVISION]))),
            Arc::clone(&session.llm),
        )),
        Box::new(ReplayingImageSource::unconfigured()),
        Box::new(Arc::clone(&recorded_store)),
    );
    let recorded = run_with_retry(&recording, &Settings::default(), &context(Vec::new()))
        .await
        .unwrap();
    drop(recording);
    let dir = session.finish().unwrap();

    let replayed_store = Arc::new(MemoryProjectStore::new());
    let services = replaying(&dir, &replayed_store);
    let replayed = run_with_retry(&services, &Settings::default(), &context(Vec::new()))
        .await
        .unwrap();

    assert_eq!(recorded.files, replayed.files);
    assert_eq!(
        recorded_store.load_files("acme").unwrap(),
        replayed_store.load_files("acme").unwrap()
    );
}
