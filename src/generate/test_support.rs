//! Scripted port doubles for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::ModelError;
use crate::generate::types::ImageRef;
use crate::ports::images::{ImageFuture, ImageSource};
use crate::ports::llm::{CompletionFuture, CompletionRequest, CompletionResponse, LlmClient};

/// Answers completions from a fixed script, then from a fallback.
pub struct ScriptedLlm {
    script: Mutex<VecDeque<Result<String, ModelError>>>,
    fallback: Result<String, ModelError>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedLlm {
    /// Serves `responses` in order; calls past the end fail.
    pub fn new<'a>(responses: impl IntoIterator<Item = &'a str>) -> Self {
        Self::from_results(responses.into_iter().map(|r| Ok(r.to_string())))
    }

    /// Serves arbitrary results in order; calls past the end fail.
    pub fn from_results(results: impl IntoIterator<Item = Result<String, ModelError>>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            fallback: Err(ModelError::format("script exhausted")),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Answers every call with `text`.
    pub fn repeating(text: &str) -> Self {
        Self::new([]).then_repeat(text)
    }

    /// Fails every call with `error`.
    pub fn failing(error: ModelError) -> Self {
        let mut llm = Self::new([]);
        llm.fallback = Err(error);
        llm
    }

    /// Answers `text` once the script runs out.
    pub fn then_repeat(mut self, text: &str) -> Self {
        self.fallback = Ok(text.to_string());
        self
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Number of calls received.
    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl LlmClient for ScriptedLlm {
    fn complete(&self, request: &CompletionRequest) -> CompletionFuture<'_> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());
        Box::pin(async move {
            next.map(|text| CompletionResponse {
                text,
                prompt_tokens: 10,
                completion_tokens: 20,
                finish_reason: Some("stop".into()),
            })
        })
    }
}

/// Image source that has no images.
pub struct NoImages;

impl ImageSource for NoImages {
    fn fetch(&self, image: &ImageRef) -> ImageFuture<'_> {
        let label = image.label();
        Box::pin(async move {
            let missing: Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> =
                Err(format!("no image at {label}").into());
            missing
        })
    }
}
