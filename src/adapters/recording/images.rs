//! Recording adapter for the `ImageSource` port.

use std::sync::{Arc, Mutex};

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::record_result;
use crate::cassette::recorder::CassetteRecorder;
use crate::generate::types::ImageRef;
use crate::ports::images::{ImageFuture, ImageSource};

/// Delegates fetches to an inner source and records the bytes as base64.
///
/// Inputs are recorded by label only; `data:` URLs are not copied into the
/// cassette.
pub struct RecordingImageSource {
    inner: Box<dyn ImageSource>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingImageSource {
    /// Wraps `inner`, appending to `recorder`.
    pub fn new(inner: Box<dyn ImageSource>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl ImageSource for RecordingImageSource {
    fn fetch(&self, image: &ImageRef) -> ImageFuture<'_> {
        let image = image.clone();
        Box::pin(async move {
            let result = self.inner.fetch(&image).await;
            let recorded = result
                .as_ref()
                .map(|bytes| STANDARD.encode(bytes))
                .map_err(ToString::to_string);
            let input = serde_json::json!({ "image": image.label() });
            record_result(&self.recorder, "images", "fetch", &input, recorded.as_ref());
            result
        })
    }
}
