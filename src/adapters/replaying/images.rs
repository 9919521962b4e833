//! Replaying adapter for the `ImageSource` port.

use std::sync::Mutex;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use super::{next_output, replay_result};
use crate::cassette::replayer::CassetteReplayer;
use crate::generate::types::ImageRef;
use crate::ports::images::{ImageFuture, ImageSource};

/// Serves recorded image bytes (base64 in the cassette) in order.
pub struct ReplayingImageSource {
    replayer: Option<Mutex<CassetteReplayer>>,
}

impl ReplayingImageSource {
    /// Creates a source backed by `replayer`.
    #[must_use]
    pub fn new(replayer: CassetteReplayer) -> Self {
        Self {
            replayer: Some(Mutex::new(replayer)),
        }
    }

    /// Creates a source with no cassette. Panics when called.
    #[must_use]
    pub fn unconfigured() -> Self {
        Self { replayer: None }
    }
}

impl ImageSource for ReplayingImageSource {
    fn fetch(&self, _image: &ImageRef) -> ImageFuture<'_> {
        let output = next_output(self.replayer.as_ref(), "images", "fetch");
        let recorded: Result<String, String> = replay_result(output, "images::fetch");
        Box::pin(async move {
            let bytes: Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> = match recorded {
                Ok(encoded) => STANDARD
                    .decode(encoded)
                    .map_err(|e| format!("recorded image is not base64: {e}").into()),
                Err(message) => Err(message.into()),
            };
            bytes
        })
    }
}
