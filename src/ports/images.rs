//! Image source port for loading reference screenshots.

use std::future::Future;
use std::pin::Pin;

use crate::generate::types::ImageRef;

/// Boxed future returned by [`ImageSource::fetch`].
pub type ImageFuture<'a> = Pin<
    Box<dyn Future<Output = Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>>> + Send + 'a>,
>;

/// Loads the raw bytes of a reference image.
///
/// Abstracting image access allows deterministic replay of color analysis
/// without network access.
pub trait ImageSource: Send + Sync {
    /// Fetches the encoded image bytes (PNG, JPEG, ...).
    ///
    /// # Errors
    ///
    /// Returns an error if the image cannot be downloaded, decoded from its
    /// `data:` URL, or read from disk.
    fn fetch(&self, image: &ImageRef) -> ImageFuture<'_>;
}
