//! Live adapter for the `ImageSource` port.
//!
//! Handles `http(s)` URLs, inline `data:` URLs and local file paths.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Client;

use crate::generate::types::ImageRef;
use crate::ports::images::{ImageFuture, ImageSource};

/// Fetches images over HTTP, from `data:` URLs, or from disk.
pub struct LiveImageSource {
    client: Client,
}

impl LiveImageSource {
    /// Creates a new live image source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    async fn load(&self, url: &str) -> Result<Vec<u8>, Box<dyn std::error::Error + Send + Sync>> {
        if url.starts_with("data:") {
            return Ok(decode_data_url(url)?);
        }
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(format!("image request for {url} failed with status {status}").into());
            }
            return Ok(response.bytes().await?.to_vec());
        }
        Ok(std::fs::read(url).map_err(|e| format!("failed to read image {url}: {e}"))?)
    }
}

impl Default for LiveImageSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageSource for LiveImageSource {
    fn fetch(&self, image: &ImageRef) -> ImageFuture<'_> {
        let url = image.url.clone();
        Box::pin(async move { self.load(&url).await })
    }
}

/// Decodes the payload of a base64 `data:` URL.
///
/// # Errors
///
/// Returns an error if the URL is not base64-encoded or the payload is invalid.
pub fn decode_data_url(url: &str) -> Result<Vec<u8>, String> {
    let (header, payload) = url
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or_else(|| "malformed data URL".to_string())?;
    if !header.ends_with(";base64") {
        return Err(format!("unsupported data URL encoding: {header}"));
    }
    STANDARD
        .decode(payload.trim())
        .map_err(|e| format!("invalid base64 in data URL: {e}"))
}

/// Reads a local image and encodes it as a `data:` URL.
///
/// The MIME type is detected from the file content.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a known image format.
pub fn to_data_url(path: &Path) -> Result<String, String> {
    let bytes =
        std::fs::read(path).map_err(|e| format!("Failed to read image {}: {e}", path.display()))?;
    let format = image::guess_format(&bytes)
        .map_err(|e| format!("{} is not a recognized image: {e}", path.display()))?;
    Ok(format!(
        "data:{};base64,{}",
        format.to_mime_type(),
        STANDARD.encode(&bytes)
    ))
}

/// Turns a CLI image argument into a reference, inlining local files.
///
/// # Errors
///
/// Returns an error if a local file cannot be inlined.
pub fn resolve_image_arg(arg: &str) -> Result<ImageRef, String> {
    if arg.starts_with("http://") || arg.starts_with("https://") || arg.starts_with("data:") {
        Ok(ImageRef::new(arg))
    } else {
        to_data_url(Path::new(arg)).map(ImageRef::new)
    }
}
