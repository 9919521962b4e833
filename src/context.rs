//! Service context bundling the port trait objects a run needs.

use std::path::Path;
use std::sync::Arc;

use crate::adapters::live::images::LiveImageSource;
use crate::adapters::live::llm::LiveLlmClient;
use crate::adapters::recording::{RecordingImageSource, RecordingLlmClient};
use crate::adapters::replaying::{ReplayingImageSource, ReplayingLlmClient};
use crate::cassette::config::CassetteConfig;
use crate::cassette::session::RecordingSession;
use crate::config::ModelSettings;
use crate::ports::images::ImageSource;
use crate::ports::llm::LlmClient;
use crate::ports::store::ProjectStore;

/// Bundles the external boundaries of the generation pipeline.
///
/// Constructors wire up different adapter sets (live, recording, replaying).
/// The store is always supplied by the caller since the same store is read
/// back by the `status` and `files` commands.
pub struct ServiceContext {
    /// Chat completion client.
    pub llm: Box<dyn LlmClient>,
    /// Loader for reference screenshots.
    pub images: Box<dyn ImageSource>,
    /// Project status, progress and file storage.
    pub store: Box<dyn ProjectStore>,
}

impl ServiceContext {
    /// Assembles a context from explicit adapters.
    pub fn new(
        llm: Box<dyn LlmClient>,
        images: Box<dyn ImageSource>,
        store: Box<dyn ProjectStore>,
    ) -> Self {
        Self { llm, images, store }
    }

    /// Creates a live context talking to the configured model API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key variable is not set.
    pub fn live(settings: &ModelSettings, store: Box<dyn ProjectStore>) -> Result<Self, String> {
        let llm = LiveLlmClient::from_env(settings)?;
        Ok(Self::new(
            Box::new(llm),
            Box::new(LiveImageSource::new()),
            store,
        ))
    }

    /// Creates a live context whose model and image traffic is recorded into
    /// a new session under `base`.
    ///
    /// The context must be dropped before [`RecordingSession::finish`].
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the session directory
    /// cannot be created.
    pub fn recording_in(
        settings: &ModelSettings,
        store: Box<dyn ProjectStore>,
        base: &Path,
    ) -> Result<(Self, RecordingSession), String> {
        let llm = LiveLlmClient::from_env(settings)?;
        let session = RecordingSession::new_in(base, &settings.model)?;
        let context = Self::new(
            Box::new(RecordingLlmClient::new(
                Box::new(llm),
                Arc::clone(&session.llm),
            )),
            Box::new(RecordingImageSource::new(
                Box::new(LiveImageSource::new()),
                Arc::clone(&session.images),
            )),
            store,
        );
        Ok((context, session))
    }

    /// Creates a context serving model and image calls from cassettes.
    ///
    /// Ports without a configured cassette panic when called.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured cassette cannot be read or parsed.
    pub fn replaying_from(
        config: &CassetteConfig,
        store: Box<dyn ProjectStore>,
    ) -> Result<Self, String> {
        let replayers = config.load_all()?;
        let llm: Box<dyn LlmClient> = match replayers.llm {
            Some(r) => Box::new(ReplayingLlmClient::new(r)),
            None => Box::new(ReplayingLlmClient::unconfigured()),
        };
        let images: Box<dyn ImageSource> = match replayers.images {
            Some(r) => Box::new(ReplayingImageSource::new(r)),
            None => Box::new(ReplayingImageSource::unconfigured()),
        };
        Ok(Self::new(llm, images, store))
    }
}
