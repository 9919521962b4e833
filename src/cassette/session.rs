//! Recording session owning one recorder per port.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::info;

use super::config::{IMAGES_CASSETTE, LLM_CASSETTE};
use super::recorder::CassetteRecorder;

/// Per-port recorders writing into one timestamped session directory.
///
/// The directory can be handed back to [`super::config::CassetteConfig::from_dir`]
/// to replay the run.
pub struct RecordingSession {
    /// Recorder for LLM interactions.
    pub llm: Arc<Mutex<CassetteRecorder>>,
    /// Recorder for image fetches.
    pub images: Arc<Mutex<CassetteRecorder>>,
    output_dir: PathBuf,
}

impl RecordingSession {
    /// Creates `<base>/<timestamp>/` and a recorder for each port.
    ///
    /// # Errors
    ///
    /// Returns an error if the session directory already exists or cannot be
    /// created.
    pub fn new_in(base: &Path, model: &str) -> Result<Self, String> {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S%.3f").to_string();
        let output_dir = base.join(&timestamp);
        if output_dir.exists() {
            return Err(format!(
                "Cassette directory already exists: {}",
                output_dir.display()
            ));
        }
        std::fs::create_dir_all(&output_dir).map_err(|e| {
            format!(
                "Failed to create cassette directory {}: {e}",
                output_dir.display()
            )
        })?;

        let recorder = |port: &str, file: &str| {
            Arc::new(Mutex::new(CassetteRecorder::new(
                output_dir.join(file),
                format!("{timestamp}-{port}"),
                model,
            )))
        };
        Ok(Self {
            llm: recorder("llm", LLM_CASSETTE),
            images: recorder("images", IMAGES_CASSETTE),
            output_dir,
        })
    }

    /// Directory the cassettes are written to.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Writes every cassette and returns the session directory.
    ///
    /// Recording adapters holding a recorder must be dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if a recorder is still shared or a cassette cannot be
    /// written.
    pub fn finish(self) -> Result<PathBuf, String> {
        fn finish_one(recorder: Arc<Mutex<CassetteRecorder>>, port: &str) -> Result<usize, String> {
            let recorder = Arc::try_unwrap(recorder)
                .map_err(|_| format!("Recording adapter for {port} still has references"))?
                .into_inner()
                .map_err(|e| format!("Recorder lock for {port} poisoned: {e}"))?;
            let count = recorder.len();
            recorder
                .finish()
                .map_err(|e| format!("Failed to write {port} cassette: {e}"))?;
            Ok(count)
        }

        let llm = finish_one(self.llm, "llm")?;
        let images = finish_one(self.images, "images")?;
        info!(dir = %self.output_dir.display(), llm, images, "cassettes written");
        Ok(self.output_dir)
    }
}
