//! Locating and loading per-port cassettes for replay.

use std::path::{Path, PathBuf};

use super::format::Cassette;
use super::replayer::CassetteReplayer;

/// Cassette file name for the LLM port inside a session directory.
pub const LLM_CASSETTE: &str = "llm.cassette.yaml";
/// Cassette file name for the image port inside a session directory.
pub const IMAGES_CASSETTE: &str = "images.cassette.yaml";

/// Per-port cassette paths. A port without a path panics when called during
/// replay.
#[derive(Debug, Clone, Default)]
pub struct CassetteConfig {
    /// LLM port cassette.
    pub llm: Option<PathBuf>,
    /// Image port cassette.
    pub images: Option<PathBuf>,
}

/// Loaded replayers, one per configured port.
pub struct PortReplayers {
    /// Replayer for the LLM port.
    pub llm: Option<CassetteReplayer>,
    /// Replayer for the image port.
    pub images: Option<CassetteReplayer>,
}

impl CassetteConfig {
    /// Picks up whichever port cassettes exist in a recorded session directory.
    #[must_use]
    pub fn from_dir(dir: &Path) -> Self {
        let existing = |name: &str| Some(dir.join(name)).filter(|p| p.is_file());
        Self {
            llm: existing(LLM_CASSETTE),
            images: existing(IMAGES_CASSETTE),
        }
    }

    /// Reads and parses one cassette file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load_cassette(path: &Path) -> Result<Cassette, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read cassette file {}: {e}", path.display()))?;
        serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse cassette file {}: {e}", path.display()))
    }

    /// Loads every configured cassette.
    ///
    /// # Errors
    ///
    /// Returns an error if any configured cassette cannot be read or parsed.
    pub fn load_all(&self) -> Result<PortReplayers, String> {
        let load = |path: &Path| Self::load_cassette(path).map(|c| CassetteReplayer::new(&c));
        Ok(PortReplayers {
            llm: self.llm.as_deref().map(load).transpose()?,
            images: self.images.as_deref().map(load).transpose()?,
        })
    }
}
