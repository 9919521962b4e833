//! Runtime settings.
//!
//! Settings come from built-in defaults, an optional YAML file, and a few
//! environment overrides, in that order. `.env` files are loaded by `main`
//! before anything reads the environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming a settings file.
pub const CONFIG_ENV: &str = "SITESMITH_CONFIG";

/// Most images attached to one prompt.
pub const MAX_PROMPT_IMAGES: usize = 5;
/// Most images analyzed for colors at once.
pub const MAX_COLOR_CONCURRENCY: usize = 5;
/// Most files serialized into the revision prompt.
pub const MAX_ESSENTIAL_FILES: usize = 10;
/// Continuation turns the revision pass may issue.
pub const MAX_REVISION_CONTINUATIONS: u32 = 1;

/// All settings for a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model endpoint and sampling.
    pub model: ModelSettings,
    /// Pipeline limits.
    pub generation: GenerationSettings,
    /// Workflow retry bounds.
    pub workflow: WorkflowSettings,
    /// Project store location.
    pub store: StoreSettings,
}

/// Model endpoint and sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL of an OpenAI-compatible API (without `/chat/completions`).
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Output token ceiling per call.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Optional nucleus sampling cutoff.
    pub top_p: Option<f32>,
    /// Hard timeout per call, in seconds.
    pub timeout_secs: u64,
    /// Optional `HTTP-Referer` header.
    pub referer: Option<String>,
    /// Optional `X-Title` header.
    pub title: Option<String>,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-sonnet-4".to_string(),
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            max_tokens: 16_000,
            temperature: 0.2,
            top_p: None,
            timeout_secs: 180,
            referer: None,
            title: Some("sitesmith".to_string()),
        }
    }
}

impl ModelSettings {
    /// The per-call timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Limits applied by the generation stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Continuation turns allowed after the initial generation turn.
    pub max_continuation_attempts: u32,
    /// Continuation turns allowed in the revision pass.
    pub revision_continuation_attempts: u32,
    /// Images attached to a prompt.
    pub max_prompt_images: usize,
    /// Images sampled for color guidance.
    pub max_color_images: usize,
    /// Images analyzed concurrently.
    pub color_concurrency: usize,
    /// Dominant colors reported per image.
    pub colors_per_image: usize,
    /// Files serialized into the revision prompt.
    pub max_essential_files: usize,
    /// Characters kept per file in the revision prompt.
    pub essential_file_chars: usize,
    /// Characters kept by markup sanitizing.
    pub max_markup_chars: usize,
    /// Characters of sanitized markup quoted in the prompt.
    pub markup_sample_chars: usize,
    /// Whether the revision pass runs at all.
    pub enable_revision: bool,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            max_continuation_attempts: 5,
            revision_continuation_attempts: 1,
            max_prompt_images: 5,
            max_color_images: 3,
            color_concurrency: 5,
            colors_per_image: 5,
            max_essential_files: 10,
            essential_file_chars: 12_000,
            max_markup_chars: 40_000,
            markup_sample_chars: 15_000,
            enable_revision: true,
        }
    }
}

/// Retry bounds owned by the workflow runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowSettings {
    /// Whole-run attempts, including the first.
    pub max_run_attempts: u32,
    /// Attempts per step, including the first.
    pub step_attempts: u32,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            max_run_attempts: 3,
            step_attempts: 1,
        }
    }
}

/// Where the filesystem store keeps projects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Root directory.
    pub root: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from(".sitesmith/projects"),
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or `SITESMITH_CONFIG`), then applies
    /// environment overrides and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an override is
    /// malformed, or validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let from_env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        let mut settings = match path.map(Path::to_path_buf).or(from_env) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses a YAML settings file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings file {}: {e}", path.display()))?;
        serde_yaml::from_str(&content)
            .map_err(|e| format!("Failed to parse settings file {}: {e}", path.display()))
    }

    /// Applies `SITESMITH_*` overrides read through `lookup`.
    ///
    /// # Errors
    ///
    /// Returns an error if a numeric override does not parse.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(model) = lookup("SITESMITH_MODEL") {
            self.model.model = model;
        }
        if let Some(url) = lookup("SITESMITH_BASE_URL") {
            self.model.base_url = url;
        }
        if let Some(root) = lookup("SITESMITH_STORE") {
            self.store.root = PathBuf::from(root);
        }
        if let Some(secs) = lookup("SITESMITH_TIMEOUT_SECS") {
            self.model.timeout_secs = secs
                .parse()
                .map_err(|e| format!("Invalid SITESMITH_TIMEOUT_SECS={secs:?}: {e}"))?;
        }
        Ok(())
    }

    /// Rejects settings the pipeline cannot run with.
    ///
    /// # Errors
    ///
    /// Returns a message naming the first invalid field.
    pub fn validate(&self) -> Result<(), String> {
        if self.model.model.trim().is_empty() {
            return Err("model.model must not be empty".into());
        }
        if self.model.timeout_secs == 0 {
            return Err("model.timeout_secs must be greater than zero".into());
        }
        if self.model.max_tokens == 0 {
            return Err("model.max_tokens must be greater than zero".into());
        }
        if !(0.0..=2.0).contains(&self.model.temperature) {
            return Err(format!(
                "model.temperature must be within 0..=2, got {}",
                self.model.temperature
            ));
        }
        if self.generation.max_continuation_attempts == 0 {
            return Err("generation.max_continuation_attempts must be at least 1".into());
        }
        let generation = &self.generation;
        if generation.color_concurrency == 0 || generation.color_concurrency > MAX_COLOR_CONCURRENCY
        {
            return Err(format!(
                "generation.color_concurrency must be within 1..={MAX_COLOR_CONCURRENCY}, got {}",
                generation.color_concurrency
            ));
        }
        if generation.max_prompt_images > MAX_PROMPT_IMAGES {
            return Err(format!(
                "generation.max_prompt_images must be at most {MAX_PROMPT_IMAGES}, got {}",
                generation.max_prompt_images
            ));
        }
        if generation.max_essential_files > MAX_ESSENTIAL_FILES {
            return Err(format!(
                "generation.max_essential_files must be at most {MAX_ESSENTIAL_FILES}, got {}",
                generation.max_essential_files
            ));
        }
        if generation.revision_continuation_attempts > MAX_REVISION_CONTINUATIONS {
            return Err(format!(
                "generation.revision_continuation_attempts must be at most {MAX_REVISION_CONTINUATIONS}, got {}",
                generation.revision_continuation_attempts
            ));
        }
        if self.workflow.max_run_attempts == 0 || self.workflow.step_attempts == 0 {
            return Err("workflow attempts must be at least 1".into());
        }
        Ok(())
    }
}
