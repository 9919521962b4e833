//! Data model shared by the generation stages.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// One generated source file. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedFile {
    /// Project-relative path, e.g. `app/page.tsx`.
    pub path: String,
    /// Full file content.
    pub content: String,
}

impl GeneratedFile {
    /// Creates a file from a path and content.
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Strips leading `/` and `./` so root-style paths from the model name the
/// same project file as relative ones.
#[must_use]
pub fn normalize_path(path: &str) -> &str {
    let mut rest = path.trim();
    loop {
        if let Some(stripped) = rest.strip_prefix("./") {
            rest = stripped;
        } else if let Some(stripped) = rest.strip_prefix('/') {
            rest = stripped;
        } else {
            return rest;
        }
    }
}

/// Whether a normalized path stays inside the project directory.
#[must_use]
pub fn is_project_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('\\')
        && !path.contains(':')
        && path.split(['/', '\\']).all(|segment| segment != "..")
}

/// An edit replacing `old_content` with `new_content` inside `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDiff {
    /// Path of the file to edit.
    pub path: String,
    /// Exact text expected in the current file.
    pub old_content: String,
    /// Replacement text.
    pub new_content: String,
}

/// Ordered, path-keyed set of files.
///
/// Files are shared behind [`Arc`], so cloning a set (or deriving a new set
/// from it) keeps untouched files pointing at the same allocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<Arc<GeneratedFile>>,
}

impl FileSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a file, replacing any file with the same path in place.
    ///
    /// Returns `true` when the path was not present before.
    pub fn upsert(&mut self, file: impl Into<Arc<GeneratedFile>>) -> bool {
        let file = file.into();
        match self.files.iter().position(|f| f.path == file.path) {
            Some(idx) => {
                self.files[idx] = file;
                false
            }
            None => {
                self.files.push(file);
                true
            }
        }
    }

    /// Looks up a file by path.
    #[must_use]
    pub fn get(&self, path: &str) -> Option<&Arc<GeneratedFile>> {
        self.files.iter().find(|f| f.path == path)
    }

    /// Number of files.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    /// Whether the set holds no files.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Iterates files in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<GeneratedFile>> {
        self.files.iter()
    }

    /// Copies the files out as plain values.
    #[must_use]
    pub fn to_vec(&self) -> Vec<GeneratedFile> {
        self.files.iter().map(|f| GeneratedFile::clone(f)).collect()
    }
}

impl FromIterator<GeneratedFile> for FileSet {
    fn from_iter<I: IntoIterator<Item = GeneratedFile>>(iter: I) -> Self {
        let mut set = Self::new();
        for file in iter {
            set.upsert(file);
        }
        set
    }
}

/// A reference screenshot: an http(s) URL, a `data:` URL, or a local path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ImageRef {
    /// Location of the image.
    pub url: String,
}

impl ImageRef {
    /// Wraps a URL or path.
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Short label safe for logs (data URLs are not printed in full).
    #[must_use]
    pub fn label(&self) -> String {
        if self.url.starts_with("data:") {
            let mime = self.url.split([';', ',']).next().unwrap_or("data:");
            format!("{mime} ({} bytes)", self.url.len())
        } else {
            self.url.clone()
        }
    }
}

/// Color extracted from a reference image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorInfo {
    /// Hex notation, e.g. `#1e3a8a`.
    pub hex: String,
    /// Red, green and blue channels.
    pub rgb: [u8; 3],
    /// Whether the color reads as dark.
    pub is_dark: bool,
    /// Whether the color reads as light.
    pub is_light: bool,
    /// Human-readable name, e.g. `dark blue`.
    pub description: String,
}

/// Immutable input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationContext {
    /// Project record the run writes to.
    pub project_id: String,
    /// URL of the site being reproduced.
    pub site_url: String,
    /// Optional natural-language intent from the user.
    #[serde(default)]
    pub user_prompt: Option<String>,
    /// Reference screenshots.
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Captured markup of the reference site.
    #[serde(default)]
    pub raw_markup: String,
}

/// Progress stage label persisted alongside the percentage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Sanitizing input.
    Preparing,
    /// Initial model turn.
    Generating,
    /// Follow-up turns repairing truncated output.
    Continuation,
    /// Refinement pass.
    Revising,
    /// Writing files.
    Finalizing,
    /// The run aborted.
    Failed,
    /// The run finished.
    Completed,
}

impl Stage {
    /// Snake-case name as stored.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Preparing => "preparing",
            Self::Generating => "generating",
            Self::Continuation => "continuation",
            Self::Revising => "revising",
            Self::Finalizing => "finalizing",
            Self::Failed => "failed",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a project record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Created, not yet picked up.
    #[default]
    Pending,
    /// A run is in flight.
    Processing,
    /// The last run finished.
    Completed,
    /// The last run aborted.
    Failed,
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// The named steps a run executes through the workflow engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Mark processing and sanitize markup.
    Prepare,
    /// Initial generation with continuation.
    Generate,
    /// Soft-failing refinement.
    Revise,
    /// Hand the final files to the store.
    Persist,
    /// Mark the project completed.
    Complete,
}

impl PipelineStage {
    /// Step name passed to the workflow engine.
    #[must_use]
    pub const fn step_name(self) -> &'static str {
        match self {
            Self::Prepare => "prepare",
            Self::Generate => "generate",
            Self::Revise => "revise",
            Self::Persist => "persist",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.step_name())
    }
}
