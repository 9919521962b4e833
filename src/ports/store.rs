//! Project store port: status, progress and generated files per project.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::generate::types::{GeneratedFile, ProjectStatus, Stage};

/// Error type returned by store adapters.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Persisted metadata for one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectRecord {
    /// Project identifier.
    pub id: String,
    /// Lifecycle status.
    pub status: ProjectStatus,
    /// Last written progress percentage.
    pub progress: u8,
    /// Last written stage label.
    pub stage: Option<Stage>,
    /// Paths of the files stored for this project, sorted.
    pub files: Vec<String>,
    /// Time of the last write.
    pub updated_at: DateTime<Utc>,
}

impl ProjectRecord {
    /// A fresh pending record.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            status: ProjectStatus::Pending,
            progress: 0,
            stage: None,
            files: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// Persists project state.
///
/// Every write must be safe to repeat: the workflow engine may re-run a whole
/// pipeline against the same project id, and the last write wins.
pub trait ProjectStore: Send + Sync {
    /// Sets the project's lifecycle status, creating the record if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set_status(&self, id: &str, status: ProjectStatus) -> Result<(), StoreError>;

    /// Sets the progress percentage and, optionally, the stage label.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    fn set_progress(&self, id: &str, percent: u8, stage: Option<Stage>) -> Result<(), StoreError>;

    /// Stores files, overwriting any existing file with the same path.
    ///
    /// # Errors
    ///
    /// Returns an error if any file cannot be written.
    fn append_files(&self, id: &str, files: &[GeneratedFile]) -> Result<(), StoreError>;

    /// Loads a project record, or `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the record exists but cannot be read.
    fn load(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError>;

    /// Loads every stored file for a project, sorted by path.
    ///
    /// # Errors
    ///
    /// Returns an error if the files cannot be read.
    fn load_files(&self, id: &str) -> Result<Vec<GeneratedFile>, StoreError>;
}

impl<T: ProjectStore + ?Sized> ProjectStore for std::sync::Arc<T> {
    fn set_status(&self, id: &str, status: ProjectStatus) -> Result<(), StoreError> {
        (**self).set_status(id, status)
    }

    fn set_progress(&self, id: &str, percent: u8, stage: Option<Stage>) -> Result<(), StoreError> {
        (**self).set_progress(id, percent, stage)
    }

    fn append_files(&self, id: &str, files: &[GeneratedFile]) -> Result<(), StoreError> {
        (**self).append_files(id, files)
    }

    fn load(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        (**self).load(id)
    }

    fn load_files(&self, id: &str) -> Result<Vec<GeneratedFile>, StoreError> {
        (**self).load_files(id)
    }
}
