//! In-memory project store used for dry runs and tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use chrono::Utc;

use crate::generate::types::{GeneratedFile, ProjectStatus, Stage};
use crate::ports::store::{ProjectRecord, ProjectStore, StoreError};

/// A store call, captured in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    /// `set_status`.
    SetStatus {
        /// Project id.
        id: String,
        /// Status written.
        status: ProjectStatus,
    },
    /// `set_progress`.
    SetProgress {
        /// Project id.
        id: String,
        /// Percentage written.
        percent: u8,
        /// Stage label written.
        stage: Option<Stage>,
    },
    /// `append_files`.
    AppendFiles {
        /// Project id.
        id: String,
        /// Paths written, in call order.
        paths: Vec<String>,
    },
}

#[derive(Default)]
struct Project {
    record: Option<ProjectRecord>,
    files: BTreeMap<String, String>,
}

#[derive(Default)]
struct Inner {
    projects: HashMap<String, Project>,
    calls: Vec<StoreCall>,
}

/// Project store keeping everything in memory and logging every write.
#[derive(Default)]
pub struct MemoryProjectStore {
    inner: Mutex<Inner>,
}

impl MemoryProjectStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write call received so far, in order.
    ///
    /// # Panics
    ///
    /// Panics if the store lock was poisoned.
    #[must_use]
    pub fn calls(&self) -> Vec<StoreCall> {
        self.inner
            .lock()
            .expect("store lock poisoned")
            .calls
            .clone()
    }

    /// Last progress written for `id` as `(percent, stage)`.
    ///
    /// # Panics
    ///
    /// Panics if the store lock was poisoned.
    #[must_use]
    pub fn load_progress(&self, id: &str) -> Option<(u8, Option<Stage>)> {
        let inner = self.inner.lock().expect("store lock poisoned");
        inner
            .projects
            .get(id)?
            .record
            .as_ref()
            .map(|r| (r.progress, r.stage))
    }

    fn write<F>(&self, id: &str, call: StoreCall, apply: F)
    where
        F: FnOnce(&mut ProjectRecord, &mut BTreeMap<String, String>),
    {
        let mut inner = self.inner.lock().expect("store lock poisoned");
        inner.calls.push(call);
        let project = inner.projects.entry(id.to_string()).or_default();
        let record = project.record.get_or_insert_with(|| ProjectRecord::new(id));
        apply(record, &mut project.files);
        record.files = project.files.keys().cloned().collect();
        record.updated_at = Utc::now();
    }
}

impl ProjectStore for MemoryProjectStore {
    fn set_status(&self, id: &str, status: ProjectStatus) -> Result<(), StoreError> {
        self.write(
            id,
            StoreCall::SetStatus {
                id: id.to_string(),
                status,
            },
            |record, _| {
                record.status = status;
            },
        );
        Ok(())
    }

    fn set_progress(&self, id: &str, percent: u8, stage: Option<Stage>) -> Result<(), StoreError> {
        let call = StoreCall::SetProgress {
            id: id.to_string(),
            percent,
            stage,
        };
        self.write(id, call, |record, _| {
            record.progress = percent;
            if stage.is_some() {
                record.stage = stage;
            }
        });
        Ok(())
    }

    fn append_files(&self, id: &str, files: &[GeneratedFile]) -> Result<(), StoreError> {
        let paths = files.iter().map(|f| f.path.clone()).collect();
        self.write(
            id,
            StoreCall::AppendFiles {
                id: id.to_string(),
                paths,
            },
            |_, stored| {
                for file in files {
                    stored.insert(file.path.clone(), file.content.clone());
                }
            },
        );
        Ok(())
    }

    fn load(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        let inner = self.inner.lock().map_err(|e| e.to_string())?;
        Ok(inner.projects.get(id).and_then(|p| p.record.clone()))
    }

    fn load_files(&self, id: &str) -> Result<Vec<GeneratedFile>, StoreError> {
        let inner = self.inner.lock().map_err(|e| e.to_string())?;
        Ok(inner
            .projects
            .get(id)
            .map(|p| {
                p.files
                    .iter()
                    .map(|(path, content)| GeneratedFile::new(path, content))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_overwrites_by_path() {
        let store = MemoryProjectStore::new();
        store
            .append_files(
                "p",
                &[GeneratedFile::new("a", "1"), GeneratedFile::new("b", "2")],
            )
            .unwrap();
        store
            .append_files("p", &[GeneratedFile::new("a", "3")])
            .unwrap();

        let files = store.load_files("p").unwrap();
        assert_eq!(
            files,
            vec![GeneratedFile::new("a", "3"), GeneratedFile::new("b", "2")]
        );
        assert_eq!(store.load("p").unwrap().unwrap().files, vec!["a", "b"]);
        assert_eq!(store.calls().len(), 2);
    }

    #[test]
    fn progress_without_stage_keeps_previous_label() {
        let store = MemoryProjectStore::new();
        store
            .set_progress("p", 10, Some(Stage::Generating))
            .unwrap();
        store.set_progress("p", 12, None).unwrap();
        assert_eq!(
            store.load_progress("p"),
            Some((12, Some(Stage::Generating)))
        );
    }

    #[test]
    fn unknown_project_loads_as_none() {
        let store = MemoryProjectStore::new();
        assert!(store.load("missing").unwrap().is_none());
        assert!(store.load_files("missing").unwrap().is_empty());
    }
}
