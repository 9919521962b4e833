//! Filesystem-backed project store.
//!
//! Directory layout:
//!
//! ```text
//! <root>/
//!   └── <project-id>/
//!         ├── project.json
//!         └── files/
//!               └── <generated paths>
//! ```

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

use chrono::Utc;

use crate::generate::types::{GeneratedFile, ProjectStatus, Stage};
use crate::ports::store::{ProjectRecord, ProjectStore, StoreError};

const RECORD_FILE: &str = "project.json";
const FILES_DIR: &str = "files";

/// Project store writing JSON records and plain files under a root directory.
pub struct FsProjectStore {
    root: PathBuf,
}

impl FsProjectStore {
    /// Creates a store rooted at `root`. Directories are created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn project_dir(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(format!("invalid project id {id:?}").into());
        }
        Ok(self.root.join(id))
    }

    fn read_record(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        let path = self.project_dir(id)?.join(RECORD_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read project record {}: {e}", path.display()))?;
        let record = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse project record {}: {e}", path.display()))?;
        Ok(Some(record))
    }

    fn update<F>(&self, id: &str, apply: F) -> Result<(), StoreError>
    where
        F: FnOnce(&mut ProjectRecord),
    {
        let dir = self.project_dir(id)?;
        std::fs::create_dir_all(&dir)
            .map_err(|e| format!("Failed to create project directory {}: {e}", dir.display()))?;
        let mut record = self
            .read_record(id)?
            .unwrap_or_else(|| ProjectRecord::new(id));
        apply(&mut record);
        record.updated_at = Utc::now();

        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| format!("Failed to serialize project record {id}: {e}"))?;
        let path = dir.join(RECORD_FILE);
        let tmp = dir.join(format!("{RECORD_FILE}.tmp"));
        std::fs::write(&tmp, json)
            .map_err(|e| format!("Failed to write {}: {e}", tmp.display()))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| format!("Failed to replace {}: {e}", path.display()))?;
        Ok(())
    }
}

/// Rejects absolute paths and paths escaping the files directory.
fn safe_relative(path: &str) -> Result<&Path, StoreError> {
    let candidate = Path::new(path);
    let ok = candidate
        .components()
        .any(|c| matches!(c, Component::Normal(_)))
        && candidate
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if ok {
        Ok(candidate)
    } else {
        Err(format!("refusing to store file outside the project: {path:?}").into())
    }
}

fn collect_files(base: &Path, dir: &Path, out: &mut Vec<GeneratedFile>) -> Result<(), StoreError> {
    let entries =
        std::fs::read_dir(dir).map_err(|e| format!("Failed to list {}: {e}", dir.display()))?;
    for entry in entries {
        let path = entry
            .map_err(|e| format!("Failed to list {}: {e}", dir.display()))?
            .path();
        if path.is_dir() {
            collect_files(base, &path, out)?;
        } else {
            let content = std::fs::read_to_string(&path)
                .map_err(|e| format!("Failed to read {}: {e}", path.display()))?;
            let relative = path.strip_prefix(base).map_err(|e| e.to_string())?;
            let relative: Vec<_> = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect();
            out.push(GeneratedFile::new(relative.join("/"), content));
        }
    }
    Ok(())
}

impl ProjectStore for FsProjectStore {
    fn set_status(&self, id: &str, status: ProjectStatus) -> Result<(), StoreError> {
        self.update(id, |record| record.status = status)
    }

    fn set_progress(&self, id: &str, percent: u8, stage: Option<Stage>) -> Result<(), StoreError> {
        self.update(id, |record| {
            record.progress = percent;
            if stage.is_some() {
                record.stage = stage;
            }
        })
    }

    fn append_files(&self, id: &str, files: &[GeneratedFile]) -> Result<(), StoreError> {
        let files_dir = self.project_dir(id)?.join(FILES_DIR);
        let relative: Vec<&Path> = files
            .iter()
            .map(|f| safe_relative(&f.path))
            .collect::<Result<_, _>>()?;

        for (file, rel) in files.iter().zip(&relative) {
            let target = files_dir.join(rel);
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| format!("Failed to create directory {}: {e}", parent.display()))?;
            }
            std::fs::write(&target, &file.content)
                .map_err(|e| format!("Failed to write {}: {e}", target.display()))?;
        }

        self.update(id, |record| {
            let mut paths: BTreeSet<String> = record.files.drain(..).collect();
            paths.extend(files.iter().map(|f| f.path.clone()));
            record.files = paths.into_iter().collect();
        })
    }

    fn load(&self, id: &str) -> Result<Option<ProjectRecord>, StoreError> {
        self.read_record(id)
    }

    fn load_files(&self, id: &str) -> Result<Vec<GeneratedFile>, StoreError> {
        let files_dir = self.project_dir(id)?.join(FILES_DIR);
        if !files_dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        collect_files(&files_dir, &files_dir, &mut files)?;
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}
