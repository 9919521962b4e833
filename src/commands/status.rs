//! `sitesmith status` command.

use crate::adapters::live::store::FsProjectStore;
use crate::config::Settings;
use crate::ports::store::{ProjectRecord, ProjectStore};

/// Execute the `status` command.
///
/// # Errors
///
/// Returns an error string if the project is unknown or cannot be read.
pub fn run(settings: &Settings, project_id: &str) -> Result<(), String> {
    let store = FsProjectStore::new(&settings.store.root);
    let record = load(&store, project_id)?;
    print!("{}", render(&record));
    Ok(())
}

pub(crate) fn load(store: &dyn ProjectStore, project_id: &str) -> Result<ProjectRecord, String> {
    store
        .load(project_id)
        .map_err(|e| format!("Failed to read project {project_id}: {e}"))?
        .ok_or_else(|| format!("Unknown project: {project_id}"))
}

fn render(record: &ProjectRecord) -> String {
    let stage = record
        .stage
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "project   {}\nstatus    {}\nprogress  {}%\nstage     {stage}\nfiles     {}\nupdated   {}\n",
        record.id,
        record.status,
        record.progress,
        record.files.len(),
        record.updated_at.to_rfc3339(),
    )
}
