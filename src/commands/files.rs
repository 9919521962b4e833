//! `sitesmith files` command.

use crate::adapters::live::store::FsProjectStore;
use crate::config::Settings;
use crate::ports::store::ProjectStore;

/// Execute the `files` command: list persisted paths with their sizes.
///
/// # Errors
///
/// Returns an error string if the project is unknown or cannot be read.
pub fn run(settings: &Settings, project_id: &str) -> Result<(), String> {
    let store = FsProjectStore::new(&settings.store.root);
    super::status::load(&store, project_id)?;
    let files = store
        .load_files(project_id)
        .map_err(|e| format!("Failed to read files of {project_id}: {e}"))?;
    if files.is_empty() {
        println!("No files stored for {project_id}.");
        return Ok(());
    }

    let width = files.iter().map(|f| f.path.len()).max().unwrap_or(4).max(4);
    println!("{:<width$}  {:>8}", "PATH", "BYTES");
    println!("{:-<width$}  {:->8}", "", "");
    for file in &files {
        println!("{:<width$}  {:>8}", file.path, file.content.len());
    }
    println!("\n{} file(s) total.", files.len());
    Ok(())
}
