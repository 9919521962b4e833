//! Command dispatch and handlers.

pub mod files;
pub mod generate;
pub mod status;

use crate::cli::{Cli, Command};
use crate::config::Settings;

/// Dispatch a parsed command to its handler.
///
/// Settings are loaded once from `--config` (or `SITESMITH_CONFIG`) plus
/// environment overrides. For `generate`, `SITESMITH_RECORD=<dir>` records
/// model and image traffic and `SITESMITH_REPLAY=<dir>` replays it.
///
/// # Errors
///
/// Returns an error string if settings are invalid or the handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let settings = Settings::load(cli.config.as_deref())?;
    match &cli.command {
        Command::Generate(args) => generate::run(&settings, args),
        Command::Status { project_id } => status::run(&settings, project_id),
        Command::Files { project_id } => files::run(&settings, project_id),
    }
}
