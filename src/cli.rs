//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI parser for `sitesmith`.
#[derive(Debug, Parser)]
#[command(
    name = "sitesmith",
    version,
    about = "Generate site projects from reference screenshots and markup"
)]
pub struct Cli {
    /// Settings file (YAML). Falls back to `SITESMITH_CONFIG`.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the generation pipeline for one project.
    Generate(GenerateArgs),
    /// Show the status and progress of a project.
    Status {
        /// Project identifier.
        project_id: String,
    },
    /// List the files persisted for a project.
    Files {
        /// Project identifier.
        project_id: String,
    },
}

/// Input for `sitesmith generate`: either a JSON bundle or individual flags.
#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// JSON file holding the whole generation context.
    #[arg(
        long,
        value_name = "FILE",
        conflicts_with_all = ["project_id", "site_url", "markup", "images", "prompt"]
    )]
    pub bundle: Option<PathBuf>,

    /// Project identifier.
    #[arg(long, required_unless_present = "bundle")]
    pub project_id: Option<String>,

    /// URL of the site being recreated.
    #[arg(long, required_unless_present = "bundle")]
    pub site_url: Option<String>,

    /// File with the captured markup of the reference site.
    #[arg(long, value_name = "FILE")]
    pub markup: Option<PathBuf>,

    /// Reference screenshot: URL, `data:` URL or local path. Repeatable.
    #[arg(long = "image", value_name = "REF")]
    pub images: Vec<String>,

    /// Extra instructions for the model.
    #[arg(long)]
    pub prompt: Option<String>,

    /// Keep results in memory and print the generated file list.
    #[arg(long)]
    pub dry_run: bool,
}
