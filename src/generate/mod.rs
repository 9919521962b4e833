//! The generation pipeline: from a reference bundle to a stored project.
//!
//! Leaf modules (`parser`, `reconcile`, `sanitize`, `colors`, `prompt`) are
//! pure or port-driven helpers; `continuation` and `revision` drive the model;
//! `pipeline` sequences everything through the workflow engine.

pub mod colors;
pub mod continuation;
pub mod parser;
pub mod pipeline;
pub mod progress;
pub mod prompt;
pub mod reconcile;
pub mod revision;
pub mod sanitize;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

pub use pipeline::{persist_files, Pipeline, RunReport, StageOutcome, StageReport};
pub use types::{FileSet, GeneratedFile, GenerationContext};
