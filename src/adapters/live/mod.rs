//! Live adapters for real external interactions.

pub mod images;
pub mod llm;
pub mod store;
pub mod workflow;
