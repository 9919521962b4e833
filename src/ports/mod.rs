//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the generation core and an
//! external system (the model API, reference images, the project store, the
//! workflow engine). Implementations live in `src/adapters/`.

pub mod images;
pub mod llm;
pub mod store;
pub mod workflow;

pub use images::{ImageFuture, ImageSource};
pub use llm::{
    ChatMessage, CompletionFuture, CompletionRequest, CompletionResponse, ContentPart, LlmClient,
    MessageContent, Role,
};
pub use store::{ProjectRecord, ProjectStore, StoreError};
pub use workflow::StepRunner;
