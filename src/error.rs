//! Error types for the generation pipeline.
//!
//! Model failures are classified at the client boundary ([`ModelError`]) and
//! wrapped into [`PipelineError`] by the stages. A failed run surfaces as a
//! [`RunFailure`] carrying the stage-result table up to the failing stage.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::generate::pipeline::StageReport;
use crate::generate::types::PipelineStage;

/// Maximum number of response-body characters kept in a [`ModelError::Request`].
pub const ERROR_BODY_LIMIT: usize = 500;

/// Errors raised by a single call to the generative model.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelError {
    /// The API answered with a non-success HTTP status.
    #[error("model request failed with status {status}: {body}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated to [`ERROR_BODY_LIMIT`] characters.
        body: String,
    },

    /// The call exceeded the configured hard timeout.
    #[error("model request timed out after {secs}s")]
    Timeout {
        /// Timeout that elapsed, in seconds.
        secs: u64,
    },

    /// The request never produced an HTTP response (DNS, TLS, connection reset).
    #[error("model request transport error: {message}")]
    Transport {
        /// Underlying transport error message.
        message: String,
    },

    /// The response arrived but did not have the expected shape.
    #[error("model response had unexpected shape: {message}")]
    ResponseFormat {
        /// What was wrong with the response.
        message: String,
    },
}

impl ModelError {
    /// Builds a [`ModelError::Request`], truncating the body on a char boundary.
    #[must_use]
    pub fn request(status: u16, body: &str) -> Self {
        Self::Request {
            status,
            body: truncate_chars(body, ERROR_BODY_LIMIT),
        }
    }

    /// Builds a [`ModelError::ResponseFormat`].
    pub fn format(message: impl Into<String>) -> Self {
        Self::ResponseFormat {
            message: message.into(),
        }
    }
}

/// Coarse error classification used in the stage-result table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network, timeout or HTTP failure talking to the model.
    ModelRequest,
    /// The model answered with an unexpected shape.
    ModelResponseFormat,
    /// Continuation attempts exhausted without a usable file.
    NoFilesExtracted,
    /// The final file list was not a non-empty list of files.
    PersistenceRejected,
    /// The project store rejected a write.
    Store,
    /// A journaled step output could not be decoded.
    Journal,
}

/// Errors that abort (or, in the revision stage, degrade) a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A model call failed.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Every continuation attempt finished without a single extracted file.
    #[error("no files extracted after {attempts} continuation attempt(s)")]
    NoFilesExtracted {
        /// Number of continuation turns that were issued.
        attempts: u32,
    },

    /// The value reaching the persist stage was not a non-empty file list.
    #[error("refusing to persist: {reason}")]
    PersistenceRejected {
        /// Why the value was rejected.
        reason: String,
    },

    /// The project store failed.
    #[error("project store error: {0}")]
    Store(String),

    /// A step output read back from the journal had the wrong shape.
    #[error("journaled step output is malformed: {0}")]
    Journal(String),
}

impl PipelineError {
    /// Returns the classification of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Model(ModelError::ResponseFormat { .. }) => ErrorKind::ModelResponseFormat,
            Self::Model(_) => ErrorKind::ModelRequest,
            Self::NoFilesExtracted { .. } => ErrorKind::NoFilesExtracted,
            Self::PersistenceRejected { .. } => ErrorKind::PersistenceRejected,
            Self::Store(_) => ErrorKind::Store,
            Self::Journal(_) => ErrorKind::Journal,
        }
    }

    /// Whether re-invoking the run could plausibly succeed.
    ///
    /// Rejected persistence and journal corruption are deterministic. Every
    /// other failure depends on the model, the network or the store.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::PersistenceRejected { .. } | Self::Journal(_))
    }
}

/// A run that aborted in a fail-closed stage.
#[derive(Error, Debug)]
#[error("stage `{stage}` failed: {error}")]
pub struct RunFailure {
    /// The stage that failed.
    pub stage: PipelineStage,
    /// The error raised by the stage.
    #[source]
    pub error: PipelineError,
    /// Stage outcomes recorded up to and including the failure.
    pub stages: Vec<StageReport>,
}

/// Truncates `text` to at most `limit` characters.
pub(crate) fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
