//! Cassettes: recorded port traffic for deterministic replay.
//!
//! A recording session writes one YAML cassette per port. Replaying adapters
//! serve the recorded outputs back so a full pipeline run can be reproduced
//! without network access.

pub mod config;
pub mod format;
pub mod recorder;
pub mod replayer;
pub mod session;
