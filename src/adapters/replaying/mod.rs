//! Replaying adapters: serve recorded outputs instead of calling out.

pub mod images;
pub mod llm;

pub use images::ReplayingImageSource;
pub use llm::ReplayingLlmClient;

use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cassette::replayer::CassetteReplayer;

/// Takes the recorded output of the next `port::method` call.
///
/// # Panics
///
/// Panics when no cassette is configured for the port or it is exhausted.
pub(crate) fn next_output(
    replayer: Option<&Mutex<CassetteReplayer>>,
    port: &str,
    method: &str,
) -> Value {
    let replayer = replayer
        .unwrap_or_else(|| panic!("no cassette configured for port {port:?} ({port}::{method})"));
    replayer
        .lock()
        .expect("replayer lock poisoned")
        .next_interaction(port, method)
        .output
}

/// Decodes an `{"ok": ..}` / `{"err": ..}` output written by `record_result`.
///
/// # Panics
///
/// Panics when the output has neither key or does not match the port's types.
pub(crate) fn replay_result<T, E>(output: Value, port: &str) -> Result<T, E>
where
    T: DeserializeOwned,
    E: DeserializeOwned,
{
    if let Some(ok) = output.get("ok") {
        return Ok(serde_json::from_value(ok.clone())
            .unwrap_or_else(|e| panic!("{port}: malformed `ok` output: {e}")));
    }
    if let Some(err) = output.get("err") {
        return Err(serde_json::from_value(err.clone())
            .unwrap_or_else(|e| panic!("{port}: malformed `err` output: {e}")));
    }
    panic!("{port}: recorded output has neither `ok` nor `err`: {output}")
}
