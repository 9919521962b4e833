//! Recording adapters: delegate to a real port and capture every call.

pub mod images;
pub mod llm;

pub use images::RecordingImageSource;
pub use llm::RecordingLlmClient;

use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::{json, Value};

use crate::cassette::recorder::CassetteRecorder;

/// Records a fallible call as `{"ok": value}` or `{"err": error}`.
///
/// Counterpart of `replaying::replay_result`.
pub(crate) fn record_result<I, T, E>(
    recorder: &Arc<Mutex<CassetteRecorder>>,
    port: &str,
    method: &str,
    input: &I,
    result: Result<&T, &E>,
) where
    I: Serialize + ?Sized,
    T: Serialize + ?Sized,
    E: Serialize + ?Sized,
{
    let output = match result {
        Ok(value) => json!({ "ok": to_json(value) }),
        Err(error) => json!({ "err": to_json(error) }),
    };
    recorder
        .lock()
        .expect("recorder lock poisoned")
        .record(port, method, to_json(input), output);
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value).expect("recorded values serialize to JSON")
}
