//! Cleanup of captured text before it is persisted
//!
//! Only the copies destined for the log sink pass through here. The bytes
//! relayed to the client are never touched.

use crate::domain::exchange::CapturedRequestBody;
use serde_json::Value;

/// Artifact left behind by naive string concatenation of JSON fragments
const CONCATENATION_ARTIFACT: &str = "\"\",";

/// Strip control characters and encoding debris from captured text
///
/// Removes every C0 and C1 control character (U+0000–U+001F, U+007F–U+009F),
/// every U+FFFD replacement character, then collapses `"",` into `"` until
/// none remain. The result is a fixpoint, so `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(text: &str) -> String {
    let mut cleaned: String = text
        .chars()
        .filter(|c| !c.is_control() && *c != char::REPLACEMENT_CHARACTER)
        .collect();

    while cleaned.contains(CONCATENATION_ARTIFACT) {
        cleaned = cleaned.replace(CONCATENATION_ARTIFACT, "\"");
    }

    cleaned
}

/// Sanitize every string in a parsed JSON document, object keys included
///
/// Numbers, booleans and nulls pass through. `jsonb` rejects `\u0000`, so
/// no string leaf may carry one to the sink.
pub fn sanitize_json(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(sanitize(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_json).collect()),
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (sanitize(&key), sanitize_json(value)))
                .collect(),
        ),
        scalar => scalar,
    }
}

/// Sanitize a captured request body, whichever shape it was parsed into
pub fn sanitize_body(body: CapturedRequestBody) -> CapturedRequestBody {
    match body {
        CapturedRequestBody::Json(value) => CapturedRequestBody::Json(sanitize_json(value)),
        CapturedRequestBody::Text(text) => CapturedRequestBody::Text(sanitize(&text)),
    }
}
