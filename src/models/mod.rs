pub mod diary;
pub mod diet;
pub mod evidence;

use serde_json::Value;

/// Remote ids have drifted between schema generations: older rows carry
/// numeric ids, newer ones uuids. Normalize to a canonical string the moment
/// a row crosses the boundary so the ambiguity never leaks into the app.
pub(crate) fn id_to_string(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    }
}
