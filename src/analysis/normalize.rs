//! Canonical analysis payload
//!
//! Every payload that leaves the pipeline or the store passes through
//! [`normalize`], which guarantees the same set of top-level and nested keys
//! regardless of what the model (or an older schema version) produced.
//! Present fields are kept as-is and missing canonical fields get their
//! documented default. `llm_results` is the one field coerced to a string.
//! A `report` or `category` that is not an object is moved aside to
//! `raw_report` / `raw_category` so the nested shape can be rebuilt.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::extract::InstructionFinding;

/// Default shape of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Str,
    NullableStr,
    List,
}

impl FieldKind {
    fn default_value(self) -> Value {
        match self {
            FieldKind::Str => Value::String(String::new()),
            FieldKind::NullableStr => Value::Null,
            FieldKind::List => Value::Array(Vec::new()),
        }
    }
}

const TOP_LEVEL_FIELDS: &[(&str, FieldKind)] = &[
    ("fileName", FieldKind::Str),
    ("vulnerabilities", FieldKind::List),
    ("recommendations", FieldKind::List),
    ("instruction_analysis", FieldKind::List),
    ("llm_results", FieldKind::Str),
];

const CATEGORY_FIELDS: &[(&str, FieldKind)] = &[
    ("description", FieldKind::Str),
    ("findings", FieldKind::List),
    ("potential_issues", FieldKind::List),
    ("example_malicious_change", FieldKind::NullableStr),
    ("vulnerabilities", FieldKind::List),
    ("cyber_security_key_findings", FieldKind::Str),
    ("general_structure_observations", FieldKind::Str),
    ("code_structure_and_quality_review", FieldKind::Str),
    ("implications_and_recommendations", FieldKind::Str),
    ("next_steps", FieldKind::Str),
];

/// A payload that satisfies the canonical shape.
///
/// The only ways to build one are [`normalize`] / [`normalize_value`] (and
/// deserialization, which routes through them), so holding an
/// `AnalysisPayload` means every canonical key is present.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Value", into = "Value")]
pub struct AnalysisPayload(Map<String, Value>);

impl AnalysisPayload {
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn file_name(&self) -> &str {
        self.0.get("fileName").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn llm_results(&self) -> &str {
        self.0
            .get("llm_results")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Instruction findings that still match the typed shape. Entries written
    /// by hand or by an older pipeline that do not parse are skipped.
    pub fn instruction_analysis(&self) -> Vec<InstructionFinding> {
        self.0
            .get("instruction_analysis")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(InstructionFinding::from_value)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the payload is the wrapper produced for unparseable input
    pub fn is_degraded(&self) -> bool {
        self.0.contains_key("error") && self.0.contains_key("raw_data")
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Value> for AnalysisPayload {
    fn from(value: Value) -> Self {
        normalize_value(value)
    }
}

impl From<AnalysisPayload> for Value {
    fn from(payload: AnalysisPayload) -> Self {
        payload.into_value()
    }
}

/// Normalize an arbitrary result into the canonical shape. Never fails.
pub fn normalize(raw: &Value) -> AnalysisPayload {
    normalize_value(raw.clone())
}

/// Owned variant of [`normalize`]
pub fn normalize_value(raw: Value) -> AnalysisPayload {
    let mut map = coerce_to_map(raw);

    for (key, kind) in TOP_LEVEL_FIELDS {
        ensure_field(&mut map, key, *kind);
    }
    coerce_llm_results(&mut map);

    let mut report = take_object(&mut map, "report", "raw_report");
    let mut category = take_object(&mut report, "category", "raw_category");
    for (key, kind) in CATEGORY_FIELDS {
        ensure_field(&mut category, key, *kind);
    }
    report.insert("category".to_string(), Value::Object(category));
    map.insert("report".to_string(), Value::Object(report));

    AnalysisPayload(map)
}

fn coerce_to_map(raw: Value) -> Map<String, Value> {
    match raw {
        Value::Object(map) => map,
        Value::String(text) => match serde_json::from_str::<Value>(&text) {
            Ok(Value::Object(map)) => map,
            Ok(_) => {
                tracing::warn!("analysis data is JSON but not an object; wrapping it");
                error_wrapper("Invalid analysis data type", text)
            }
            Err(err) => {
                tracing::warn!(error = %err, "analysis data is not valid JSON; wrapping it");
                error_wrapper("Failed to parse analysis data", text)
            }
        },
        other => {
            tracing::warn!("analysis data is not a mapping; wrapping it");
            error_wrapper("Invalid analysis data type", other.to_string())
        }
    }
}

fn error_wrapper(message: &str, raw_data: String) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("error".to_string(), Value::String(message.to_string()));
    map.insert("raw_data".to_string(), Value::String(raw_data));
    map
}

fn ensure_field(map: &mut Map<String, Value>, key: &str, kind: FieldKind) {
    if !map.contains_key(key) {
        map.insert(key.to_string(), kind.default_value());
    }
}

/// A provider error object in `llm_results` collapses to "".
fn coerce_llm_results(map: &mut Map<String, Value>) {
    if let Some(value) = map.get_mut("llm_results") {
        if !value.is_string() {
            tracing::debug!("llm_results is not a string; clearing it");
            *value = Value::String(String::new());
        }
    }
}

/// Remove `key` as an object. Anything else found under it is kept under
/// `aside` (unless that key is already taken) and an empty object returned.
fn take_object(map: &mut Map<String, Value>, key: &str, aside: &str) -> Map<String, Value> {
    match map.remove(key) {
        Some(Value::Object(inner)) => inner,
        Some(other) => {
            tracing::debug!(field = key, moved_to = aside, "section is not an object; keeping it aside");
            map.entry(aside.to_string()).or_insert(other);
            Map::new()
        }
        None => Map::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn category(payload: &AnalysisPayload) -> &Map<String, Value> {
        payload.as_map()["report"]["category"].as_object().unwrap()
    }

    /// Every canonical key is present and the nested sections are objects
    fn assert_canonical(payload: &AnalysisPayload) {
        for (key, _) in TOP_LEVEL_FIELDS {
            assert!(payload.get(key).is_some(), "missing {key}");
        }
        assert!(payload.get("llm_results").unwrap().is_string());
        let category = category(payload);
        for (key, _) in CATEGORY_FIELDS {
            assert!(category.contains_key(*key), "missing {key}");
        }
    }

    fn sample_inputs() -> Vec<Value> {
        vec![
            Value::Null,
            json!(42),
            json!(true),
            json!([1, 2, 3]),
            json!("not json at all"),
            json!("[1, 2]"),
            json!("{\"fileName\": \"pump.l5x\"}"),
            json!({}),
            json!({"x": 1}),
            json!({"report": "flat text"}),
            json!({"report": {"category": {"findings": ["a"], "next_steps": 7}}}),
            json!({"llm_results": {"error": "quota exceeded"}}),
            json!({"instruction_analysis": "none", "recommendations": ["patch"]}),
        ]
    }

    #[test]
    fn test_empty_object_gets_every_default() {
        let payload = normalize(&json!({}));
        assert_canonical(&payload);
        for (key, kind) in TOP_LEVEL_FIELDS {
            assert_eq!(payload.get(key), Some(&kind.default_value()), "{key}");
        }
        for (key, kind) in CATEGORY_FIELDS {
            assert_eq!(category(&payload).get(*key), Some(&kind.default_value()), "{key}");
        }
        assert_eq!(payload.file_name(), "");
        assert_eq!(payload.llm_results(), "");
        assert_eq!(category(&payload)["example_malicious_change"], Value::Null);
        assert_eq!(category(&payload)["findings"], json!([]));
    }

    #[test]
    fn test_every_input_yields_canonical_shape() {
        for input in sample_inputs() {
            assert_canonical(&normalize(&input));
        }
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for input in sample_inputs() {
            let once = normalize(&input);
            let twice = normalize(&once.to_value());
            assert_eq!(once, twice, "not idempotent for {input}");
        }
    }

    #[test]
    fn test_present_fields_are_kept() {
        let payload = normalize(&json!({
            "fileName": "mixer.l5x",
            "custom": {"kept": true},
            "report": {"category": {"description": "desc", "findings": ["one"]}},
            "recommendations": ["isolate"],
        }));
        assert_eq!(payload.file_name(), "mixer.l5x");
        assert_eq!(payload.get("custom"), Some(&json!({"kept": true})));
        assert_eq!(category(&payload)["description"], json!("desc"));
        assert_eq!(category(&payload)["findings"], json!(["one"]));
        assert_eq!(payload.get("recommendations"), Some(&json!(["isolate"])));
    }

    #[test]
    fn test_present_mistyped_fields_are_kept() {
        let payload = normalize(&json!({
            "fileName": 17,
            "recommendations": "patch the HMI",
            "instruction_analysis": "none",
            "report": {"category": {"findings": "one finding", "next_steps": 7}},
        }));
        assert_canonical(&payload);
        assert_eq!(payload.get("fileName"), Some(&json!(17)));
        assert_eq!(payload.get("recommendations"), Some(&json!("patch the HMI")));
        assert_eq!(payload.get("instruction_analysis"), Some(&json!("none")));
        assert!(payload.instruction_analysis().is_empty());
        assert_eq!(category(&payload)["findings"], json!("one finding"));
        assert_eq!(category(&payload)["next_steps"], json!(7));
        assert_eq!(category(&payload)["description"], json!(""));
    }

    #[test]
    fn test_non_object_sections_are_moved_aside() {
        let payload = normalize(&json!({"report": "flat text"}));
        assert_canonical(&payload);
        assert_eq!(payload.get("raw_report"), Some(&json!("flat text")));

        let payload = normalize(&json!({"report": {"summary": "s", "category": ["a", "b"]}}));
        assert_canonical(&payload);
        let report = payload.get("report").unwrap();
        assert_eq!(report["summary"], json!("s"));
        assert_eq!(report["raw_category"], json!(["a", "b"]));
        assert_eq!(normalize(&payload.to_value()), payload);
    }

    #[test]
    fn test_llm_results_object_is_coerced_to_empty_string() {
        let payload = normalize(&json!({"llm_results": {"error": "timeout"}}));
        assert_eq!(payload.get("llm_results"), Some(&json!("")));

        let kept = normalize(&json!({"llm_results": "## Summary"}));
        assert_eq!(kept.llm_results(), "## Summary");
    }

    #[test]
    fn test_unparseable_string_is_wrapped() {
        let payload = normalize(&json!("garbage {"));
        assert!(payload.is_degraded());
        assert_eq!(payload.get("error"), Some(&json!("Failed to parse analysis data")));
        assert_eq!(payload.get("raw_data"), Some(&json!("garbage {")));
    }

    #[test]
    fn test_json_string_object_is_parsed() {
        let payload = normalize(&json!("{\"fileName\": \"valve.l5x\"}"));
        assert!(!payload.is_degraded());
        assert_eq!(payload.file_name(), "valve.l5x");
    }

    #[test]
    fn test_non_mapping_is_wrapped_with_stringified_value() {
        let payload = normalize(&json!([1, 2]));
        assert_eq!(payload.get("error"), Some(&json!("Invalid analysis data type")));
        assert_eq!(payload.get("raw_data"), Some(&json!("[1,2]")));
    }

    #[test]
    fn test_deserialize_routes_through_normalize() {
        let payload: AnalysisPayload = serde_json::from_str(r#"{"fileName": "a"}"#).unwrap();
        assert_canonical(&payload);
        assert_eq!(payload.file_name(), "a");
    }
}
