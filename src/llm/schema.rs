// Output schema descriptors and JSON extraction for model responses
//
// Models are asked for bare JSON but frequently wrap it in markdown fences
// or prose. extract_json peels those layers; OutputSchema then checks the
// top-level shape before a stage attempts a typed deserialization.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// Expected kind of a top-level field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    /// Present-and-string, or null, or absent
    NullableString,
    Array,
    Object,
}

impl FieldKind {
    fn describe(&self) -> &'static str {
        match self {
            FieldKind::String => "string",
            FieldKind::NullableString => "string or null",
            FieldKind::Array => "array",
            FieldKind::Object => "object",
        }
    }
}

/// One required top-level field
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
}

/// Shallow structural schema for a model response. Deep validation happens
/// when the stage deserializes into its typed output struct; this layer
/// catches the common failure of a missing or mis-typed top-level field
/// early enough to drive a repair retry.
#[derive(Debug, Clone, Copy)]
pub struct OutputSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl OutputSchema {
    /// One-line shape description used in repair instructions
    pub fn describe(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|f| format!("\"{}\": {}", f.name, f.kind.describe()))
            .collect();
        format!("{{ {} }}", fields.join(", "))
    }

    /// Check a parsed value against the schema
    pub fn validate(&self, value: &Value) -> Result<(), String> {
        let obj = value
            .as_object()
            .ok_or_else(|| format!("expected a JSON object for '{}'", self.name))?;

        for field in self.fields {
            let entry = obj.get(field.name);
            let ok = match field.kind {
                FieldKind::String => matches!(entry, Some(Value::String(_))),
                FieldKind::NullableString => {
                    matches!(entry, None | Some(Value::Null) | Some(Value::String(_)))
                }
                FieldKind::Array => matches!(entry, Some(Value::Array(_))),
                FieldKind::Object => matches!(entry, Some(Value::Object(_))),
            };
            if !ok {
                return Err(format!(
                    "field '{}' must be a {} in '{}' output",
                    field.name,
                    field.kind.describe(),
                    self.name
                ));
            }
        }
        Ok(())
    }
}

pub fn classification_schema() -> OutputSchema {
    OutputSchema {
        name: "classification",
        fields: &[
            FieldSpec { name: "intent", kind: FieldKind::String },
            FieldSpec { name: "domain", kind: FieldKind::String },
            FieldSpec { name: "domainHierarchy", kind: FieldKind::Array },
            FieldSpec { name: "quickResponse", kind: FieldKind::NullableString },
            FieldSpec { name: "questions", kind: FieldKind::Array },
        ],
    }
}

pub fn competitors_schema() -> OutputSchema {
    OutputSchema {
        name: "competitors",
        fields: &[FieldSpec { name: "competitors", kind: FieldKind::Array }],
    }
}

pub fn overview_schema() -> OutputSchema {
    OutputSchema {
        name: "market_overview",
        fields: &[
            FieldSpec { name: "title", kind: FieldKind::String },
            FieldSpec { name: "content", kind: FieldKind::String },
        ],
    }
}

pub fn gaps_schema() -> OutputSchema {
    OutputSchema {
        name: "gap_analysis",
        fields: &[FieldSpec { name: "gaps", kind: FieldKind::Array }],
    }
}

pub fn problem_schema() -> OutputSchema {
    OutputSchema {
        name: "problem_statement",
        fields: &[
            FieldSpec { name: "title", kind: FieldKind::String },
            FieldSpec { name: "content", kind: FieldKind::String },
            FieldSpec { name: "targetUser", kind: FieldKind::String },
            FieldSpec { name: "keyDifferentiators", kind: FieldKind::Array },
            FieldSpec { name: "validationQuestions", kind: FieldKind::Array },
        ],
    }
}

static FENCE_REGEX: OnceLock<Regex> = OnceLock::new();

fn fence_regex() -> &'static Regex {
    FENCE_REGEX.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*\n?([\s\S]*?)```").expect("fence regex must compile")
    })
}

/// Extract a JSON value from a model response. Tries, in order: the whole
/// trimmed response, the first fenced code block, and the outermost brace
/// span. Returns the parse error of the most promising candidate.
pub fn extract_json(content: &str) -> Result<Value, String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err("empty response".to_string());
    }

    let mut last_error = String::new();

    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        match serde_json::from_str(trimmed) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = e.to_string(),
        }
    }

    if let Some(caps) = fence_regex().captures(trimmed) {
        if let Some(block) = caps.get(1) {
            match serde_json::from_str(block.as_str().trim()) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = e.to_string(),
            }
        }
    }

    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            match serde_json::from_str(&trimmed[start..=end]) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = e.to_string(),
            }
        }
    }

    if last_error.is_empty() {
        last_error = "no JSON object found in response".to_string();
    }
    Err(last_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_bare_json() {
        let value = extract_json(r#"{"intent": "build"}"#).unwrap();
        assert_eq!(value["intent"], "build");
    }

    #[test]
    fn test_extract_fenced_json() {
        let content = "Here is the classification:\n```json\n{\"intent\": \"explore\"}\n```\nDone.";
        let value = extract_json(content).unwrap();
        assert_eq!(value["intent"], "explore");
    }

    #[test]
    fn test_extract_fence_without_language_tag() {
        let content = "```\n{\"ok\": true}\n```";
        let value = extract_json(content).unwrap();
        assert_eq!(value["ok"], true);
    }

    #[test]
    fn test_extract_embedded_braces() {
        let content = "The answer is {\"intent\": \"small_talk\", \"quickResponse\": \"Hi\"} as requested.";
        let value = extract_json(content).unwrap();
        assert_eq!(value["intent"], "small_talk");
    }

    #[test]
    fn test_extract_rejects_prose() {
        assert!(extract_json("I could not produce JSON, sorry.").is_err());
        assert!(extract_json("").is_err());
        assert!(extract_json("   \n  ").is_err());
    }

    #[test]
    fn test_classification_schema_accepts_valid() {
        let schema = classification_schema();
        let value = json!({
            "intent": "build",
            "domain": "note-taking apps",
            "domainHierarchy": ["productivity", "note-taking apps"],
            "quickResponse": null,
            "questions": []
        });
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn test_classification_schema_allows_absent_nullable() {
        let schema = classification_schema();
        let value = json!({
            "intent": "build",
            "domain": "crm tools",
            "domainHierarchy": [],
            "questions": []
        });
        assert!(schema.validate(&value).is_ok());
    }

    #[test]
    fn test_schema_rejects_missing_field() {
        let schema = overview_schema();
        let value = json!({"title": "Overview"});
        let err = schema.validate(&value).unwrap_err();
        assert!(err.contains("content"));
    }

    #[test]
    fn test_schema_rejects_wrong_kind() {
        let schema = gaps_schema();
        let value = json!({"gaps": "not an array"});
        assert!(schema.validate(&value).is_err());
    }

    #[test]
    fn test_schema_rejects_non_object() {
        let schema = competitors_schema();
        assert!(schema.validate(&json!(["a", "b"])).is_err());
    }

    #[test]
    fn test_describe_lists_fields() {
        let description = problem_schema().describe();
        assert!(description.contains("\"targetUser\": string"));
        assert!(description.contains("\"keyDifferentiators\": array"));
    }
}
