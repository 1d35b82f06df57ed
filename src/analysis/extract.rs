//! Instruction-level findings embedded in free-form model output
//!
//! The forensic prompt asks for an `instruction_analysis` JSON array, but the
//! response is prose and the array arrives in whatever quoting style the
//! model felt like. Extraction tries, in order:
//!
//! 1. a fenced ```` ```json ```` block whose body is a top-level array
//! 2. an `instruction_analysis` label (`:` or `=`) followed by an array
//!
//! The candidate text is parsed as a relaxed literal first and as strict JSON
//! second. Every miss degrades to an empty list; nothing here returns an error.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::relaxed;

/// Severity attached to one instruction finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "Low",
            RiskLevel::Medium => "Medium",
            RiskLevel::High => "High",
            RiskLevel::Critical => "Critical",
        }
    }

    /// Case-insensitive; tolerates surrounding whitespace and a trailing "risk".
    pub fn parse(raw: &str) -> Option<Self> {
        let lowered = raw.trim().to_ascii_lowercase();
        let word = lowered.strip_suffix("risk").unwrap_or(&lowered).trim();
        match word {
            "low" => Some(RiskLevel::Low),
            "medium" | "moderate" => Some(RiskLevel::Medium),
            "high" => Some(RiskLevel::High),
            "critical" => Some(RiskLevel::Critical),
            _ => None,
        }
    }

    pub fn is_severe(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Critical)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One `{instruction, insight, risk_level}` triple
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionFinding {
    pub instruction: String,
    pub insight: String,
    pub risk_level: RiskLevel,
}

impl InstructionFinding {
    /// Build a finding from one array element. Elements that are not objects,
    /// have no instruction text, or carry an unrecognised risk level are
    /// rejected.
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;

        let instruction = scalar_text(obj.get("instruction")?)?;
        if instruction.trim().is_empty() {
            return None;
        }
        let insight = obj.get("insight").and_then(scalar_text).unwrap_or_default();
        let risk_level = obj
            .get("risk_level")
            .or_else(|| obj.get("risk"))
            .and_then(Value::as_str)
            .and_then(RiskLevel::parse)?;

        Some(Self {
            instruction,
            insight,
            risk_level,
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Extract instruction findings from raw model text.
pub fn extract(llm_text: &str) -> Vec<InstructionFinding> {
    let Some(items) = extract_array(llm_text) else {
        return Vec::new();
    };

    let findings: Vec<InstructionFinding> = items
        .iter()
        .filter_map(InstructionFinding::from_value)
        .collect();
    if findings.len() < items.len() {
        tracing::debug!(
            kept = findings.len(),
            dropped = items.len() - findings.len(),
            "skipped malformed instruction findings"
        );
    }
    findings
}

/// Locate and parse the embedded array without interpreting its elements.
pub fn extract_array(llm_text: &str) -> Option<Vec<Value>> {
    let candidate = find_array_text(llm_text)?;
    match parse_candidate(candidate)? {
        Value::Array(items) => Some(items),
        _ => None,
    }
}

/// Raw text of the first embedded array candidate, if any.
pub fn find_array_text(llm_text: &str) -> Option<&str> {
    fenced_array(llm_text).or_else(|| labelled_array(llm_text))
}

fn parse_candidate(candidate: &str) -> Option<Value> {
    if let Some(value) = relaxed::parse(candidate) {
        return Some(value);
    }
    match serde_json::from_str(candidate) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(error = %err, "instruction array candidate did not parse");
            None
        }
    }
}

fn fenced_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?is)```json\s*(\[.*?\])\s*```").expect("fenced block pattern is valid")
    })
}

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"instruction_analysis["'`]?\s*[:=]\s*\["#).expect("label pattern is valid")
    })
}

fn fenced_array(text: &str) -> Option<&str> {
    fenced_pattern()
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn labelled_array(text: &str) -> Option<&str> {
    let label = label_pattern().find(text)?;
    // The match ends just past the opening bracket.
    let open = label.end() - 1;
    let close = matching_bracket(text, open)?;
    Some(&text[open..=close])
}

/// Byte index of the `]` balancing the `[` at `open`, skipping brackets that
/// appear inside quoted strings.
fn matching_bracket(text: &str, open: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let mut escaped = false;

    for (offset, ch) in text[open..].char_indices() {
        if let Some(q) = quote {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' => quote = Some(ch),
            '[' => depth += 1,
            ']' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(open + offset);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_no_json_yields_empty() {
        assert!(extract("no json here").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_fenced_json_block() {
        let text = "```json\n[{\"instruction\":\"MOV A,B\",\"insight\":\"x\",\"risk_level\":\"Low\"}]\n```";
        assert_eq!(
            extract(text),
            vec![InstructionFinding {
                instruction: "MOV A,B".to_string(),
                insight: "x".to_string(),
                risk_level: RiskLevel::Low,
            }]
        );
    }

    #[test]
    fn test_fenced_block_inside_prose() {
        let text = "## 7. INSTRUCTION-LEVEL ANALYSIS\nSee below.\n\n```JSON\n[\n  {\"instruction\": \"A M10.0\", \"insight\": \"hidden marker\", \"risk_level\": \"high\"}\n]\n```\nThat is all.";
        let findings = extract(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].risk_level, RiskLevel::High);
    }

    #[test]
    fn test_labelled_array_with_single_quotes() {
        let text = "Findings follow.\ninstruction_analysis = [{'instruction': 'T DB5.DBW2', 'insight': 'overwrites [setpoint]', 'risk_level': 'Critical'},]\nEnd.";
        let findings = extract(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].instruction, "T DB5.DBW2");
        assert_eq!(findings[0].insight, "overwrites [setpoint]");
        assert_eq!(findings[0].risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_labelled_array_inside_json_object() {
        let text = r#"{"instruction_analysis": [{"instruction": "JU FC99", "insight": "uncalled block", "risk_level": "Medium"}], "other": [1]}"#;
        let findings = extract(text);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_non_array_candidate_is_discarded() {
        assert_eq!(extract_array("instruction_analysis: [1, 2"), None);
        assert!(extract("```json\n{\"a\": 1}\n```").is_empty());
    }

    #[test]
    fn test_unparseable_candidate_is_empty() {
        let text = "```json\n[{instruction: MOV}]\n```";
        assert!(extract(text).is_empty());
    }

    #[test]
    fn test_malformed_elements_are_skipped() {
        let text = r#"```json
[
  {"instruction": "MOV A,B", "insight": "ok", "risk_level": "Low"},
  {"instruction": "", "insight": "blank", "risk_level": "Low"},
  {"instruction": "CALL X", "insight": "unknown risk", "risk_level": "Severe"},
  "just a string",
  {"instruction": 42, "risk": "Critical"}
]
```"#;
        let findings = extract(text);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[1].instruction, "42");
        assert_eq!(findings[1].insight, "");
        assert_eq!(findings[1].risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_risk_level_parsing() {
        assert_eq!(RiskLevel::parse(" CRITICAL "), Some(RiskLevel::Critical));
        assert_eq!(RiskLevel::parse("High risk"), Some(RiskLevel::High));
        assert_eq!(RiskLevel::parse("moderate"), Some(RiskLevel::Medium));
        assert_eq!(RiskLevel::parse("n/a"), None);
    }

    #[test]
    fn test_matching_bracket_skips_quoted_brackets() {
        let text = r#"x = ["a]", ["b"]] tail"#;
        let open = text.find('[').unwrap();
        let close = matching_bracket(text, open).unwrap();
        assert_eq!(&text[open..=close], r#"["a]", ["b"]]"#);
    }
}
