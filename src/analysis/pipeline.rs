//! Forensic analysis of one PLC program file
//!
//! prompt -> LLM -> extract instruction findings -> normalize. The result is
//! always a schema-valid payload: a failed or timed-out model call produces
//! an empty analysis body rather than no payload at all.

use serde_json::{json, Value};

use super::extract::{extract, InstructionFinding};
use super::normalize::{normalize_value, AnalysisPayload};
use crate::llm::{truncate_chars, LlmClient, ANALYST_SYSTEM_PROMPT};

const FORENSIC_PROMPT: &str = r#"The following PLC logic is under investigation for any signs of **malicious logic, embedded threats, unsafe control logic, or suspicious code structures**.

You must perform a **complete forensic and quality analysis** of this logic to detect known and novel PLC-based threats. These may include logic bombs, sabotage, unauthorised overrides, covert control logic, payload hiding, and bad engineering practices that weaken system integrity or safety.

---

Respond ONLY in the following structured format. Be precise, professional, and concise. Your audience includes ICS engineers, cybersecurity analysts, and operations managers.

---

1. EXECUTIVE SUMMARY
- Summarise the code's functional intent (if discernible)
- Note any high-level safety or security concerns at a glance

---

2. CYBER SECURITY KEY FINDINGS
For each issue identified, provide:
- **Title**: Short description (e.g., "Runtime-triggered Logic Bomb")
- **Location**: FC/FB number, network or STL line number
- **Threat Behaviour**: Explain step-by-step what the code does
- **Risk Level**: [Low, Medium, High, Critical]
- **Impact**: Operational and/or safety consequences
- **Mitigation**: How to neutralise or remove the threat

You MUST check for:
- Hardcoded overrides (e.g., MOV or L/T instructions overwriting DBs or setpoints)
- Time-delayed triggers using counters, runtime, or process values
- Covert logic hidden in redundant branches or unused blocks
- Suppressed alarms (e.g., writing 0 to alarm bits or masking DB alarms)
- Memory marker misuse (e.g., hidden M-bit toggles or reserved bits)
- Persistence mechanisms or backdoors (e.g., uncalled FCs, reserved DB usage)
- Payload hiding (e.g., logic embedded in FBs called conditionally only once)
- Any logic that could damage equipment, affect product quality, or trigger false signals
- External command injection risk (e.g., inputs that override operator logic)
- Signature mismatches, version mismatches, or timestamp oddities
- Triggers that appear inactive but are activated via indirect markers

---

3. GENERAL STRUCTURE OBSERVATIONS
- Outline code structure (FCs, DBs, reuse of FBs)
- Comment on naming patterns, modularity, and clarity
- Identify any undocumented or poorly explained elements

---

4. CODE STRUCTURE & QUALITY REVIEW
- Highlight unstructured memory access, missing symbolic addressing, copy-paste logic, poor naming, missing comments on key logic paths, and engineering anti-patterns that increase error risk
- Suggest improvements for maintainability, auditability, and clarity

---

5. IMPLICATIONS AND RECOMMENDATIONS
Provide a table:

| Risk | Description | Recommendation |

Ensure each row is unique, meaningful, and offers a specific mitigation or follow-up.

---

6. NEXT STEPS
- Recommend immediate and mid-term actions (isolate suspect logic, diff against a trusted baseline, audit engineering workstation access, revalidate signatures and timestamps, review linked FCs/OBs and conditional FB calls, scan other blocks for similar patterns)

---

7. INSTRUCTION-LEVEL ANALYSIS (REQUIRED)
Return a JSON array named `instruction_analysis` in a ```json fenced block with this format:

[
  {
    "instruction": "<raw STL, SCL or ladder line>",
    "insight": "<plain-language description>",
    "risk_level": "<Low|Medium|High|Critical>"
  }
]

If a section has no relevant content, write "None".

Now analyse the following PLC logic export:
"#;

/// Runs the forensic prompt for one file through an [`LlmClient`]
pub struct Analyzer<'a> {
    client: LlmClient<'a>,
    max_document_chars: usize,
}

impl<'a> Analyzer<'a> {
    pub fn new(client: LlmClient<'a>, max_document_chars: usize) -> Self {
        Self {
            client,
            max_document_chars,
        }
    }

    pub fn provider(&self) -> &str {
        self.client.provider()
    }

    pub fn model(&self) -> &str {
        self.client.model()
    }

    pub fn build_prompt(&self, content: &str) -> String {
        let mut prompt = String::from(FORENSIC_PROMPT);
        prompt.push_str(truncate_chars(content, self.max_document_chars));
        prompt
    }

    pub async fn analyze(&self, file_name: &str, content: &str) -> AnalysisPayload {
        let prompt = self.build_prompt(content);

        let (llm_results, findings) = match self
            .client
            .generate(Some(ANALYST_SYSTEM_PROMPT), &prompt)
            .await
        {
            Ok(text) => {
                let findings = extract(&text);
                (text, findings)
            }
            // Detail was logged by the client; the payload only records absence.
            Err(_) => (String::new(), Vec::new()),
        };

        tracing::info!(
            file_name,
            findings = findings.len(),
            severe = findings.iter().filter(|f| f.risk_level.is_severe()).count(),
            "analysis complete"
        );

        build_payload(file_name, llm_results, &findings)
    }
}

/// Assemble the skeleton for a model answer and normalize it
pub fn build_payload(
    file_name: &str,
    llm_results: String,
    findings: &[InstructionFinding],
) -> AnalysisPayload {
    let severe: Vec<Value> = findings
        .iter()
        .filter(|f| f.risk_level.is_severe())
        .map(|f| Value::String(format!("[{}] {}: {}", f.risk_level, f.instruction, f.insight)))
        .collect();

    let skeleton = json!({
        "fileName": file_name,
        "report": {
            "category": {
                "findings": severe,
            }
        },
        "llm_results": llm_results,
        "instruction_analysis": findings,
    });

    normalize_value(skeleton)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::RiskLevel;
    use crate::config::LlmConfig;
    use crate::llm::StaticTransport;
    use serde_json::json;

    fn config() -> LlmConfig {
        LlmConfig {
            max_document_chars: 10,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_analyze_extracts_findings() {
        let transport = StaticTransport::text(
            "1. EXECUTIVE SUMMARY\nBad.\n```json\n[{\"instruction\":\"XIC(BypassSafety)[OTE(ProcessOutput)]\",\"insight\":\"bypasses a safety interlock\",\"risk_level\":\"Critical\"}]\n```",
        );
        let cfg = config();
        let analyzer = Analyzer::new(LlmClient::new(&transport, &cfg), cfg.max_document_chars);

        let payload = analyzer.analyze("dev.l5x", "XIC(BypassSafety)").await;

        assert_eq!(payload.file_name(), "dev.l5x");
        let findings = payload.instruction_analysis();
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].risk_level, RiskLevel::Critical);
        assert!(payload.llm_results().contains("EXECUTIVE SUMMARY"));
        assert_eq!(
            payload.as_map()["report"]["category"]["findings"],
            json!(["[Critical] XIC(BypassSafety)[OTE(ProcessOutput)]: bypasses a safety interlock"])
        );
    }

    #[tokio::test]
    async fn test_provider_failure_still_yields_valid_payload() {
        let transport = StaticTransport::failing("OpenAI API key not set");
        let cfg = config();
        let analyzer = Analyzer::new(LlmClient::new(&transport, &cfg), cfg.max_document_chars);

        let payload = analyzer.analyze("dev.l5x", "NOP").await;

        assert_eq!(payload.llm_results(), "");
        assert!(payload.instruction_analysis().is_empty());
        assert_eq!(payload.file_name(), "dev.l5x");
        assert!(!payload.is_degraded());
    }

    #[tokio::test]
    async fn test_prompt_truncates_document() {
        let transport = StaticTransport::text("no findings");
        let cfg = config();
        let analyzer = Analyzer::new(LlmClient::new(&transport, &cfg), cfg.max_document_chars);

        analyzer.analyze("long.awl", "0123456789ABCDEF").await;

        let prompts = transport.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].ends_with("0123456789"));
        assert!(prompts[0].contains("INSTRUCTION-LEVEL ANALYSIS"));
    }
}
