use firstwatch::analysis::pipeline::build_payload;
use firstwatch::analysis::{extract, fingerprint_payload, normalize, RiskLevel};
use firstwatch::compare::Comparator;
use firstwatch::config::LlmConfig;
use firstwatch::llm::{LlmClient, StaticTransport};
use firstwatch::store::AnalysisStore;
use firstwatch::Analyzer;
use pretty_assertions::assert_eq;
use serde_json::json;

const LLM_TEXT: &str = "```json\n[{\"instruction\":\"XIC(BypassSafety)[OTE(ProcessOutput)]\",\"insight\":\"bypasses a safety interlock\",\"risk_level\":\"Critical\"}]\n```";

#[test]
fn raw_llm_text_to_deduplicated_record() {
    let findings = extract(LLM_TEXT);
    let payload = build_payload("dev.l5x", LLM_TEXT.to_string(), &findings);

    let stored = payload.instruction_analysis();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].risk_level, RiskLevel::Critical);
    assert_eq!(
        payload.get("instruction_analysis").unwrap()[0]["risk_level"],
        json!("Critical")
    );

    let store = AnalysisStore::open_in_memory().unwrap();
    let value = payload.to_value();
    let id = store
        .save_analysis("dev.l5x", "complete", &value, Some("plc/dev.l5x"), None, None)
        .unwrap();
    assert!(id.is_some());

    // Re-normalizing is a no-op, so the second save carries identical content.
    let again = normalize(&value);
    assert_eq!(fingerprint_payload(&again), fingerprint_payload(&payload));
    let duplicate = store
        .save_analysis("dev.l5x", "complete", &again.to_value(), Some("plc/dev.l5x"), None, None)
        .unwrap();
    assert_eq!(duplicate, None);

    let record = store.get_analysis(id.unwrap()).unwrap().unwrap();
    assert_eq!(record.payload, payload);
}

#[tokio::test]
async fn analyze_save_then_compare_against_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let store = AnalysisStore::open(&dir.path().join("firstwatch.db")).unwrap();
    let config = LlmConfig {
        interaction_log: Some(dir.path().join("llm.ndjson").display().to_string()),
        ..LlmConfig::default()
    };

    let analysis_transport = StaticTransport::text(format!("1. EXECUTIVE SUMMARY\nSuspicious.\n{LLM_TEXT}"));
    let analyzer = Analyzer::new(LlmClient::new(&analysis_transport, &config), config.max_document_chars);
    let payload = analyzer.analyze("dev.l5x", "XIC(BypassSafety)OTE(ProcessOutput)").await;
    let analysis_id = store
        .save_analysis("dev.l5x", "complete", &payload.to_value(), None, Some("openai"), Some("gpt-4o"))
        .unwrap()
        .unwrap();

    let baseline_id = store
        .save_baseline("dev.l5x", Some("dev-golden.l5x"), None, Some(&json!({"content": "XIC(Start)OTE(Motor)"})), None, None)
        .unwrap()
        .unwrap();

    let compare_transport = StaticTransport::text("## Overview\nSafety bypass added.");
    let comparator = Comparator::new(
        LlmClient::new(&compare_transport, &config),
        &store,
        config.max_document_chars,
    );
    let outcome = comparator.compare_records(analysis_id, baseline_id).await.unwrap();
    assert!(outcome.prompt.contains("XIC(Start)OTE(Motor)"));

    // The label outlives the analysis it came from.
    store.delete_analysis(analysis_id).unwrap();
    let history = store.list_comparisons(Some(analysis_id), None).unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, outcome.comparison_id);
    assert_eq!(history[0].analysis_file_name.as_deref(), Some("dev.l5x"));
    assert_eq!(history[0].result, "## Overview\nSafety bypass added.");

    let log = std::fs::read_to_string(dir.path().join("llm.ndjson")).unwrap();
    assert_eq!(log.lines().count(), 2);
}
