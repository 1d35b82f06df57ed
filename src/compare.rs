//! LLM comparison of an analysis against a baseline
//!
//! A comparison is a single model call. It is either recorded in the
//! comparison history or it failed; nothing is written for a failed call.

use std::time::Duration;
use thiserror::Error;

use crate::analysis::AnalysisPayload;
use crate::llm::{truncate_chars, LlmClient, LlmFailure, ANALYST_SYSTEM_PROMPT};
use crate::store::{AnalysisStore, NewComparison, StoreError};

#[derive(Debug, Error)]
pub enum ComparisonError {
    #[error("provider error: {0}")]
    Provider(String),
    #[error("provider did not answer within {0:?}")]
    Timeout(Duration),
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
    #[error("{kind} {id} not found")]
    SourceNotFound { kind: &'static str, id: i64 },
}

impl From<LlmFailure> for ComparisonError {
    fn from(failure: LlmFailure) -> Self {
        match failure {
            LlmFailure::Provider(message) => ComparisonError::Provider(message),
            LlmFailure::Timeout(after) => ComparisonError::Timeout(after),
        }
    }
}

/// One side of a comparison
#[derive(Debug, Clone, Copy, Default)]
pub struct ComparisonSource<'a> {
    /// Record id, when the text came from the store
    pub id: Option<i64>,
    pub file_name: Option<&'a str>,
    pub content: &'a str,
}

impl<'a> ComparisonSource<'a> {
    pub fn text(content: &'a str) -> Self {
        Self {
            content,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonResult {
    pub comparison_id: i64,
    pub result: String,
    pub prompt: String,
}

pub struct Comparator<'a> {
    client: LlmClient<'a>,
    store: &'a AnalysisStore,
    max_document_chars: usize,
}

impl<'a> Comparator<'a> {
    pub fn new(client: LlmClient<'a>, store: &'a AnalysisStore, max_document_chars: usize) -> Self {
        Self {
            client,
            store,
            max_document_chars,
        }
    }

    pub fn build_prompt(&self, analysis: &str, baseline: &str) -> String {
        format!(
            r#"Compare the following two PLC code files in detail.

Respond ONLY in the following structured markdown format, using the exact section headers below, in this order. If a section has no relevant content, write "None" under the header. Use bullet points, code blocks and tables where they help.

---
ANALYSIS FILE:
{analysis}
---
BASELINE FILE:
{baseline}
---

## Overview
- Summarize the purpose of each file and the context of the comparison.

## Structural Differences
- Differences in blocks, networks, routines, organization, naming and modularity.

## Logic Differences
- New, missing or modified instructions, changes in control flow, logic bombs and other functional changes.

## Security and Risk Analysis
- Security-relevant differences: vulnerabilities, unsafe logic, sabotage, covert threats. One subheader per finding.

## Key Risks and Recommendations
- The most important risks, each with a recommended mitigation.

## Conclusion
- Overall summary, critical findings and next steps.
"#,
            analysis = truncate_chars(analysis, self.max_document_chars),
            baseline = truncate_chars(baseline, self.max_document_chars),
        )
    }

    /// Run one comparison and record it
    pub async fn compare(
        &self,
        analysis: &ComparisonSource<'_>,
        baseline: &ComparisonSource<'_>,
    ) -> Result<ComparisonResult, ComparisonError> {
        let prompt = self.build_prompt(analysis.content, baseline.content);
        let result = self
            .client
            .generate(Some(ANALYST_SYSTEM_PROMPT), &prompt)
            .await?;

        let comparison_id = self.store.save_comparison(&NewComparison {
            analysis_id: analysis.id,
            baseline_id: baseline.id,
            analysis_file_name: analysis.file_name,
            baseline_file_name: baseline.file_name,
            prompt: &prompt,
            result: &result,
            provider: Some(self.client.provider()),
            model: Some(self.client.model()),
        })?;

        Ok(ComparisonResult {
            comparison_id,
            result,
            prompt,
        })
    }

    /// Compare two stored records by id
    pub async fn compare_records(
        &self,
        analysis_id: i64,
        baseline_id: i64,
    ) -> Result<ComparisonResult, ComparisonError> {
        let analysis = self
            .store
            .get_analysis(analysis_id)?
            .ok_or(ComparisonError::SourceNotFound {
                kind: "analysis",
                id: analysis_id,
            })?;
        let baseline = self
            .store
            .get_baseline(baseline_id)?
            .ok_or(ComparisonError::SourceNotFound {
                kind: "baseline",
                id: baseline_id,
            })?;

        let analysis_text = comparison_text(&analysis.payload);
        let baseline_text = comparison_text(&baseline.payload);

        self.compare(
            &ComparisonSource {
                id: Some(analysis.id),
                file_name: Some(&analysis.file_name),
                content: &analysis_text,
            },
            &ComparisonSource {
                id: Some(baseline.id),
                file_name: Some(&baseline.file_name),
                content: &baseline_text,
            },
        )
        .await
    }
}

/// Text a stored payload contributes to a comparison: the captured source
/// when there is one, otherwise the payload itself.
pub fn comparison_text(payload: &AnalysisPayload) -> String {
    ["content", "file_content"]
        .iter()
        .find_map(|key| payload.get(key).and_then(|v| v.as_str()))
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{:#}", payload.to_value()))
}
