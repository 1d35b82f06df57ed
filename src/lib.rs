pub mod analysis;
pub mod cli;
pub mod compare;
pub mod config;
pub mod intel;
pub mod llm;
pub mod store;

pub use analysis::{normalize, AnalysisPayload, Analyzer, InstructionFinding, RiskLevel};
pub use compare::{Comparator, ComparisonError, ComparisonResult, ComparisonSource};
pub use config::Config;
pub use llm::{LlmClient, LlmResponse, LlmTransport, StaticTransport};
pub use store::{AnalysisStore, StoreError};
