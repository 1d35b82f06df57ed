//! Result normalization, instruction extraction and fingerprinting

pub mod extract;
pub mod fingerprint;
pub mod normalize;
pub mod pipeline;
mod relaxed;

pub use extract::{extract, InstructionFinding, RiskLevel};
pub use fingerprint::{fingerprint, fingerprint_payload};
pub use normalize::{normalize, normalize_value, AnalysisPayload};
pub use pipeline::Analyzer;
