//! Data models for sprite-qa

pub mod analysis;
pub mod generation;
pub mod job;
pub mod pattern;
pub mod verification;

pub use analysis::{hallucination_type, AnalysisResult, ImageAnalysis};
pub use generation::{AssetKey, Generation};
pub use job::{AnalysisJob, JobOutcome, JobStatus};
pub use pattern::{HallucinationPattern, LearnedFixSet, OutcomeClass, PromptOutcomePattern};
pub use verification::{
    classify, BatchItemStatus, MatchTier, VerificationRecord, VerificationStatus,
    IMPROVEMENT_THRESHOLD,
};
