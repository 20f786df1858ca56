//! Business logic services for sprite-qa

pub mod analysis_worker;
pub mod background_client;
pub mod batch_verifier;
pub mod cleanup;
pub mod fix_learner;
pub mod fix_verifier;
pub mod generation_client;
pub mod keywords;
pub mod outcome_aggregator;
pub mod pattern_tracker;
pub mod prompt_builder;
pub mod prompt_enhancer;
pub mod rate_limiter;
pub mod sample_matcher;
pub mod stats;
pub mod vision_client;

pub use analysis_worker::{AnalysisWorker, ProcessSummary, WorkerSettings};
pub use background_client::{BackgroundError, BackgroundRemover, HttpBackgroundRemover};
pub use batch_verifier::{run_batch, BatchItemResult, BatchReport, BatchRequest, BatchSummary};
pub use cleanup::{run_cleanup, CleanupMode, CleanupReport};
pub use fix_verifier::{
    FixVerifier, VerificationReport, VerifierSettings, VerifyError, VerifyOutcome,
};
pub use generation_client::{
    GenerationError, GenerationRequest, HttpImageGenerator, ImageGenerator,
};
pub use sample_matcher::{Sample, SampleLookup, SampleMatcher};
pub use vision_client::{HttpVisionAnalyzer, VisionAnalyzer, VisionError};
