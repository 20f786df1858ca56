//! Fix verification engine
//!
//! Regenerates a representative sample with the learned fixes applied,
//! re-analyses it against the original request, classifies the result, and
//! records the verdict.
//!
//! Pattern mutation and the audit record are written in one transaction.
//! Background removal is best-effort: any failure or timeout keeps the raw
//! image.

use rand::Rng;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::background_client::BackgroundRemover;
use super::fix_learner::{forget_failed_fixes, VERIFIED_CONFIDENCE_STEP};
use super::generation_client::{GenerationError, GenerationRequest, ImageGenerator};
use super::prompt_builder::build_prompt;
use super::prompt_enhancer::{self, EnhancedPrompt};
use super::sample_matcher::{Sample, SampleMatcher};
use super::vision_client::{VisionAnalyzer, VisionError};
use crate::db;
use crate::db::patterns::PatternTarget;
use crate::models::{
    classify, HallucinationPattern, MatchTier, VerificationRecord, VerificationStatus,
};
use crate::utils::begin_monitored;

/// Exclusive upper bound for regeneration seeds
const MAX_SEED: u32 = 2_147_483_647;
const VERIFY_STEPS: u32 = 25;
const VERIFY_GUIDANCE: f32 = 3.0;
const VERIFY_SIZE: u32 = 1024;

/// Verification engine errors
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("pattern {0} not found")]
    PatternNotFound(Uuid),

    #[error("generation {0} not found")]
    GenerationNotFound(String),

    #[error("generation {0} has not been analysed")]
    NotAnalysed(String),

    #[error("generation {0} has no hallucination to verify")]
    NoHallucination(String),

    #[error("image generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("re-analysis failed: {0}")]
    Analysis(#[from] VisionError),

    #[error(transparent)]
    Database(#[from] sprite_common::Error),
}

/// Tunables for verification runs
#[derive(Debug, Clone)]
pub struct VerifierSettings {
    pub quality_tier: String,
    pub background_timeout: Duration,
}

impl Default for VerifierSettings {
    fn default() -> Self {
        Self {
            quality_tier: "starter".to_string(),
            background_timeout: Duration::from_secs(30),
        }
    }
}

/// Completed verification run
#[derive(Debug, Clone, Serialize)]
pub struct VerificationReport {
    pub status: VerificationStatus,
    pub message: String,
    pub record: VerificationRecord,
    pub warnings: Vec<String>,
}

/// Result of a verification request
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum VerifyOutcome {
    /// No tier produced a sample for the pattern
    SampleNotFound { pattern_id: Uuid },
    /// Learned state produced no change to the prompt
    NoFixAvailable {
        generation_id: String,
        match_tier: Option<MatchTier>,
    },
    /// Regenerated, re-analysed and recorded
    Completed(VerificationReport),
}

impl VerifyOutcome {
    pub fn status(&self) -> Option<VerificationStatus> {
        match self {
            VerifyOutcome::SampleNotFound { .. } => None,
            VerifyOutcome::NoFixAvailable { .. } => Some(VerificationStatus::NoFixAvailable),
            VerifyOutcome::Completed(report) => Some(report.status),
        }
    }
}

fn verdict_message(
    status: VerificationStatus,
    original_type: Option<&str>,
    new_type: Option<&str>,
) -> String {
    let original = original_type.unwrap_or("unknown");
    let new = new_type.unwrap_or("unknown");
    match status {
        VerificationStatus::VerifiedFixed => {
            format!("Hallucination \"{}\" is fixed; no issues detected.", original)
        }
        VerificationStatus::StillBroken => {
            format!("Hallucination \"{}\" still occurs; the fix needs improvement.", original)
        }
        VerificationStatus::Improved => format!(
            "Original issue fixed but new issue \"{}\" appeared; overall alignment improved.",
            new
        ),
        VerificationStatus::DifferentIssue => format!(
            "Original \"{}\" fixed but new issue \"{}\" appeared.",
            original, new
        ),
        VerificationStatus::NoFixAvailable => "No learned fixes apply.".to_string(),
    }
}

/// Regenerate-and-reanalyse verification of learned fixes
pub struct FixVerifier {
    db: SqlitePool,
    vision: Arc<dyn VisionAnalyzer>,
    generator: Arc<dyn ImageGenerator>,
    background: Option<Arc<dyn BackgroundRemover>>,
    matcher: SampleMatcher,
    settings: VerifierSettings,
}

impl FixVerifier {
    pub fn new(
        db: SqlitePool,
        vision: Arc<dyn VisionAnalyzer>,
        generator: Arc<dyn ImageGenerator>,
        background: Option<Arc<dyn BackgroundRemover>>,
        settings: VerifierSettings,
    ) -> Self {
        Self {
            db,
            vision,
            generator,
            background,
            matcher: SampleMatcher::standard(),
            settings,
        }
    }

    /// Replace the sample lookup chain
    pub fn with_matcher(mut self, matcher: SampleMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Verify the candidate fix of a pattern
    pub async fn verify_pattern(&self, pattern_id: Uuid) -> Result<VerifyOutcome, VerifyError> {
        let pattern = db::patterns::get_pattern(&self.db, pattern_id)
            .await?
            .ok_or(VerifyError::PatternNotFound(pattern_id))?;

        self.verify_loaded_pattern(&pattern).await
    }

    /// Verify a pattern that is already loaded
    pub async fn verify_loaded_pattern(
        &self,
        pattern: &HallucinationPattern,
    ) -> Result<VerifyOutcome, VerifyError> {
        let sample = self
            .matcher
            .find(&self.db, &pattern.key, &pattern.hallucination_type)
            .await?;

        match sample {
            Some(sample) => self.run(sample, Some(pattern)).await,
            None => {
                tracing::info!(pattern_id = %pattern.id, "No representative sample for pattern");
                Ok(VerifyOutcome::SampleNotFound {
                    pattern_id: pattern.id,
                })
            }
        }
    }

    /// Verify the learned fixes against one specific defective generation
    pub async fn verify_generation(&self, generation_id: &str) -> Result<VerifyOutcome, VerifyError> {
        let generation = db::generations::get_generation(&self.db, generation_id)
            .await?
            .ok_or_else(|| VerifyError::GenerationNotFound(generation_id.to_string()))?;
        let analysis = db::analyses::get_analysis(&self.db, generation_id)
            .await?
            .ok_or_else(|| VerifyError::NotAnalysed(generation_id.to_string()))?;

        if !analysis.result.has_hallucination {
            return Err(VerifyError::NoHallucination(generation_id.to_string()));
        }

        let sample = Sample {
            generation,
            analysis: analysis.result,
            tier: None,
        };
        self.run(sample, None).await
    }

    async fn run(
        &self,
        sample: Sample,
        pattern: Option<&HallucinationPattern>,
    ) -> Result<VerifyOutcome, VerifyError> {
        let generation = &sample.generation;
        let base = build_prompt(
            &generation.prompt,
            &generation.key.category_id,
            &generation.key.subcategory_id,
            &generation.key.style_id,
        );
        let context = prompt_enhancer::load_context(&self.db, &generation.key, pattern).await?;
        let enhanced: EnhancedPrompt = prompt_enhancer::apply(&base, &generation.prompt, &context);

        if !enhanced.has_fixes() {
            tracing::info!(
                generation_id = %generation.id,
                pattern_id = ?pattern.map(|p| p.id),
                "No learned fixes apply"
            );
            return Ok(VerifyOutcome::NoFixAvailable {
                generation_id: generation.id.clone(),
                match_tier: sample.tier,
            });
        }

        let seed: u32 = rand::thread_rng().gen_range(0..MAX_SEED);
        let request = GenerationRequest {
            prompt: enhanced.prompt.clone(),
            negative_prompt: enhanced.negative.clone(),
            seed,
            steps: VERIFY_STEPS,
            guidance: VERIFY_GUIDANCE,
            width: VERIFY_SIZE,
            height: VERIFY_SIZE,
        };

        tracing::info!(
            generation_id = %generation.id,
            seed,
            fixes = ?enhanced.applied_fixes,
            "Regenerating with learned fixes"
        );

        let image_url = self
            .generator
            .generate(&request, &self.settings.quality_tier)
            .await?;
        let image_url = self.strip_background(image_url).await;

        let reanalysis = self
            .vision
            .analyze(&image_url, &generation.prompt, &generation.key)
            .await?;

        let original_type = sample.analysis.hallucination_type.clone();
        let delta = reanalysis.prompt_alignment - sample.analysis.prompt_alignment;
        let status = classify(
            original_type.as_deref(),
            reanalysis.has_hallucination,
            reanalysis.hallucination_type.as_deref(),
            delta,
        );
        let message = verdict_message(
            status,
            original_type.as_deref(),
            reanalysis.hallucination_type.as_deref(),
        );

        let record = VerificationRecord {
            id: Uuid::new_v4(),
            original_generation_id: generation.id.clone(),
            pattern_id: pattern.map(|p| p.id),
            key: pattern.map(|p| p.key.clone()).unwrap_or_else(|| generation.key.clone()),
            match_tier: sample.tier,
            verification_image_url: image_url,
            applied_fixes: enhanced.applied_fixes.clone(),
            original_hallucination_type: original_type.clone(),
            new_has_hallucination: reanalysis.has_hallucination,
            new_hallucination_type: reanalysis.hallucination_type.clone(),
            original_alignment: sample.analysis.prompt_alignment,
            new_alignment: reanalysis.prompt_alignment,
            status,
            message: message.clone(),
            created_at: sprite_common::time::now(),
        };

        let target = match pattern {
            Some(p) => Some(PatternTarget::One(p.id)),
            None => original_type.as_deref().map(|kind| PatternTarget::Matching {
                key: &generation.key,
                hallucination_type: kind,
            }),
        };

        let mut tx = begin_monitored(&self.db, "verify::record_verdict").await?;
        match status {
            VerificationStatus::VerifiedFixed => {
                if let Some(target) = target {
                    db::patterns::deactivate(tx.conn(), target).await?;
                }
                db::fix_sets::raise_confidence(tx.conn(), &record.key, VERIFIED_CONFIDENCE_STEP)
                    .await?;
            }
            VerificationStatus::StillBroken => {
                if let Some(target) = target {
                    let failed = db::patterns::prevention_clauses(tx.conn(), target).await?;
                    db::patterns::mark_still_broken(tx.conn(), target).await?;
                    forget_failed_fixes(tx.conn(), &record.key, &failed).await?;
                }
            }
            _ => {}
        }
        if let Some(target) = target {
            db::patterns::stamp_verification(tx.conn(), target, status).await?;
        }
        db::verifications::insert_record(tx.conn(), &record).await?;
        tx.commit().await?;

        tracing::info!(
            generation_id = %generation.id,
            pattern_id = ?record.pattern_id,
            status = status.as_str(),
            original_alignment = record.original_alignment,
            new_alignment = record.new_alignment,
            "Verification recorded"
        );

        Ok(VerifyOutcome::Completed(VerificationReport {
            status,
            message,
            record,
            warnings: enhanced.warnings,
        }))
    }

    async fn strip_background(&self, image_url: String) -> String {
        let Some(remover) = &self.background else {
            return image_url;
        };

        match tokio::time::timeout(
            self.settings.background_timeout,
            remover.remove_background(&image_url),
        )
        .await
        {
            Ok(Ok(clean_url)) => clean_url,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Background removal failed, using raw image");
                image_url
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.settings.background_timeout.as_millis() as u64,
                    "Background removal timed out, using raw image"
                );
                image_url
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_types() {
        let msg = verdict_message(
            VerificationStatus::DifferentIssue,
            Some("extra_element"),
            Some("style_mismatch"),
        );
        assert!(msg.contains("extra_element"));
        assert!(msg.contains("style_mismatch"));

        let msg = verdict_message(VerificationStatus::VerifiedFixed, None, None);
        assert!(msg.contains("unknown"));
    }

    #[test]
    fn test_outcome_status() {
        let outcome = VerifyOutcome::NoFixAvailable {
            generation_id: "g".to_string(),
            match_tier: Some(MatchTier::Exact),
        };
        assert_eq!(outcome.status(), Some(VerificationStatus::NoFixAvailable));
        let outcome = VerifyOutcome::SampleNotFound {
            pattern_id: Uuid::nil(),
        };
        assert_eq!(outcome.status(), None);
    }
}
