//! Representative-sample selection for fix verification
//!
//! An ordered chain of lookup tiers; the first tier that yields a sample
//! wins. Tiers are independent, so adding one means pushing another
//! `SampleLookup` onto the chain.

use async_trait::async_trait;
use sprite_common::Result;
use sqlx::SqlitePool;

use crate::db;
use crate::models::{AnalysisResult, AssetKey, Generation, MatchTier};

/// A generation to regenerate, with the analysis it is compared against
#[derive(Debug, Clone)]
pub struct Sample {
    pub generation: Generation,
    pub analysis: AnalysisResult,
    pub tier: Option<MatchTier>,
}

/// One tier of the chain
#[async_trait]
pub trait SampleLookup: Send + Sync {
    fn tier(&self) -> MatchTier;

    async fn find(
        &self,
        pool: &SqlitePool,
        key: &AssetKey,
        hallucination_type: &str,
    ) -> Result<Option<Sample>>;
}

/// Defective generations of the same type, with optional subcategory and
/// style constraints
struct DefectLookup {
    tier: MatchTier,
    same_subcategory: bool,
    same_style: bool,
}

#[async_trait]
impl SampleLookup for DefectLookup {
    fn tier(&self) -> MatchTier {
        self.tier
    }

    async fn find(
        &self,
        pool: &SqlitePool,
        key: &AssetKey,
        hallucination_type: &str,
    ) -> Result<Option<Sample>> {
        let generation_id = db::analyses::find_defect_sample(
            pool,
            hallucination_type,
            &key.category_id,
            self.same_subcategory.then_some(key.subcategory_id.as_str()),
            self.same_style.then_some(key.style_id.as_str()),
        )
        .await?;

        let Some(generation_id) = generation_id else {
            return Ok(None);
        };

        let generation = db::generations::get_generation(pool, &generation_id).await?;
        let analysis = db::analyses::get_analysis(pool, &generation_id).await?;

        Ok(match (generation, analysis) {
            (Some(generation), Some(analysis)) => Some(Sample {
                generation,
                analysis: analysis.result,
                tier: Some(self.tier),
            }),
            _ => None,
        })
    }
}

/// Any generation of the category/subcategory, compared against a
/// placeholder analysis (alignment 50, defect present)
struct FallbackLookup;

#[async_trait]
impl SampleLookup for FallbackLookup {
    fn tier(&self) -> MatchTier {
        MatchTier::Fallback
    }

    async fn find(
        &self,
        pool: &SqlitePool,
        key: &AssetKey,
        hallucination_type: &str,
    ) -> Result<Option<Sample>> {
        let generation =
            db::generations::latest_in_subcategory(pool, &key.category_id, &key.subcategory_id)
                .await?;

        Ok(generation.map(|generation| Sample {
            generation,
            analysis: AnalysisResult::synthetic(Some(hallucination_type.to_string())),
            tier: Some(MatchTier::Fallback),
        }))
    }
}

/// Chain of sample lookups
pub struct SampleMatcher {
    tiers: Vec<Box<dyn SampleLookup>>,
}

impl SampleMatcher {
    pub fn new(tiers: Vec<Box<dyn SampleLookup>>) -> Self {
        Self { tiers }
    }

    /// Exact, any style, any subcategory, then fallback
    pub fn standard() -> Self {
        Self::new(vec![
            Box::new(DefectLookup {
                tier: MatchTier::Exact,
                same_subcategory: true,
                same_style: true,
            }),
            Box::new(DefectLookup {
                tier: MatchTier::AnyStyle,
                same_subcategory: true,
                same_style: false,
            }),
            Box::new(DefectLookup {
                tier: MatchTier::Category,
                same_subcategory: false,
                same_style: false,
            }),
            Box::new(FallbackLookup),
        ])
    }

    /// First sample any tier finds
    pub async fn find(
        &self,
        pool: &SqlitePool,
        key: &AssetKey,
        hallucination_type: &str,
    ) -> Result<Option<Sample>> {
        for lookup in &self.tiers {
            if let Some(sample) = lookup.find(pool, key, hallucination_type).await? {
                tracing::debug!(
                    tier = lookup.tier().as_str(),
                    generation_id = %sample.generation.id,
                    "Found representative sample"
                );
                return Ok(Some(sample));
            }
        }
        Ok(None)
    }
}

impl Default for SampleMatcher {
    fn default() -> Self {
        Self::standard()
    }
}
