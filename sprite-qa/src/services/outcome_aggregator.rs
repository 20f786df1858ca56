//! Prompt outcome aggregator
//!
//! Rolls every completed analysis into per-prompt-shape statistics,
//! independent of any specific defect.

use sprite_common::Result;
use sqlx::SqliteConnection;

use super::keywords::prompt_shape;
use crate::db;
use crate::models::{AnalysisResult, AssetKey, OutcomeClass};

/// Fold one analysis into the aggregate for its prompt shape
pub async fn record_outcome(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    prompt: &str,
    result: &AnalysisResult,
) -> Result<OutcomeClass> {
    let shape = prompt_shape(prompt);
    let class = OutcomeClass::classify(result.prompt_alignment, result.has_hallucination);

    db::outcomes::upsert_outcome(conn, key, &shape, prompt, result.prompt_alignment, class).await?;

    tracing::debug!(key = %key, shape = %shape, ?class, "Recorded prompt outcome");
    Ok(class)
}
