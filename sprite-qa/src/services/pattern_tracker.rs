//! Hallucination pattern tracker
//!
//! Deduplicates recurring defects by exact compound key:
//! (category, subcategory, style, type, trigger keyword set).

use sprite_common::Result;
use sqlx::SqliteConnection;
use uuid::Uuid;

use super::keywords::trigger_keywords;
use crate::db;
use crate::models::AssetKey;

/// Pattern id and occurrence count after recording
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedPattern {
    pub id: Uuid,
    pub occurrence_count: i64,
}

impl TrackedPattern {
    pub fn is_new(&self) -> bool {
        self.occurrence_count == 1
    }
}

/// Record one detected hallucination for a prompt
///
/// `prevention_prompt` only fills an empty slot; it never replaces a fix
/// that is already stored.
pub async fn record_occurrence(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    prompt: &str,
    hallucination_type: &str,
    prevention_prompt: Option<&str>,
) -> Result<TrackedPattern> {
    let keywords = trigger_keywords(prompt);
    let (id, occurrence_count) = db::patterns::upsert_occurrence(
        conn,
        key,
        hallucination_type,
        &keywords,
        prevention_prompt,
    )
    .await?;

    if occurrence_count == 1 {
        tracing::info!(
            pattern_id = %id,
            key = %key,
            hallucination_type,
            "Created hallucination pattern"
        );
    } else {
        tracing::debug!(
            pattern_id = %id,
            occurrence_count,
            hallucination_type,
            "Hallucination pattern recurred"
        );
    }

    Ok(TrackedPattern {
        id,
        occurrence_count,
    })
}
