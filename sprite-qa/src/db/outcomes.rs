//! Prompt outcome aggregates

use sprite_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::parse_uuid;
use crate::models::{AssetKey, OutcomeClass, PromptOutcomePattern};

fn outcome_from_row(row: &SqliteRow) -> Result<PromptOutcomePattern> {
    let id: String = row.try_get("id")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(PromptOutcomePattern {
        id: parse_uuid(&id)?,
        key: AssetKey {
            category_id: row.try_get("category_id")?,
            subcategory_id: row.try_get("subcategory_id")?,
            style_id: row.try_get("style_id")?,
        },
        prompt_pattern: row.try_get("prompt_pattern")?,
        total_count: row.try_get("total_count")?,
        positive_count: row.try_get("positive_count")?,
        negative_count: row.try_get("negative_count")?,
        avg_alignment: row.try_get("avg_alignment")?,
        best_variant: row.try_get("best_variant")?,
        best_alignment: row.try_get("best_alignment")?,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Fold one analysed prompt into the aggregate for its shape
///
/// Single statement: the running mean, counters, and best variant are all
/// computed from the stored row, so concurrent writers never lose updates.
pub async fn upsert_outcome(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    prompt_pattern: &str,
    prompt: &str,
    alignment: f64,
    class: OutcomeClass,
) -> Result<()> {
    let now = time::now_db();
    let positive = i64::from(class == OutcomeClass::Positive);
    let negative = i64::from(class == OutcomeClass::Negative);

    sqlx::query(
        r#"
        INSERT INTO prompt_outcomes (
            id, category_id, subcategory_id, style_id, prompt_pattern,
            total_count, positive_count, negative_count, avg_alignment,
            best_variant, best_alignment, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, 1, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(category_id, subcategory_id, style_id, prompt_pattern) DO UPDATE SET
            avg_alignment = (avg_alignment * total_count + excluded.avg_alignment) / (total_count + 1),
            total_count = total_count + 1,
            positive_count = positive_count + excluded.positive_count,
            negative_count = negative_count + excluded.negative_count,
            best_variant = CASE
                WHEN best_variant IS NULL OR excluded.best_alignment > best_alignment
                THEN excluded.best_variant
                ELSE best_variant
            END,
            best_alignment = MAX(best_alignment, excluded.best_alignment),
            updated_at = excluded.updated_at
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&key.category_id)
    .bind(&key.subcategory_id)
    .bind(&key.style_id)
    .bind(prompt_pattern)
    .bind(positive)
    .bind(negative)
    .bind(alignment)
    .bind(prompt)
    .bind(alignment)
    .bind(&now)
    .bind(&now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Load the aggregate for one prompt shape
pub async fn get_outcome(
    pool: &SqlitePool,
    key: &AssetKey,
    prompt_pattern: &str,
) -> Result<Option<PromptOutcomePattern>> {
    let row = sqlx::query(
        r#"
        SELECT id, category_id, subcategory_id, style_id, prompt_pattern,
               total_count, positive_count, negative_count, avg_alignment,
               best_variant, best_alignment, created_at, updated_at
        FROM prompt_outcomes
        WHERE category_id = ? AND subcategory_id = ? AND style_id = ? AND prompt_pattern = ?
        "#,
    )
    .bind(&key.category_id)
    .bind(&key.subcategory_id)
    .bind(&key.style_id)
    .bind(prompt_pattern)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(outcome_from_row).transpose()
}

pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM prompt_outcomes")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
