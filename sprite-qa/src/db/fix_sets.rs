//! Learned fix set persistence

use sprite_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use super::{decode_list, encode_list, parse_uuid};
use crate::models::{AssetKey, LearnedFixSet};

const FIX_SET_COLUMNS: &str = "id, category_id, subcategory_id, style_id, prompt_template, \
                               required_keywords, avoid_keywords, version, confidence_score, \
                               is_active, created_at, updated_at";

fn fix_set_from_row(row: &SqliteRow) -> Result<LearnedFixSet> {
    let id: String = row.try_get("id")?;
    let required: String = row.try_get("required_keywords")?;
    let avoid: String = row.try_get("avoid_keywords")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(LearnedFixSet {
        id: parse_uuid(&id)?,
        key: AssetKey {
            category_id: row.try_get("category_id")?,
            subcategory_id: row.try_get("subcategory_id")?,
            style_id: row.try_get("style_id")?,
        },
        prompt_template: row.try_get("prompt_template")?,
        required_keywords: decode_list(&required)?,
        avoid_keywords: decode_list(&avoid)?,
        version: row.try_get("version")?,
        confidence_score: row.try_get("confidence_score")?,
        is_active: row.try_get("is_active")?,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Load the fix set stored for exactly this key
pub async fn get_for_key(
    conn: &mut SqliteConnection,
    key: &AssetKey,
) -> Result<Option<LearnedFixSet>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM learned_fix_sets
        WHERE category_id = ? AND subcategory_id = ? AND style_id = ?
        "#,
        FIX_SET_COLUMNS
    ))
    .bind(&key.category_id)
    .bind(&key.subcategory_id)
    .bind(&key.style_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(fix_set_from_row).transpose()
}

/// Active fix set for a key, preferring the exact style and falling back
/// to the most confident set of any style in the same subcategory
pub async fn find_best(pool: &SqlitePool, key: &AssetKey) -> Result<Option<LearnedFixSet>> {
    let row = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM learned_fix_sets
        WHERE is_active = 1 AND category_id = ? AND subcategory_id = ?
        ORDER BY (style_id = ?) DESC, confidence_score DESC, updated_at DESC
        LIMIT 1
        "#,
        FIX_SET_COLUMNS
    ))
    .bind(&key.category_id)
    .bind(&key.subcategory_id)
    .bind(&key.style_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(fix_set_from_row).transpose()
}

/// Insert or overwrite the fix set for its key
pub async fn save(conn: &mut SqliteConnection, fix_set: &LearnedFixSet) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO learned_fix_sets (
            id, category_id, subcategory_id, style_id, prompt_template,
            required_keywords, avoid_keywords, version, confidence_score, is_active,
            created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(category_id, subcategory_id, style_id) DO UPDATE SET
            prompt_template = excluded.prompt_template,
            required_keywords = excluded.required_keywords,
            avoid_keywords = excluded.avoid_keywords,
            version = excluded.version,
            confidence_score = excluded.confidence_score,
            is_active = excluded.is_active,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(fix_set.id.to_string())
    .bind(&fix_set.key.category_id)
    .bind(&fix_set.key.subcategory_id)
    .bind(&fix_set.key.style_id)
    .bind(&fix_set.prompt_template)
    .bind(encode_list(&fix_set.required_keywords)?)
    .bind(encode_list(&fix_set.avoid_keywords)?)
    .bind(fix_set.version)
    .bind(fix_set.confidence_score)
    .bind(fix_set.is_active)
    .bind(time::to_db(fix_set.created_at))
    .bind(time::to_db(fix_set.updated_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Raise confidence for a key, capped at 100
pub async fn raise_confidence(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    amount: f64,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE learned_fix_sets
        SET confidence_score = MIN(100.0, confidence_score + ?), updated_at = ?
        WHERE category_id = ? AND subcategory_id = ? AND style_id = ?
        "#,
    )
    .bind(amount)
    .bind(time::now_db())
    .bind(&key.category_id)
    .bind(&key.subcategory_id)
    .bind(&key.style_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Drop learned keywords from every fix set
pub async fn clear_keywords(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE learned_fix_sets
        SET required_keywords = '[]', avoid_keywords = '[]', updated_at = ?
        WHERE required_keywords != '[]' OR avoid_keywords != '[]'
        "#,
    )
    .bind(time::now_db())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM learned_fix_sets")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
