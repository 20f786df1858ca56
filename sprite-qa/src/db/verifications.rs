//! Verification record persistence (append-only)

use sprite_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};

use super::{decode_list, encode_list, parse_uuid};
use crate::models::{AssetKey, MatchTier, VerificationRecord, VerificationStatus};

const RECORD_COLUMNS: &str = "id, original_generation_id, pattern_id, category_id, subcategory_id, \
                              style_id, match_tier, verification_image_url, applied_fixes, \
                              original_hallucination_type, new_has_hallucination, \
                              new_hallucination_type, original_alignment, new_alignment, status, \
                              message, created_at";

fn record_from_row(row: &SqliteRow) -> Result<VerificationRecord> {
    let id: String = row.try_get("id")?;
    let pattern_id: Option<String> = row.try_get("pattern_id")?;
    let match_tier: Option<String> = row.try_get("match_tier")?;
    let applied: String = row.try_get("applied_fixes")?;
    let status: String = row.try_get("status")?;
    let created_at: String = row.try_get("created_at")?;

    Ok(VerificationRecord {
        id: parse_uuid(&id)?,
        original_generation_id: row.try_get("original_generation_id")?,
        pattern_id: pattern_id.as_deref().map(parse_uuid).transpose()?,
        key: AssetKey {
            category_id: row.try_get("category_id")?,
            subcategory_id: row.try_get("subcategory_id")?,
            style_id: row.try_get("style_id")?,
        },
        match_tier: match_tier.as_deref().map(MatchTier::parse).transpose()?,
        verification_image_url: row.try_get("verification_image_url")?,
        applied_fixes: decode_list(&applied)?,
        original_hallucination_type: row.try_get("original_hallucination_type")?,
        new_has_hallucination: row.try_get("new_has_hallucination")?,
        new_hallucination_type: row.try_get("new_hallucination_type")?,
        original_alignment: row.try_get("original_alignment")?,
        new_alignment: row.try_get("new_alignment")?,
        status: VerificationStatus::parse(&status)?,
        message: row.try_get("message")?,
        created_at: time::from_db(&created_at)?,
    })
}

/// Append a verification record
pub async fn insert_record(conn: &mut SqliteConnection, record: &VerificationRecord) -> Result<()> {
    sqlx::query(&format!(
        "INSERT INTO verification_records ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        RECORD_COLUMNS
    ))
    .bind(record.id.to_string())
    .bind(&record.original_generation_id)
    .bind(record.pattern_id.map(|id| id.to_string()))
    .bind(&record.key.category_id)
    .bind(&record.key.subcategory_id)
    .bind(&record.key.style_id)
    .bind(record.match_tier.map(|t| t.as_str()))
    .bind(&record.verification_image_url)
    .bind(encode_list(&record.applied_fixes)?)
    .bind(&record.original_hallucination_type)
    .bind(record.new_has_hallucination)
    .bind(&record.new_hallucination_type)
    .bind(record.original_alignment)
    .bind(record.new_alignment)
    .bind(record.status.as_str())
    .bind(&record.message)
    .bind(time::to_db(record.created_at))
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Number of records with a given status
pub async fn count_by_status(pool: &SqlitePool, status: VerificationStatus) -> Result<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM verification_records WHERE status = ?")
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Newest records first
pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<VerificationRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM verification_records ORDER BY created_at DESC, rowid DESC LIMIT ?",
        RECORD_COLUMNS
    ))
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Records for one pattern, oldest first
pub async fn list_for_pattern(
    pool: &SqlitePool,
    pattern_id: uuid::Uuid,
) -> Result<Vec<VerificationRecord>> {
    let rows = sqlx::query(&format!(
        "SELECT {} FROM verification_records WHERE pattern_id = ? ORDER BY created_at ASC, rowid ASC",
        RECORD_COLUMNS
    ))
    .bind(pattern_id.to_string())
    .fetch_all(pool)
    .await?;

    rows.iter().map(record_from_row).collect()
}

/// Distinct (type, key) pairs that have at least one VERIFIED_FIXED record
pub async fn verified_fixed_keys(conn: &mut SqliteConnection) -> Result<Vec<(String, AssetKey)>> {
    let rows = sqlx::query(
        r#"
        SELECT DISTINCT original_hallucination_type, category_id, subcategory_id, style_id
        FROM verification_records
        WHERE status = 'VERIFIED_FIXED' AND original_hallucination_type IS NOT NULL
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    rows.iter()
        .map(|row| -> Result<(String, AssetKey)> {
            Ok((
                row.try_get("original_hallucination_type")?,
                AssetKey {
                    category_id: row.try_get("category_id")?,
                    subcategory_id: row.try_get("subcategory_id")?,
                    style_id: row.try_get("style_id")?,
                },
            ))
        })
        .collect()
}

/// Delete records whose original defect was of a type
pub async fn delete_by_type(conn: &mut SqliteConnection, hallucination_type: &str) -> Result<u64> {
    let result =
        sqlx::query("DELETE FROM verification_records WHERE original_hallucination_type = ?")
            .bind(hallucination_type)
            .execute(&mut *conn)
            .await?;
    Ok(result.rows_affected())
}

pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM verification_records")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}
