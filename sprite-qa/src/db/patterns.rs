//! Hallucination pattern persistence

use sprite_common::{time, Result};
use sqlx::query::Query;
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{decode_list, encode_list, parse_uuid};
use crate::models::{AssetKey, HallucinationPattern, VerificationStatus};

const PATTERN_COLUMNS: &str = "id, category_id, subcategory_id, style_id, hallucination_type, \
                               trigger_keywords, occurrence_count, prevention_prompt, is_active, \
                               last_verification_status, last_verified_at, created_at, updated_at";

fn pattern_from_row(row: &SqliteRow) -> Result<HallucinationPattern> {
    let id: String = row.try_get("id")?;
    let keywords: String = row.try_get("trigger_keywords")?;
    let last_status: Option<String> = row.try_get("last_verification_status")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(HallucinationPattern {
        id: parse_uuid(&id)?,
        key: AssetKey {
            category_id: row.try_get("category_id")?,
            subcategory_id: row.try_get("subcategory_id")?,
            style_id: row.try_get("style_id")?,
        },
        hallucination_type: row.try_get("hallucination_type")?,
        trigger_keywords: decode_list(&keywords)?,
        occurrence_count: row.try_get("occurrence_count")?,
        prevention_prompt: row.try_get("prevention_prompt")?,
        is_active: row.try_get("is_active")?,
        last_verification_status: last_status
            .as_deref()
            .map(VerificationStatus::parse)
            .transpose()?,
        last_verified_at: time::from_db_opt(row.try_get("last_verified_at")?)?,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Insert a new pattern or count one more occurrence of an existing one
///
/// The prevention prompt is only written when the stored one is NULL.
/// Returns the pattern id and its occurrence count after the write.
pub async fn upsert_occurrence(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    hallucination_type: &str,
    trigger_keywords: &[String],
    prevention_prompt: Option<&str>,
) -> Result<(Uuid, i64)> {
    let now = time::now_db();

    let row = sqlx::query(
        r#"
        INSERT INTO hallucination_patterns (
            id, category_id, subcategory_id, style_id, hallucination_type, trigger_keywords,
            occurrence_count, prevention_prompt, is_active, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, 1, ?, 1, ?, ?)
        ON CONFLICT(category_id, subcategory_id, style_id, hallucination_type, trigger_keywords)
        DO UPDATE SET
            occurrence_count = occurrence_count + 1,
            prevention_prompt = COALESCE(prevention_prompt, excluded.prevention_prompt),
            updated_at = excluded.updated_at
        RETURNING id, occurrence_count
        "#,
    )
    .bind(Uuid::new_v4().to_string())
    .bind(&key.category_id)
    .bind(&key.subcategory_id)
    .bind(&key.style_id)
    .bind(hallucination_type)
    .bind(encode_list(trigger_keywords)?)
    .bind(prevention_prompt)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    let id: String = row.try_get("id")?;
    Ok((parse_uuid(&id)?, row.try_get("occurrence_count")?))
}

/// Load a pattern by id
pub async fn get_pattern(pool: &SqlitePool, id: Uuid) -> Result<Option<HallucinationPattern>> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM hallucination_patterns WHERE id = ?",
        PATTERN_COLUMNS
    ))
    .bind(id.to_string())
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(pattern_from_row).transpose()
}

/// Active patterns with a prevention prompt for a category/subcategory,
/// optionally restricted to one style, most frequent first
pub async fn list_fixable(
    pool: &SqlitePool,
    category_id: &str,
    subcategory_id: Option<&str>,
    style_id: Option<&str>,
    limit: i64,
) -> Result<Vec<HallucinationPattern>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM hallucination_patterns
        WHERE is_active = 1
          AND prevention_prompt IS NOT NULL
          AND category_id = ?
          AND (? IS NULL OR subcategory_id = ?)
          AND (? IS NULL OR style_id = ?)
        ORDER BY occurrence_count DESC, created_at ASC
        LIMIT ?
        "#,
        PATTERN_COLUMNS
    ))
    .bind(category_id)
    .bind(subcategory_id)
    .bind(subcategory_id)
    .bind(style_id)
    .bind(style_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(pattern_from_row).collect()
}

/// Batch candidates: active, with a prevention prompt, at least
/// `min_occurrences`, highest occurrence first
pub async fn list_batch_candidates(
    pool: &SqlitePool,
    min_occurrences: i64,
    category_id: Option<&str>,
    limit: i64,
) -> Result<Vec<HallucinationPattern>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT {}
        FROM hallucination_patterns
        WHERE is_active = 1
          AND prevention_prompt IS NOT NULL
          AND occurrence_count >= ?
          AND (? IS NULL OR category_id = ?)
        ORDER BY occurrence_count DESC, created_at ASC
        LIMIT ?
        "#,
        PATTERN_COLUMNS
    ))
    .bind(min_occurrences)
    .bind(category_id)
    .bind(category_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(pattern_from_row).collect()
}

/// Which pattern rows a verification outcome applies to
#[derive(Debug, Clone, Copy)]
pub enum PatternTarget<'a> {
    /// A single pattern by id
    One(Uuid),
    /// Every pattern of a type for an asset key
    Matching {
        key: &'a AssetKey,
        hallucination_type: &'a str,
    },
}

impl PatternTarget<'_> {
    fn clause(&self) -> &'static str {
        match self {
            PatternTarget::One(_) => "id = ?",
            PatternTarget::Matching { .. } => {
                "category_id = ? AND subcategory_id = ? AND style_id = ? AND hallucination_type = ?"
            }
        }
    }
}

fn bind_target<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    target: PatternTarget<'_>,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match target {
        PatternTarget::One(id) => query.bind(id.to_string()),
        PatternTarget::Matching {
            key,
            hallucination_type,
        } => query
            .bind(key.category_id.clone())
            .bind(key.subcategory_id.clone())
            .bind(key.style_id.clone())
            .bind(hallucination_type.to_string()),
    }
}

/// Deactivate the targeted patterns
pub async fn deactivate(conn: &mut SqliteConnection, target: PatternTarget<'_>) -> Result<u64> {
    let sql = format!(
        "UPDATE hallucination_patterns SET is_active = 0, updated_at = ? WHERE is_active = 1 AND {}",
        target.clause()
    );
    let result = bind_target(sqlx::query(&sql).bind(time::now_db()), target)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Prevention clauses currently carried by the targeted patterns
pub async fn prevention_clauses(
    conn: &mut SqliteConnection,
    target: PatternTarget<'_>,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT DISTINCT prevention_prompt FROM hallucination_patterns WHERE prevention_prompt IS NOT NULL AND {}",
        target.clause()
    );
    let rows = bind_target(sqlx::query(&sql), target)
        .fetch_all(&mut *conn)
        .await?;

    let mut clauses = Vec::with_capacity(rows.len());
    for row in &rows {
        clauses.push(row.try_get::<String, _>("prevention_prompt")?);
    }
    Ok(clauses)
}

/// Count a failed fix as another occurrence and drop the fix
pub async fn mark_still_broken(
    conn: &mut SqliteConnection,
    target: PatternTarget<'_>,
) -> Result<u64> {
    let sql = format!(
        r#"
        UPDATE hallucination_patterns
        SET occurrence_count = occurrence_count + 1,
            prevention_prompt = NULL,
            updated_at = ?
        WHERE {}
        "#,
        target.clause()
    );
    let result = bind_target(sqlx::query(&sql).bind(time::now_db()), target)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Remember the latest verification verdict on the targeted patterns
pub async fn stamp_verification(
    conn: &mut SqliteConnection,
    target: PatternTarget<'_>,
    status: VerificationStatus,
) -> Result<u64> {
    let now = time::now_db();
    let sql = format!(
        r#"
        UPDATE hallucination_patterns
        SET last_verification_status = ?, last_verified_at = ?, updated_at = ?
        WHERE {}
        "#,
        target.clause()
    );
    let result = bind_target(
        sqlx::query(&sql)
            .bind(status.as_str())
            .bind(now.clone())
            .bind(now),
        target,
    )
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Delete inactive patterns of a type for one asset key
pub async fn delete_inactive_matching(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    hallucination_type: &str,
) -> Result<u64> {
    let target = PatternTarget::Matching {
        key,
        hallucination_type,
    };
    let sql = format!(
        "DELETE FROM hallucination_patterns WHERE is_active = 0 AND {}",
        target.clause()
    );
    let result = bind_target(sqlx::query(&sql), target)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every inactive pattern
pub async fn delete_inactive(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM hallucination_patterns WHERE is_active = 0")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete every pattern of a type, active or not
pub async fn delete_by_type(conn: &mut SqliteConnection, hallucination_type: &str) -> Result<u64> {
    let result = sqlx::query("DELETE FROM hallucination_patterns WHERE hallucination_type = ?")
        .bind(hallucination_type)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

pub async fn delete_all(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query("DELETE FROM hallucination_patterns")
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Pattern counts for reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatternCounts {
    pub total: i64,
    pub active: i64,
    /// Active with a candidate fix
    pub pending_verification: i64,
}

pub async fn counts(pool: &SqlitePool) -> Result<PatternCounts> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(is_active), 0) AS active,
               COALESCE(SUM(CASE WHEN is_active = 1 AND prevention_prompt IS NOT NULL
                                 THEN 1 ELSE 0 END), 0) AS pending_verification
        FROM hallucination_patterns
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(PatternCounts {
        total: row.try_get("total")?,
        active: row.try_get("active")?,
        pending_verification: row.try_get("pending_verification")?,
    })
}

/// Hallucination types by summed occurrence count, most frequent first
pub async fn top_types(pool: &SqlitePool, limit: i64) -> Result<Vec<(String, i64)>> {
    let rows = sqlx::query(
        r#"
        SELECT hallucination_type, SUM(occurrence_count) AS occurrences
        FROM hallucination_patterns
        GROUP BY hallucination_type
        ORDER BY occurrences DESC, hallucination_type ASC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| -> Result<(String, i64)> {
            Ok((row.try_get("hallucination_type")?, row.try_get("occurrences")?))
        })
        .collect()
}
