//! Image analysis persistence (one row per generation)

use sprite_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqliteConnection, SqlitePool};
use uuid::Uuid;

use super::{decode_list, encode_list, parse_uuid};
use crate::models::{AnalysisResult, ImageAnalysis};

fn analysis_from_row(row: &SqliteRow) -> Result<ImageAnalysis> {
    let id: String = row.try_get("id")?;
    let raw: String = row.try_get("raw_analysis")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    let result = AnalysisResult {
        detected_objects: decode_list(&row.try_get::<String, _>("detected_objects")?)?,
        detected_style: row.try_get("detected_style")?,
        detected_colors: decode_list(&row.try_get::<String, _>("detected_colors")?)?,
        detected_mood: row.try_get("detected_mood")?,
        quality_score: row.try_get("quality_score")?,
        style_accuracy: row.try_get("style_accuracy")?,
        prompt_alignment: row.try_get("prompt_alignment")?,
        confidence: row.try_get("confidence_score")?,
        has_hallucination: row.try_get("has_hallucination")?,
        hallucination_type: row.try_get("hallucination_type")?,
        hallucination_details: row.try_get("hallucination_details")?,
        requested_elements: decode_list(&row.try_get::<String, _>("requested_elements")?)?,
        missing_elements: decode_list(&row.try_get::<String, _>("missing_elements")?)?,
        extra_elements: decode_list(&row.try_get::<String, _>("extra_elements")?)?,
        suggested_fix: row.try_get("suggested_fix")?,
        raw: serde_json::from_str(&raw)?,
    };

    Ok(ImageAnalysis {
        id: parse_uuid(&id)?,
        generation_id: row.try_get("generation_id")?,
        result,
        created_at: time::from_db(&created_at)?,
        updated_at: time::from_db(&updated_at)?,
    })
}

/// Insert or overwrite the analysis for a generation
///
/// Returns the id of the (single) row for that generation.
pub async fn upsert_analysis(
    conn: &mut SqliteConnection,
    generation_id: &str,
    result: &AnalysisResult,
) -> Result<Uuid> {
    let now = time::now_db();
    let new_id = Uuid::new_v4().to_string();

    let id: String = sqlx::query_scalar(
        r#"
        INSERT INTO image_analyses (
            id, generation_id, detected_objects, detected_style, detected_colors, detected_mood,
            quality_score, style_accuracy, prompt_alignment, confidence_score,
            has_hallucination, hallucination_type, hallucination_details,
            requested_elements, missing_elements, extra_elements, suggested_fix,
            raw_analysis, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(generation_id) DO UPDATE SET
            detected_objects = excluded.detected_objects,
            detected_style = excluded.detected_style,
            detected_colors = excluded.detected_colors,
            detected_mood = excluded.detected_mood,
            quality_score = excluded.quality_score,
            style_accuracy = excluded.style_accuracy,
            prompt_alignment = excluded.prompt_alignment,
            confidence_score = excluded.confidence_score,
            has_hallucination = excluded.has_hallucination,
            hallucination_type = excluded.hallucination_type,
            hallucination_details = excluded.hallucination_details,
            requested_elements = excluded.requested_elements,
            missing_elements = excluded.missing_elements,
            extra_elements = excluded.extra_elements,
            suggested_fix = excluded.suggested_fix,
            raw_analysis = excluded.raw_analysis,
            updated_at = excluded.updated_at
        RETURNING id
        "#,
    )
    .bind(&new_id)
    .bind(generation_id)
    .bind(encode_list(&result.detected_objects)?)
    .bind(&result.detected_style)
    .bind(encode_list(&result.detected_colors)?)
    .bind(&result.detected_mood)
    .bind(result.quality_score)
    .bind(result.style_accuracy)
    .bind(result.prompt_alignment)
    .bind(result.confidence)
    .bind(result.has_hallucination)
    .bind(&result.hallucination_type)
    .bind(&result.hallucination_details)
    .bind(encode_list(&result.requested_elements)?)
    .bind(encode_list(&result.missing_elements)?)
    .bind(encode_list(&result.extra_elements)?)
    .bind(&result.suggested_fix)
    .bind(serde_json::to_string(&result.raw)?)
    .bind(&now)
    .bind(&now)
    .fetch_one(&mut *conn)
    .await?;

    parse_uuid(&id)
}

/// Load the analysis for a generation
pub async fn get_analysis(pool: &SqlitePool, generation_id: &str) -> Result<Option<ImageAnalysis>> {
    let row = sqlx::query(
        r#"
        SELECT id, generation_id, detected_objects, detected_style, detected_colors, detected_mood,
               quality_score, style_accuracy, prompt_alignment, confidence_score,
               has_hallucination, hallucination_type, hallucination_details,
               requested_elements, missing_elements, extra_elements, suggested_fix,
               raw_analysis, created_at, updated_at
        FROM image_analyses
        WHERE generation_id = ?
        "#,
    )
    .bind(generation_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(analysis_from_row).transpose()
}

/// Most recent defective generation matching a type and a (partially
/// relaxed) asset key. `None` for subcategory or style matches any value.
pub async fn find_defect_sample(
    pool: &SqlitePool,
    hallucination_type: &str,
    category_id: &str,
    subcategory_id: Option<&str>,
    style_id: Option<&str>,
) -> Result<Option<String>> {
    let generation_id: Option<String> = sqlx::query_scalar(
        r#"
        SELECT a.generation_id
        FROM image_analyses a
        JOIN generations g ON g.id = a.generation_id
        WHERE a.has_hallucination = 1
          AND a.hallucination_type = ?
          AND g.category_id = ?
          AND (? IS NULL OR g.subcategory_id = ?)
          AND (? IS NULL OR g.style_id = ?)
        ORDER BY a.created_at DESC, a.rowid DESC
        LIMIT 1
        "#,
    )
    .bind(hallucination_type)
    .bind(category_id)
    .bind(subcategory_id)
    .bind(subcategory_id)
    .bind(style_id)
    .bind(style_id)
    .fetch_optional(pool)
    .await?;

    Ok(generation_id)
}

/// Mark defective analyses of a type as resolved, keeping the rows
pub async fn resolve_type(conn: &mut SqliteConnection, hallucination_type: &str) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE image_analyses
        SET has_hallucination = 0, hallucination_type = NULL, suggested_fix = NULL, updated_at = ?
        WHERE has_hallucination = 1 AND hallucination_type = ?
        "#,
    )
    .bind(time::now_db())
    .bind(hallucination_type)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Clear the hallucination flag on every analysis
pub async fn clear_all_flags(conn: &mut SqliteConnection) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE image_analyses
        SET has_hallucination = 0, hallucination_type = NULL, updated_at = ?
        WHERE has_hallucination = 1 OR hallucination_type IS NOT NULL
        "#,
    )
    .bind(time::now_db())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Aggregate figures over all stored analyses
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnalysisTotals {
    pub total: i64,
    pub with_hallucination: i64,
    pub avg_quality: f64,
    pub avg_alignment: f64,
}

pub async fn totals(pool: &SqlitePool) -> Result<AnalysisTotals> {
    let row = sqlx::query(
        r#"
        SELECT COUNT(*) AS total,
               COALESCE(SUM(has_hallucination), 0) AS with_hallucination,
               COALESCE(AVG(quality_score), 0.0) AS avg_quality,
               COALESCE(AVG(prompt_alignment), 0.0) AS avg_alignment
        FROM image_analyses
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(AnalysisTotals {
        total: row.try_get("total")?,
        with_hallucination: row.try_get("with_hallucination")?,
        avg_quality: row.try_get("avg_quality")?,
        avg_alignment: row.try_get("avg_alignment")?,
    })
}
