//! Database access for sprite-qa
//!
//! Every table is created idempotently at startup. Per-entity modules take a
//! `&SqlitePool` for reads and a `&mut SqliteConnection` for writes that may
//! run inside a monitored transaction.

pub mod analyses;
pub mod fix_sets;
pub mod generations;
pub mod jobs;
pub mod outcomes;
pub mod patterns;
pub mod verifications;

use sprite_common::{Error, Result};
use sqlx::SqlitePool;
use uuid::Uuid;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS generations (
        id TEXT PRIMARY KEY,
        prompt TEXT NOT NULL,
        category_id TEXT NOT NULL,
        subcategory_id TEXT NOT NULL,
        style_id TEXT NOT NULL,
        image_url TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_generations_key ON generations (category_id, subcategory_id, style_id)",
    r#"
    CREATE TABLE IF NOT EXISTS analysis_jobs (
        id TEXT PRIMARY KEY,
        generation_id TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL DEFAULT 'pending'
            CHECK (status IN ('pending', 'processing', 'completed', 'failed')),
        priority INTEGER NOT NULL DEFAULT 0,
        retry_count INTEGER NOT NULL DEFAULT 0,
        error_message TEXT,
        created_at TEXT NOT NULL,
        started_at TEXT,
        completed_at TEXT,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_analysis_jobs_queue ON analysis_jobs (status, priority DESC, created_at)",
    r#"
    CREATE TABLE IF NOT EXISTS image_analyses (
        id TEXT PRIMARY KEY,
        generation_id TEXT NOT NULL UNIQUE,
        detected_objects TEXT NOT NULL DEFAULT '[]',
        detected_style TEXT NOT NULL,
        detected_colors TEXT NOT NULL DEFAULT '[]',
        detected_mood TEXT NOT NULL,
        quality_score REAL NOT NULL,
        style_accuracy REAL NOT NULL,
        prompt_alignment REAL NOT NULL,
        confidence_score REAL NOT NULL,
        has_hallucination INTEGER NOT NULL DEFAULT 0,
        hallucination_type TEXT,
        hallucination_details TEXT,
        requested_elements TEXT NOT NULL DEFAULT '[]',
        missing_elements TEXT NOT NULL DEFAULT '[]',
        extra_elements TEXT NOT NULL DEFAULT '[]',
        suggested_fix TEXT,
        raw_analysis TEXT NOT NULL DEFAULT 'null',
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_image_analyses_type ON image_analyses (has_hallucination, hallucination_type)",
    r#"
    CREATE TABLE IF NOT EXISTS hallucination_patterns (
        id TEXT PRIMARY KEY,
        category_id TEXT NOT NULL,
        subcategory_id TEXT NOT NULL,
        style_id TEXT NOT NULL,
        hallucination_type TEXT NOT NULL,
        trigger_keywords TEXT NOT NULL,
        occurrence_count INTEGER NOT NULL DEFAULT 1,
        prevention_prompt TEXT,
        is_active INTEGER NOT NULL DEFAULT 1,
        last_verification_status TEXT,
        last_verified_at TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (category_id, subcategory_id, style_id, hallucination_type, trigger_keywords)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS prompt_outcomes (
        id TEXT PRIMARY KEY,
        category_id TEXT NOT NULL,
        subcategory_id TEXT NOT NULL,
        style_id TEXT NOT NULL,
        prompt_pattern TEXT NOT NULL,
        total_count INTEGER NOT NULL DEFAULT 0,
        positive_count INTEGER NOT NULL DEFAULT 0,
        negative_count INTEGER NOT NULL DEFAULT 0,
        avg_alignment REAL NOT NULL DEFAULT 0,
        best_variant TEXT,
        best_alignment REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (category_id, subcategory_id, style_id, prompt_pattern)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS learned_fix_sets (
        id TEXT PRIMARY KEY,
        category_id TEXT NOT NULL,
        subcategory_id TEXT NOT NULL,
        style_id TEXT NOT NULL,
        prompt_template TEXT NOT NULL DEFAULT '',
        required_keywords TEXT NOT NULL DEFAULT '[]',
        avoid_keywords TEXT NOT NULL DEFAULT '[]',
        version INTEGER NOT NULL DEFAULT 1,
        confidence_score REAL NOT NULL DEFAULT 0,
        is_active INTEGER NOT NULL DEFAULT 1,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (category_id, subcategory_id, style_id)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS verification_records (
        id TEXT PRIMARY KEY,
        original_generation_id TEXT NOT NULL,
        pattern_id TEXT,
        category_id TEXT NOT NULL,
        subcategory_id TEXT NOT NULL,
        style_id TEXT NOT NULL,
        match_tier TEXT,
        verification_image_url TEXT NOT NULL,
        applied_fixes TEXT NOT NULL DEFAULT '[]',
        original_hallucination_type TEXT,
        new_has_hallucination INTEGER NOT NULL,
        new_hallucination_type TEXT,
        original_alignment REAL NOT NULL,
        new_alignment REAL NOT NULL,
        status TEXT NOT NULL,
        message TEXT NOT NULL,
        created_at TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_verification_records_status ON verification_records (status, created_at)",
    r#"
    CREATE TRIGGER IF NOT EXISTS verification_records_append_only
    BEFORE UPDATE ON verification_records
    BEGIN
        SELECT RAISE(ABORT, 'verification records are immutable');
    END
    "#,
];

/// Create sprite-qa tables if they don't exist
pub async fn init_tables(pool: &SqlitePool) -> Result<()> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }

    tracing::info!(
        "Database tables initialized (generations, analysis_jobs, image_analyses, \
         hallucination_patterns, prompt_outcomes, learned_fix_sets, verification_records)"
    );

    Ok(())
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid> {
    Uuid::parse_str(value)
        .map_err(|e| Error::Internal(format!("Invalid stored id '{}': {}", value, e)))
}

pub(crate) fn decode_list(value: &str) -> Result<Vec<String>> {
    Ok(serde_json::from_str(value)?)
}

pub(crate) fn encode_list(values: &[String]) -> Result<String> {
    Ok(serde_json::to_string(values)?)
}
