//! Test Helper Utilities
//!
//! Temporary databases, seed data, and scripted stand-ins for the vision,
//! generation and background-removal services.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

use sprite_qa::models::{AnalysisResult, AssetKey, Generation};
use sprite_qa::services::{
    BackgroundError, BackgroundRemover, FixVerifier, GenerationError, GenerationRequest,
    ImageGenerator, VerifierSettings, VisionAnalyzer, VisionError,
};

/// Create a temporary database with all tables
///
/// TempDir must be kept alive for the duration of the test.
pub async fn create_test_db() -> (TempDir, SqlitePool) {
    let temp_dir = TempDir::new().expect("temp dir");
    let pool = sprite_common::db::init_database(&temp_dir.path().join("test_qa.db"), 4)
        .await
        .expect("open test database");
    sprite_qa::db::init_tables(&pool).await.expect("init tables");
    (temp_dir, pool)
}

pub fn sword_key() -> AssetKey {
    AssetKey::new("WEAPONS", "SWORDS", "PIXEL_ART_16")
}

pub async fn seed_generation(pool: &SqlitePool, id: &str, prompt: &str, key: &AssetKey) -> Generation {
    let generation = Generation {
        id: id.to_string(),
        prompt: prompt.to_string(),
        key: key.clone(),
        image_url: format!("https://img.test/{}.png", id),
        created_at: Utc::now(),
    };
    sprite_qa::db::generations::insert_generation(pool, &generation)
        .await
        .expect("insert generation");
    generation
}

pub fn clean_result(alignment: f64) -> AnalysisResult {
    AnalysisResult {
        detected_objects: vec!["sword".to_string()],
        detected_style: "pixel art".to_string(),
        detected_colors: vec!["silver".to_string()],
        detected_mood: "neutral".to_string(),
        quality_score: 80.0,
        style_accuracy: 80.0,
        prompt_alignment: alignment,
        confidence: 90.0,
        has_hallucination: false,
        hallucination_type: None,
        hallucination_details: None,
        requested_elements: vec!["sword".to_string()],
        missing_elements: Vec::new(),
        extra_elements: Vec::new(),
        suggested_fix: None,
        raw: serde_json::json!({}),
    }
}

pub fn defect_result(kind: &str, alignment: f64) -> AnalysisResult {
    AnalysisResult {
        has_hallucination: true,
        hallucination_type: Some(kind.to_string()),
        hallucination_details: Some("scabbard drawn next to the blade".to_string()),
        extra_elements: vec!["scabbard".to_string()],
        suggested_fix: Some("no scabbard".to_string()),
        ..clean_result(alignment)
    }
}

pub async fn seed_analysis(pool: &SqlitePool, generation_id: &str, result: &AnalysisResult) {
    let mut conn = pool.acquire().await.expect("acquire");
    sprite_qa::db::analyses::upsert_analysis(&mut conn, generation_id, result)
        .await
        .expect("upsert analysis");
}

/// Insert a pattern with a given occurrence count and prevention clause
pub async fn seed_pattern(
    pool: &SqlitePool,
    key: &AssetKey,
    kind: &str,
    prompt: &str,
    occurrences: i64,
    prevention: Option<&str>,
) -> Uuid {
    let mut conn = pool.acquire().await.expect("acquire");
    let tracked = sprite_qa::services::pattern_tracker::record_occurrence(
        &mut conn, key, prompt, kind, prevention,
    )
    .await
    .expect("record occurrence");
    drop(conn);

    sqlx::query("UPDATE hallucination_patterns SET occurrence_count = ? WHERE id = ?")
        .bind(occurrences)
        .bind(tracked.id.to_string())
        .execute(pool)
        .await
        .expect("set occurrence count");
    tracked.id
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", table))
        .fetch_one(pool)
        .await
        .expect("count rows")
}

/// Vision analyzer that replays a fixed script of responses
pub struct ScriptedVision {
    responses: Mutex<VecDeque<Result<AnalysisResult, VisionError>>>,
    calls: AtomicUsize,
}

impl ScriptedVision {
    pub fn new(responses: Vec<Result<AnalysisResult, VisionError>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VisionAnalyzer for ScriptedVision {
    async fn analyze(
        &self,
        _image_url: &str,
        _prompt: &str,
        _key: &AssetKey,
    ) -> Result<AnalysisResult, VisionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(VisionError::Network("script exhausted".to_string())))
    }
}

/// Analyzer that never answers in time
pub struct HangingVision;

#[async_trait]
impl VisionAnalyzer for HangingVision {
    async fn analyze(
        &self,
        _image_url: &str,
        _prompt: &str,
        _key: &AssetKey,
    ) -> Result<AnalysisResult, VisionError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Err(VisionError::Timeout("hung".to_string()))
    }
}

/// Generator that records requests and returns a fresh URL, or always fails
pub struct FakeGenerator {
    fail: bool,
    pub requests: Mutex<Vec<GenerationRequest>>,
}

impl FakeGenerator {
    pub fn working() -> Arc<Self> {
        Arc::new(Self {
            fail: false,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            fail: true,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ImageGenerator for FakeGenerator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        _quality_tier: &str,
    ) -> Result<String, GenerationError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        if self.fail {
            return Err(GenerationError::Failed("no images returned".to_string()));
        }
        Ok(format!("https://img.test/verify-{}.png", requests.len()))
    }
}

/// Background remover behaviours
pub enum FakeBackground {
    Working,
    Failing,
    Hanging,
}

#[async_trait]
impl BackgroundRemover for FakeBackground {
    async fn remove_background(&self, image_url: &str) -> Result<String, BackgroundError> {
        match self {
            FakeBackground::Working => Ok(format!("{}?nobg", image_url)),
            FakeBackground::Failing => Err(BackgroundError::Failed),
            FakeBackground::Hanging => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(image_url.to_string())
            }
        }
    }
}

pub fn build_verifier(
    pool: &SqlitePool,
    vision: Arc<ScriptedVision>,
    generator: Arc<FakeGenerator>,
    background: Option<FakeBackground>,
) -> FixVerifier {
    FixVerifier::new(
        pool.clone(),
        vision,
        generator,
        background.map(|b| Arc::new(b) as Arc<dyn BackgroundRemover>),
        VerifierSettings {
            quality_tier: "starter".to_string(),
            background_timeout: Duration::from_millis(100),
        },
    )
}
