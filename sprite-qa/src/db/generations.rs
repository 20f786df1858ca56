//! Generated artifact storage
//!
//! Rows are written by the upstream generation pipeline; this service only
//! reads them, except for `insert_generation` used by that collaborator.

use sprite_common::{time, Result};
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::models::{AssetKey, Generation};

fn generation_from_row(row: &SqliteRow) -> Result<Generation> {
    let created_at: String = row.try_get("created_at")?;
    Ok(Generation {
        id: row.try_get("id")?,
        prompt: row.try_get("prompt")?,
        key: AssetKey {
            category_id: row.try_get("category_id")?,
            subcategory_id: row.try_get("subcategory_id")?,
            style_id: row.try_get("style_id")?,
        },
        image_url: row.try_get("image_url")?,
        created_at: time::from_db(&created_at)?,
    })
}

/// Insert or replace a generation record
pub async fn insert_generation(pool: &SqlitePool, generation: &Generation) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO generations (id, prompt, category_id, subcategory_id, style_id, image_url, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            prompt = excluded.prompt,
            category_id = excluded.category_id,
            subcategory_id = excluded.subcategory_id,
            style_id = excluded.style_id,
            image_url = excluded.image_url
        "#,
    )
    .bind(&generation.id)
    .bind(&generation.prompt)
    .bind(&generation.key.category_id)
    .bind(&generation.key.subcategory_id)
    .bind(&generation.key.style_id)
    .bind(&generation.image_url)
    .bind(time::to_db(generation.created_at))
    .execute(pool)
    .await?;

    Ok(())
}

/// Load a generation by id
pub async fn get_generation(pool: &SqlitePool, id: &str) -> Result<Option<Generation>> {
    let row = sqlx::query(
        r#"
        SELECT id, prompt, category_id, subcategory_id, style_id, image_url, created_at
        FROM generations
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(generation_from_row).transpose()
}

/// Most recent generation of a category/subcategory, defects or not
pub async fn latest_in_subcategory(
    pool: &SqlitePool,
    category_id: &str,
    subcategory_id: &str,
) -> Result<Option<Generation>> {
    let row = sqlx::query(
        r#"
        SELECT id, prompt, category_id, subcategory_id, style_id, image_url, created_at
        FROM generations
        WHERE category_id = ? AND subcategory_id = ?
        ORDER BY created_at DESC, rowid DESC
        LIMIT 1
        "#,
    )
    .bind(category_id)
    .bind(subcategory_id)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(generation_from_row).transpose()
}
