//! Generated artifacts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Category / subcategory / style triple that scopes all learned state
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub category_id: String,
    pub subcategory_id: String,
    pub style_id: String,
}

impl AssetKey {
    pub fn new(
        category_id: impl Into<String>,
        subcategory_id: impl Into<String>,
        style_id: impl Into<String>,
    ) -> Self {
        Self {
            category_id: category_id.into(),
            subcategory_id: subcategory_id.into(),
            style_id: style_id.into(),
        }
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.category_id, self.subcategory_id, self.style_id
        )
    }
}

/// A generated image and the request that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generation {
    pub id: String,
    pub prompt: String,
    #[serde(flatten)]
    pub key: AssetKey,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
}
