//! Learned fix sets
//!
//! Each detected hallucination feeds keywords into the fix set of its asset
//! key: missing elements become required, unwanted elements become avoided,
//! and the derived prevention clause joins the required list and template.

use sprite_common::{time, Result};
use sqlx::SqliteConnection;
use uuid::Uuid;

use crate::db;
use crate::models::{hallucination_type, AssetKey, LearnedFixSet};

pub const DEFAULT_TEMPLATE: &str =
    "{subject}, single game asset, centered composition, transparent background";

/// Confidence gained per verified fix
pub const VERIFIED_CONFIDENCE_STEP: f64 = 5.0;

const STYLE_REQUIREMENT: &str = "strict style adherence";

/// Append new, non-empty, not-yet-present items; true if anything was added
fn merge_into(target: &mut Vec<String>, items: &[String]) -> bool {
    let mut added = false;
    for item in items {
        let item = item.trim();
        if !item.is_empty() && !target.iter().any(|t| t == item) {
            target.push(item.to_string());
            added = true;
        }
    }
    added
}

/// Merge one observation into a fix set. Returns true if the set changed.
pub fn merge_observation(
    fix_set: &mut LearnedFixSet,
    kind: &str,
    prevention_clause: Option<&str>,
    missing_elements: &[String],
    extra_elements: &[String],
) -> bool {
    let mut required: Vec<String> = Vec::new();
    let mut avoid: Vec<String> = Vec::new();

    match kind {
        hallucination_type::MISSING_ELEMENT => required.extend(missing_elements.iter().cloned()),
        hallucination_type::WRONG_ELEMENT | hallucination_type::EXTRA_ELEMENT => {
            avoid.extend(extra_elements.iter().cloned())
        }
        hallucination_type::STYLE_MISMATCH => required.push(STYLE_REQUIREMENT.to_string()),
        _ => {}
    }
    if let Some(clause) = prevention_clause {
        required.push(clause.to_string());
    }

    let added_required = merge_into(&mut fix_set.required_keywords, &required);
    let added_avoid = merge_into(&mut fix_set.avoid_keywords, &avoid);
    if !added_required && !added_avoid {
        return false;
    }

    if let Some(clause) = prevention_clause.map(str::trim).filter(|c| !c.is_empty()) {
        if !fix_set.prompt_template.contains(clause) {
            fix_set.prompt_template = format!("{}, {}", fix_set.prompt_template, clause);
        }
    }
    fix_set.version += 1;
    fix_set.updated_at = time::now();
    true
}

fn remove_clause(fix_set: &mut LearnedFixSet, clause: &str) -> bool {
    let clause = clause.trim();
    if clause.is_empty() {
        return false;
    }
    let keep = |item: &String| !item.trim().eq_ignore_ascii_case(clause);

    let before = fix_set.required_keywords.len() + fix_set.avoid_keywords.len();
    fix_set.required_keywords.retain(keep);
    fix_set.avoid_keywords.retain(keep);
    let removed = before != fix_set.required_keywords.len() + fix_set.avoid_keywords.len();

    let suffix = format!(", {}", clause).to_ascii_lowercase();
    let at = fix_set.prompt_template.to_ascii_lowercase().find(&suffix);
    if let Some(at) = at {
        fix_set.prompt_template.replace_range(at..at + suffix.len(), "");
    }
    removed || at.is_some()
}

/// Remove clauses that failed verification from a fix set
///
/// Matching is case-insensitive on trimmed text. The version moves once
/// when anything was removed. Returns true if the set changed.
pub fn forget_clauses(fix_set: &mut LearnedFixSet, clauses: &[String]) -> bool {
    let mut changed = false;
    for clause in clauses {
        changed |= remove_clause(fix_set, clause);
    }
    if changed {
        fix_set.version += 1;
        fix_set.updated_at = time::now();
    }
    changed
}

/// Drop clauses that just failed verification from the fix set for a key
///
/// Returns the new version when anything was removed.
pub async fn forget_failed_fixes(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    clauses: &[String],
) -> Result<Option<i64>> {
    let Some(mut fix_set) = db::fix_sets::get_for_key(conn, key).await? else {
        return Ok(None);
    };
    if !forget_clauses(&mut fix_set, clauses) {
        return Ok(None);
    }

    db::fix_sets::save(conn, &fix_set).await?;
    tracing::info!(
        key = %key,
        version = fix_set.version,
        forgotten = ?clauses,
        "Failed fix removed from fix set"
    );
    Ok(Some(fix_set.version))
}

/// Update the fix set for a key after a detected hallucination
///
/// Returns the new version when something was learned.
pub async fn learn_from_observation(
    conn: &mut SqliteConnection,
    key: &AssetKey,
    kind: &str,
    prevention_clause: Option<&str>,
    missing_elements: &[String],
    extra_elements: &[String],
) -> Result<Option<i64>> {
    let now = time::now();
    let mut fix_set = match db::fix_sets::get_for_key(conn, key).await? {
        Some(existing) => existing,
        None => LearnedFixSet {
            id: Uuid::new_v4(),
            key: key.clone(),
            prompt_template: DEFAULT_TEMPLATE.to_string(),
            required_keywords: Vec::new(),
            avoid_keywords: Vec::new(),
            version: 0,
            confidence_score: 0.0,
            is_active: true,
            created_at: now,
            updated_at: now,
        },
    };

    if !merge_observation(
        &mut fix_set,
        kind,
        prevention_clause,
        missing_elements,
        extra_elements,
    ) {
        return Ok(None);
    }

    db::fix_sets::save(conn, &fix_set).await?;

    tracing::info!(
        key = %key,
        version = fix_set.version,
        required = fix_set.required_keywords.len(),
        avoid = fix_set.avoid_keywords.len(),
        "Learned fix set updated"
    );

    Ok(Some(fix_set.version))
}
