//! Learned-fix prompt enhancement
//!
//! Applies what the tracker has learned for an asset key to a base prompt
//! pair: required keywords, avoid keywords, and short prevention clauses.
//! `apply` is pure; `load_context` gathers its inputs from the store.

use serde::Serialize;
use sprite_common::Result;
use sqlx::SqlitePool;

use super::keywords::{cap_words, contains_ignore_case, extract_fix_keywords, extract_from_list, word_count};
use super::prompt_builder::PromptPair;
use crate::db;
use crate::models::{AssetKey, HallucinationPattern, LearnedFixSet};

const MAX_REQUIRED_ADDED: usize = 5;
const MAX_AVOID_ADDED: usize = 15;
const MAX_PATTERN_FIXES: usize = 2;
const PATTERN_LOOKUP_LIMIT: i64 = 5;
const BROAD_MIN_OCCURRENCES: i64 = 3;
const MAX_PROMPT_WORDS: usize = 100;
const MAX_NEGATIVE_WORDS: usize = 60;

/// Everything learned for one asset key
#[derive(Debug, Clone, Default)]
pub struct LearnedContext {
    pub fix_set: Option<LearnedFixSet>,
    /// Candidate patterns in the order they should be tried
    pub patterns: Vec<HallucinationPattern>,
    /// Most frequent category-wide pattern, used when nothing else applied
    pub broad_pattern: Option<HallucinationPattern>,
}

/// Enhanced prompt pair and a description of each applied fix
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnhancedPrompt {
    pub prompt: String,
    pub negative: String,
    pub applied_fixes: Vec<String>,
    pub warnings: Vec<String>,
}

impl EnhancedPrompt {
    pub fn has_fixes(&self) -> bool {
        !self.applied_fixes.is_empty()
    }
}

/// Apply learned fixes to a base prompt pair
///
/// Word caps cut the base text, never an applied fix, so every entry in
/// `applied_fixes` is present in the returned prompt pair.
pub fn apply(base: &PromptPair, user_prompt: &str, ctx: &LearnedContext) -> EnhancedPrompt {
    let mut prompt_additions: Vec<String> = Vec::new();
    let mut negative_additions: Vec<String> = Vec::new();
    let mut applied_fixes = Vec::new();
    let mut warnings = Vec::new();

    if let Some(fix_set) = &ctx.fix_set {
        let to_add: Vec<String> = extract_from_list(&fix_set.required_keywords)
            .into_iter()
            .filter(|kw| kw.len() > 2 && !contains_ignore_case(&base.prompt, kw))
            .take(MAX_REQUIRED_ADDED)
            .collect();
        if !to_add.is_empty() {
            applied_fixes.push(format!("Added: {}", to_add.join(", ")));
            prompt_additions.extend(to_add);
        }

        let avoid: Vec<String> = fix_set
            .avoid_keywords
            .iter()
            .filter(|kw| !kw.is_empty() && word_count(kw) <= 3 && !contains_ignore_case(&base.negative, kw))
            .take(MAX_AVOID_ADDED)
            .cloned()
            .collect();
        if !avoid.is_empty() {
            applied_fixes.push(format!("Negative: +{} terms", avoid.len()));
            negative_additions.extend(avoid);
        }
    }

    let mut patterns_added = 0;
    for pattern in &ctx.patterns {
        if patterns_added >= MAX_PATTERN_FIXES {
            break;
        }

        if let Some(clause) = pattern.prevention_prompt.as_deref().map(str::trim) {
            let candidate = if word_count(clause) <= 5 {
                Some(clause.to_string())
            } else {
                extract_fix_keywords(clause).into_iter().next()
            };
            if let Some(fix) = candidate.filter(|f| !f.is_empty()) {
                if !already_present(&base.prompt, &prompt_additions, &fix) {
                    applied_fixes.push(format!("Fix: {}", fix));
                    prompt_additions.push(fix);
                    patterns_added += 1;
                }
            }
        }

        let user_lower = user_prompt.to_lowercase();
        if pattern
            .trigger_keywords
            .iter()
            .any(|t| t.len() > 3 && user_lower.contains(&t.to_lowercase()))
        {
            warnings.push(format!("Potential issue: {}", pattern.hallucination_type));
        }
    }

    if patterns_added == 0 {
        if let Some(clause) = ctx
            .broad_pattern
            .as_ref()
            .and_then(|p| p.prevention_prompt.as_deref())
            .map(str::trim)
        {
            if word_count(clause) <= 4 && !already_present(&base.prompt, &prompt_additions, clause) {
                applied_fixes.push(format!("Common fix: {}", clause));
                prompt_additions.push(clause.to_string());
            }
        }
    }

    EnhancedPrompt {
        prompt: compose(&base.prompt, &prompt_additions, MAX_PROMPT_WORDS),
        negative: compose(&base.negative, &negative_additions, MAX_NEGATIVE_WORDS),
        applied_fixes,
        warnings,
    }
}

fn already_present(base: &str, additions: &[String], fix: &str) -> bool {
    contains_ignore_case(base, fix) || additions.iter().any(|a| contains_ignore_case(a, fix))
}

/// Join `additions` onto `base`, cutting only the base to stay within `max`
fn compose(base: &str, additions: &[String], max: usize) -> String {
    let reserved: usize = additions.iter().map(|a| word_count(a)).sum();
    let base = cap_words(base, max.saturating_sub(reserved));

    std::iter::once(base)
        .filter(|b| !b.trim().is_empty())
        .chain(additions.iter().cloned())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Gather the learned context for a key
///
/// `focus` (the pattern being verified) is tried before the others when it
/// still carries a prevention clause.
pub async fn load_context(
    pool: &SqlitePool,
    key: &AssetKey,
    focus: Option<&HallucinationPattern>,
) -> Result<LearnedContext> {
    let fix_set = db::fix_sets::find_best(pool, key).await?;

    let mut patterns = db::patterns::list_fixable(
        pool,
        &key.category_id,
        Some(&key.subcategory_id),
        Some(&key.style_id),
        PATTERN_LOOKUP_LIMIT,
    )
    .await?;
    if patterns.is_empty() {
        patterns = db::patterns::list_fixable(
            pool,
            &key.category_id,
            Some(&key.subcategory_id),
            None,
            PATTERN_LOOKUP_LIMIT,
        )
        .await?;
    }

    if let Some(focus) = focus.filter(|p| p.prevention_prompt.is_some()) {
        patterns.retain(|p| p.id != focus.id);
        patterns.insert(0, focus.clone());
        patterns.truncate(PATTERN_LOOKUP_LIMIT as usize);
    }

    let broad_pattern = db::patterns::list_batch_candidates(
        pool,
        BROAD_MIN_OCCURRENCES,
        Some(&key.category_id),
        1,
    )
    .await?
    .into_iter()
    .next();

    tracing::debug!(
        key = %key,
        has_fix_set = fix_set.is_some(),
        patterns = patterns.len(),
        has_broad = broad_pattern.is_some(),
        "Loaded learned context"
    );

    Ok(LearnedContext {
        fix_set,
        patterns,
        broad_pattern,
    })
}
