//! Prompt text helpers
//!
//! Tokenisation used for pattern keys and prompt shapes, plus extraction of
//! short, usable keywords from free-form fix suggestions.

use crate::models::hallucination_type;

/// Maximum trigger keywords kept per pattern
pub const MAX_TRIGGER_KEYWORDS: usize = 10;
/// Maximum tokens in a canonical prompt shape
pub const MAX_SHAPE_TOKENS: usize = 10;
/// Longest prevention clause, in words
pub const MAX_CLAUSE_WORDS: usize = 5;

/// Lowercase, keep ASCII letters/digits and whitespace, split on whitespace
fn tokens(prompt: &str) -> Vec<String> {
    let cleaned: String = prompt
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// Trigger keyword set: distinct tokens longer than 3 chars, in prompt
/// order, capped at 10
pub fn trigger_keywords(prompt: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for token in tokens(prompt) {
        if token.len() > 3 && !keywords.contains(&token) {
            keywords.push(token);
            if keywords.len() == MAX_TRIGGER_KEYWORDS {
                break;
            }
        }
    }
    keywords
}

/// Canonical prompt shape: tokens longer than 2 chars, sorted, first 10,
/// space-joined. Word-order variants share a shape.
pub fn prompt_shape(prompt: &str) -> String {
    let mut words: Vec<String> = tokens(prompt).into_iter().filter(|t| t.len() > 2).collect();
    words.sort();
    words.truncate(MAX_SHAPE_TOKENS);
    words.join(" ")
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Keep the first `max` words; strips a trailing comma left by the cut
pub fn cap_words(text: &str, max: usize) -> String {
    if word_count(text) <= max {
        return text.to_string();
    }
    let capped = text.split_whitespace().take(max).collect::<Vec<_>>().join(" ");
    capped.trim_end_matches(|c: char| c == ',' || c.is_whitespace()).to_string()
}

pub fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn is_quote(c: char) -> bool {
    c == '\'' || c == '"'
}

/// Non-empty runs enclosed by single or double quotes (either kind closes)
pub fn quoted_phrases(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut phrases = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        if is_quote(chars[i]) {
            if let Some(offset) = chars[i + 1..].iter().position(|c| is_quote(*c)) {
                let end = i + 1 + offset;
                if end > i + 1 {
                    phrases.push(chars[i + 1..end].iter().collect());
                    i = end + 1;
                    continue;
                }
            }
        }
        i += 1;
    }

    phrases
}

/// Pull usable keywords out of a fix suggestion
///
/// Quoted phrases of up to five words count unless they read like an
/// instruction ("to ", "for "). A text of four words or fewer is itself a
/// keyword unless it starts an instruction ("Add ", "Use ", "Specify ").
pub fn extract_fix_keywords(text: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();

    for phrase in quoted_phrases(text) {
        let clean = phrase.trim();
        if !clean.is_empty()
            && word_count(clean) <= 5
            && !clean.contains("to ")
            && !clean.contains("for ")
        {
            keywords.push(clean.to_string());
        }
    }

    let trimmed = text.trim();
    if word_count(trimmed) <= 4
        && !text.contains("Add ")
        && !text.contains("Use ")
        && !text.contains("Specify ")
    {
        keywords.push(trimmed.to_string());
    }

    let mut seen: Vec<String> = Vec::new();
    for keyword in keywords {
        if !seen.contains(&keyword) {
            seen.push(keyword);
        }
    }
    seen
}

/// Keywords from every stored requirement, deduplicated, capped at 10
pub fn extract_from_list(items: &[String]) -> Vec<String> {
    let mut all: Vec<String> = Vec::new();
    for item in items {
        for keyword in extract_fix_keywords(item) {
            if !all.contains(&keyword) {
                all.push(keyword);
            }
        }
    }
    all.truncate(10);
    all
}

/// Short candidate fix for a newly observed hallucination
///
/// Prefers the analyzer's suggestion (whole if short, else its quoted
/// phrases); otherwise a per-type default. Always at most five words.
pub fn derive_prevention_clause(
    suggested_fix: Option<&str>,
    kind: &str,
    missing_elements: &[String],
    extra_elements: &[String],
) -> Option<String> {
    let mut clause = String::new();

    if let Some(suggestion) = suggested_fix.map(str::trim).filter(|s| !s.is_empty()) {
        if word_count(suggestion) <= MAX_CLAUSE_WORDS {
            clause = suggestion.to_string();
        } else {
            let quoted = quoted_phrases(suggestion);
            if !quoted.is_empty() {
                clause = quoted.into_iter().take(2).collect::<Vec<_>>().join(", ");
            }
        }
    }

    if clause.is_empty() {
        clause = match kind {
            hallucination_type::MISSING_ELEMENT if !missing_elements.is_empty() => missing_elements
                .iter()
                .take(3)
                .cloned()
                .collect::<Vec<_>>()
                .join(", "),
            hallucination_type::WRONG_ELEMENT if !extra_elements.is_empty() => {
                format!("no {}", extra_elements[0])
            }
            hallucination_type::STYLE_MISMATCH => "exact style match".to_string(),
            hallucination_type::EXTRA_ELEMENT => "single object only".to_string(),
            _ => String::new(),
        };
    }

    if clause.is_empty() {
        return None;
    }

    if word_count(&clause) > MAX_CLAUSE_WORDS {
        clause = clause
            .split_whitespace()
            .take(MAX_CLAUSE_WORDS)
            .collect::<Vec<_>>()
            .join(" ");
    }

    Some(clause)
}
