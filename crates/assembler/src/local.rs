//! Local heuristic capabilities.
//!
//! Offline stand-ins for the model-backed summarizer and fact extractor.
//! They let the CLI replay transcripts without any external service, and
//! they are deterministic, which the end-to-end tests rely on.

use async_trait::async_trait;
use contextual_core::capability::{FactExtractor, Summarizer};
use contextual_core::error::MaintenanceError;
use contextual_core::turn::{Role, Turn};

/// Longest key accepted by [`PatternFactExtractor`], in words.
const MAX_KEY_WORDS: usize = 3;

/// Split text into trimmed sentences.
///
/// A sentence ends at a newline, or at `.`, `!` or `?` followed by
/// whitespace or end of text, so `v1.2` and `assistant-X` stay intact.
fn sentences(text: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        let boundary = match c {
            '\n' => Some((pos, pos + 1)),
            '.' | '!' | '?' => match chars.peek() {
                None => Some((pos + 1, pos + 1)),
                Some((_, next)) if next.is_whitespace() => Some((pos + 1, pos + 1)),
                _ => None,
            },
            _ => None,
        };
        if let Some((end, resume)) = boundary {
            let sentence = text[start..end].trim();
            if !sentence.is_empty() {
                out.push(sentence);
            }
            start = resume;
        }
    }

    let tail = text[start..].trim();
    if !tail.is_empty() {
        out.push(tail);
    }
    out
}

/// Truncate to at most `max_chars` characters, marking the cut.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Summarizes by keeping the first sentence of every turn.
#[derive(Debug, Clone)]
pub struct ExtractiveSummarizer {
    max_chars: usize,
}

impl ExtractiveSummarizer {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(16),
        }
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new(600)
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    fn name(&self) -> &str {
        "extractive"
    }

    async fn summarize(&self, turns: &[Turn]) -> Result<String, MaintenanceError> {
        let lines: Vec<String> = turns
            .iter()
            .filter_map(|t| {
                sentences(&t.content)
                    .first()
                    .map(|s| format!("{}: {}", t.role, s))
            })
            .collect();

        Ok(truncate_chars(&lines.join(" "), self.max_chars))
    }
}

/// Extracts `my <key> is <value>` and `key: value` statements from user turns.
///
/// Keys are lowercased with words joined by `_`, so "My favorite color is
/// blue" yields `favorite_color = blue`. Assistant turns are ignored.
#[derive(Debug, Clone, Default)]
pub struct PatternFactExtractor;

impl PatternFactExtractor {
    pub fn new() -> Self {
        Self
    }

    fn key_from_words(raw: &str) -> Option<String> {
        let words: Vec<&str> = raw.split_whitespace().collect();
        if words.is_empty() || words.len() > MAX_KEY_WORDS {
            return None;
        }
        let valid = words
            .iter()
            .all(|w| w.chars().all(|c| c.is_alphanumeric() || c == '-' || c == '_'));
        if !valid || !words[0].starts_with(|c: char| c.is_alphabetic()) {
            return None;
        }
        Some(words.join("_").to_lowercase())
    }

    fn clean_value(raw: &str) -> Option<String> {
        let value = raw
            .trim()
            .trim_end_matches(['.', '!', '?', ',', ';'])
            .trim();
        (!value.is_empty()).then(|| value.to_string())
    }

    /// `my <key> is <value>`, anywhere in the sentence.
    fn possessive(sentence: &str) -> Option<(String, String)> {
        // ASCII lowercasing keeps byte offsets aligned with `sentence`.
        let lower = sentence.to_ascii_lowercase();
        let start = lower.match_indices("my ").map(|(i, _)| i).find(|&i| {
            lower[..i]
                .chars()
                .next_back()
                .is_none_or(|c| !c.is_alphanumeric())
        })?;

        let after_my = start + 3;
        let is_at = after_my + lower[after_my..].find(" is ")?;
        let key = Self::key_from_words(&sentence[after_my..is_at])?;
        let value = Self::clean_value(&sentence[is_at + 4..])?;
        Some((key, value))
    }

    /// `key: value` on its own line.
    fn labelled(line: &str) -> Option<(String, String)> {
        let (key, value) = line.split_once(':')?;
        if value.starts_with("//") {
            return None;
        }
        let key = Self::key_from_words(key)?;
        let value = Self::clean_value(value)?;
        Some((key, value))
    }
}

#[async_trait]
impl FactExtractor for PatternFactExtractor {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn extract_facts(&self, turn: &Turn) -> Result<Vec<(String, String)>, MaintenanceError> {
        if turn.role != Role::User {
            return Ok(Vec::new());
        }

        let mut pairs = Vec::new();
        for line in turn.content.lines() {
            if let Some(pair) = Self::labelled(line) {
                pairs.push(pair);
                continue;
            }
            pairs.extend(sentences(line).into_iter().filter_map(Self::possessive));
        }
        Ok(pairs)
    }
}
