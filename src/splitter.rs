//! Word splitters: text -> word tokens with character offsets.
//!
//! Every splitter must be deterministic and return tokens in increasing,
//! non-overlapping character order with `start <= end <= text.chars().count()`.
//! Offsets are character (Unicode scalar) offsets, not bytes.

use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

/// A word-level token and the character range it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordToken {
    /// Token text, exactly as it appears in the source.
    pub text: String,
    /// Start character (inclusive).
    pub start: usize,
    /// End character (exclusive).
    pub end: usize,
}

impl WordToken {
    /// Create a new word token.
    #[must_use]
    pub fn new(text: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            text: text.into(),
            start,
            end,
        }
    }
}

/// Splits text into word tokens.
pub trait WordsSplitter: Send + Sync {
    /// Split `text` into ordered word tokens.
    fn split(&self, text: &str) -> Vec<WordToken>;

    /// Splitter name, as used in checkpoint configs.
    fn name(&self) -> &'static str;
}

/// Default GLiNER splitter: word runs (with inner `-`/`_` joins) or single
/// non-space symbols.
///
/// `"state-of-the-art models, 2024!"` splits into
/// `["state-of-the-art", "models", ",", "2024", "!"]`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WhitespaceTokenSplitter;

static WORD_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\w+(?:[-_]\w+)*|\S").unwrap());

impl WordsSplitter for WhitespaceTokenSplitter {
    fn split(&self, text: &str) -> Vec<WordToken> {
        let mut tokens = Vec::new();
        // Regex matches are byte ranges; walk the text once to turn them
        // into char offsets.
        let mut byte_cursor = 0;
        let mut char_cursor = 0;
        for m in WORD_PATTERN.find_iter(text) {
            char_cursor += text[byte_cursor..m.start()].chars().count();
            let start = char_cursor;
            let len = m.as_str().chars().count();
            char_cursor += len;
            byte_cursor = m.end();
            tokens.push(WordToken::new(m.as_str(), start, start + len));
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "whitespace"
    }
}

/// Splits on whitespace only; punctuation stays attached to words.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpaceSplitter;

impl WordsSplitter for SpaceSplitter {
    fn split(&self, text: &str) -> Vec<WordToken> {
        let mut tokens = Vec::new();
        let mut current: Option<(usize, usize)> = None; // (char start, byte start)

        for (char_idx, (byte_idx, ch)) in text.char_indices().enumerate() {
            match (ch.is_whitespace(), current) {
                (false, None) => current = Some((char_idx, byte_idx)),
                (true, Some((start, byte_start))) => {
                    tokens.push(WordToken::new(&text[byte_start..byte_idx], start, char_idx));
                    current = None;
                }
                _ => {}
            }
        }
        if let Some((start, byte_start)) = current {
            let word = &text[byte_start..];
            tokens.push(WordToken::new(word, start, start + word.chars().count()));
        }
        tokens
    }

    fn name(&self) -> &'static str {
        "space"
    }
}

/// Built-in splitter selection by config name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitterType {
    /// [`WhitespaceTokenSplitter`]
    #[default]
    Whitespace,
    /// [`SpaceSplitter`]
    Space,
}

impl SplitterType {
    /// Parse a `words_splitter_type` config value.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "whitespace" => Ok(Self::Whitespace),
            "space" => Ok(Self::Space),
            other => Err(Error::config(format!(
                "unsupported words splitter '{}' (available: whitespace, space)",
                other
            ))),
        }
    }

    /// Instantiate the splitter.
    #[must_use]
    pub fn build(self) -> Box<dyn WordsSplitter> {
        match self {
            Self::Whitespace => Box::new(WhitespaceTokenSplitter),
            Self::Space => Box::new(SpaceSplitter),
        }
    }
}
