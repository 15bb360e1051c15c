//! Token-to-character offset handling.
//!
//! # Coordinate Systems
//!
//! ```text
//! Text:       "Café met Bob"
//!
//! CHAR INDEX  C  a  f  é     m  e  t     B  o  b
//!             0  1  2  3  4  5  6  7  8  9 10 11
//!
//! BYTE INDEX  C  a  f  [é ]     m  e  t     B  o  b
//!             0  1  2  3-4  5  6  7  8  9 10 11 12
//!
//! WORD TOKEN  [Café]  [met]  [Bob]
//!               0       1      2
//!
//! SUB-WORD    [CLS] <<ENT>> person <<SEP>> Ca ##fé met Bob [SEP]
//! ```
//!
//! Decoders speak word-token indices. Callers speak character offsets.
//! [`OffsetMap`] is the only bridge between the two: it is built once per
//! text from the word splitter's output and consulted once per decoded
//! span. Rust strings are indexed by byte, so slicing the original text
//! goes through [`char_slice`], which converts at the boundary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Per-text table mapping word-token index to its character range.
///
/// `start_char_of_token[i]..end_char_of_token[i]` is the character range
/// of token `i` in the original text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OffsetMap {
    start_char_of_token: Vec<usize>,
    end_char_of_token: Vec<usize>,
}

impl OffsetMap {
    /// Create an empty offset map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from parallel start/end sequences.
    pub fn from_parts(starts: Vec<usize>, ends: Vec<usize>) -> Result<Self> {
        if starts.len() != ends.len() {
            return Err(Error::invalid_input(format!(
                "offset map needs parallel sequences, got {} starts and {} ends",
                starts.len(),
                ends.len()
            )));
        }
        Ok(Self {
            start_char_of_token: starts,
            end_char_of_token: ends,
        })
    }

    /// Append a token's character range.
    pub fn push(&mut self, start: usize, end: usize) {
        self.start_char_of_token.push(start);
        self.end_char_of_token.push(end);
    }

    /// Start character of every token.
    #[must_use]
    pub fn starts(&self) -> &[usize] {
        &self.start_char_of_token
    }

    /// End character (exclusive) of every token.
    #[must_use]
    pub fn ends(&self) -> &[usize] {
        &self.end_char_of_token
    }

    /// Character range of a single token.
    #[must_use]
    pub fn get(&self, token_idx: usize) -> Option<(usize, usize)> {
        Some((
            *self.start_char_of_token.get(token_idx)?,
            *self.end_char_of_token.get(token_idx)?,
        ))
    }

    /// Character range covered by tokens `start_token..=end_token`.
    ///
    /// Returns `None` when either index is past the end of the map.
    #[must_use]
    pub fn char_span(&self, start_token: usize, end_token: usize) -> Option<(usize, usize)> {
        let start = *self.start_char_of_token.get(start_token)?;
        let end = *self.end_char_of_token.get(end_token)?;
        Some((start, end))
    }

    /// Number of tokens.
    #[must_use]
    pub fn len(&self) -> usize {
        self.start_char_of_token.len()
    }

    /// Check if empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start_char_of_token.is_empty()
    }
}

// =============================================================================
// Conversion Functions
// =============================================================================

/// Build a table where `map[char_idx]` gives the byte index.
///
/// The table has one trailing entry for `text.chars().count()`, so exclusive
/// end offsets resolve too. Useful when converting many spans from the same
/// text.
#[must_use]
pub fn build_char_to_byte_map(text: &str) -> Vec<usize> {
    let mut map: Vec<usize> = text.char_indices().map(|(byte_idx, _)| byte_idx).collect();
    map.push(text.len());
    map
}

/// Character-offset slicer over one text.
///
/// Builds the char-to-byte table once, so slicing many spans of the same
/// text costs one lookup each. ASCII text needs no table.
#[derive(Debug, Clone)]
pub struct CharSlicer<'a> {
    text: &'a str,
    char_to_byte: Option<Vec<usize>>,
}

impl<'a> CharSlicer<'a> {
    /// Prepare `text` for slicing.
    #[must_use]
    pub fn new(text: &'a str) -> Self {
        let char_to_byte = (!text.is_ascii()).then(|| build_char_to_byte_map(text));
        Self { text, char_to_byte }
    }

    /// Slice by character offsets `[char_start, char_end)`.
    ///
    /// Returns `None` if the range is inverted or past the end of the text.
    #[must_use]
    pub fn slice(&self, char_start: usize, char_end: usize) -> Option<&'a str> {
        if char_start > char_end {
            return None;
        }
        match &self.char_to_byte {
            None => self.text.get(char_start..char_end),
            Some(map) => {
                let byte_start = *map.get(char_start)?;
                let byte_end = *map.get(char_end)?;
                self.text.get(byte_start..byte_end)
            }
        }
    }
}

/// Slice `text` by character offsets `[char_start, char_end)`.
///
/// Returns `None` if the range is inverted or past the end of the text.
/// For many spans of one text, use [`CharSlicer`].
#[must_use]
pub fn char_slice(text: &str, char_start: usize, char_end: usize) -> Option<&str> {
    CharSlicer::new(text).slice(char_start, char_end)
}
