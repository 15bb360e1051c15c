//! Entity structures: decoder hypotheses and reconstructed entities.

use serde::{Deserialize, Serialize};

/// A span hypothesis from a decoder, in TOKEN coordinates.
///
/// `start` and `end` are word-token indices; `end` is inclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanHypothesis {
    /// First token of the span.
    pub start: usize,
    /// Last token of the span (inclusive).
    pub end: usize,
    /// Entity label.
    pub label: String,
    /// Decoder score.
    pub score: f32,
}

impl SpanHypothesis {
    /// Create a new hypothesis.
    #[must_use]
    pub fn new(start: usize, end: usize, label: impl Into<String>, score: f32) -> Self {
        Self {
            start,
            end,
            label: label.into(),
            score,
        }
    }

    /// Whether two hypotheses cover exactly the same tokens.
    #[must_use]
    pub fn same_bounds(&self, other: &SpanHypothesis) -> bool {
        self.start == other.start && self.end == other.end
    }

    /// Whether two hypotheses share at least one token.
    #[must_use]
    pub fn overlaps(&self, other: &SpanHypothesis) -> bool {
        !(self.start > other.end || other.start > self.end)
    }

    /// Whether one hypothesis fully contains the other.
    #[must_use]
    pub fn nests_with(&self, other: &SpanHypothesis) -> bool {
        (self.start <= other.start && self.end >= other.end)
            || (other.start <= self.start && other.end >= self.end)
    }
}

/// A recognized named entity, in CHARACTER coordinates of the original text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Start position (character offset, inclusive)
    pub start: usize,
    /// End position (character offset, exclusive)
    pub end: usize,
    /// Entity text, sliced from the original input
    pub text: String,
    /// Entity label
    pub label: String,
    /// Decoder score
    pub score: f32,
}

impl Entity {
    /// Create a new entity.
    #[must_use]
    pub fn new(
        text: impl Into<String>,
        label: impl Into<String>,
        start: usize,
        end: usize,
        score: f32,
    ) -> Self {
        Self {
            start,
            end,
            text: text.into(),
            label: label.into(),
            score,
        }
    }

    /// Character length of the entity.
    #[must_use]
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    /// Whether the entity covers no characters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Check if this entity overlaps with another.
    #[must_use]
    pub fn overlaps(&self, other: &Entity) -> bool {
        !(self.end <= other.start || other.end <= self.start)
    }
}
