//! Score tensor -> token-indexed span hypotheses.
//!
//! Decoders apply a sigmoid to the encoder's logits, keep every
//! (span, class) whose probability is strictly above the threshold, then
//! resolve overlaps greedily by descending score:
//!
//! | mode              | two kept spans may...                      |
//! |-------------------|--------------------------------------------|
//! | flat              | not share any token                        |
//! | nested            | share tokens only if one contains the other|
//! | `multi_label`     | additionally share exact bounds            |
//!
//! Output per text is sorted by start token.

pub mod span;
pub mod token;

pub use span::SpanDecoder;
pub use token::TokenDecoder;

use crate::config::{PredictOptions, SpanMode};
use crate::entity::SpanHypothesis;
use crate::{Error, Result};
use candle_core::{DType, Tensor};
use std::collections::BTreeMap;

/// Turns a score tensor into span hypotheses per text.
pub trait Decoder: Send + Sync {
    /// Decode one batch.
    ///
    /// `tokens` are the word tokens of each text (after truncation),
    /// `id_to_classes` the batch's 1-based class table.
    fn decode(
        &self,
        tokens: &[Vec<String>],
        id_to_classes: &BTreeMap<usize, String>,
        scores: &Tensor,
        options: &PredictOptions,
    ) -> Result<Vec<Vec<SpanHypothesis>>>;

    /// Decoder name.
    fn name(&self) -> &'static str;
}

/// The decoder matching a span mode.
#[must_use]
pub fn decoder_for(mode: &SpanMode) -> Box<dyn Decoder> {
    if mode.is_token_level() {
        Box::new(TokenDecoder)
    } else {
        Box::new(SpanDecoder)
    }
}

/// Whether `candidate` conflicts with an already kept hypothesis.
fn conflicts(
    candidate: &SpanHypothesis,
    kept: &SpanHypothesis,
    flat_ner: bool,
    multi_label: bool,
) -> bool {
    if candidate.same_bounds(kept) {
        return !multi_label;
    }
    if !candidate.overlaps(kept) {
        return false;
    }
    flat_ner || !candidate.nests_with(kept)
}

/// Greedy overlap resolution.
///
/// Visits hypotheses from highest to lowest score, keeping each one that
/// does not conflict with those already kept. The result is sorted by
/// start token; ties keep score order.
#[must_use]
pub fn greedy_search(
    mut spans: Vec<SpanHypothesis>,
    flat_ner: bool,
    multi_label: bool,
) -> Vec<SpanHypothesis> {
    spans.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<SpanHypothesis> = Vec::with_capacity(spans.len());
    for span in spans {
        if !kept.iter().any(|k| conflicts(&span, k, flat_ner, multi_label)) {
            kept.push(span);
        }
    }
    kept.sort_by_key(|s| s.start);
    kept
}

/// Sigmoid probabilities of a logits tensor, flattened, with its dims.
///
/// Fails unless the tensor has `rank` dimensions.
pub(crate) fn probabilities(scores: &Tensor, rank: usize) -> Result<(Vec<f32>, Vec<usize>)> {
    if scores.rank() != rank {
        return Err(Error::invalid_input(format!(
            "expected rank-{} logits, got shape {:?}",
            rank,
            scores.dims()
        )));
    }
    let probs = candle_nn::ops::sigmoid(&scores.to_dtype(DType::F32)?)?;
    let flat = probs.flatten_all()?.to_vec1::<f32>()?;
    Ok((flat, scores.dims().to_vec()))
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn hypotheses() -> impl Strategy<Value = Vec<SpanHypothesis>> {
        prop::collection::vec((0usize..10, 0usize..4, 0usize..3, 0.0f32..1.0), 0..20).prop_map(|v| {
            v.into_iter()
                .map(|(s, w, c, p)| {
                    SpanHypothesis::new(s, s + w, format!("c{}", c), p)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn flat_output_has_no_overlaps(spans in hypotheses(), multi_label in any::<bool>()) {
            let kept = greedy_search(spans, true, multi_label);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(!a.overlaps(b) || (multi_label && a.same_bounds(b)));
                }
            }
        }

        #[test]
        fn nested_output_only_nests(spans in hypotheses()) {
            let kept = greedy_search(spans, false, false);
            for (i, a) in kept.iter().enumerate() {
                for b in &kept[i + 1..] {
                    prop_assert!(!a.overlaps(b) || (a.nests_with(b) && !a.same_bounds(b)));
                }
            }
        }

        #[test]
        fn output_is_sorted_subset(spans in hypotheses()) {
            let n = spans.len();
            let kept = greedy_search(spans, true, false);
            prop_assert!(kept.len() <= n);
            prop_assert!(kept.windows(2).all(|w| w[0].start <= w[1].start));
        }
    }
}
