//! Decoder for span-based checkpoints.

use super::{greedy_search, probabilities, Decoder};
use crate::config::PredictOptions;
use crate::entity::SpanHypothesis;
use crate::{Error, Result};
use candle_core::Tensor;
use std::collections::BTreeMap;

/// Decodes `[batch, seq_len, max_width, num_classes]` span logits.
///
/// Cell `[b, s, w, c]` scores the span `(s, s + w)` of text `b` for class
/// id `c + 1`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanDecoder;

impl Decoder for SpanDecoder {
    fn decode(
        &self,
        tokens: &[Vec<String>],
        id_to_classes: &BTreeMap<usize, String>,
        scores: &Tensor,
        options: &PredictOptions,
    ) -> Result<Vec<Vec<SpanHypothesis>>> {
        let (probs, dims) = probabilities(scores, 4)?;
        let (batch, seq_len, width, classes) = (dims[0], dims[1], dims[2], dims[3]);
        if batch < tokens.len() {
            return Err(Error::invalid_input(format!(
                "span logits cover {} texts, batch has {}",
                batch,
                tokens.len()
            )));
        }

        let mut out = Vec::with_capacity(tokens.len());
        for (b, words) in tokens.iter().enumerate() {
            let num_words = words.len();
            let mut spans = Vec::new();
            for start in 0..seq_len.min(num_words) {
                for w in 0..width {
                    let end = start + w;
                    if end >= num_words {
                        break;
                    }
                    for c in 0..classes {
                        let p = probs[((b * seq_len + start) * width + w) * classes + c];
                        if p <= options.threshold {
                            continue;
                        }
                        if let Some(label) = id_to_classes.get(&(c + 1)) {
                            spans.push(SpanHypothesis::new(start, end, label.clone(), p));
                        }
                    }
                }
            }
            out.push(greedy_search(spans, options.flat_ner, options.multi_label));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "span"
    }
}
