//! Decoder for token-level checkpoints.
//!
//! Logits are `[3, batch, seq_len, num_classes]`: start, end and inside
//! scores of every word for every class. A start and an end of the same
//! class form a span when every word between them is inside above the
//! threshold; the span's score is the mean inside probability.

use super::{greedy_search, probabilities, Decoder};
use crate::config::PredictOptions;
use crate::entity::SpanHypothesis;
use crate::processing::token::{END, INSIDE, START};
use crate::{Error, Result};
use candle_core::Tensor;
use std::collections::BTreeMap;

/// Decodes start/end/inside token logits.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenDecoder;

impl Decoder for TokenDecoder {
    fn decode(
        &self,
        tokens: &[Vec<String>],
        id_to_classes: &BTreeMap<usize, String>,
        scores: &Tensor,
        options: &PredictOptions,
    ) -> Result<Vec<Vec<SpanHypothesis>>> {
        let (probs, dims) = probabilities(scores, 4)?;
        let (channels, batch, seq_len, classes) = (dims[0], dims[1], dims[2], dims[3]);
        if channels != 3 {
            return Err(Error::invalid_input(format!(
                "token logits need start/end/inside channels, got {}",
                channels
            )));
        }
        if batch < tokens.len() {
            return Err(Error::invalid_input(format!(
                "token logits cover {} texts, batch has {}",
                batch,
                tokens.len()
            )));
        }
        let at = |ch: usize, b: usize, pos: usize, c: usize| {
            probs[((ch * batch + b) * seq_len + pos) * classes + c]
        };

        let mut out = Vec::with_capacity(tokens.len());
        for (b, words) in tokens.iter().enumerate() {
            let n = seq_len.min(words.len());
            let mut spans = Vec::new();
            for c in 0..classes {
                let Some(label) = id_to_classes.get(&(c + 1)) else {
                    continue;
                };
                let starts = (0..n).filter(|&i| at(START, b, i, c) > options.threshold);
                let ends: Vec<usize> = (0..n)
                    .filter(|&i| at(END, b, i, c) > options.threshold)
                    .collect();
                for st in starts {
                    for &ed in ends.iter().filter(|&&ed| ed >= st) {
                        let inside: Vec<f32> = (st..=ed).map(|i| at(INSIDE, b, i, c)).collect();
                        if inside.iter().any(|&p| p < options.threshold) {
                            continue;
                        }
                        let score = inside.iter().sum::<f32>() / inside.len() as f32;
                        spans.push(SpanHypothesis::new(st, ed, label.clone(), score));
                    }
                }
            }
            out.push(greedy_search(spans, options.flat_ner, options.multi_label));
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "token"
    }
}
