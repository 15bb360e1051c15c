//! Span-based conversion strategy.
//!
//! Every word position `i` proposes `max_width` candidates `(i, i + w)`.
//! Candidates running past the end of the text are masked out and their
//! indices zeroed, so the table is always `[n * max_width, 2]`.

use super::padding::{BatchSchema, FeatureKind, FeatureMap, FeatureValue, PaddingCollator};
use super::prompt::PromptEncoder;
use super::{
    assemble_raw_batch, ensure_integral, DataProcessor, ModelInput, NerSpan, RawBatch,
    RawExample, LABELS, SPAN_IDX, SPAN_MASK,
};
use crate::config::GLiNERConfig;
use crate::Result;
use candle_core::{Device, Tensor};
use std::collections::HashMap;

/// Span candidates for one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanCandidates {
    /// `(start, end)` word indices, end inclusive; `(0, 0)` where invalid.
    pub idx: Vec<(i64, i64)>,
    /// Whether the candidate lies inside the text.
    pub mask: Vec<bool>,
}

impl SpanCandidates {
    /// Enumerate candidates for a text of `num_words` words.
    #[must_use]
    pub fn new(num_words: usize, max_width: usize) -> Self {
        let num_spans = num_words.saturating_mul(max_width);
        let mut idx = Vec::with_capacity(num_spans);
        let mut mask = Vec::with_capacity(num_spans);
        for start in 0..num_words {
            for width in 0..max_width {
                let end = start + width;
                if end < num_words {
                    idx.push((start as i64, end as i64));
                    mask.push(true);
                } else {
                    idx.push((0, 0));
                    mask.push(false);
                }
            }
        }
        Self { idx, mask }
    }

    /// Number of candidates (valid or not).
    #[must_use]
    pub fn len(&self) -> usize {
        self.idx.len()
    }

    /// Whether there are no candidates.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.idx.is_empty()
    }

    fn idx_tensor(&self) -> Result<Tensor> {
        let flat: Vec<i64> = self.idx.iter().flat_map(|&(s, e)| [s, e]).collect();
        Ok(Tensor::from_vec(flat, (self.idx.len(), 2), &Device::Cpu)?)
    }

    fn mask_tensor(&self) -> Result<Tensor> {
        let mask: Vec<u8> = self.mask.iter().map(|&m| u8::from(m)).collect();
        let len = mask.len();
        Ok(Tensor::from_vec(mask, len, &Device::Cpu)?)
    }

    /// Class id per candidate: the ground-truth class for exact matches,
    /// `0` for none, `-1` for masked candidates.
    fn labels(&self, ner: &[NerSpan], classes_to_id: &HashMap<String, usize>) -> Vec<f32> {
        let gold: HashMap<(i64, i64), usize> = ner
            .iter()
            .filter_map(|span| {
                let id = *classes_to_id.get(&span.label)?;
                Some(((span.start as i64, span.end as i64), id))
            })
            .collect();
        self.idx
            .iter()
            .zip(&self.mask)
            .map(|(bounds, &valid)| {
                if !valid {
                    -1.0
                } else {
                    gold.get(bounds).map_or(0.0, |&id| id as f32)
                }
            })
            .collect()
    }
}

/// Conversion strategy for span-based checkpoints.
#[derive(Debug, Clone)]
pub struct SpanProcessor {
    config: GLiNERConfig,
    prompt: PromptEncoder,
}

impl SpanProcessor {
    /// Create a span processor.
    #[must_use]
    pub fn new(config: GLiNERConfig, prompt: PromptEncoder) -> Self {
        Self { config, prompt }
    }

    /// The configuration.
    #[must_use]
    pub fn config(&self) -> &GLiNERConfig {
        &self.config
    }
}

impl DataProcessor for SpanProcessor {
    fn collate_raw_batch(
        &self,
        examples: &[RawExample],
        labels: Option<&[String]>,
    ) -> Result<RawBatch> {
        let mut raw = assemble_raw_batch(&self.config, examples, labels)?;

        let features = raw
            .seq_length
            .iter()
            .map(|&n| {
                let candidates = SpanCandidates::new(n, self.config.max_width);
                let mut features = FeatureMap::new();
                features.insert(
                    SPAN_IDX.into(),
                    FeatureValue::Tensor(candidates.idx_tensor()?),
                );
                features.insert(
                    SPAN_MASK.into(),
                    FeatureValue::Tensor(candidates.mask_tensor()?),
                );
                Ok(features)
            })
            .collect::<Result<Vec<_>>>()?;
        let schema = BatchSchema::new()
            .with(SPAN_IDX, FeatureKind::Table)
            .with(SPAN_MASK, FeatureKind::Sequence);
        let mut padded = PaddingCollator::new(schema).pad(&features)?;

        raw.span_idx = padded.remove(SPAN_IDX);
        raw.span_mask = padded.remove(SPAN_MASK);
        Ok(raw)
    }

    fn collate_fn(&self, raw: &RawBatch, prepare_labels: bool) -> Result<ModelInput> {
        let mut input = ModelInput::from(self.prompt.encode_batch(raw)?);
        if let Some(span_idx) = &raw.span_idx {
            ensure_integral(SPAN_IDX, span_idx)?;
        }
        input.insert(SPAN_IDX, raw.span_idx.clone());
        input.insert(SPAN_MASK, raw.span_mask.clone());

        if prepare_labels {
            let features = raw
                .seq_length
                .iter()
                .enumerate()
                .map(|(i, &n)| {
                    let candidates = SpanCandidates::new(n, self.config.max_width);
                    let ner = raw.entities.get(i).and_then(Option::as_deref).unwrap_or(&[]);
                    let mut features = FeatureMap::new();
                    features.insert(
                        LABELS.into(),
                        FeatureValue::List(candidates.labels(ner, &raw.classes_to_id)),
                    );
                    features
                })
                .collect::<Vec<_>>();
            let schema = BatchSchema::new().with(LABELS, FeatureKind::List);
            let mut padded = PaddingCollator::new(schema).pad(&features)?;
            input.insert(LABELS, padded.remove(LABELS));
        }
        Ok(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::fixtures::{test_tokenizer, words};
    use crate::processing::INPUT_IDS;
    use std::sync::Arc;

    fn processor(max_width: usize) -> SpanProcessor {
        let config = GLiNERConfig {
            max_width,
            ..GLiNERConfig::default()
        };
        let prompt = PromptEncoder::new(Arc::new(test_tokenizer()), &config).unwrap();
        SpanProcessor::new(config, prompt)
    }

    #[test]
    fn test_span_candidates() {
        let c = SpanCandidates::new(3, 2);
        assert_eq!(c.idx, vec![(0, 0), (0, 1), (1, 1), (1, 2), (2, 2), (0, 0)]);
        assert_eq!(c.mask, vec![true, true, true, true, true, false]);
        assert!(SpanCandidates::new(0, 12).is_empty());
    }

    #[test]
    fn test_raw_batch_span_tensors_are_padded() {
        let p = processor(2);
        let examples = vec![
            RawExample::new(words(&["Alice", "met", "Bob"])),
            RawExample::new(words(&["Bob"])),
        ];
        let labels = vec!["person".to_string()];
        let raw = p.collate_raw_batch(&examples, Some(&labels)).unwrap();

        let span_idx = raw.span_idx.as_ref().unwrap();
        assert_eq!(span_idx.dims(), &[2, 6, 2]);
        let mask = raw.span_mask.as_ref().unwrap().to_vec2::<u8>().unwrap();
        assert_eq!(mask[0], vec![1, 1, 1, 1, 1, 0]);
        assert_eq!(mask[1], vec![1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_collate_fn_carries_span_tensors() {
        let p = processor(12);
        let labels = vec!["person".to_string()];
        let raw = p
            .collate_raw_batch(&[RawExample::new(words(&["Alice"]))], Some(&labels))
            .unwrap();
        let input = p.collate_fn(&raw, false).unwrap();
        assert_eq!(input.get(INPUT_IDS).unwrap().dims(), &[1, 6]);
        assert_eq!(input.get(SPAN_IDX).unwrap().dims(), &[1, 12, 2]);
        assert!(!input.contains_key(LABELS));
    }

    #[test]
    fn test_prepare_labels() {
        let p = processor(2);
        let examples = vec![
            RawExample::new(words(&["Alice", "met", "Bob"])).with_ner(vec![
                NerSpan::new(0, 0, "person"),
                NerSpan::new(1, 2, "location"),
            ]),
            RawExample::new(words(&["Bob"])).with_ner(vec![NerSpan::new(0, 0, "person")]),
        ];
        let raw = p.collate_raw_batch(&examples, None).unwrap();
        // sorted: location = 1, person = 2
        let input = p.collate_fn(&raw, true).unwrap();
        let labels = input.get(LABELS).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(labels[0], vec![2.0, 0.0, 0.0, 1.0, 0.0, -1.0]);
        assert_eq!(labels[1], vec![2.0, -1.0, 0.0, 0.0, 0.0, 0.0]);
    }
}
