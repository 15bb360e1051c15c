//! Token-level conversion strategy.
//!
//! No span candidates are built; the encoder scores every word for
//! start/end/inside of each class. Training labels mirror that layout as
//! one `[1, 3, seq_len, num_classes]` tensor per example.

use super::padding::{BatchSchema, FeatureKind, FeatureMap, FeatureValue, PaddingCollator};
use super::prompt::PromptEncoder;
use super::{assemble_raw_batch, DataProcessor, ModelInput, NerSpan, RawBatch, RawExample, LABELS};
use crate::config::GLiNERConfig;
use crate::Result;
use candle_core::{Device, Tensor};
use std::collections::HashMap;

/// Label channels of a token-level label tensor.
pub const START: usize = 0;
/// End channel.
pub const END: usize = 1;
/// Inside channel.
pub const INSIDE: usize = 2;

/// Conversion strategy for `token_level` checkpoints.
#[derive(Debug, Clone)]
pub struct TokenProcessor {
    config: GLiNERConfig,
    prompt: PromptEncoder,
}

impl TokenProcessor {
    /// Create a token processor.
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

/// Build the `[1, 3, seq_len, num_classes]` label tensor of one example.
///
/// Spans past `seq_len` (cut off by truncation) or with an unknown label
/// are skipped.
pub fn token_labels(
    ner: &[NerSpan],
    seq_len: usize,
    classes_to_id: &HashMap<String, usize>,
) -> Result<Tensor> {
    let num_classes = classes_to_id.len();
    let mut data = vec![0f32; 3 * seq_len * num_classes];
    let at =
        |channel: usize, pos: usize, class: usize| (channel * seq_len + pos) * num_classes + class;

    for span in ner {
        let Some(&id) = classes_to_id.get(&span.label) else {
            continue;
        };
        if span.start > span.end || span.end >= seq_len {
            continue;
        }
        let class = id - 1;
        data[at(START, span.start, class)] = 1.0;
        data[at(END, span.end, class)] = 1.0;
        for pos in span.start..=span.end {
            data[at(INSIDE, pos, class)] = 1.0;
        }
    }
    Ok(Tensor::from_vec(
        data,
        (1, 3, seq_len, num_classes),
        &Device::Cpu,
    )?)
}

impl DataProcessor for TokenProcessor {
    fn collate_raw_batch(
        &self,
        examples: &[RawExample],
        labels: Option<&[String]>,
    ) -> Result<RawBatch> {
        assemble_raw_batch(&self.config, examples, labels)
    }

    fn collate_fn(&self, raw: &RawBatch, prepare_labels: bool) -> Result<ModelInput> {
        let mut input = ModelInput::from(self.prompt.encode_batch(raw)?);

        if prepare_labels {
            let features = raw
                .seq_length
                .iter()
                .enumerate()
                .map(|(i, &n)| {
                    let ner = raw.entities.get(i).and_then(Option::as_deref).unwrap_or(&[]);
                    let mut features = FeatureMap::new();
                    features.insert(
                        LABELS.into(),
                        FeatureValue::Tensor(token_labels(ner, n, &raw.classes_to_id)?),
                    );
                    Ok(features)
                })
                .collect::<Result<Vec<_>>>()?;
            let schema = BatchSchema::new().with(LABELS, FeatureKind::TokenLabels);
            let mut padded = PaddingCollator::new(schema).pad(&features)?;
            input.insert(LABELS, padded.remove(LABELS));
        }
        Ok(input)
    }
}
