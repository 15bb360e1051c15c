//! Example-to-tensor conversion.
//!
//! # Architecture
//!
//! ```text
//!  RawExample*  ──collate_raw_batch──▶  RawBatch  ──collate_fn──▶  ModelInput
//!  (words, ner)      (class table,      (tokens, lengths,          (padded tensors
//!                     span tensors)      id_to_classes, spans)      + span_idx/span_mask
//!                                                                   + text_lengths)
//! ```
//!
//! Two strategies implement [`DataProcessor`]: [`SpanProcessor`] for
//! span-based checkpoints and [`TokenProcessor`] for `token_level` ones.
//! [`DataCollator`] picks one at construction and delegates to it.

pub mod collator;
pub mod padding;
pub mod prompt;
pub mod span;
pub mod token;

pub use collator::DataCollator;
pub use padding::{
    BatchSchema, FeatureKind, FeatureMap, FeatureValue, PaddedBatch, PaddingCollator,
};
pub use span::SpanProcessor;
pub use token::TokenProcessor;

use crate::config::GLiNERConfig;
use crate::offset::OffsetMap;
use crate::{Error, Result};
use candle_core::{DType, Device, Tensor};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Model input key for sub-word ids.
pub const INPUT_IDS: &str = "input_ids";
/// Model input key for the attention mask.
pub const ATTENTION_MASK: &str = "attention_mask";
/// Model input key for the first-sub-word-of-each-word mask.
pub const WORDS_MASK: &str = "words_mask";
/// Model input key for per-example word counts.
pub const TEXT_LENGTHS: &str = "text_lengths";
/// Model input key for span candidates.
pub const SPAN_IDX: &str = "span_idx";
/// Model input key for the span validity mask.
pub const SPAN_MASK: &str = "span_mask";
/// Model input key for training labels.
pub const LABELS: &str = "labels";

/// A ground-truth entity span over word tokens (`end` inclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NerSpan {
    /// First word.
    pub start: usize,
    /// Last word (inclusive).
    pub end: usize,
    /// Entity label.
    pub label: String,
}

impl NerSpan {
    /// Create a ground-truth span.
    #[must_use]
    pub fn new(start: usize, end: usize, label: impl Into<String>) -> Self {
        Self {
            start,
            end,
            label: label.into(),
        }
    }
}

/// One example as produced by the word splitter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExample {
    /// Word tokens, in order.
    pub tokenized_text: Vec<String>,
    /// Ground-truth spans; `None` at inference time.
    pub ner: Option<Vec<NerSpan>>,
}

impl RawExample {
    /// An unlabeled example.
    #[must_use]
    pub fn new(tokenized_text: Vec<String>) -> Self {
        Self {
            tokenized_text,
            ner: None,
        }
    }

    /// Attach ground-truth spans.
    #[must_use]
    pub fn with_ner(mut self, ner: Vec<NerSpan>) -> Self {
        self.ner = Some(ner);
        self
    }
}

/// Everything a batch needs before tensorization, plus what decoding and
/// entity reconstruction need after the forward pass.
#[derive(Debug, Clone, Default)]
pub struct RawBatch {
    /// Per-example word tokens (after truncation).
    pub tokens: Vec<Vec<String>>,
    /// Per-example token counts.
    pub seq_length: Vec<usize>,
    /// Label -> class id (1-based).
    pub classes_to_id: HashMap<String, usize>,
    /// Class id (1-based) -> label, shared by the whole batch.
    pub id_to_classes: BTreeMap<usize, String>,
    /// Ground-truth spans per example.
    pub entities: Vec<Option<Vec<NerSpan>>>,
    /// Padded `[batch, num_spans, 2]` span candidates (span strategy only).
    pub span_idx: Option<Tensor>,
    /// Padded `[batch, num_spans]` span validity (span strategy only).
    pub span_mask: Option<Tensor>,
    /// Per-text offset maps, attached by the input builder.
    pub offset_maps: Vec<OffsetMap>,
}

impl RawBatch {
    /// Number of examples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Whether the batch holds no examples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Number of classes in the label table.
    #[must_use]
    pub fn num_classes(&self) -> usize {
        self.id_to_classes.len()
    }

    /// `[batch, 1]` tensor of token counts.
    pub fn text_lengths(&self) -> Result<Tensor> {
        let lengths: Vec<i64> = self.seq_length.iter().map(|&n| n as i64).collect();
        Ok(Tensor::from_vec(
            lengths,
            (self.seq_length.len(), 1),
            &Device::Cpu,
        )?)
    }
}

/// Model-ready inputs: feature key -> tensor, or an explicitly absent entry.
///
/// Absent entries (`None`) are kept so the encoder can tell "this mode has
/// no span tensors" apart from "the key was forgotten".
#[derive(Debug, Clone, Default)]
pub struct ModelInput {
    inputs: BTreeMap<String, Option<Tensor>>,
}

impl ModelInput {
    /// Empty input map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tensor for `key`, if present and not absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Tensor> {
        self.inputs.get(key).and_then(Option::as_ref)
    }

    /// Whether `key` has an entry, absent or not.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.inputs.contains_key(key)
    }

    /// Set `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: Option<Tensor>) {
        self.inputs.insert(key.into(), value);
    }

    /// Iterate over entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&Tensor>)> {
        self.inputs.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }

    /// Keys in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.inputs.keys().map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    /// Whether there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    /// Thread the batch-scoped tensors of `raw` through.
    ///
    /// `span_idx`/`span_mask` from the raw batch win when present; an
    /// entry the strategy already produced is kept over an absent one.
    /// `text_lengths` always comes from the raw batch.
    pub fn merge_batch_scoped(&mut self, raw: &RawBatch) -> Result<()> {
        for (key, value) in [(SPAN_IDX, &raw.span_idx), (SPAN_MASK, &raw.span_mask)] {
            match value {
                Some(t) => self.insert(key, Some(t.clone())),
                None => {
                    self.inputs.entry(key.to_string()).or_insert(None);
                }
            }
        }
        self.insert(TEXT_LENGTHS, Some(raw.text_lengths()?));
        Ok(())
    }

    /// Move every present tensor onto `device`. Absent entries pass
    /// through untouched.
    pub fn to_device(&self, device: &Device) -> Result<Self> {
        let inputs = self
            .inputs
            .iter()
            .map(|(k, v)| {
                let moved = v.as_ref().map(|t| t.to_device(device)).transpose()?;
                Ok((k.clone(), moved))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { inputs })
    }
}

impl From<PaddedBatch> for ModelInput {
    fn from(batch: PaddedBatch) -> Self {
        Self {
            inputs: batch.into_iter().map(|(k, v)| (k, Some(v))).collect(),
        }
    }
}

/// An example-to-tensor conversion strategy.
pub trait DataProcessor: Send + Sync {
    /// Assemble the raw batch: truncate, build the class table, and attach
    /// any span-representation tensors.
    ///
    /// With `labels`, the class table is exactly those labels in order.
    /// Without, it is the sorted union of the examples' ground-truth labels.
    fn collate_raw_batch(&self, examples: &[RawExample], labels: Option<&[String]>)
        -> Result<RawBatch>;

    /// Tensorize a raw batch. With `prepare_labels`, ground-truth spans are
    /// turned into a `labels` tensor.
    fn collate_fn(&self, raw: &RawBatch, prepare_labels: bool) -> Result<ModelInput>;
}

/// The strategy chosen for a checkpoint, held by value.
#[derive(Debug, Clone)]
pub enum Processor {
    /// Span-based modes.
    Span(SpanProcessor),
    /// `token_level` mode.
    Token(TokenProcessor),
}

impl Processor {
    /// Whether this is the token-level strategy.
    #[must_use]
    pub fn is_token_level(&self) -> bool {
        matches!(self, Processor::Token(_))
    }
}

impl DataProcessor for Processor {
    fn collate_raw_batch(
        &self,
        examples: &[RawExample],
        labels: Option<&[String]>,
    ) -> Result<RawBatch> {
        match self {
            Processor::Span(p) => p.collate_raw_batch(examples, labels),
            Processor::Token(p) => p.collate_raw_batch(examples, labels),
        }
    }

    fn collate_fn(&self, raw: &RawBatch, prepare_labels: bool) -> Result<ModelInput> {
        match self {
            Processor::Span(p) => p.collate_fn(raw, prepare_labels),
            Processor::Token(p) => p.collate_fn(raw, prepare_labels),
        }
    }
}

// =============================================================================
// Shared raw-batch assembly
// =============================================================================

/// Truncate, build the class table, and collect tokens/lengths. Span
/// tensors are left to the strategy.
pub(crate) fn assemble_raw_batch(
    config: &GLiNERConfig,
    examples: &[RawExample],
    labels: Option<&[String]>,
) -> Result<RawBatch> {
    if examples.is_empty() {
        return Err(Error::EmptyBatch);
    }

    let class_list: Vec<String> = match labels {
        Some(labels) => labels.to_vec(),
        None => examples
            .iter()
            .flat_map(|ex| ex.ner.iter().flatten().map(|span| span.label.clone()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };
    let mut classes_to_id = HashMap::new();
    let mut id_to_classes = BTreeMap::new();
    for label in class_list {
        if !classes_to_id.contains_key(&label) {
            let id = classes_to_id.len() + 1;
            classes_to_id.insert(label.clone(), id);
            id_to_classes.insert(id, label);
        }
    }
    if id_to_classes.len() > config.max_types {
        log::warn!(
            "[GLiNER] {} entity types exceed the checkpoint's max_types ({})",
            id_to_classes.len(),
            config.max_types
        );
    }

    let mut tokens = Vec::with_capacity(examples.len());
    let mut seq_length = Vec::with_capacity(examples.len());
    let mut entities = Vec::with_capacity(examples.len());
    for (i, ex) in examples.iter().enumerate() {
        let mut words = ex.tokenized_text.clone();
        if words.len() > config.max_len {
            log::warn!(
                "[GLiNER] Example {} has {} words; truncating to max_len {}",
                i,
                words.len(),
                config.max_len
            );
            words.truncate(config.max_len);
        }
        seq_length.push(words.len());
        tokens.push(words);
        entities.push(ex.ner.clone());
    }

    Ok(RawBatch {
        tokens,
        seq_length,
        classes_to_id,
        id_to_classes,
        entities,
        span_idx: None,
        span_mask: None,
        offset_maps: Vec::new(),
    })
}

/// Tensorize a rank-1 `i64` vector.
pub(crate) fn i64_tensor(values: Vec<i64>) -> Result<Tensor> {
    let len = values.len();
    Ok(Tensor::from_vec(values, len, &Device::Cpu)?)
}

/// Check that an id tensor is integral before it reaches the encoder.
pub(crate) fn ensure_integral(key: &str, t: &Tensor) -> Result<()> {
    match t.dtype() {
        DType::I64 | DType::U32 | DType::U8 => Ok(()),
        other => Err(Error::config(format!(
            "'{}' must be an integer tensor, found {:?}",
            key, other
        ))),
    }
}
