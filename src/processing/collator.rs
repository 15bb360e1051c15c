//! Processing-strategy dispatcher.
//!
//! The strategy is picked from the checkpoint's span mode once, when the
//! collator is built. Each batch call delegates to it and then threads the
//! batch-scoped tensors (`span_idx`, `span_mask`, `text_lengths`) through.

use super::prompt::PromptEncoder;
use super::{
    DataProcessor, ModelInput, Processor, RawBatch, RawExample, SpanProcessor, TokenProcessor,
};
use crate::config::GLiNERConfig;
use crate::Result;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Batches raw examples into model inputs through one fixed strategy.
#[derive(Debug, Clone)]
pub struct DataCollator<P: DataProcessor = Processor> {
    processor: P,
    prepare_labels: bool,
}

impl DataCollator<Processor> {
    /// Select the strategy for `config.span_mode`.
    pub fn from_config(config: &GLiNERConfig, tokenizer: Arc<Tokenizer>) -> Result<Self> {
        let prompt = PromptEncoder::new(tokenizer, config)?;
        let processor = if config.span_mode.is_token_level() {
            Processor::Token(TokenProcessor::new(config.clone(), prompt))
        } else {
            Processor::Span(SpanProcessor::new(config.clone(), prompt))
        };
        log::debug!(
            "[DataCollator] span_mode={} -> {} strategy",
            config.span_mode,
            if processor.is_token_level() { "token" } else { "span" }
        );
        Ok(Self::new(processor))
    }
}

impl<P: DataProcessor> DataCollator<P> {
    /// Wrap a strategy. Label preparation is off.
    #[must_use]
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            prepare_labels: false,
        }
    }

    /// Turn ground-truth spans into a `labels` tensor on every call.
    #[must_use]
    pub fn with_prepare_labels(mut self, prepare_labels: bool) -> Self {
        self.prepare_labels = prepare_labels;
        self
    }

    /// The strategy.
    #[must_use]
    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Collate a batch of examples.
    ///
    /// Returns the model input together with the raw batch it was built
    /// from, which decoding and entity reconstruction need later.
    pub fn collate(
        &self,
        examples: &[RawExample],
        labels: Option<&[String]>,
    ) -> Result<(ModelInput, RawBatch)> {
        let raw = self.processor.collate_raw_batch(examples, labels)?;
        let input = self.collate_raw(&raw)?;
        Ok((input, raw))
    }

    /// Tensorize an already assembled raw batch.
    pub fn collate_raw(&self, raw: &RawBatch) -> Result<ModelInput> {
        let mut input = self.processor.collate_fn(raw, self.prepare_labels)?;
        input.merge_batch_scoped(raw)?;
        if log::log_enabled!(log::Level::Debug) {
            for (key, value) in input.iter() {
                log::debug!("[DataCollator] {} -> {:?}", key, value.map(|t| t.dims()));
            }
        }
        Ok(input)
    }
}
