//! The GLiNER inference pipeline.
//!
//! # Coordinate flow
//!
//! ```text
//!  text ──split──▶ words + OffsetMap ──collate──▶ ModelInput ──encoder──▶ logits
//!                        │                                                 │
//!                        │                                             decoder
//!                        ▼                                                 ▼
//!   Entity (chars) ◀── reconstruct_entities ◀──────────── SpanHypothesis (words)
//! ```
//!
//! Word indices never leave this module: everything returned to a caller
//! is in character offsets of the original text.

use crate::checkpoint::{Checkpoint, LoadOptions, TOKENIZER_FILE};
use crate::config::{GLiNERConfig, PredictOptions, CONFIG_FILE};
use crate::decoding::{decoder_for, Decoder};
use crate::entity::{Entity, SpanHypothesis};
use crate::offset::{CharSlicer, OffsetMap};
use crate::processing::{DataCollator, ModelInput, RawBatch, RawExample};
use crate::splitter::{SplitterType, WordsSplitter};
use crate::{Error, Result};
use candle_core::{Device, Tensor};
use std::path::Path;
use std::sync::Arc;
use tokenizers::Tokenizer;

/// The encoder + scoring head behind a GLiNER checkpoint.
///
/// Implementations receive the collated [`ModelInput`] and return the
/// logits the checkpoint's decoder expects: `[batch, seq_len, max_width,
/// num_classes]` for span modes, `[3, batch, seq_len, num_classes]` for
/// `token_level`.
pub trait EncoderModel {
    /// Run the forward pass.
    fn forward(&self, input: &ModelInput) -> Result<Tensor>;

    /// Device the model's weights live on.
    fn device(&self) -> &Device;

    /// Whether the model accepts inputs on any device (exported graphs
    /// that manage placement themselves). Inputs are not moved for these.
    fn is_device_agnostic(&self) -> bool {
        false
    }

    /// Persist weights into a checkpoint directory. Models without
    /// writable weights keep the default, which writes nothing.
    fn save_weights(&self, _dir: &Path) -> Result<()> {
        Ok(())
    }
}

/// Zero-shot NER over an [`EncoderModel`].
pub struct GLiNER<M> {
    config: GLiNERConfig,
    tokenizer: Arc<Tokenizer>,
    splitter: Box<dyn WordsSplitter>,
    collator: DataCollator,
    decoder: Box<dyn Decoder>,
    model: M,
}

impl<M> std::fmt::Debug for GLiNER<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GLiNER")
            .field("span_mode", &self.config.span_mode)
            .field("splitter", &self.splitter.name())
            .field("decoder", &self.decoder.name())
            .finish()
    }
}

impl<M: EncoderModel> GLiNER<M> {
    /// Assemble a pipeline from its parts.
    ///
    /// A tokenizer whose size disagrees with `config.vocab_size` is only
    /// warned about; embeddings may be resized afterwards.
    pub fn new(config: GLiNERConfig, tokenizer: Tokenizer, model: M) -> Result<Self> {
        config.validate()?;
        let vocab = tokenizer.get_vocab_size(true);
        if config.vocab_size != -1 && config.vocab_size != vocab as i64 {
            log::warn!(
                "[GLiNER] Config vocab_size ({}) does not match tokenizer size ({}); \
                 resize the encoder embeddings if this is unintended",
                config.vocab_size,
                vocab
            );
        }

        let splitter = SplitterType::from_name(&config.words_splitter_type)?.build();
        let tokenizer = Arc::new(tokenizer);
        let collator = DataCollator::from_config(&config, Arc::clone(&tokenizer))?;
        let decoder = decoder_for(&config.span_mode);

        Ok(Self {
            config,
            tokenizer,
            splitter,
            collator,
            decoder,
            model,
        })
    }

    /// Load a checkpoint by local path or HuggingFace id.
    ///
    /// `load_model` builds the encoder from the resolved checkpoint
    /// (weights path, config).
    pub fn from_pretrained<F>(model_id: &str, options: &LoadOptions, load_model: F) -> Result<Self>
    where
        F: FnOnce(&Checkpoint) -> Result<M>,
    {
        let mut checkpoint = Checkpoint::resolve(model_id, options)?;
        let tokenizer = checkpoint.load_tokenizer()?;
        let model = load_model(&checkpoint)?;
        log::info!(
            "[GLiNER] Loaded {} (span_mode={}, max_width={})",
            model_id,
            checkpoint.config().span_mode,
            checkpoint.config().max_width
        );
        Self::new(checkpoint.config().clone(), tokenizer, model)
    }

    /// Replace the word splitter.
    #[must_use]
    pub fn with_splitter(mut self, splitter: Box<dyn WordsSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    /// Replace the decoder.
    #[must_use]
    pub fn with_decoder(mut self, decoder: Box<dyn Decoder>) -> Self {
        self.decoder = decoder;
        self
    }

    /// Configuration.
    #[must_use]
    pub fn config(&self) -> &GLiNERConfig {
        &self.config
    }

    /// Tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// The wrapped model.
    #[must_use]
    pub fn model(&self) -> &M {
        &self.model
    }

    /// Build model inputs for `texts` against one label set.
    ///
    /// Returns the encoder-ready input and the raw batch (tokens, class
    /// table, offset maps) needed to decode and reconstruct entities.
    pub fn prepare_model_inputs(
        &self,
        texts: &[&str],
        labels: &[&str],
    ) -> Result<(ModelInput, RawBatch)> {
        let mut examples = Vec::with_capacity(texts.len());
        let mut offset_maps = Vec::with_capacity(texts.len());
        for text in texts {
            let mut words = Vec::new();
            let mut offsets = OffsetMap::new();
            for token in self.splitter.split(text) {
                offsets.push(token.start, token.end);
                words.push(token.text);
            }
            examples.push(RawExample::new(words));
            offset_maps.push(offsets);
        }

        let labels: Vec<String> = labels.iter().map(|l| l.to_string()).collect();
        let (input, mut raw) = self.collator.collate(&examples, Some(&labels))?;
        raw.offset_maps = offset_maps;

        let input = if self.model.is_device_agnostic() {
            input
        } else {
            input.to_device(self.model.device())?
        };
        log::debug!(
            "[GLiNER] Prepared {} texts x {} labels",
            raw.len(),
            raw.num_classes()
        );
        Ok((input, raw))
    }

    /// Predict entities for a batch of texts.
    pub fn batch_predict_entities(
        &self,
        texts: &[&str],
        labels: &[&str],
        options: &PredictOptions,
    ) -> Result<Vec<Vec<Entity>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let (input, raw) = self.prepare_model_inputs(texts, labels)?;
        let scores = self.model.forward(&input)?;
        let hypotheses = self
            .decoder
            .decode(&raw.tokens, &raw.id_to_classes, &scores, options)?;
        reconstruct_entities(texts, &raw, &hypotheses)
    }

    /// Predict entities for one text.
    pub fn predict_entities(
        &self,
        text: &str,
        labels: &[&str],
        options: &PredictOptions,
    ) -> Result<Vec<Entity>> {
        Ok(self
            .batch_predict_entities(&[text], labels, options)?
            .into_iter()
            .next()
            .unwrap_or_default())
    }

    /// Write config, tokenizer and (if the model supports it) weights to
    /// `dir`, creating it if needed.
    pub fn save_pretrained(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        self.config.to_file(dir.join(CONFIG_FILE))?;
        self.tokenizer
            .save(dir.join(TOKENIZER_FILE), true)
            .map_err(Error::tokenizer)?;
        self.model.save_weights(dir)?;
        log::info!("[GLiNER] Saved checkpoint to {}", dir.display());
        Ok(())
    }
}

/// Map token-indexed hypotheses back to character entities.
///
/// Entity text is sliced from `texts`, never from the tokens. Order is
/// kept as given. A token index outside its text's offset map, or an
/// inverted span, is an [`Error::Alignment`].
pub fn reconstruct_entities(
    texts: &[&str],
    raw: &RawBatch,
    hypotheses: &[Vec<SpanHypothesis>],
) -> Result<Vec<Vec<Entity>>> {
    if texts.len() != hypotheses.len() || texts.len() > raw.offset_maps.len() {
        return Err(Error::invalid_input(format!(
            "{} texts, {} hypothesis lists, {} offset maps",
            texts.len(),
            hypotheses.len(),
            raw.offset_maps.len()
        )));
    }

    texts
        .iter()
        .zip(hypotheses)
        .zip(&raw.offset_maps)
        .enumerate()
        .map(|(text_index, ((text, spans), offsets))| {
            let slicer = CharSlicer::new(text);
            spans
                .iter()
                .map(|span| reconstruct_one(text_index, &slicer, offsets, span))
                .collect::<Result<Vec<_>>>()
        })
        .collect()
}

fn reconstruct_one(
    text_index: usize,
    slicer: &CharSlicer<'_>,
    offsets: &OffsetMap,
    span: &SpanHypothesis,
) -> Result<Entity> {
    let alignment = |token_index| Error::Alignment {
        text_index,
        token_index,
        num_tokens: offsets.len(),
    };
    let (start, _) = offsets
        .get(span.start)
        .ok_or_else(|| alignment(span.start))?;
    let (_, end) = offsets.get(span.end).ok_or_else(|| alignment(span.end))?;
    if span.start > span.end {
        return Err(alignment(span.end));
    }
    let surface = slicer.slice(start, end).ok_or_else(|| alignment(span.end))?;
    Ok(Entity::new(
        surface,
        span.label.clone(),
        start,
        end,
        span.score,
    ))
}
