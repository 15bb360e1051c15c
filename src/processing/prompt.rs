//! Label prompt + sub-word encoding.
//!
//! Every example is encoded word by word behind a prompt listing the
//! entity types:
//!
//! ```text
//! [CLS] <<ENT>> person <<ENT>> location <<SEP>> Alice met Bob [SEP]
//! words_mask:  0 0 0 0 0 0                      1     2   3   0
//! ```
//!
//! `words_mask` carries the 1-based word index on the first sub-word of
//! each word, so the encoder can pool word embeddings back out.

use super::padding::{
    BatchSchema, FeatureKind, FeatureMap, FeatureValue, PaddedBatch, PaddingCollator,
};
use super::{i64_tensor, RawBatch, ATTENTION_MASK, INPUT_IDS, WORDS_MASK};
use crate::config::GLiNERConfig;
use crate::{Error, Result};
use std::sync::Arc;
use tokenizers::Tokenizer;

/// Fallback id for the sequence start token.
const TOKEN_START: u32 = 1;
/// Fallback id for the sequence end token.
const TOKEN_END: u32 = 2;

const START_CANDIDATES: [&str; 3] = ["[CLS]", "<s>", "<|startoftext|>"];
const END_CANDIDATES: [&str; 3] = ["[SEP]", "</s>", "<|endoftext|>"];

/// One encoded example, unpadded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodedPrompt {
    /// Sub-word ids.
    pub input_ids: Vec<i64>,
    /// All ones.
    pub attention_mask: Vec<i64>,
    /// 1-based word index on the first sub-word of each word.
    pub words_mask: Vec<i64>,
}

impl EncodedPrompt {
    /// Number of sub-words.
    #[must_use]
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    /// Whether nothing was encoded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }

    /// Number of prompt sub-words before the first text word.
    #[must_use]
    pub fn prompt_len(&self) -> usize {
        self.words_mask
            .iter()
            .position(|&w| w == 1)
            .unwrap_or(self.words_mask.len())
    }
}

/// Encodes prompts with a shared, read-only tokenizer.
#[derive(Clone)]
pub struct PromptEncoder {
    tokenizer: Arc<Tokenizer>,
    start_id: u32,
    end_id: u32,
    ent_id: u32,
    sep_id: u32,
}

impl std::fmt::Debug for PromptEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEncoder")
            .field("start_id", &self.start_id)
            .field("end_id", &self.end_id)
            .field("ent_id", &self.ent_id)
            .field("sep_id", &self.sep_id)
            .finish()
    }
}

impl PromptEncoder {
    /// Resolve the special tokens named by `config`.
    ///
    /// Fails if the tokenizer does not know `ent_token` or `sep_token`.
    pub fn new(tokenizer: Arc<Tokenizer>, config: &GLiNERConfig) -> Result<Self> {
        let lookup = |token: &str| {
            tokenizer.token_to_id(token).ok_or_else(|| {
                Error::config(format!(
                    "tokenizer has no id for special token '{}'",
                    token
                ))
            })
        };
        let ent_id = lookup(&config.ent_token)?;
        let sep_id = lookup(&config.sep_token)?;

        let first_known = |candidates: &[&str], fallback: u32| {
            candidates
                .iter()
                .find_map(|t| tokenizer.token_to_id(t))
                .unwrap_or(fallback)
        };
        let start_id = first_known(&START_CANDIDATES, TOKEN_START);
        let end_id = first_known(&END_CANDIDATES, TOKEN_END);

        Ok(Self {
            tokenizer,
            start_id,
            end_id,
            ent_id,
            sep_id,
        })
    }

    /// The tokenizer.
    #[must_use]
    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    /// Encode one example behind the label prompt.
    pub fn encode(&self, words: &[String], labels: &[&str]) -> Result<EncodedPrompt> {
        let mut input_ids: Vec<i64> = vec![i64::from(self.start_id)];
        let mut words_mask: Vec<i64> = vec![0];

        for label in labels {
            input_ids.push(i64::from(self.ent_id));
            words_mask.push(0);
            for id in self.subword_ids(label)? {
                input_ids.push(id);
                words_mask.push(0);
            }
        }
        input_ids.push(i64::from(self.sep_id));
        words_mask.push(0);

        for (word_idx, word) in words.iter().enumerate() {
            for (k, id) in self.subword_ids(word)?.into_iter().enumerate() {
                input_ids.push(id);
                words_mask.push(if k == 0 { word_idx as i64 + 1 } else { 0 });
            }
        }
        input_ids.push(i64::from(self.end_id));
        words_mask.push(0);

        let attention_mask = vec![1; input_ids.len()];
        Ok(EncodedPrompt {
            input_ids,
            attention_mask,
            words_mask,
        })
    }

    /// Encode and pad every example of a raw batch, using its class table
    /// as the prompt.
    pub fn encode_batch(&self, raw: &RawBatch) -> Result<PaddedBatch> {
        let labels: Vec<&str> = raw.id_to_classes.values().map(String::as_str).collect();
        let features = raw
            .tokens
            .iter()
            .map(|words| {
                let prompt = self.encode(words, &labels)?;
                let mut features = FeatureMap::new();
                features.insert(
                    INPUT_IDS.into(),
                    FeatureValue::Tensor(i64_tensor(prompt.input_ids)?),
                );
                features.insert(
                    ATTENTION_MASK.into(),
                    FeatureValue::Tensor(i64_tensor(prompt.attention_mask)?),
                );
                features.insert(
                    WORDS_MASK.into(),
                    FeatureValue::Tensor(i64_tensor(prompt.words_mask)?),
                );
                Ok(features)
            })
            .collect::<Result<Vec<_>>>()?;
        prompt_collator().pad(&features)
    }

    fn subword_ids(&self, piece: &str) -> Result<Vec<i64>> {
        let encoding = self
            .tokenizer
            .encode(piece, false)
            .map_err(Error::tokenizer)?;
        Ok(encoding.get_ids().iter().map(|&id| i64::from(id)).collect())
    }
}

fn prompt_collator() -> PaddingCollator {
    PaddingCollator::new(
        BatchSchema::new()
            .with(INPUT_IDS, FeatureKind::Sequence)
            .with(ATTENTION_MASK, FeatureKind::Sequence)
            .with(WORDS_MASK, FeatureKind::Sequence),
    )
}
