//! # gliner-infer
//!
//! GLiNER-style zero-shot NER inference: batch collation and entity
//! reconstruction around a pluggable encoder.
//!
//! - **Collation**: ragged word sequences -> padded prompt/span tensors
//! - **Reconstruction**: word-indexed span scores -> character-offset entities
//! - **Checkpoints**: local directories or HuggingFace snapshots
//!
//! ## Pipeline
//!
//! ```text
//! texts, labels
//!     │ WordsSplitter            (words + OffsetMap per text)
//!     ▼
//! RawExample*
//!     │ DataCollator             (span or token strategy, fixed per checkpoint)
//!     ▼
//! ModelInput ──▶ EncoderModel::forward ──▶ logits
//!                                             │ Decoder (threshold + greedy)
//!                                             ▼
//!                                     SpanHypothesis (word indices)
//!                                             │ reconstruct_entities
//!                                             ▼
//!                                     Entity (char offsets)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use gliner_infer::prelude::*;
//!
//! let model = GLiNER::from_pretrained(DEFAULT_GLINER_MODEL, &LoadOptions::default(), |ckpt| {
//!     MyEncoder::load(ckpt.weights_path())
//! })?;
//! let entities = model.predict_entities(
//!     "Alice met Bob in Paris",
//!     &["person", "location"],
//!     &PredictOptions::default(),
//! )?;
//! ```
//!
//! ## Padding Engine
//!
//! Batch tensors are built by [`PaddingCollator`] from an explicit
//! [`BatchSchema`]:
//!
//! ```rust
//! use gliner_infer::{BatchSchema, FeatureKind, FeatureMap, FeatureValue, PaddingCollator};
//! use candle_core::{Device, Tensor};
//!
//! let schema = BatchSchema::new().with("input_ids", FeatureKind::Sequence);
//! let batch: Vec<FeatureMap> = [vec![1i64, 2, 3], vec![1, 2]]
//!     .into_iter()
//!     .map(|ids| {
//!         let t = Tensor::new(ids.as_slice(), &Device::Cpu).unwrap();
//!         FeatureMap::from([("input_ids".to_string(), FeatureValue::Tensor(t))])
//!     })
//!     .collect();
//! let padded = PaddingCollator::new(schema).pad(&batch).unwrap();
//! assert_eq!(
//!     padded["input_ids"].to_vec2::<i64>().unwrap(),
//!     vec![vec![1, 2, 3], vec![1, 2, 0]]
//! );
//! ```
//!
//! ## Feature Flags
//!
//! ```toml
//! [dependencies]
//! gliner-infer = "0.1"                                              # + hub downloads
//! gliner-infer = { version = "0.1", default-features = false }      # local checkpoints only
//! gliner-infer = { version = "0.1", features = ["metal"] }          # + Apple GPU
//! gliner-infer = { version = "0.1", features = ["cuda"] }           # + NVIDIA GPU
//! ```

#![warn(missing_docs)]

pub mod checkpoint;
pub mod config;
pub mod decoding;
pub mod device;
mod entity;
mod error;
pub mod model;
pub mod offset;
pub mod processing;
pub mod splitter;

use candle_core::{Device, Tensor};

/// A scripted encoder for testing.
///
/// Returns whatever the closure computes from the model input, so tests
/// can drive decoding without real weights.
///
/// # Example
///
/// ```rust
/// use gliner_infer::{MockEncoder, EncoderModel, ModelInput};
/// use candle_core::{DType, Device, Tensor};
///
/// let mock = MockEncoder::new(|_input| {
///     Ok(Tensor::zeros((1, 3, 12, 1), DType::F32, &Device::Cpu)?)
/// });
/// let logits = mock.forward(&ModelInput::new()).unwrap();
/// assert_eq!(logits.dims(), &[1, 3, 12, 1]);
/// ```
pub struct MockEncoder {
    forward_fn: Box<dyn Fn(&ModelInput) -> Result<Tensor> + Send + Sync>,
    device: Device,
    device_agnostic: bool,
}

impl MockEncoder {
    /// Create a mock encoder on the CPU.
    pub fn new<F>(forward_fn: F) -> Self
    where
        F: Fn(&ModelInput) -> Result<Tensor> + Send + Sync + 'static,
    {
        Self {
            forward_fn: Box::new(forward_fn),
            device: Device::Cpu,
            device_agnostic: false,
        }
    }

    /// Mark the mock as device-agnostic.
    #[must_use]
    pub fn device_agnostic(mut self, agnostic: bool) -> Self {
        self.device_agnostic = agnostic;
        self
    }
}

impl std::fmt::Debug for MockEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockEncoder")
            .field("device_agnostic", &self.device_agnostic)
            .finish()
    }
}

impl EncoderModel for MockEncoder {
    fn forward(&self, input: &ModelInput) -> Result<Tensor> {
        (self.forward_fn)(input)
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn is_device_agnostic(&self) -> bool {
        self.device_agnostic
    }
}

pub mod prelude {
    //! Commonly used items, re-exported for convenience.
    //!
    //! ```rust
    //! use gliner_infer::prelude::*;
    //!
    //! let opts = PredictOptions::default().threshold(0.3).flat_ner(false);
    //! assert!(!opts.multi_label);
    //! ```
    pub use crate::checkpoint::{Checkpoint, LoadOptions, WeightsFormat};
    pub use crate::config::{GLiNERConfig, PredictOptions, SpanMode};
    pub use crate::entity::{Entity, SpanHypothesis};
    pub use crate::error::{Error, Result};
    pub use crate::model::{EncoderModel, GLiNER};
    pub use crate::offset::OffsetMap;
    pub use crate::splitter::{WhitespaceTokenSplitter, WordsSplitter};
    pub use crate::{MockEncoder, DEFAULT_GLINER_MODEL};
}

// Re-exports
pub use checkpoint::{Checkpoint, LoadOptions, TokenizerSource, WeightsFormat};
pub use config::{GLiNERConfig, PredictOptions, SpanMode};
pub use decoding::{greedy_search, Decoder, SpanDecoder, TokenDecoder};
pub use device::best_device;
pub use entity::{Entity, SpanHypothesis};
pub use error::{Error, Result};
pub use model::{reconstruct_entities, EncoderModel, GLiNER};
pub use offset::{char_slice, CharSlicer, OffsetMap};
pub use processing::{
    BatchSchema, DataCollator, DataProcessor, FeatureKind, FeatureMap, FeatureValue, ModelInput,
    NerSpan, PaddedBatch, PaddingCollator, Processor, RawBatch, RawExample, SpanProcessor,
    TokenProcessor,
};
pub use splitter::{SpaceSplitter, SplitterType, WhitespaceTokenSplitter, WordToken, WordsSplitter};

/// Default GLiNER checkpoint (span mode).
pub const DEFAULT_GLINER_MODEL: &str = "urchade/gliner_small-v2.1";
