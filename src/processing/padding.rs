//! Heterogeneous padding engine.
//!
//! Turns per-example feature maps into one batch tensor per key. Each key
//! has a [`FeatureKind`] declared up front in a [`BatchSchema`]; the kind,
//! not the runtime shape of the first example, decides how values are
//! padded.
//!
//! ```text
//! Sequence     [3] [2]              -> [2, 3]            right-pad, stack
//! Table        [4,2] [6,2]          -> [2, 6, 2]         pad rows+cols, stack
//! TokenLabels  [1,3,5,2] [1,3,4,4]  -> [1, 6, 5, 4]      pad seq+classes, cat axis 1
//! List         [1.,2.] [3.]         -> [2, 2] f32        right-pad
//! Scalar       4 7                  -> [2] f32           no padding
//! ```
//!
//! Padding is always zero. A zero in a padded slot is never a valid class
//! or score on its own; consumers pair it with a mask or a length.

use crate::{Error, Result};
use candle_core::{DType, Device, Tensor};
use std::collections::BTreeMap;

/// How values of one feature key are batched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeatureKind {
    /// Rank-1 tensor, right-padded to the longest example and stacked.
    Sequence,
    /// Rank-2 tensor, padded along both axes and stacked.
    Table,
    /// Rank-4 `[1, sub, seq_len, num_classes]` token-level labels, padded
    /// along the last two axes and concatenated along axis 1.
    TokenLabels,
    /// Ragged list of numbers, right-padded into an `f32` matrix.
    List,
    /// One number per example, collected into an `f32` vector.
    Scalar,
}

impl FeatureKind {
    fn name(self) -> &'static str {
        match self {
            FeatureKind::Sequence => "rank-1 tensor",
            FeatureKind::Table => "rank-2 tensor",
            FeatureKind::TokenLabels => "rank-4 token labels",
            FeatureKind::List => "list",
            FeatureKind::Scalar => "scalar",
        }
    }
}

/// One per-example feature value.
#[derive(Debug, Clone)]
pub enum FeatureValue {
    /// A tensor of any rank.
    Tensor(Tensor),
    /// A ragged list of numbers.
    List(Vec<f32>),
    /// A single number.
    Scalar(f64),
}

impl FeatureValue {
    fn kind_name(&self) -> &'static str {
        match self {
            FeatureValue::Tensor(_) => "tensor",
            FeatureValue::List(_) => "list",
            FeatureValue::Scalar(_) => "scalar",
        }
    }
}

impl From<Tensor> for FeatureValue {
    fn from(t: Tensor) -> Self {
        FeatureValue::Tensor(t)
    }
}

impl From<Vec<f32>> for FeatureValue {
    fn from(v: Vec<f32>) -> Self {
        FeatureValue::List(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        FeatureValue::Scalar(v)
    }
}

/// Features of a single example, keyed by name.
pub type FeatureMap = BTreeMap<String, FeatureValue>;

/// Padded batch: one tensor per key, leading dimension is the batch.
pub type PaddedBatch = BTreeMap<String, Tensor>;

/// Declared feature kinds for every key of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchSchema {
    kinds: BTreeMap<String, FeatureKind>,
}

impl BatchSchema {
    /// Create an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a key.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, kind: FeatureKind) -> Self {
        self.kinds.insert(key.into(), kind);
        self
    }

    /// Kind declared for `key`.
    #[must_use]
    pub fn kind(&self, key: &str) -> Option<FeatureKind> {
        self.kinds.get(key).copied()
    }

    /// Declared keys, in order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.kinds.keys().map(String::as_str)
    }

    /// Number of declared keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    /// Whether no keys are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

/// Pads batches of feature maps according to a [`BatchSchema`].
#[derive(Debug, Clone)]
pub struct PaddingCollator {
    schema: BatchSchema,
}

impl PaddingCollator {
    /// Create a collator. List and scalar tensors are built on the CPU;
    /// [`ModelInput::to_device`](crate::ModelInput::to_device) moves them.
    #[must_use]
    pub fn new(schema: BatchSchema) -> Self {
        Self { schema }
    }

    /// Pad a batch. The input is never modified.
    pub fn pad(&self, batch: &[FeatureMap]) -> Result<PaddedBatch> {
        if batch.is_empty() {
            return Err(Error::EmptyBatch);
        }
        for (index, example) in batch.iter().enumerate() {
            if let Some(key) = example.keys().find(|k| self.schema.kind(k).is_none()) {
                return Err(Error::config(format!(
                    "key '{}' of example {} is not declared in the batch schema",
                    key, index
                )));
            }
        }

        let mut padded = PaddedBatch::new();
        for (key, &kind) in &self.schema.kinds {
            let values = batch
                .iter()
                .enumerate()
                .map(|(index, example)| {
                    example.get(key).ok_or_else(|| Error::MissingFeature {
                        key: key.clone(),
                        index,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            let tensor = self.pad_key(key, kind, &values)?;
            log::debug!("[Padding] {} ({}) -> {:?}", key, kind.name(), tensor.dims());
            padded.insert(key.clone(), tensor);
        }
        Ok(padded)
    }

    fn pad_key(&self, key: &str, kind: FeatureKind, values: &[&FeatureValue]) -> Result<Tensor> {
        match kind {
            FeatureKind::Sequence | FeatureKind::Table | FeatureKind::TokenLabels => {
                let tensors = values
                    .iter()
                    .map(|v| match v {
                        FeatureValue::Tensor(t) => Ok(t),
                        other => Err(mismatch(key, kind, other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                match kind {
                    FeatureKind::Sequence => pad_sequences(key, &tensors),
                    FeatureKind::Table => pad_2d(key, &tensors),
                    _ => pad_token_labels(key, &tensors),
                }
            }
            FeatureKind::List => {
                let lists = values
                    .iter()
                    .map(|v| match v {
                        FeatureValue::List(l) => Ok(l.as_slice()),
                        other => Err(mismatch(key, kind, other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                pad_lists(key, &lists, &Device::Cpu)
            }
            FeatureKind::Scalar => {
                let scalars = values
                    .iter()
                    .map(|v| match v {
                        FeatureValue::Scalar(s) => Ok(*s),
                        other => Err(mismatch(key, kind, other)),
                    })
                    .collect::<Result<Vec<_>>>()?;
                stack_scalars(key, &scalars, &Device::Cpu)
            }
        }
    }
}

fn mismatch(key: &str, kind: FeatureKind, value: &FeatureValue) -> Error {
    Error::FeatureMismatch {
        key: key.to_string(),
        expected: kind.name(),
        found: value.kind_name(),
    }
}

/// Bring `tensor` to `rank`, dropping one leading unit axis if present.
fn with_rank(key: &str, tensor: &Tensor, rank: usize) -> Result<Tensor> {
    let dims = tensor.dims();
    if dims.len() == rank {
        Ok(tensor.clone())
    } else if dims.len() == rank + 1 && dims[0] == 1 {
        Ok(tensor.squeeze(0)?)
    } else {
        Err(Error::UnsupportedRank {
            key: key.to_string(),
            rank: dims.len(),
        })
    }
}

/// Right-pad rank-1 tensors with zeros to the longest and stack them.
///
/// `[1, 2, 3]` and `[1, 2]` become `[[1, 2, 3], [1, 2, 0]]`.
pub fn pad_sequences(key: &str, tensors: &[&Tensor]) -> Result<Tensor> {
    if tensors.is_empty() {
        return Err(Error::EmptyFeature {
            key: key.to_string(),
        });
    }
    let tensors = tensors
        .iter()
        .map(|t| with_rank(key, t, 1))
        .collect::<Result<Vec<_>>>()?;
    let max_len = tensors.iter().map(|t| t.dims()[0]).max().unwrap_or(0);

    let padded = tensors
        .iter()
        .map(|t| t.pad_with_zeros(0, 0, max_len - t.dims()[0]))
        .collect::<candle_core::Result<Vec<_>>>()?;
    Ok(Tensor::stack(&padded, 0)?)
}

/// Pad rank-2 tensors to `[max_rows, max_cols]` and stack them.
pub fn pad_2d(key: &str, tensors: &[&Tensor]) -> Result<Tensor> {
    if tensors.is_empty() {
        return Err(Error::EmptyFeature {
            key: key.to_string(),
        });
    }
    let tensors = tensors
        .iter()
        .map(|t| with_rank(key, t, 2))
        .collect::<Result<Vec<_>>>()?;
    let max_rows = tensors.iter().map(|t| t.dims()[0]).max().unwrap_or(0);
    let max_cols = tensors.iter().map(|t| t.dims()[1]).max().unwrap_or(0);

    let padded = tensors
        .iter()
        .map(|t| {
            let (rows, cols) = (t.dims()[0], t.dims()[1]);
            t.pad_with_zeros(1, 0, max_cols - cols)?
                .pad_with_zeros(0, 0, max_rows - rows)
        })
        .collect::<candle_core::Result<Vec<_>>>()?;
    Ok(Tensor::stack(&padded, 0)?)
}

/// Pad rank-4 `[1, sub, seq_len, num_classes]` label tensors along the
/// sequence and class axes, then concatenate along axis 1.
///
/// The result is `[1, sum(sub), max_seq_len, max_num_classes]`.
pub fn pad_token_labels(key: &str, tensors: &[&Tensor]) -> Result<Tensor> {
    if tensors.is_empty() {
        return Err(Error::EmptyFeature {
            key: key.to_string(),
        });
    }
    for t in tensors {
        if t.rank() != 4 {
            return Err(Error::UnsupportedRank {
                key: key.to_string(),
                rank: t.rank(),
            });
        }
    }
    let max_seq_len = tensors.iter().map(|t| t.dims()[2]).max().unwrap_or(0);
    let max_num_classes = tensors.iter().map(|t| t.dims()[3]).max().unwrap_or(0);

    let padded = tensors
        .iter()
        .map(|t| {
            let (seq_len, num_classes) = (t.dims()[2], t.dims()[3]);
            t.pad_with_zeros(3, 0, max_num_classes - num_classes)?
                .pad_with_zeros(2, 0, max_seq_len - seq_len)
        })
        .collect::<candle_core::Result<Vec<_>>>()?;
    Ok(Tensor::cat(&padded, 1)?)
}

/// Right-pad ragged lists with zeros into a `[batch, max_len]` `f32` tensor.
pub fn pad_lists(key: &str, lists: &[&[f32]], device: &Device) -> Result<Tensor> {
    if lists.is_empty() {
        return Err(Error::EmptyFeature {
            key: key.to_string(),
        });
    }
    let max_len = lists.iter().map(|l| l.len()).max().unwrap_or(0);
    let mut data = Vec::with_capacity(lists.len() * max_len);
    for list in lists {
        data.extend_from_slice(list);
        data.resize(data.len() + max_len - list.len(), 0.0);
    }
    Ok(Tensor::from_vec(data, (lists.len(), max_len), device)?)
}

/// Collect one scalar per example into a `[batch]` `f32` tensor.
pub fn stack_scalars(key: &str, scalars: &[f64], device: &Device) -> Result<Tensor> {
    if scalars.is_empty() {
        return Err(Error::EmptyFeature {
            key: key.to_string(),
        });
    }
    Ok(Tensor::new(scalars, device)?.to_dtype(DType::F32)?)
}
