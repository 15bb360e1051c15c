//! Checkpoint configuration and prediction options.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the config file inside a checkpoint directory.
pub const CONFIG_FILE: &str = "gliner_config.json";

/// Span representation mode.
///
/// Checkpoints name many span-based representations (`markerV0`,
/// `query`, `mlp`, ...). They all collate the same way, so only
/// `token_level` is distinguished; the original name is kept for
/// round-tripping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SpanMode {
    /// Per-token start/end/inside classification.
    TokenLevel,
    /// Explicit (start, end) span candidates.
    Span(String),
}

impl SpanMode {
    /// Whether this is token-level mode.
    #[must_use]
    pub fn is_token_level(&self) -> bool {
        matches!(self, SpanMode::TokenLevel)
    }

    /// Config string for this mode.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            SpanMode::TokenLevel => "token_level",
            SpanMode::Span(name) => name,
        }
    }
}

impl Default for SpanMode {
    fn default() -> Self {
        SpanMode::Span("markerV0".to_string())
    }
}

impl From<String> for SpanMode {
    fn from(s: String) -> Self {
        if s == "token_level" {
            SpanMode::TokenLevel
        } else {
            SpanMode::Span(s)
        }
    }
}

impl From<SpanMode> for String {
    fn from(mode: SpanMode) -> Self {
        mode.as_str().to_string()
    }
}

impl std::fmt::Display for SpanMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mirror of `gliner_config.json`.
///
/// Unknown keys (training hyper-parameters, encoder sub-configs) are
/// ignored on load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GLiNERConfig {
    /// Backbone encoder identifier.
    pub model_name: String,
    /// Span representation mode.
    pub span_mode: SpanMode,
    /// Maximum span width (in word tokens) for span candidates.
    pub max_width: usize,
    /// Maximum number of word tokens per text; longer texts are truncated.
    pub max_len: usize,
    /// Entity-type marker token.
    pub ent_token: String,
    /// Prompt/text separator token.
    pub sep_token: String,
    /// Token id of `ent_token`; `-1` for legacy checkpoints.
    pub class_token_index: i64,
    /// Encoder vocabulary size; `-1` when unknown.
    pub vocab_size: i64,
    /// Word splitter name.
    pub words_splitter_type: String,
    /// Hidden dimension of the span/label heads.
    pub hidden_size: usize,
    /// Maximum number of entity types per prompt.
    pub max_types: usize,
}

impl Default for GLiNERConfig {
    fn default() -> Self {
        Self {
            model_name: "microsoft/deberta-v3-small".to_string(),
            span_mode: SpanMode::default(),
            max_width: 12,
            max_len: 384,
            ent_token: "<<ENT>>".to_string(),
            sep_token: "<<SEP>>".to_string(),
            class_token_index: -1,
            vocab_size: -1,
            words_splitter_type: "whitespace".to_string(),
            hidden_size: 512,
            max_types: 25,
        }
    }
}

impl GLiNERConfig {
    /// Token-level configuration (NuNER-style checkpoints).
    #[must_use]
    pub fn token_level() -> Self {
        Self {
            span_mode: SpanMode::TokenLevel,
            ..Self::default()
        }
    }

    /// Load from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::MissingArtifact(path.to_path_buf()));
        }
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Write as pretty JSON.
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Reject values no batch could be built from.
    pub fn validate(&self) -> Result<()> {
        if self.max_width == 0 {
            return Err(Error::config("max_width must be at least 1"));
        }
        if self.max_len == 0 {
            return Err(Error::config("max_len must be at least 1"));
        }
        if self.ent_token.is_empty() || self.sep_token.is_empty() {
            return Err(Error::config("ent_token and sep_token must be non-empty"));
        }
        Ok(())
    }

    /// Whether the checkpoint predates stored special-token indices and
    /// needs its tokenizer extended.
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.class_token_index == -1 || self.vocab_size == -1
    }
}

/// Options for a prediction call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PredictOptions {
    /// Forbid overlapping entities.
    pub flat_ner: bool,
    /// Minimum score (exclusive) for a span to be kept.
    pub threshold: f32,
    /// Allow one span to carry several labels.
    pub multi_label: bool,
}

impl Default for PredictOptions {
    fn default() -> Self {
        Self {
            flat_ner: true,
            threshold: 0.5,
            multi_label: false,
        }
    }
}

impl PredictOptions {
    /// Set flat NER.
    #[must_use]
    pub fn flat_ner(mut self, flat_ner: bool) -> Self {
        self.flat_ner = flat_ner;
        self
    }

    /// Set score threshold.
    #[must_use]
    pub fn threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set multi-label decoding.
    #[must_use]
    pub fn multi_label(mut self, multi_label: bool) -> Self {
        self.multi_label = multi_label;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_mode_round_trip() {
        let mode: SpanMode = serde_json::from_str("\"token_level\"").unwrap();
        assert!(mode.is_token_level());

        let mode: SpanMode = serde_json::from_str("\"markerV0\"").unwrap();
        assert_eq!(mode, SpanMode::Span("markerV0".into()));
        assert_eq!(serde_json::to_string(&mode).unwrap(), "\"markerV0\"");
    }

    #[test]
    fn test_config_defaults_fill_missing_keys() {
        let json = r#"{"model_name": "x", "span_mode": "token_level", "dropout": 0.4}"#;
        let config: GLiNERConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.model_name, "x");
        assert!(config.span_mode.is_token_level());
        assert_eq!(config.max_width, 12);
        assert_eq!(config.ent_token, "<<ENT>>");
        assert!(config.is_legacy());
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        let config = GLiNERConfig {
            max_width: 8,
            class_token_index: 128002,
            vocab_size: 128004,
            ..GLiNERConfig::default()
        };
        config.to_file(&path).unwrap();

        let loaded = GLiNERConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
        assert!(!loaded.is_legacy());
    }

    #[test]
    fn test_missing_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        match GLiNERConfig::from_file(&path) {
            Err(Error::MissingArtifact(p)) => assert_eq!(p, path),
            other => panic!("expected MissingArtifact, got {:?}", other),
        }
    }

    #[test]
    fn test_validate() {
        let bad = GLiNERConfig {
            max_width: 0,
            ..GLiNERConfig::default()
        };
        assert!(bad.validate().is_err());
        assert!(GLiNERConfig::default().validate().is_ok());
    }

    #[test]
    fn test_predict_options_builder() {
        let opts = PredictOptions::default()
            .flat_ner(false)
            .threshold(0.3)
            .multi_label(true);
        assert!(!opts.flat_ner);
        assert!((opts.threshold - 0.3).abs() < f32::EPSILON);
        assert!(opts.multi_label);
    }
}
