//! Checkpoint artifact resolution.
//!
//! A checkpoint is a directory holding:
//!
//! ```text
//! gliner_config.json          GLiNERConfig
//! tokenizer.json              sub-word tokenizer
//! pytorch_model.bin           weights (or model.safetensors / model.onnx)
//! ```
//!
//! An identifier naming an existing directory is used as is; anything else
//! is fetched as a HuggingFace snapshot (feature `hub`).
//!
//! Checkpoints that ship only config and weights borrow the tokenizer of
//! their base encoder (`config.model_name`), unless
//! [`LoadOptions::load_tokenizer()`] demands the checkpoint's own.

use crate::config::{GLiNERConfig, CONFIG_FILE};
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use tokenizers::{AddedToken, Tokenizer};

/// Tokenizer file name.
pub const TOKENIZER_FILE: &str = "tokenizer.json";
/// Extra token legacy checkpoints need besides `ent_token`/`sep_token`.
pub const FLERT_TOKEN: &str = "[FLERT]";

/// Weights file format.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WeightsFormat {
    /// `pytorch_model.bin`, falling back to `model.safetensors`.
    #[default]
    Native,
    /// An exported ONNX graph with the given file name.
    Onnx(String),
}

impl WeightsFormat {
    /// ONNX export under its usual name.
    #[must_use]
    pub fn onnx() -> Self {
        WeightsFormat::Onnx("model.onnx".to_string())
    }

    fn candidates(&self) -> Vec<&str> {
        match self {
            WeightsFormat::Native => vec!["pytorch_model.bin", "model.safetensors"],
            WeightsFormat::Onnx(name) => vec![name.as_str()],
        }
    }
}

/// How to load a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadOptions {
    /// Weights to look for.
    pub weights: WeightsFormat,
    /// Extend legacy tokenizers with the prompt tokens.
    pub resize_token_embeddings: bool,
    /// Require `tokenizer.json` inside the checkpoint.
    pub load_tokenizer: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            weights: WeightsFormat::default(),
            resize_token_embeddings: true,
            load_tokenizer: false,
        }
    }
}

impl LoadOptions {
    /// Set the weights format.
    #[must_use]
    pub fn weights(mut self, weights: WeightsFormat) -> Self {
        self.weights = weights;
        self
    }

    /// Set legacy tokenizer extension.
    #[must_use]
    pub fn resize_token_embeddings(mut self, resize: bool) -> Self {
        self.resize_token_embeddings = resize;
        self
    }

    /// Require the checkpoint's own tokenizer instead of falling back to
    /// the base encoder's.
    #[must_use]
    pub fn load_tokenizer(mut self, load: bool) -> Self {
        self.load_tokenizer = load;
        self
    }
}

/// Where the tokenizer of a checkpoint comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenizerSource {
    /// A `tokenizer.json` on disk.
    File(PathBuf),
    /// `tokenizer.json` of a HuggingFace repo, fetched on load.
    Hub(String),
}

impl TokenizerSource {
    /// Pick the tokenizer for the checkpoint in `dir`.
    ///
    /// Order: the checkpoint's `tokenizer.json`, then the base encoder
    /// named by `config.model_name` (a local directory, or a hub repo with
    /// feature `hub`). With `options.load_tokenizer` only the first is
    /// accepted.
    pub fn select(dir: &Path, config: &GLiNERConfig, options: &LoadOptions) -> Result<Self> {
        let own = dir.join(TOKENIZER_FILE);
        if own.exists() {
            return Ok(TokenizerSource::File(own));
        }
        if options.load_tokenizer {
            return Err(Error::MissingArtifact(own));
        }

        let base = Path::new(&config.model_name).join(TOKENIZER_FILE);
        if base.exists() {
            log::info!(
                "[Checkpoint] No {} in {}, using {}",
                TOKENIZER_FILE,
                dir.display(),
                base.display()
            );
            return Ok(TokenizerSource::File(base));
        }
        if cfg!(feature = "hub") && !config.model_name.is_empty() {
            log::info!(
                "[Checkpoint] No {} in {}, using base encoder {}",
                TOKENIZER_FILE,
                dir.display(),
                config.model_name
            );
            return Ok(TokenizerSource::Hub(config.model_name.clone()));
        }
        Err(Error::MissingArtifact(own))
    }

    fn path(&self) -> Result<PathBuf> {
        match self {
            TokenizerSource::File(path) => Ok(path.clone()),
            TokenizerSource::Hub(repo_id) => fetch_tokenizer(repo_id),
        }
    }
}

#[cfg(feature = "hub")]
fn fetch_tokenizer(repo_id: &str) -> Result<PathBuf> {
    use hf_hub::api::sync::Api;

    let api = Api::new().map_err(|e| Error::retrieval(format!("HuggingFace API: {}", e)))?;
    api.model(repo_id.to_string())
        .get(TOKENIZER_FILE)
        .map_err(|e| {
            Error::retrieval(format!("{} of {}: {}", TOKENIZER_FILE, repo_id, e))
        })
}

#[cfg(not(feature = "hub"))]
fn fetch_tokenizer(repo_id: &str) -> Result<PathBuf> {
    let path = Path::new(repo_id).join(TOKENIZER_FILE);
    Err(Error::MissingArtifact(path))
}

/// A resolved checkpoint: config and weights exist on disk.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    dir: PathBuf,
    config: GLiNERConfig,
    tokenizer: TokenizerSource,
    weights_path: PathBuf,
    resize_token_embeddings: bool,
}

impl Checkpoint {
    /// Resolve `model_id` as a local directory, or download it.
    pub fn resolve(model_id: &str, options: &LoadOptions) -> Result<Self> {
        let dir = Path::new(model_id);
        if dir.is_dir() {
            return Self::from_dir(dir, options);
        }
        Self::download(model_id, options)
    }

    /// Load from a local directory.
    pub fn from_dir(dir: impl AsRef<Path>, options: &LoadOptions) -> Result<Self> {
        let dir = dir.as_ref();
        let config = GLiNERConfig::from_file(dir.join(CONFIG_FILE))?;

        let tokenizer = TokenizerSource::select(dir, &config, options)?;

        let candidates = options.weights.candidates();
        let weights_path = candidates
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
            .ok_or_else(|| Error::MissingArtifact(dir.join(candidates[0])))?;

        log::info!(
            "[Checkpoint] {} (span_mode={}, weights={})",
            dir.display(),
            config.span_mode,
            weights_path.display()
        );
        Ok(Self {
            dir: dir.to_path_buf(),
            config,
            tokenizer,
            weights_path,
            resize_token_embeddings: options.resize_token_embeddings,
        })
    }

    #[cfg(feature = "hub")]
    fn download(model_id: &str, options: &LoadOptions) -> Result<Self> {
        use hf_hub::api::sync::Api;

        let api = Api::new().map_err(|e| Error::retrieval(format!("HuggingFace API: {}", e)))?;
        let repo = api.model(model_id.to_string());

        let config_path = repo
            .get(CONFIG_FILE)
            .map_err(|e| Error::retrieval(format!("{}: {}", CONFIG_FILE, e)))?;
        match repo.get(TOKENIZER_FILE) {
            Ok(_) => {}
            Err(e) if options.load_tokenizer => {
                return Err(Error::retrieval(format!("{}: {}", TOKENIZER_FILE, e)));
            }
            Err(e) => log::debug!("[Checkpoint] {} not in {}: {}", TOKENIZER_FILE, model_id, e),
        }

        let candidates = options.weights.candidates();
        if !candidates.iter().any(|name| repo.get(name).is_ok()) {
            return Err(Error::retrieval(format!(
                "weights: none of {} in {}",
                candidates.join(" | "),
                model_id
            )));
        }

        let dir = config_path
            .parent()
            .ok_or_else(|| {
                Error::retrieval(format!("no snapshot dir for {}", model_id))
            })?;
        Self::from_dir(dir, options)
    }

    #[cfg(not(feature = "hub"))]
    fn download(model_id: &str, _options: &LoadOptions) -> Result<Self> {
        Err(Error::MissingArtifact(PathBuf::from(model_id)))
    }

    /// Checkpoint directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Parsed configuration.
    #[must_use]
    pub fn config(&self) -> &GLiNERConfig {
        &self.config
    }

    /// Path of the weights file found.
    #[must_use]
    pub fn weights_path(&self) -> &Path {
        &self.weights_path
    }

    /// Where the tokenizer is loaded from.
    #[must_use]
    pub fn tokenizer_source(&self) -> &TokenizerSource {
        &self.tokenizer
    }

    /// Load the tokenizer, extending it for legacy checkpoints.
    ///
    /// Extension also fills in `class_token_index` and `vocab_size`, so the
    /// config no longer reads as legacy once saved.
    pub fn load_tokenizer(&mut self) -> Result<Tokenizer> {
        let path = self.tokenizer.path()?;
        let mut tokenizer = Tokenizer::from_file(&path).map_err(Error::tokenizer)?;
        if self.config.is_legacy() && self.resize_token_embeddings {
            let added = add_prompt_tokens(&mut tokenizer, &self.config);
            let ent_id = tokenizer
                .token_to_id(&self.config.ent_token)
                .ok_or_else(|| {
                    Error::config(format!("{} not added", self.config.ent_token))
                })?;
            self.config.class_token_index = i64::from(ent_id);
            self.config.vocab_size = tokenizer.get_vocab_size(true) as i64;
            log::info!(
                "[Checkpoint] Legacy: +{} prompt tokens, class_token_index={}, vocab_size={}",
                added,
                self.config.class_token_index,
                self.config.vocab_size
            );
        }
        Ok(tokenizer)
    }
}

/// Add `[FLERT]`, `ent_token` and `sep_token` as special tokens.
///
/// Returns how many were new.
pub fn add_prompt_tokens(tokenizer: &mut Tokenizer, config: &GLiNERConfig) -> usize {
    let tokens: Vec<AddedToken> = [
        FLERT_TOKEN,
        config.ent_token.as_str(),
        config.sep_token.as_str(),
    ]
    .into_iter()
    .map(|t| AddedToken::from(t.to_string(), true))
    .collect();
    tokenizer.add_tokens(&tokens)
}
