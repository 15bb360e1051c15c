//! Checkpoint loading and saving against on-disk directories.

use candle_core::{DType, Device, Tensor};
use gliner_infer::checkpoint::TOKENIZER_FILE;
use gliner_infer::config::CONFIG_FILE;
use gliner_infer::{
    Checkpoint, Error, GLiNER, GLiNERConfig, LoadOptions, MockEncoder, PredictOptions,
    WeightsFormat,
};
use std::path::Path;

const TOKENIZER_JSON: &str = r#"{"version": "1.0", "truncation": null, "padding": null,
    "added_tokens": [], "normalizer": null, "pre_tokenizer": null, "post_processor": null,
    "decoder": null, "model": {"type": "WordLevel",
    "vocab": {"[UNK]": 0, "[CLS]": 1, "[SEP]": 2, "Alice": 3, "person": 4},
    "unk_token": "[UNK]"}}"#;

fn write_checkpoint(dir: &Path, config: &GLiNERConfig, weights: &str) {
    config.to_file(dir.join(CONFIG_FILE)).unwrap();
    std::fs::write(dir.join(TOKENIZER_FILE), TOKENIZER_JSON).unwrap();
    std::fs::write(dir.join(weights), b"\0").unwrap();
}

fn zero_encoder() -> MockEncoder {
    MockEncoder::new(|input| {
        let batch = input.get("input_ids").unwrap().dims()[0];
        Ok(Tensor::zeros((batch, 1, 12, 1), DType::F32, &Device::Cpu)?)
    })
}

#[test]
fn test_from_pretrained_local_legacy_checkpoint() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), &GLiNERConfig::default(), "pytorch_model.bin");

    let mut seen_weights = None;
    let model = GLiNER::from_pretrained(
        dir.path().to_str().unwrap(),
        &LoadOptions::default(),
        |ckpt: &Checkpoint| {
            seen_weights = Some(ckpt.weights_path().to_path_buf());
            Ok(zero_encoder())
        },
    )
    .unwrap();

    assert_eq!(seen_weights.unwrap(), dir.path().join("pytorch_model.bin"));
    // legacy config: prompt tokens were added so collation works
    assert!(model.tokenizer().token_to_id("<<ENT>>").is_some());
    let entities = model
        .predict_entities("Alice", &["person"], &PredictOptions::default())
        .unwrap();
    assert!(entities.is_empty());
}

#[test]
fn test_from_pretrained_without_resize_fails_on_missing_prompt_tokens() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), &GLiNERConfig::default(), "pytorch_model.bin");
    let options = LoadOptions::default().resize_token_embeddings(false);
    let err = GLiNER::from_pretrained(dir.path().to_str().unwrap(), &options, |_| {
        Ok(zero_encoder())
    })
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_missing_onnx_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    write_checkpoint(dir.path(), &GLiNERConfig::default(), "pytorch_model.bin");
    let options = LoadOptions::default().weights(WeightsFormat::Onnx("quantized.onnx".into()));
    let err = GLiNER::from_pretrained(dir.path().to_str().unwrap(), &options, |_| {
        Ok(zero_encoder())
    })
    .unwrap_err();
    match err {
        Error::MissingArtifact(path) => assert_eq!(path, dir.path().join("quantized.onnx")),
        other => panic!("expected MissingArtifact, got {:?}", other),
    }
}

#[test]
fn test_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = Checkpoint::from_dir(dir.path(), &LoadOptions::default()).unwrap_err();
    match err {
        Error::MissingArtifact(path) => assert_eq!(path, dir.path().join(CONFIG_FILE)),
        other => panic!("expected MissingArtifact, got {:?}", other),
    }
}

#[test]
fn test_save_pretrained_round_trip() {
    let src = tempfile::tempdir().unwrap();
    let config = GLiNERConfig {
        max_width: 8,
        ..GLiNERConfig::token_level()
    };
    write_checkpoint(src.path(), &config, "model.safetensors");
    let model = GLiNER::from_pretrained(
        src.path().to_str().unwrap(),
        &LoadOptions::default(),
        |_| Ok(zero_encoder()),
    )
    .unwrap();

    let out = tempfile::tempdir().unwrap();
    let target = out.path().join("saved");
    model.save_pretrained(&target).unwrap();
    assert!(target.join(CONFIG_FILE).exists());
    assert!(target.join(TOKENIZER_FILE).exists());

    let reloaded = GLiNERConfig::from_file(target.join(CONFIG_FILE)).unwrap();
    assert_eq!(reloaded, *model.config());
    assert!(reloaded.span_mode.is_token_level());
    // prompt tokens were added on load, so the saved config is no longer legacy
    assert!(!reloaded.is_legacy());
    assert_eq!(
        reloaded.class_token_index,
        i64::from(model.tokenizer().token_to_id("<<ENT>>").unwrap())
    );
    assert_eq!(
        reloaded.vocab_size,
        model.tokenizer().get_vocab_size(true) as i64
    );

    let tokenizer = tokenizers::Tokenizer::from_file(target.join(TOKENIZER_FILE)).unwrap();
    assert_eq!(
        tokenizer.token_to_id("<<SEP>>"),
        model.tokenizer().token_to_id("<<SEP>>")
    );
}
