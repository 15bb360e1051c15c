//! End-to-end prediction tests with a scripted encoder.
//!
//! The encoder returns hand-placed logits, so these tests pin the whole
//! path: splitting, collation, decoding and character reconstruction.

use candle_core::{Device, Tensor};
use gliner_infer::processing::{INPUT_IDS, SPAN_IDX, SPAN_MASK, TEXT_LENGTHS, WORDS_MASK};
use gliner_infer::{
    Decoder, EncoderModel, Entity, Error, GLiNER, GLiNERConfig, MockEncoder, ModelInput,
    PredictOptions, SpaceSplitter, SpanHypothesis,
};
use std::collections::BTreeMap;
use tokenizers::Tokenizer;

const HIGH: f32 = 5.0;
const LOW: f32 = -5.0;
const LABELS: [&str; 2] = ["person", "location"];

const VOCAB: [&str; 14] = [
    "[PAD]", "[CLS]", "[SEP]", "[UNK]", "<<ENT>>", "<<SEP>>", "person", "location", "Alice",
    "met", "Bob", "in", "Paris", "Café",
];

fn tokenizer() -> Tokenizer {
    let vocab = VOCAB
        .iter()
        .enumerate()
        .map(|(i, t)| format!("\"{}\": {}", t, i))
        .collect::<Vec<_>>()
        .join(", ");
    let json = format!(
        r#"{{"version": "1.0", "truncation": null, "padding": null, "added_tokens": [],
            "normalizer": null, "pre_tokenizer": null, "post_processor": null, "decoder": null,
            "model": {{"type": "WordLevel", "vocab": {{{}}}, "unk_token": "[UNK]"}}}}"#,
        vocab
    );
    Tokenizer::from_bytes(json.as_bytes()).unwrap()
}

/// Longest text in the batch, read back from the collated input.
fn max_len(input: &ModelInput) -> usize {
    input
        .get(TEXT_LENGTHS)
        .unwrap()
        .to_vec2::<i64>()
        .unwrap()
        .into_iter()
        .map(|row| row[0] as usize)
        .max()
        .unwrap_or(0)
}

/// Span encoder: `hits` are `(text, start, width, class)` cells set high.
fn span_encoder(
    max_width: usize,
    classes: usize,
    hits: Vec<(usize, usize, usize, usize)>,
) -> MockEncoder {
    MockEncoder::new(move |input| {
        let batch = input.get(INPUT_IDS).unwrap().dims()[0];
        let seq = max_len(input);
        let mut data = vec![LOW; batch * seq * max_width * classes];
        for &(b, s, w, c) in hits.iter().filter(|h| h.1 < seq) {
            data[((b * seq + s) * max_width + w) * classes + c] = HIGH;
        }
        Ok(Tensor::from_vec(
            data,
            (batch, seq, max_width, classes),
            &Device::Cpu,
        )?)
    })
}

fn span_model(hits: Vec<(usize, usize, usize, usize)>) -> GLiNER<MockEncoder> {
    let config = GLiNERConfig::default();
    let encoder = span_encoder(config.max_width, 2, hits);
    GLiNER::new(config, tokenizer(), encoder).unwrap()
}

// =============================================================================
// Span mode
// =============================================================================

#[test]
fn test_alice_met_bob() {
    let model = span_model(vec![(0, 0, 0, 0), (0, 2, 0, 0)]);
    let entities = model
        .predict_entities("Alice met Bob", &LABELS, &PredictOptions::default())
        .unwrap();

    assert_eq!(entities.len(), 2);
    assert_eq!(
        (entities[0].start, entities[0].end, entities[0].text.as_str()),
        (0, 5, "Alice")
    );
    assert_eq!(entities[0].label, "person");
    assert_eq!(
        (entities[1].start, entities[1].end, entities[1].text.as_str()),
        (10, 13, "Bob")
    );
}

#[test]
fn test_batch_with_ragged_texts() {
    // text 1: "Bob in Paris": Bob person, Paris location
    let model = span_model(vec![(0, 0, 0, 0), (1, 0, 0, 0), (1, 2, 0, 1)]);
    let out = model
        .batch_predict_entities(
            &["Alice", "Bob in Paris"],
            &["person", "location"],
            &PredictOptions::default(),
        )
        .unwrap();

    assert_eq!(out.len(), 2);
    assert_eq!(out[0].len(), 1);
    assert_eq!(out[0][0].text, "Alice");
    let texts: Vec<(&str, &str)> = out[1]
        .iter()
        .map(|e| (e.text.as_str(), e.label.as_str()))
        .collect();
    assert_eq!(texts, vec![("Bob", "person"), ("Paris", "location")]);
    assert_eq!((out[1][1].start, out[1][1].end), (7, 12));
}

#[test]
fn test_unicode_offsets_are_characters() {
    let model = span_model(vec![(0, 0, 0, 1), (0, 2, 0, 1)]);
    let text = "Café in 北京";
    let entities = model
        .predict_entities(text, &["person", "location"], &PredictOptions::default())
        .unwrap();
    assert_eq!(
        entities[0],
        Entity::new("Café", "location", 0, 4, entities[0].score)
    );
    assert_eq!((entities[1].start, entities[1].end), (8, 10));
    assert_eq!(entities[1].text, "北京");
}

#[test]
fn test_multi_word_span_keeps_original_text() {
    // "Alice  met" (two spaces) as one span of width 2
    let model = span_model(vec![(0, 0, 1, 0)]);
    let entities = model
        .predict_entities("Alice  met Bob", &["person"], &PredictOptions::default())
        .unwrap();
    assert_eq!(entities[0].text, "Alice  met");
    assert_eq!((entities[0].start, entities[0].end), (0, 10));
}

#[test]
fn test_flat_vs_nested() {
    // "Alice met Bob" whole (w=2) and "Bob" nested inside
    let hits = vec![(0, 0, 2, 0), (0, 2, 0, 1)];
    let model = span_model(hits);
    let flat = model
        .predict_entities("Alice met Bob", &LABELS, &PredictOptions::default())
        .unwrap();
    assert_eq!(flat.len(), 1);

    let nested = model
        .predict_entities(
            "Alice met Bob",
            &["person", "location"],
            &PredictOptions::default().flat_ner(false),
        )
        .unwrap();
    assert_eq!(nested.len(), 2);
}

#[test]
fn test_truncated_words_never_surface() {
    let config = GLiNERConfig {
        max_len: 2,
        ..GLiNERConfig::default()
    };
    // (0, 2, 0, 0) would be "Bob", past max_len
    let encoder = span_encoder(config.max_width, 1, vec![(0, 0, 0, 0), (0, 2, 0, 0)]);
    let model = GLiNER::new(config, tokenizer(), encoder).unwrap();
    let entities = model
        .predict_entities("Alice met Bob", &["person"], &PredictOptions::default())
        .unwrap();
    assert_eq!(entities.len(), 1);
    assert_eq!(entities[0].text, "Alice");
}

#[test]
fn test_empty_text_yields_no_entities() {
    let model = span_model(vec![]);
    let out = model
        .batch_predict_entities(&["", "Bob"], &["person"], &PredictOptions::default())
        .unwrap();
    assert!(out[0].is_empty());
    assert!(out[1].is_empty());
    assert!(model
        .batch_predict_entities(&[], &["person"], &PredictOptions::default())
        .unwrap()
        .is_empty());
}

// =============================================================================
// Input builder
// =============================================================================

#[test]
fn test_prepare_model_inputs_span_mode() {
    let model = span_model(vec![]);
    let (input, raw) = model
        .prepare_model_inputs(&["Alice met Bob", "Paris"], &["person", "location"])
        .unwrap();

    assert_eq!(raw.seq_length, vec![3, 1]);
    assert_eq!(raw.id_to_classes[&1], "person");
    assert_eq!(raw.offset_maps[0].char_span(2, 2), Some((10, 13)));
    assert_eq!(input.get(SPAN_IDX).unwrap().dims(), &[2, 36, 2]);
    assert_eq!(input.get(SPAN_MASK).unwrap().dims(), &[2, 36]);
    let words_mask = input.get(WORDS_MASK).unwrap().to_vec2::<i64>().unwrap();
    assert_eq!(words_mask[0], vec![0, 0, 0, 0, 0, 0, 1, 2, 3, 0]);
    assert_eq!(words_mask[1], vec![0, 0, 0, 0, 0, 0, 1, 0, 0, 0]);
}

#[test]
fn test_prepare_model_inputs_token_mode() {
    let model = GLiNER::new(
        GLiNERConfig::token_level(),
        tokenizer(),
        MockEncoder::new(|_| unreachable!()).device_agnostic(true),
    )
    .unwrap();
    let (input, _) = model.prepare_model_inputs(&["Bob"], &["person"]).unwrap();
    assert!(input.contains_key(SPAN_IDX));
    assert!(input.get(SPAN_IDX).is_none());
    assert!(input.get(SPAN_MASK).is_none());
    assert_eq!(
        input.get(TEXT_LENGTHS).unwrap().to_vec2::<i64>().unwrap(),
        vec![vec![1]]
    );
}

#[test]
fn test_custom_splitter() {
    let model = span_model(vec![(0, 0, 0, 0)]).with_splitter(Box::new(SpaceSplitter));
    let entities = model
        .predict_entities("Alice, met", &["person"], &PredictOptions::default())
        .unwrap();
    assert_eq!(entities[0].text, "Alice,");
}

#[test]
fn test_unknown_splitter_is_config_error() {
    let config = GLiNERConfig {
        words_splitter_type: "jieba".into(),
        ..GLiNERConfig::default()
    };
    let err = GLiNER::new(config, tokenizer(), MockEncoder::new(|_| unreachable!())).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_vocab_mismatch_is_not_fatal() {
    let config = GLiNERConfig {
        vocab_size: 50_000,
        class_token_index: 4,
        ..GLiNERConfig::default()
    };
    let encoder = MockEncoder::new(|_| unreachable!());
    assert!(GLiNER::new(config, tokenizer(), encoder).is_ok());
}

// =============================================================================
// Token mode
// =============================================================================

#[test]
fn test_token_level_prediction() {
    // "Alice met Bob": person over words 0..=0 and 2..=2
    let encoder = MockEncoder::new(|input| {
        let seq = max_len(input);
        let classes = 1;
        let mut data = vec![LOW; 3 * seq * classes];
        for pos in [0, 2] {
            for ch in 0..3 {
                data[ch * seq + pos] = HIGH;
            }
        }
        Ok(Tensor::from_vec(data, (3, 1, seq, classes), &Device::Cpu)?)
    });
    let model = GLiNER::new(GLiNERConfig::token_level(), tokenizer(), encoder).unwrap();
    let entities = model
        .predict_entities("Alice met Bob", &["person"], &PredictOptions::default())
        .unwrap();
    let texts: Vec<&str> = entities.iter().map(|e| e.text.as_str()).collect();
    assert_eq!(texts, vec!["Alice", "Bob"]);
}

// =============================================================================
// Reconstruction contract
// =============================================================================

struct OutOfRange;

impl Decoder for OutOfRange {
    fn decode(
        &self,
        tokens: &[Vec<String>],
        _id_to_classes: &BTreeMap<usize, String>,
        _scores: &Tensor,
        _options: &PredictOptions,
    ) -> gliner_infer::Result<Vec<Vec<SpanHypothesis>>> {
        Ok(tokens
            .iter()
            .map(|t| vec![SpanHypothesis::new(0, t.len(), "person", 0.9)])
            .collect())
    }

    fn name(&self) -> &'static str {
        "out-of-range"
    }
}

#[test]
fn test_decoder_contract_violation_is_alignment_error() {
    let model = span_model(vec![]).with_decoder(Box::new(OutOfRange));
    let err = model
        .predict_entities("Alice met Bob", &["person"], &PredictOptions::default())
        .unwrap_err();
    match err {
        Error::Alignment {
            text_index,
            token_index,
            num_tokens,
        } => assert_eq!((text_index, token_index, num_tokens), (0, 3, 3)),
        other => panic!("expected alignment error, got {:?}", other),
    }
}

#[test]
fn test_device_agnostic_model_sees_cpu_inputs() {
    let encoder = MockEncoder::new(|input| {
        for (_, t) in input.iter().filter_map(|(k, t)| t.map(|t| (k, t))) {
            assert!(t.device().is_cpu());
        }
        Ok(Tensor::zeros(
            (1, 1, 12, 1),
            candle_core::DType::F32,
            &Device::Cpu,
        )?)
    })
    .device_agnostic(true);
    assert!(encoder.is_device_agnostic());
    let model = GLiNER::new(GLiNERConfig::default(), tokenizer(), encoder).unwrap();
    let entities = model
        .predict_entities("Bob", &["person"], &PredictOptions::default())
        .unwrap();
    assert!(entities.is_empty());
}
