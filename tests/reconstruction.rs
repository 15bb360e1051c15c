//! Property tests for entity reconstruction.
//!
//! Whatever the text (scripts, whitespace runs, punctuation), an entity
//! built from words `s..=e` must carry exactly the original characters
//! between the start of word `s` and the end of word `e`.

use gliner_infer::{
    char_slice, reconstruct_entities, OffsetMap, RawBatch, SpanHypothesis,
    WhitespaceTokenSplitter, WordsSplitter,
};
use proptest::prelude::*;

fn offset_map(text: &str) -> OffsetMap {
    let mut map = OffsetMap::new();
    for word in WhitespaceTokenSplitter.split(text) {
        map.push(word.start, word.end);
    }
    map
}

/// Words mixing ASCII, accented Latin, CJK and emoji, joined by spaces,
/// tabs or punctuation.
fn mixed_text() -> impl Strategy<Value = String> {
    let word = prop_oneof![
        "[a-zA-Z]{1,8}",
        "[àéîõüç]{1,4}",
        "[北京東京上海]{1,3}",
        "[😀🎉]{1,2}",
        "[0-9]{1,4}",
    ];
    let sep = prop_oneof![Just(" "), Just("  "), Just("\t"), Just(", "), Just(". ")];
    prop::collection::vec((word, sep), 1..12).prop_map(|parts| {
        parts
            .into_iter()
            .map(|(w, s)| format!("{}{}", w, s))
            .collect::<String>()
    })
}

proptest! {
    #[test]
    fn entity_text_is_original_slice(text in mixed_text(), a in 0usize..64, b in 0usize..64) {
        let map = offset_map(&text);
        prop_assume!(!map.is_empty());
        let n = map.len();
        let (s, e) = if a % n <= b % n { (a % n, b % n) } else { (b % n, a % n) };

        let raw = RawBatch {
            offset_maps: vec![map.clone()],
            ..RawBatch::default()
        };
        let hyps = vec![vec![SpanHypothesis::new(s, e, "thing", 0.9)]];
        let out = reconstruct_entities(&[text.as_str()], &raw, &hyps).unwrap();

        let entity = &out[0][0];
        let (start, end) = (map.starts()[s], map.ends()[e]);
        prop_assert_eq!((entity.start, entity.end), (start, end));
        prop_assert_eq!(Some(entity.text.as_str()), char_slice(&text, start, end));
        prop_assert!(end <= text.chars().count());
    }

    #[test]
    fn every_word_reconstructs_to_itself(text in mixed_text()) {
        let words = WhitespaceTokenSplitter.split(&text);
        let raw = RawBatch {
            offset_maps: vec![offset_map(&text)],
            ..RawBatch::default()
        };
        let hyps = vec![(0..words.len())
            .map(|i| SpanHypothesis::new(i, i, "w", 0.5))
            .collect::<Vec<_>>()];
        let out = reconstruct_entities(&[text.as_str()], &raw, &hyps).unwrap();

        prop_assert_eq!(out[0].len(), words.len());
        for (entity, word) in out[0].iter().zip(&words) {
            prop_assert_eq!(&entity.text, &word.text);
        }
    }
}
