// ============================================================
// Layer 4 — Feature Alignment
// ============================================================
// Turns one parser Sentence into one padded DepSample.
//
// The encoder works on sub-word tokens but the parser works
// on words, so every word is mapped to the token span that
// represents it:
//
//   tokens:    [CLS]  他   来   了   [SEP] [PAD] ...
//   positions:   0    1    2    3     4     5
//   words:     ROOT  他   来了
//   start:       0    1    2
//   end:         0    1    3
//
// ROOT representation:
//   cls     → ROOT is the [CLS] token itself
//   unused  → a "[unused1]" word is prepended and used as ROOT
//   root    → the literal word "root" is prepended
//
// Positions past max_seq_len are clipped to the last slot and
// words past max_seq_len are dropped together with their arcs.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokenizers::Tokenizer;

use crate::data::dataset::DepSample;
use crate::domain::error::{ParserError, Result};
use crate::domain::sentence::Sentence;
use crate::domain::vocab::LabelVocab;

pub const CLS: &str = "[CLS]";
pub const SEP: &str = "[SEP]";
pub const PAD: &str = "[PAD]";
pub const UNK: &str = "[UNK]";
pub const MASK: &str = "[MASK]";
pub const UNUSED_ROOT: &str = "[unused1]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RootRepresentation {
    Cls,
    Unused,
    Root,
}

/// Ids of the special tokens the alignment needs.
#[derive(Debug, Clone, Copy)]
struct SpecialIds {
    cls:  u32,
    sep:  u32,
    pad:  u32,
    unk:  u32,
}

impl SpecialIds {
    fn from_tokenizer(tokenizer: &Tokenizer) -> Result<Self> {
        let id = |tok: &str| {
            tokenizer
                .token_to_id(tok)
                .ok_or_else(|| ParserError::config(format!("tokenizer has no '{tok}' token")))
        };
        Ok(Self { cls: id(CLS)?, sep: id(SEP)?, pad: id(PAD)?, unk: id(UNK)? })
    }
}

pub struct FeatureBuilder<'a> {
    tokenizer:       &'a Tokenizer,
    relations:       &'a LabelVocab,
    pos_tags:        Option<&'a LabelVocab>,
    max_seq_len:     usize,
    root:            RootRepresentation,
    input_mask_prob: f64,
    special:         SpecialIds,
}

impl<'a> FeatureBuilder<'a> {
    pub fn new(
        tokenizer:   &'a Tokenizer,
        relations:   &'a LabelVocab,
        pos_tags:    Option<&'a LabelVocab>,
        max_seq_len: usize,
        root:        RootRepresentation,
    ) -> Result<Self> {
        if max_seq_len < 2 {
            return Err(ParserError::config("max_seq_len must be at least 2"));
        }
        Ok(Self {
            tokenizer,
            relations,
            pos_tags,
            max_seq_len,
            root,
            input_mask_prob: 0.0,
            special: SpecialIds::from_tokenizer(tokenizer)?,
        })
    }

    /// Probability of replacing a word by [MASK] when building training samples.
    pub fn with_input_mask_prob(mut self, prob: f64) -> Self {
        self.input_mask_prob = prob;
        self
    }

    pub fn build_all<R: Rng>(&self, sentences: &[Sentence], training: bool, rng: &mut R) -> Result<Vec<DepSample>> {
        sentences
            .iter()
            .enumerate()
            .map(|(i, s)| {
                self.build(s, training, rng)
                    .map_err(|e| match e {
                        ParserError::Data(msg) => ParserError::data(format!("sentence {i}: {msg}")),
                        other => other,
                    })
            })
            .collect()
    }

    pub fn build<R: Rng>(&self, sentence: &Sentence, training: bool, rng: &mut R) -> Result<DepSample> {
        let annotated = sentence.is_annotated();
        if annotated && sentence.words.iter().any(|w| w.arcs.is_none()) {
            return Err(ParserError::data("illegal CoNLL-U data: annotated and blank DEPS mixed in one sentence"));
        }

        let l = self.max_seq_len;

        // ── Word list, with ROOT prepended when it is a real word ────────────
        let mut words: Vec<String> = sentence.words.iter().map(|w| w.form.clone()).collect();
        if training && self.input_mask_prob > 0.0 {
            for w in words.iter_mut() {
                if rng.gen::<f64>() < self.input_mask_prob {
                    *w = MASK.to_string();
                }
            }
        }
        match self.root {
            RootRepresentation::Cls => {}
            RootRepresentation::Unused => words.insert(0, UNUSED_ROOT.to_string()),
            RootRepresentation::Root => words.insert(0, "root".to_string()),
        }

        // ── Token sequence and word spans ────────────────────────────────────
        let mut input_ids = vec![self.special.cls];
        let mut spans: Vec<(u32, u32)> = Vec::with_capacity(words.len() + 1);
        if self.root == RootRepresentation::Cls {
            spans.push((0, 0));
        }
        let last = (l - 1) as u32;
        for w in &words {
            let enc = self
                .tokenizer
                .encode(w.as_str(), false)
                .map_err(|e| ParserError::data(format!("cannot tokenise '{w}': {e}")))?;
            let start = input_ids.len();
            if enc.get_ids().is_empty() {
                input_ids.push(self.special.unk);
            } else {
                input_ids.extend_from_slice(enc.get_ids());
            }
            let end = input_ids.len() - 1;
            spans.push(((start as u32).min(last), (end as u32).min(last)));
        }
        input_ids.push(self.special.sep);
        input_ids.truncate(l);
        let real_tokens = input_ids.len();
        input_ids.resize(l, self.special.pad);

        let mut attention_mask = vec![0u32; l];
        attention_mask[..real_tokens].iter_mut().for_each(|m| *m = 1);

        // ── Word-level tensors ───────────────────────────────────────────────
        let sent_len = spans.len().min(l);
        let mut start_pos = vec![0u32; l];
        let mut end_pos = vec![0u32; l];
        let mut word_mask = vec![0u32; l];
        for (k, &(s, e)) in spans.iter().take(sent_len).enumerate() {
            start_pos[k] = s;
            end_pos[k] = e;
            word_mask[k] = 1;
        }

        let mut dep_ids = vec![0u32; l * l];
        if annotated {
            for (k, word) in sentence.words.iter().enumerate().take(sent_len.saturating_sub(1)) {
                let dep = k + 1;
                for arc in word.arcs.iter().flatten() {
                    if arc.head < sent_len {
                        dep_ids[arc.head * l + dep] = self.relations.id_of(&arc.label)? as u32;
                    }
                }
            }
        }

        let mut pos_ids = vec![0u32; l];
        if let Some(tags) = self.pos_tags {
            for (k, word) in sentence.words.iter().enumerate().take(sent_len.saturating_sub(1)) {
                if let Some(tag) = &word.pos {
                    pos_ids[k + 1] = tags.id_of(tag)? as u32;
                }
            }
        }

        Ok(DepSample {
            input_ids,
            attention_mask,
            token_type_ids: vec![0; l],
            start_pos,
            end_pos,
            word_mask,
            dep_ids,
            pos_ids,
            sent_len,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::sentence::{Arc, Word};
    use crate::infra::tokenizer_store::build_word_level;
    use rand::{rngs::StdRng, SeedableRng};

    pub(crate) fn sentence(words: &[(&str, &str, &[(usize, &str)])]) -> Sentence {
        Sentence::new(
            words
                .iter()
                .map(|(form, pos, arcs)| Word {
                    form: form.to_string(),
                    pos: Some(pos.to_string()),
                    arcs: Some(arcs.iter().map(|&(h, l)| Arc::new(h, l)).collect()),
                })
                .collect(),
        )
    }

    fn setup() -> (Tokenizer, LabelVocab, LabelVocab) {
        let tok = build_word_level(["he", "came", "home"].iter().map(|s| s.to_string()), 200).unwrap();
        (tok, LabelVocab::relations(["Agt", "Root", "Loc"]), LabelVocab::pos_tags(["PN", "VV", "NN"]))
    }

    #[test]
    fn test_cls_root_alignment_and_arcs() {
        let (tok, rel, pos) = setup();
        let b = FeatureBuilder::new(&tok, &rel, Some(&pos), 6, RootRepresentation::Cls).unwrap();
        let s = sentence(&[("he", "PN", &[(2, "Agt")]), ("came", "VV", &[(0, "Root")])]);
        let sample = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap();

        assert_eq!(sample.sent_len, 3);
        assert_eq!(sample.word_mask, vec![1, 1, 1, 0, 0, 0]);
        assert_eq!(&sample.start_pos[..3], &[0, 1, 2]);
        assert_eq!(&sample.attention_mask[..5], &[1, 1, 1, 1, 0]);
        // head 2 governs word 1
        assert_eq!(sample.dep_ids[2 * 6 + 1], rel.id_of("Agt").unwrap() as u32);
        assert_eq!(sample.dep_ids[2], rel.id_of("Root").unwrap() as u32);
        assert_eq!(sample.pos_ids[0], 0);
        assert_eq!(sample.pos_ids[2], pos.id_of("VV").unwrap() as u32);
    }

    #[test]
    fn test_unused_root_shifts_tokens() {
        let (tok, rel, _) = setup();
        let b = FeatureBuilder::new(&tok, &rel, None, 8, RootRepresentation::Unused).unwrap();
        let s = sentence(&[("he", "PN", &[(0, "Root")])]);
        let sample = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(sample.sent_len, 2);
        assert_eq!(&sample.start_pos[..2], &[1, 2]);
        assert_eq!(sample.input_ids[1], tok.token_to_id(UNUSED_ROOT).unwrap());
    }

    #[test]
    fn test_truncation_drops_words_and_arcs() {
        let (tok, rel, _) = setup();
        let b = FeatureBuilder::new(&tok, &rel, None, 3, RootRepresentation::Cls).unwrap();
        let s = sentence(&[
            ("he", "PN", &[(2, "Agt")]),
            ("came", "VV", &[(0, "Root")]),
            ("home", "NN", &[(2, "Loc")]),
        ]);
        let sample = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(sample.sent_len, 3);
        assert_eq!(sample.dep_ids.len(), 9);
        assert!(sample.start_pos.iter().all(|&p| p <= 2));
    }

    #[test]
    fn test_mixed_annotation_is_data_error() {
        let (tok, rel, _) = setup();
        let b = FeatureBuilder::new(&tok, &rel, None, 6, RootRepresentation::Cls).unwrap();
        let mut s = sentence(&[("he", "PN", &[(2, "Agt")]), ("came", "VV", &[(0, "Root")])]);
        s.words[1].arcs = None;
        let err = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ParserError::Data(_)));
    }

    #[test]
    fn test_unknown_pos_tag_is_data_error() {
        let (tok, rel, pos) = setup();
        let b = FeatureBuilder::new(&tok, &rel, Some(&pos), 6, RootRepresentation::Cls).unwrap();
        let s = sentence(&[("he", "ADV", &[(2, "Agt")]), ("came", "VV", &[(0, "Root")])]);
        let err = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap_err();
        assert!(matches!(err, ParserError::Data(_)));
        assert!(err.to_string().contains("ADV"));
    }

    #[test]
    fn test_blank_sentence_has_no_gold_arcs() {
        let (tok, rel, _) = setup();
        let b = FeatureBuilder::new(&tok, &rel, None, 6, RootRepresentation::Cls).unwrap();
        let mut s = sentence(&[("he", "PN", &[]), ("came", "VV", &[])]);
        s.words.iter_mut().for_each(|w| w.arcs = None);
        let sample = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap();
        assert!(sample.dep_ids.iter().all(|&d| d == 0));
        assert_eq!(sample.sent_len, 3);
    }

    #[test]
    fn test_input_mask_only_applies_in_training() {
        let (tok, rel, _) = setup();
        let b = FeatureBuilder::new(&tok, &rel, None, 6, RootRepresentation::Cls)
            .unwrap()
            .with_input_mask_prob(1.0);
        let s = sentence(&[("he", "PN", &[(0, "Root")])]);
        let mask_id = tok.token_to_id(MASK).unwrap();
        let train = b.build(&s, true, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_eq!(train.input_ids[1], mask_id);
        let dev = b.build(&s, false, &mut StdRng::seed_from_u64(0)).unwrap();
        assert_ne!(dev.input_ids[1], mask_id);
    }
}
