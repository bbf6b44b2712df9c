// ============================================================
// Layer 6 — Attachment Scorer
// ============================================================
// Semantic dependency scoring on arc sets:
//
//   UAS = F1 over (sentence, head, dependent)
//   LAS = F1 over (sentence, head, dependent, label)
//
// F1 = 2·P·R / (P + R), with P = correct / predicted and
// R = correct / gold. Both scores lie in [0, 1]. With one
// head per word and every word attached, P = R and the F1
// equals the classic attachment accuracy.

use std::{collections::HashSet, path::Path};

use crate::data::conllu::ConllFile;
use crate::domain::error::{ParserError, Result};
use crate::domain::sentence::Sentence;
use crate::domain::traits::AttachmentScorer;

#[derive(Debug, Clone, Copy, Default)]
pub struct SdpScorer;

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Counts {
    predicted: usize,
    gold:      usize,
    correct:   usize,
}

impl Counts {
    fn f1(&self) -> f64 {
        if self.predicted == 0 || self.gold == 0 || self.correct == 0 {
            return 0.0;
        }
        let p = self.correct as f64 / self.predicted as f64;
        let r = self.correct as f64 / self.gold as f64;
        2.0 * p * r / (p + r)
    }
}

fn labeled_arcs(sentence: &Sentence) -> HashSet<(usize, usize, &str)> {
    sentence
        .words
        .iter()
        .enumerate()
        .flat_map(|(k, w)| w.arcs.iter().flatten().map(move |a| (a.head, k + 1, a.label.as_str())))
        .collect()
}

impl AttachmentScorer for SdpScorer {
    fn score_sentences(&self, predicted: &[Sentence], gold: &[Sentence]) -> Result<(f64, f64)> {
        if predicted.len() != gold.len() {
            return Err(ParserError::data(format!(
                "{} predicted sentences for {} gold sentences",
                predicted.len(),
                gold.len()
            )));
        }
        let mut unlabeled = Counts::default();
        let mut labeled = Counts::default();

        for (i, (p, g)) in predicted.iter().zip(gold).enumerate() {
            if p.words.len() != g.words.len() {
                return Err(ParserError::data(format!(
                    "sentence {i}: {} predicted words for {} gold words",
                    p.words.len(),
                    g.words.len()
                )));
            }
            let p_arcs = labeled_arcs(p);
            let g_arcs = labeled_arcs(g);
            let p_pairs: HashSet<(usize, usize)> = p_arcs.iter().map(|&(h, d, _)| (h, d)).collect();
            let g_pairs: HashSet<(usize, usize)> = g_arcs.iter().map(|&(h, d, _)| (h, d)).collect();

            labeled.predicted += p_arcs.len();
            labeled.gold += g_arcs.len();
            labeled.correct += p_arcs.intersection(&g_arcs).count();
            unlabeled.predicted += p_pairs.len();
            unlabeled.gold += g_pairs.len();
            unlabeled.correct += p_pairs.intersection(&g_pairs).count();
        }

        Ok((unlabeled.f1(), labeled.f1()))
    }

    fn score(&self, predicted_path: &Path, gold_path: &Path) -> Result<(f64, f64)> {
        let predicted = ConllFile::read(predicted_path)?.sentences()?;
        let gold = ConllFile::read(gold_path)?.sentences()?;
        self.score_sentences(&predicted, &gold)
    }
}
