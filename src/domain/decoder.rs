// ============================================================
// Layer 3 — Probability Grid and Threshold Decoder
// ============================================================
// ProbGrid is a host-side copy of the combined probability
// tensor [batch, L, L, labels]; entry (b, h, d, k) is
//   P(arc h → d) × P(label k | arc h → d)
// with zeros wherever h or d is padding.
//
// ThresholdDecoder is the default GraphDecoder:
//   1. every (h, d) pair whose arc probability (the sum over
//      labels) exceeds the threshold becomes an arc
//   2. its label is the most probable non-"no arc" label
//   3. a word left without any head receives its single most
//      probable head, so every real word is attached

use super::error::{ParserError, Result};
use super::sentence::{LabeledArc, SemGraph};
use super::traits::GraphDecoder;

#[derive(Debug, Clone, PartialEq)]
pub struct ProbGrid {
    data:   Vec<f32>,
    batch:  usize,
    len:    usize,
    labels: usize,
}

impl ProbGrid {
    pub fn new(data: Vec<f32>, [batch, len, len2, labels]: [usize; 4]) -> Result<Self> {
        if len != len2 {
            return Err(ParserError::shape(format!("probability grid must be square, got {len}x{len2}")));
        }
        if data.len() != batch * len * len * labels {
            return Err(ParserError::shape(format!(
                "probability grid has {} values, expected {batch}x{len}x{len}x{labels}",
                data.len()
            )));
        }
        Ok(Self { data, batch, len, labels })
    }

    pub fn dims(&self) -> [usize; 4] {
        [self.batch, self.len, self.len, self.labels]
    }

    /// Label distribution for the pair (head, dependent) of sentence `b`.
    pub fn pair(&self, b: usize, head: usize, dep: usize) -> &[f32] {
        let start = ((b * self.len + head) * self.len + dep) * self.labels;
        &self.data[start..start + self.labels]
    }

    pub fn values(&self) -> &[f32] {
        &self.data
    }
}

#[derive(Debug, Clone)]
pub struct ThresholdDecoder {
    pub threshold: f32,
}

impl Default for ThresholdDecoder {
    fn default() -> Self {
        Self { threshold: 0.5 }
    }
}

impl ThresholdDecoder {
    fn best_label(dist: &[f32]) -> usize {
        dist.iter()
            .enumerate()
            .skip(1)
            .fold((1, f32::NEG_INFINITY), |best, (k, &p)| if p > best.1 { (k, p) } else { best })
            .0
    }

    fn decode_sentence(&self, probs: &ProbGrid, b: usize, n: usize) -> SemGraph {
        let mut graph = SemGraph::empty(n);
        for dep in 1..n {
            let mut fallback: Option<(usize, f32)> = None;
            for head in 0..n {
                if head == dep {
                    continue;
                }
                let dist = probs.pair(b, head, dep);
                let arc_prob: f32 = dist.iter().sum();
                if arc_prob > self.threshold {
                    graph.incoming[dep].push(LabeledArc { head, label_id: Self::best_label(dist) });
                }
                if fallback.map_or(true, |(_, p)| arc_prob > p) {
                    fallback = Some((head, arc_prob));
                }
            }
            if graph.incoming[dep].is_empty() {
                if let Some((head, _)) = fallback {
                    let label_id = Self::best_label(probs.pair(b, head, dep));
                    graph.incoming[dep].push(LabeledArc { head, label_id });
                }
            }
        }
        graph
    }
}

impl GraphDecoder for ThresholdDecoder {
    fn decode(&self, probs: &ProbGrid, lengths: &[usize]) -> Result<Vec<SemGraph>> {
        let [batch, len, _, labels] = probs.dims();
        if lengths.len() != batch {
            return Err(ParserError::shape(format!(
                "{} sentence lengths for a batch of {batch}",
                lengths.len()
            )));
        }
        if labels < 2 {
            return Err(ParserError::shape("label dimension must hold at least one real label"));
        }
        lengths
            .iter()
            .enumerate()
            .map(|(b, &n)| {
                if n > len {
                    return Err(ParserError::shape(format!("sentence length {n} exceeds grid size {len}")));
                }
                Ok(self.decode_sentence(probs, b, n))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Grid for one sentence of 2 words (len 3) and 3 labels.
    fn grid(set: &[(usize, usize, [f32; 3])]) -> ProbGrid {
        let mut data = vec![0.0; 3 * 3 * 3];
        for &(h, d, dist) in set {
            let start = (h * 3 + d) * 3;
            data[start..start + 3].copy_from_slice(&dist);
        }
        ProbGrid::new(data, [1, 3, 3, 3]).unwrap()
    }

    #[test]
    fn test_arcs_above_threshold_are_kept() {
        let probs = grid(&[
            (0, 2, [0.05, 0.05, 0.9]),
            (2, 1, [0.1, 0.6, 0.3]),
            (0, 1, [0.0, 0.3, 0.3]),
        ]);
        let graphs = ThresholdDecoder::default().decode(&probs, &[3]).unwrap();
        assert_eq!(graphs[0].incoming[2], vec![LabeledArc { head: 0, label_id: 2 }]);
        // 0→1 has arc prob 0.6 and 2→1 has 1.0, both above 0.5
        assert_eq!(graphs[0].incoming[1].len(), 2);
        assert!(graphs[0].incoming[0].is_empty());
    }

    #[test]
    fn test_unattached_word_gets_best_head() {
        let probs = grid(&[(0, 1, [0.1, 0.2, 0.05]), (2, 1, [0.0, 0.1, 0.1]), (0, 2, [0.0, 0.0, 0.9])]);
        let graphs = ThresholdDecoder::default().decode(&probs, &[3]).unwrap();
        assert_eq!(graphs[0].incoming[1], vec![LabeledArc { head: 0, label_id: 1 }]);
    }

    #[test]
    fn test_padding_positions_are_ignored() {
        let probs = grid(&[(0, 1, [0.0, 0.9, 0.0]), (2, 1, [0.0, 0.0, 0.99])]);
        let graphs = ThresholdDecoder::default().decode(&probs, &[2]).unwrap();
        assert_eq!(graphs[0].len_with_root(), 2);
        assert_eq!(graphs[0].incoming[1], vec![LabeledArc { head: 0, label_id: 1 }]);
    }

    #[test]
    fn test_length_mismatch_is_shape_error() {
        let probs = grid(&[]);
        assert!(matches!(
            ThresholdDecoder::default().decode(&probs, &[3, 3]).unwrap_err(),
            ParserError::Shape(_)
        ));
        assert!(ProbGrid::new(vec![0.0; 5], [1, 2, 2, 2]).is_err());
    }
}
