// ============================================================
// Layer 5 — Loss & Decision Engine
// ============================================================
// One entry point, update_and_predict, driven by three flags:
//
//   calc_loss        masked composite loss (needs gold targets)
//   update           one optimization step on that loss
//   calc_prediction  decode-ready probabilities → external
//                    decoder → corpus-format predictions
//                    (needs sentence lengths)
//
// Decoding composition:
//
//   P[b,h,d,k] = σ(unlabeled[b,h,d]) · softmax(labeled[b,h,d,·])[k]
//                · weight[b,h,d]
//
// The engine holds only settings and borrowed collaborators.
// The model's parameters change only inside the updater.

use burn::{
    prelude::*,
    tensor::activation::{sigmoid, softmax},
};

use crate::domain::decoder::ProbGrid;
use crate::domain::error::{ParserError, Result};
use crate::domain::sentence::Prediction;
use crate::domain::traits::{GraphDecoder, MetricsSink};
use crate::domain::vocab::LabelVocab;
use crate::ml::loss::{self, LossSettings};
use crate::ml::model::ParserScores;
use crate::ml::optim::ParameterUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepFlags {
    pub calc_loss:       bool,
    pub update:          bool,
    pub calc_prediction: bool,
}

impl StepFlags {
    pub const TRAIN: Self = Self { calc_loss: true, update: true, calc_prediction: false };
    pub const DECODE: Self = Self { calc_loss: false, update: false, calc_prediction: true };
}

#[derive(Debug, Clone)]
pub struct GoldTargets<B: Backend> {
    pub dep_ids: Tensor<B, 3, Int>,
    pub pos_ids: Option<Tensor<B, 2, Int>>,
}

#[derive(Debug, Clone, Default)]
pub struct StepOutput {
    /// Detached scalar loss.
    pub loss:            Option<f64>,
    /// One DEPS string per real word, per sentence.
    pub predictions:     Option<Vec<Prediction>>,
    /// One POS tag per real word, per sentence.
    pub pos_predictions: Option<Vec<Prediction>>,
}

/// Where component losses are reported.
pub struct SummaryTarget<'s> {
    pub sink:        &'s mut dyn MetricsSink,
    pub global_step: usize,
}

pub struct DecisionEngine<'a> {
    pub loss:        LossSettings,
    pub pos_pad_idx: usize,
    pub decoder:     &'a dyn GraphDecoder,
    pub relations:   &'a LabelVocab,
    pub pos_tags:    Option<&'a LabelVocab>,
}

impl<'a> DecisionEngine<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn update_and_predict<B: Backend>(
        &self,
        scores:           ParserScores<B>,
        gold:             Option<GoldTargets<B>>,
        word_pad_mask:    Tensor<B, 2, Bool>,
        sentence_lengths: Option<&[usize]>,
        flags:            StepFlags,
        updater:          Option<&mut dyn ParameterUpdate<B>>,
        summary:          Option<SummaryTarget<'_>>,
    ) -> Result<StepOutput> {
        if flags.calc_loss && gold.is_none() {
            return Err(ParserError::config("gold targets are required when calc_loss is set"));
        }
        if flags.update && !flags.calc_loss {
            return Err(ParserError::config("update requires calc_loss"));
        }
        if flags.calc_prediction && sentence_lengths.is_none() {
            return Err(ParserError::config("sentence_lengths are required when calc_prediction is set"));
        }

        let weights = loss::weight_mask(word_pad_mask.clone());
        let mut output = StepOutput::default();

        if flags.calc_loss {
            if let Some(gold) = gold {
                let total = self.compute_loss(&scores, gold, weights.clone(), word_pad_mask, summary)?;
                output.loss = Some(total.clone().into_scalar().elem::<f64>());
                if flags.update {
                    let updater = updater
                        .ok_or_else(|| ParserError::config("update requested without an optimizer"))?;
                    updater.apply(total)?;
                }
            }
        }

        if flags.calc_prediction {
            if let Some(lengths) = sentence_lengths {
                output.pos_predictions = self.predict_pos(&scores, lengths)?;
                output.predictions = Some(self.decode(scores, weights, lengths)?);
            }
        }

        Ok(output)
    }

    fn compute_loss<B: Backend>(
        &self,
        scores:        &ParserScores<B>,
        gold:          GoldTargets<B>,
        weights:       Tensor<B, 3>,
        word_pad_mask: Tensor<B, 2, Bool>,
        summary:       Option<SummaryTarget<'_>>,
    ) -> Result<Tensor<B, 1>> {
        let arc = loss::arc_loss(scores.unlabeled.clone(), loss::arc_targets(gold.dep_ids.clone()), weights);
        let label = loss::label_loss(scores.labeled.clone(), gold.dep_ids);
        let pos = match (&scores.pos_logits, gold.pos_ids) {
            (Some(logits), Some(ids)) => Some(loss::pos_loss(logits.clone(), ids, self.pos_pad_idx)),
            (Some(_), None) => {
                return Err(ParserError::config("the POS head is enabled but no gold POS ids were given"))
            }
            (None, _) => None,
        };

        if let Some(SummaryTarget { sink, global_step }) = summary {
            if global_step > 0 {
                sink.add_scalar("train_loss/dep_arc_loss", arc.clone().into_scalar().elem::<f64>(), global_step)?;
                sink.add_scalar("train_loss/dep_label_loss", label.clone().into_scalar().elem::<f64>(), global_step)?;
                if let Some(p) = &pos {
                    sink.add_scalar("train_loss/pos_loss", p.clone().into_scalar().elem::<f64>(), global_step)?;
                }
            }
        }

        let combined = self.loss.combine(arc, label, pos);
        Ok(self.loss.postprocess(combined, loss::words_num(word_pad_mask)))
    }

    /// Combined pair probabilities, zero wherever a position is padding.
    pub fn pair_probabilities<B: Backend>(scores: ParserScores<B>, weights: Tensor<B, 3>) -> Tensor<B, 4> {
        let [batch, len, len2, labels] = scores.labeled.dims();
        let shape = [batch, len, len2, labels];
        let arc_prob = sigmoid(scores.unlabeled).unsqueeze_dim::<4>(3).expand(Shape::new(shape));
        let label_prob = softmax(scores.labeled, 3);
        arc_prob * label_prob * weights.unsqueeze_dim::<4>(3).expand(Shape::new(shape))
    }

    fn decode<B: Backend>(&self, scores: ParserScores<B>, weights: Tensor<B, 3>, lengths: &[usize]) -> Result<Vec<Prediction>> {
        let probs = Self::pair_probabilities(scores, weights);
        let dims = probs.dims();
        let data = probs
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| ParserError::shape(format!("cannot read pair probabilities: {e:?}")))?;
        let grid = ProbGrid::new(data, dims)?;
        let graphs = self.decoder.decode(&grid, lengths)?;
        self.relations.parse_to_sent_batch(&graphs)
    }

    fn predict_pos<B: Backend>(&self, scores: &ParserScores<B>, lengths: &[usize]) -> Result<Option<Vec<Prediction>>> {
        let (Some(logits), Some(tags)) = (&scores.pos_logits, self.pos_tags) else {
            return Ok(None);
        };
        let [batch, len, _] = logits.dims();
        let ids = logits
            .clone()
            .argmax(2)
            .reshape([batch * len])
            .into_data()
            .convert::<i64>()
            .to_vec::<i64>()
            .map_err(|e| ParserError::shape(format!("cannot read POS predictions: {e:?}")))?;

        lengths
            .iter()
            .enumerate()
            .map(|(b, &n)| {
                (1..n.min(len))
                    .map(|w| {
                        let id = ids[b * len + w] as usize;
                        // the pad id never names a tag
                        if id == self.pos_pad_idx {
                            Ok("_".to_string())
                        } else {
                            tags.label_of(id).map(str::to_string)
                        }
                    })
                    .collect::<Result<Prediction>>()
            })
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::decoder::ThresholdDecoder;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[derive(Default)]
    struct RecordingSink {
        rows: Vec<(String, f64, usize)>,
    }

    impl MetricsSink for RecordingSink {
        fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
            self.rows.push((tag.to_string(), value, step));
            Ok(())
        }
    }

    #[derive(Default)]
    struct CountingUpdater {
        calls: usize,
        last:  f64,
    }

    impl ParameterUpdate<TestBackend> for CountingUpdater {
        fn apply(&mut self, loss: Tensor<TestBackend, 1>) -> Result<()> {
            self.calls += 1;
            self.last = loss.into_scalar() as f64;
            Ok(())
        }

        fn learning_rate(&self) -> f64 {
            1e-3
        }
    }

    fn vocab() -> LabelVocab {
        LabelVocab::relations(["Agt", "Root"])
    }

    /// B=2, L=4; sentence 0 has length 3 (ROOT included), sentence 1 length 4.
    fn fixture() -> (ParserScores<TestBackend>, Tensor<TestBackend, 2, Bool>, Tensor<TestBackend, 3, Int>) {
        let device = Default::default();
        let unlabeled: Vec<f32> = (0..32).map(|v| ((v * 5) % 7) as f32 - 3.0).collect();
        let labeled: Vec<f32> = (0..96).map(|v| ((v * 3) % 11) as f32 * 0.2 - 1.0).collect();
        let scores = ParserScores {
            unlabeled:  Tensor::<TestBackend, 1>::from_floats(unlabeled.as_slice(), &device).reshape([2, 4, 4]),
            labeled:    Tensor::<TestBackend, 1>::from_floats(labeled.as_slice(), &device).reshape([2, 4, 4, 3]),
            pos_logits: None,
        };
        let pads = [false, false, false, true, false, false, false, false];
        let pad_mask = Tensor::<TestBackend, 1, Bool>::from_bool(TensorData::from(pads.as_slice()), &device)
            .reshape([2, 4]);
        let mut gold = vec![0i32; 32];
        gold[1] = 2; // ROOT → word 1, "Root"
        gold[4 + 2] = 1; // word 1 → word 2, "Agt"
        gold[16 + 2] = 2;
        gold[16 + 2 * 4 + 1] = 1;
        gold[16 + 2 * 4 + 3] = 1;
        let dep_ids = Tensor::<TestBackend, 1, Int>::from_ints(gold.as_slice(), &device).reshape([2, 4, 4]);
        (scores, pad_mask, dep_ids)
    }

    fn engine<'a>(decoder: &'a ThresholdDecoder, relations: &'a LabelVocab) -> DecisionEngine<'a> {
        DecisionEngine { loss: LossSettings::default(), pos_pad_idx: 0, decoder, relations, pos_tags: None }
    }

    #[test]
    fn test_calc_loss_without_gold_is_config_error() {
        let (scores, mask, _) = fixture();
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let err = engine(&decoder, &relations)
            .update_and_predict(scores, None, mask, None, StepFlags::TRAIN, None, None)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_prediction_without_lengths_is_config_error() {
        let (scores, mask, _) = fixture();
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let err = engine(&decoder, &relations)
            .update_and_predict(scores, None, mask, None, StepFlags::DECODE, None, None)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_pos_head_without_gold_pos_is_config_error() {
        let (mut scores, mask, dep_ids) = fixture();
        scores.pos_logits = Some(Tensor::zeros([2, 4, 3], &Default::default()));
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let flags = StepFlags { calc_loss: true, update: false, calc_prediction: false };
        let err = engine(&decoder, &relations)
            .update_and_predict(scores, Some(GoldTargets { dep_ids, pos_ids: None }), mask, None, flags, None, None)
            .unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_loss_matches_components_and_update_receives_it() {
        let (scores, mask, dep_ids) = fixture();
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let engine = engine(&decoder, &relations);

        let weights = loss::weight_mask(mask.clone());
        let arc: f32 = loss::arc_loss(scores.unlabeled.clone(), loss::arc_targets(dep_ids.clone()), weights)
            .into_scalar();
        let label: f32 = loss::label_loss(scores.labeled.clone(), dep_ids.clone()).into_scalar();
        let expected = (2.0 * (0.5 * arc + 0.5 * label) / 7.0) as f64;

        let mut updater = CountingUpdater::default();
        let mut sink = RecordingSink::default();
        let out = engine
            .update_and_predict(
                scores,
                Some(GoldTargets { dep_ids, pos_ids: None }),
                mask,
                None,
                StepFlags::TRAIN,
                Some(&mut updater),
                Some(SummaryTarget { sink: &mut sink, global_step: 3 }),
            )
            .unwrap();

        let loss = out.loss.unwrap();
        assert!((loss - expected).abs() < 1e-4);
        assert_eq!(updater.calls, 1);
        assert!((updater.last - loss).abs() < 1e-6);
        assert!(out.predictions.is_none());
        let tags: Vec<&str> = sink.rows.iter().map(|r| r.0.as_str()).collect();
        assert_eq!(tags, vec!["train_loss/dep_arc_loss", "train_loss/dep_label_loss"]);
        assert!(sink.rows.iter().all(|r| r.2 == 3));
    }

    #[test]
    fn test_no_summary_at_step_zero() {
        let (scores, mask, dep_ids) = fixture();
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let mut sink = RecordingSink::default();
        let flags = StepFlags { calc_loss: true, update: false, calc_prediction: false };
        engine(&decoder, &relations)
            .update_and_predict(
                scores,
                Some(GoldTargets { dep_ids, pos_ids: None }),
                mask,
                None,
                flags,
                None,
                Some(SummaryTarget { sink: &mut sink, global_step: 0 }),
            )
            .unwrap();
        assert!(sink.rows.is_empty());
    }

    #[test]
    fn test_masked_pairs_have_zero_probability() {
        let (scores, mask, _) = fixture();
        let probs: Vec<f32> = DecisionEngine::pair_probabilities(scores, loss::weight_mask(mask))
            .into_data()
            .to_vec()
            .unwrap();
        let at = |b: usize, h: usize, d: usize, k: usize| probs[((b * 4 + h) * 4 + d) * 3 + k];
        for h in 0..4 {
            for d in 0..4 {
                let pair: Vec<f32> = (0..3).map(|k| at(0, h, d, k)).collect();
                if h == 3 || d == 3 {
                    assert!(pair.iter().all(|&p| p == 0.0));
                } else {
                    // Σ_k P = σ(x) ∈ (0, 1)
                    let arc: f32 = pair.iter().sum();
                    assert!(arc > 0.0 && arc < 1.0);
                }
            }
        }
    }

    #[test]
    fn test_decode_produces_one_cell_per_word() {
        let (scores, mask, _) = fixture();
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let out = engine(&decoder, &relations)
            .update_and_predict(scores, None, mask, Some(&[3, 4]), StepFlags::DECODE, None, None)
            .unwrap();
        assert!(out.loss.is_none());
        let preds = out.predictions.unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[0].len(), 2);
        assert_eq!(preds[1].len(), 3);
        assert!(preds.iter().flatten().all(|cell| cell != "_"));
    }

    #[test]
    fn test_pos_predictions_use_tag_vocab() {
        let (mut scores, mask, _) = fixture();
        let device = Default::default();
        // every position prefers id 2
        let logits: Vec<f32> = (0..24).map(|v| if v % 3 == 2 { 4.0 } else { 0.0 }).collect();
        scores.pos_logits =
            Some(Tensor::<TestBackend, 1>::from_floats(logits.as_slice(), &device).reshape([2, 4, 3]));
        let tags = LabelVocab::pos_tags(["NN", "VV"]);
        let (decoder, relations) = (ThresholdDecoder::default(), vocab());
        let engine = DecisionEngine { pos_tags: Some(&tags), ..engine(&decoder, &relations) };
        let out = engine
            .update_and_predict(scores, None, mask, Some(&[3, 4]), StepFlags::DECODE, None, None)
            .unwrap();
        let pos = out.pos_predictions.unwrap();
        assert_eq!(pos[0], vec!["VV".to_string(), "VV".to_string()]);
        assert_eq!(pos[1].len(), 3);
    }
}
