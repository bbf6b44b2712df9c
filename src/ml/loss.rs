// ============================================================
// Layer 5 — Composite Masked Loss
// ============================================================
// Three supervision signals under variable-length padding:
//
//   arc   — BCE-with-logits of unlabeled scores vs (dep_id ≥ 1),
//           weighted by the pair mask, summed
//   label — cross-entropy over relation labels at every pair,
//           gold id 0 ignored, summed
//   pos   — cross-entropy over POS ids, pad id ignored, averaged
//
//   loss = 2·[(1−α)·arc + α·label] + β·pos
//
// then optionally / words_num, × scaling ratio, and averaged
// over replicas.
//
// The pair mask is all-ones [B, L, L] with every row and
// every column of a padded word position zeroed.

use burn::{
    prelude::*,
    tensor::activation::{log_sigmoid, log_softmax},
};

use crate::domain::error::{ParserError, Result};

/// Pair weights from the word-pad mask (true = padding).
pub fn weight_mask<B: Backend>(word_pad_mask: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
    let [batch, len] = word_pad_mask.dims();
    let device = word_pad_mask.device();
    let shape = Shape::new([batch, len, len]);
    let weights = Tensor::<B, 3>::ones(shape.clone(), &device);
    // padded head → zero row
    let weights = weights.mask_fill(word_pad_mask.clone().unsqueeze_dim::<3>(2).expand(shape.clone()), 0.0);
    // padded dependent → zero column
    weights.mask_fill(word_pad_mask.unsqueeze_dim::<3>(1).expand(shape), 0.0)
}

/// Number of non-padded word positions in the batch.
pub fn words_num<B: Backend>(word_pad_mask: Tensor<B, 2, Bool>) -> usize {
    let pads: i64 = word_pad_mask.clone().int().sum().into_scalar().elem::<i64>();
    word_pad_mask.dims().iter().product::<usize>() - pads as usize
}

/// 1.0 where a gold arc exists (label id ≥ 1), else 0.0.
pub fn arc_targets<B: Backend>(dep_ids: Tensor<B, 3, Int>) -> Tensor<B, 3> {
    dep_ids.greater_equal_elem(1).float()
}

pub fn arc_loss<B: Backend>(unlabeled: Tensor<B, 3>, targets: Tensor<B, 3>, weights: Tensor<B, 3>) -> Tensor<B, 1> {
    // −[t·log σ(x) + (1−t)·log σ(−x)]
    let positive = log_sigmoid(unlabeled.clone()).mul(targets.clone());
    let negative = log_sigmoid(unlabeled.neg()).mul(targets.neg().add_scalar(1.0));
    (positive + negative).neg().mul(weights).sum()
}

pub fn label_loss<B: Backend>(labeled: Tensor<B, 4>, dep_ids: Tensor<B, 3, Int>) -> Tensor<B, 1> {
    let [batch, len, len2, _] = labeled.dims();
    let keep = dep_ids.clone().greater_equal_elem(1).float();
    let nll = log_softmax(labeled, 3)
        .gather(3, dep_ids.unsqueeze_dim::<4>(3))
        .reshape([batch, len, len2])
        .neg();
    nll.mul(keep).sum()
}

/// Mean cross-entropy over positions whose gold id is not `pad_idx`.
pub fn pos_loss<B: Backend>(logits: Tensor<B, 3>, pos_ids: Tensor<B, 2, Int>, pad_idx: usize) -> Tensor<B, 1> {
    let [batch, len, _] = logits.dims();
    let keep = pos_ids.clone().not_equal_elem(pad_idx as i64).float();
    let count = keep.clone().sum().clamp_min(1.0);
    let nll = log_softmax(logits, 2)
        .gather(2, pos_ids.unsqueeze_dim::<3>(2))
        .reshape([batch, len])
        .neg();
    nll.mul(keep).sum().div(count)
}

#[derive(Debug, Clone)]
pub struct LossSettings {
    /// α
    pub label_loss_ratio:          f64,
    /// β
    pub pos_loss_ratio:            f64,
    pub average_loss_by_words_num: bool,
    pub scale_loss:                bool,
    pub loss_scaling_ratio:        f64,
    pub n_gpu:                     usize,
}

impl Default for LossSettings {
    fn default() -> Self {
        Self {
            label_loss_ratio:          0.5,
            pos_loss_ratio:            1.0,
            average_loss_by_words_num: true,
            scale_loss:                false,
            loss_scaling_ratio:        1.0,
            n_gpu:                     1,
        }
    }
}

impl LossSettings {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.label_loss_ratio) {
            return Err(ParserError::config(format!(
                "label_loss_ratio must lie in [0, 1], got {}",
                self.label_loss_ratio
            )));
        }
        if self.pos_loss_ratio < 0.0 {
            return Err(ParserError::config("pos_loss_ratio must be non-negative"));
        }
        Ok(())
    }

    pub fn combine<B: Backend>(&self, arc: Tensor<B, 1>, label: Tensor<B, 1>, pos: Option<Tensor<B, 1>>) -> Tensor<B, 1> {
        let alpha = self.label_loss_ratio;
        let base = (arc.mul_scalar(1.0 - alpha) + label.mul_scalar(alpha)).mul_scalar(2.0);
        match pos {
            Some(p) => base + p.mul_scalar(self.pos_loss_ratio),
            None => base,
        }
    }

    pub fn postprocess<B: Backend>(&self, loss: Tensor<B, 1>, words_num: usize) -> Tensor<B, 1> {
        let mut loss = loss;
        if self.average_loss_by_words_num {
            loss = loss.div_scalar(words_num.max(1) as f64);
        }
        if self.scale_loss {
            loss = loss.mul_scalar(self.loss_scaling_ratio);
        }
        if self.n_gpu > 1 {
            // one value per replica
            loss = loss.mean();
        }
        loss
    }
}
