// ============================================================
// Layer 5 — Biaffine Dependency Model
// ============================================================
// Encoder + two biaffine scorers + optional POS classifier.
//
//                 EncoderInputs
//                      │
//               BertologyEncoder
//                      │  H: [batch, L, d]
//        ┌─────────────┼──────────────┐
//        ▼             ▼              ▼
//   unlabeled      labeled        POS linear
//   biaffine       biaffine       (optional)
//   [B, L, L]    [B, L, L, |R|]   [B, L, |P|]
//
// unlabeled[b, i, j] is the logit that word i governs word j.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::{self, ParserError};
use crate::ml::biaffine::{BiaffineScorer, BiaffineScorerConfig};
use crate::ml::encoder::{BertologyEncoder, BertologyEncoderConfig, EncoderInputs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum EncoderType {
    Bertology,
    Lstm,
    Gru,
    Transformer,
}

#[derive(Config, Debug)]
pub struct ParserModelConfig {
    pub encoder:             BertologyEncoderConfig,
    pub num_labels:          usize,
    #[config(default = "EncoderType::Bertology")]
    pub encoder_type:        EncoderType,
    #[config(default = false)]
    pub direct_biaffine:     bool,
    #[config(default = 512)]
    pub biaffine_hidden_dim: usize,
    #[config(default = 0.33)]
    pub biaffine_dropout:    f64,
    /// Number of POS ids (pad included); `None` disables the POS head.
    #[config(default = "None")]
    pub pos_label_num:       Option<usize>,
}

impl ParserModelConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> error::Result<BiaffineDependencyModel<B>> {
        if self.encoder_type != EncoderType::Bertology {
            return Err(ParserError::config(format!(
                "encoder_type {:?} is not supported, only bertology is implemented",
                self.encoder_type
            )));
        }
        if self.num_labels < 2 {
            return Err(ParserError::config("the relation vocabulary needs at least one label besides <NONE>"));
        }

        let d = self.encoder.d_model;
        let scorer = |out: usize| {
            if self.direct_biaffine {
                BiaffineScorerConfig::direct(d, d, out)
            } else {
                BiaffineScorerConfig::deep(d, d, self.biaffine_hidden_dim, out, self.biaffine_dropout)
            }
        };

        let pos_classifier = match self.pos_label_num {
            Some(n) if n < 2 => {
                return Err(ParserError::config("pos_label_num must count the pad id and at least one tag"))
            }
            Some(n) => Some(LinearConfig::new(d, n).init(device)),
            None => None,
        };

        Ok(BiaffineDependencyModel {
            encoder: self.encoder.init(device),
            unlabeled_biaffine: scorer(1).init(device),
            labeled_biaffine: scorer(self.num_labels).init(device),
            pos_classifier,
            max_seq_len: self.encoder.max_seq_len,
        })
    }
}

/// The three score tensors of one forward pass.
#[derive(Debug, Clone)]
pub struct ParserScores<B: Backend> {
    pub unlabeled:  Tensor<B, 3>,
    pub labeled:    Tensor<B, 4>,
    pub pos_logits: Option<Tensor<B, 3>>,
}

impl<B: Backend> ParserScores<B> {
    pub fn shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        let mut shapes = vec![
            ("unlabeled_scores", self.unlabeled.dims().to_vec()),
            ("labeled_scores", self.labeled.dims().to_vec()),
        ];
        if let Some(p) = &self.pos_logits {
            shapes.push(("pos_logits", p.dims().to_vec()));
        }
        shapes
    }
}

#[derive(Module, Debug)]
pub struct BiaffineDependencyModel<B: Backend> {
    pub encoder:            BertologyEncoder<B>,
    pub unlabeled_biaffine: BiaffineScorer<B>,
    pub labeled_biaffine:   BiaffineScorer<B>,
    pub pos_classifier:     Option<Linear<B>>,
    pub max_seq_len:        usize,
}

impl<B: Backend> BiaffineDependencyModel<B> {
    pub fn uses_pos(&self) -> bool {
        self.pos_classifier.is_some()
    }

    pub fn forward(&self, inputs: &EncoderInputs<B>) -> error::Result<ParserScores<B>> {
        inputs.validate(self.max_seq_len)?;

        let encoded = self.encoder.forward(inputs);
        let [batch, len, _] = encoded.dims();

        let unlabeled = self
            .unlabeled_biaffine
            .forward(encoded.clone(), encoded.clone())
            .reshape([batch, len, len]);
        let labeled = self.labeled_biaffine.forward(encoded.clone(), encoded.clone());
        let pos_logits = self.pos_classifier.as_ref().map(|c| c.forward(encoded));

        Ok(ParserScores { unlabeled, labeled, pos_logits })
    }
}
