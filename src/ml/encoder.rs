// ============================================================
// Layer 5 — Contextual Encoder ("bertology" family)
// ============================================================
// Token ids → one contextual vector per WORD position.
//
//   input_ids        [batch, T]   ─┐
//   token_type_ids   [batch, T]   ─┼─► embeddings → N encoder blocks → LayerNorm
//   attention_mask   [batch, T]   ─┘         (padding masked in attention)
//                                                  │ [batch, T, d_model]
//   start_pos/end_pos [batch, L] ──────────────────► word selection
//                                                  │ [batch, L, d_model]
//
// Word selection picks, for every word, the token vector at
// its start position, its end position, or the average of
// both. Position 0 of the word axis is ROOT.

use burn::{
    module::Ignored,
    nn::{
        attention::{MhaInput, MultiHeadAttention, MultiHeadAttentionConfig},
        Dropout, DropoutConfig, Embedding, EmbeddingConfig, LayerNorm, LayerNormConfig, Linear, LinearConfig,
    },
    prelude::*,
};
use serde::{Deserialize, Serialize};

use crate::domain::error::{self, ParserError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WordSelect {
    Start,
    End,
    Average,
}

/// The named inputs the bertology encoder consumes.
#[derive(Debug, Clone)]
pub struct EncoderInputs<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub token_type_ids: Tensor<B, 2, Int>,
    pub start_pos:      Tensor<B, 2, Int>,
    pub end_pos:        Tensor<B, 2, Int>,
}

impl<B: Backend> EncoderInputs<B> {
    /// Reject structurally inconsistent inputs before any computation.
    pub fn validate(&self, max_seq_len: usize) -> error::Result<()> {
        let [batch, tokens] = self.input_ids.dims();
        let token_shaped = [("attention_mask", self.attention_mask.dims()), ("token_type_ids", self.token_type_ids.dims())];
        for (name, dims) in token_shaped {
            if dims != [batch, tokens] {
                return Err(ParserError::config(format!(
                    "encoder input '{name}' has shape {dims:?}, expected [{batch}, {tokens}] like input_ids"
                )));
            }
        }
        if tokens > max_seq_len {
            return Err(ParserError::config(format!(
                "input_ids hold {tokens} tokens, more than max_seq_len {max_seq_len}"
            )));
        }
        for (name, dims) in [("start_pos", self.start_pos.dims()), ("end_pos", self.end_pos.dims())] {
            if dims != [batch, max_seq_len] {
                return Err(ParserError::config(format!(
                    "encoder input '{name}' has shape {dims:?}, expected [{batch}, {max_seq_len}]"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Config, Debug)]
pub struct BertologyEncoderConfig {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
    #[config(default = "WordSelect::Start")]
    pub word_select: WordSelect,
    #[config(default = 2)]
    pub type_vocab_size: usize,
}

impl BertologyEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> BertologyEncoder<B> {
        let layers = (0..self.num_layers).map(|_| self.build_encoder_block(device)).collect();
        BertologyEncoder {
            token_embedding:    EmbeddingConfig::new(self.vocab_size, self.d_model).init(device),
            position_embedding: EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device),
            segment_embedding:  EmbeddingConfig::new(self.type_vocab_size, self.d_model).init(device),
            layers,
            final_norm:         LayerNormConfig::new(self.d_model).init(device),
            dropout:            DropoutConfig::new(self.dropout).init(),
            word_select:        Ignored(self.word_select),
        }
    }

    fn build_encoder_block<B: Backend>(&self, device: &B::Device) -> EncoderBlock<B> {
        EncoderBlock {
            self_attn:   MultiHeadAttentionConfig::new(self.d_model, self.num_heads)
                .with_dropout(self.dropout)
                .init(device),
            ffn_linear1: LinearConfig::new(self.d_model, self.d_ff).init(device),
            ffn_linear2: LinearConfig::new(self.d_ff, self.d_model).init(device),
            norm1:       LayerNormConfig::new(self.d_model).init(device),
            norm2:       LayerNormConfig::new(self.d_model).init(device),
            dropout:     DropoutConfig::new(self.dropout).init(),
        }
    }
}

#[derive(Module, Debug)]
pub struct EncoderBlock<B: Backend> {
    pub self_attn:   MultiHeadAttention<B>,
    pub ffn_linear1: Linear<B>,
    pub ffn_linear2: Linear<B>,
    pub norm1:       LayerNorm<B>,
    pub norm2:       LayerNorm<B>,
    pub dropout:     Dropout,
}

impl<B: Backend> EncoderBlock<B> {
    /// Post-norm block; `mask_pad` is true at padded token positions.
    pub fn forward(&self, x: Tensor<B, 3>, mask_pad: Tensor<B, 2, Bool>) -> Tensor<B, 3> {
        let attn = self
            .self_attn
            .forward(MhaInput::self_attn(x.clone()).mask_pad(mask_pad))
            .context;
        let x = self.norm1.forward(x + self.dropout.forward(attn));
        let ffn = self.ffn_linear2.forward(
            burn::tensor::activation::gelu(self.ffn_linear1.forward(x.clone())),
        );
        self.norm2.forward(x + self.dropout.forward(ffn))
    }
}

#[derive(Module, Debug)]
pub struct BertologyEncoder<B: Backend> {
    pub token_embedding:    Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub segment_embedding:  Embedding<B>,
    pub layers:             Vec<EncoderBlock<B>>,
    pub final_norm:         LayerNorm<B>,
    pub dropout:            Dropout,
    pub word_select:        Ignored<WordSelect>,
}

impl<B: Backend> BertologyEncoder<B> {
    /// Token-level contextual vectors: [batch, T, d_model].
    pub fn encode_tokens(&self, inputs: &EncoderInputs<B>) -> Tensor<B, 3> {
        let [batch, tokens] = inputs.input_ids.dims();
        let device = inputs.input_ids.device();

        let positions = Tensor::<B, 1, Int>::arange(0..tokens as i64, &device)
            .unsqueeze::<2>()
            .expand(Shape::new([batch, tokens]));

        let embedded = self.token_embedding.forward(inputs.input_ids.clone())
            + self.position_embedding.forward(positions)
            + self.segment_embedding.forward(inputs.token_type_ids.clone());

        let mask_pad = inputs.attention_mask.clone().equal_elem(0);
        let mut x = self.dropout.forward(embedded);
        for layer in &self.layers {
            x = layer.forward(x, mask_pad.clone());
        }
        self.final_norm.forward(x)
    }

    /// Word-level contextual vectors: [batch, L, d_model].
    pub fn forward(&self, inputs: &EncoderInputs<B>) -> Tensor<B, 3> {
        let hidden = self.encode_tokens(inputs);
        let [batch, _, d_model] = hidden.dims();
        let [_, words] = inputs.start_pos.dims();

        let select = |pos: &Tensor<B, 2, Int>| {
            let index = pos.clone().unsqueeze_dim::<3>(2).expand(Shape::new([batch, words, d_model]));
            hidden.clone().gather(1, index)
        };
        match self.word_select.0 {
            WordSelect::Start => select(&inputs.start_pos),
            WordSelect::End => select(&inputs.end_pos),
            WordSelect::Average => (select(&inputs.start_pos) + select(&inputs.end_pos)).div_scalar(2.0),
        }
    }
}
