// ============================================================
// Layer 5 — Batch Unpacking
// ============================================================
// A raw loader batch → the structured fields the parser core
// needs:
//
//   inputs     named encoder inputs
//   word_mask  1 = real word (ROOT included), 0 = pad
//   sent_len   words per sentence, ROOT included
//   dep_ids    gold label id per (head, dependent), 0 = no arc
//   pos_ids    gold POS ids, 0 = pad
//
// Each encoder family has its own layout, so this is a trait
// and the controller stays generic over it.

use burn::prelude::*;

use crate::data::batcher::DepBatch;
use crate::domain::error::{ParserError, Result};
use crate::ml::encoder::EncoderInputs;
use crate::ml::model::EncoderType;

#[derive(Debug, Clone)]
pub struct UnpackedBatch<B: Backend> {
    pub inputs:    EncoderInputs<B>,
    pub word_mask: Tensor<B, 2, Int>,
    pub sent_len:  Vec<usize>,
    pub dep_ids:   Tensor<B, 3, Int>,
    pub pos_ids:   Tensor<B, 2, Int>,
}

impl<B: Backend> UnpackedBatch<B> {
    /// True at padded word positions.
    pub fn word_pad_mask(&self) -> Tensor<B, 2, Bool> {
        self.word_mask.clone().equal_elem(0)
    }
}

pub trait BatchUnpacker: Send + Sync {
    fn unpack<B: Backend>(&self, batch: DepBatch<B>) -> Result<UnpackedBatch<B>>;
}

/// Unpacking for transformer-style encoders: token ids, attention
/// mask, segment ids plus word start/end positions.
#[derive(Debug, Clone, Copy, Default)]
pub struct BertologyUnpacker;

impl BatchUnpacker for BertologyUnpacker {
    fn unpack<B: Backend>(&self, batch: DepBatch<B>) -> Result<UnpackedBatch<B>> {
        let [n, l] = batch.word_mask.dims();
        if batch.sent_len.len() != n {
            return Err(ParserError::shape(format!(
                "batch carries {} sentence lengths for {n} sentences",
                batch.sent_len.len()
            )));
        }
        if batch.dep_ids.dims() != [n, l, l] {
            return Err(ParserError::shape(format!(
                "dep_ids has shape {:?}, expected [{n}, {l}, {l}]",
                batch.dep_ids.dims()
            )));
        }
        Ok(UnpackedBatch {
            inputs: EncoderInputs {
                input_ids:      batch.input_ids,
                attention_mask: batch.attention_mask,
                token_type_ids: batch.token_type_ids,
                start_pos:      batch.start_pos,
                end_pos:        batch.end_pos,
            },
            word_mask: batch.word_mask,
            sent_len:  batch.sent_len,
            dep_ids:   batch.dep_ids,
            pos_ids:   batch.pos_ids,
        })
    }
}

/// The unpacker registered for an encoder family.
pub fn unpacker_for(encoder_type: EncoderType) -> Result<BertologyUnpacker> {
    match encoder_type {
        EncoderType::Bertology => Ok(BertologyUnpacker),
        other => Err(ParserError::config(format!("no batch unpacker for encoder_type {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::batcher::DepBatcher;
    use crate::data::dataset::DepSample;
    use burn::backend::NdArray;
    use burn::data::dataloader::batcher::Batcher;

    type TestBackend = NdArray<f32>;

    fn sample(len: usize) -> DepSample {
        let l = 4;
        let mut word_mask = vec![0; l];
        word_mask[..len].iter_mut().for_each(|m| *m = 1);
        DepSample {
            input_ids: vec![5; l],
            attention_mask: vec![1; l],
            token_type_ids: vec![0; l],
            start_pos: (0..l as u32).collect(),
            end_pos: (0..l as u32).collect(),
            word_mask,
            dep_ids: vec![0; l * l],
            pos_ids: vec![0; l],
            sent_len: len,
        }
    }

    #[test]
    fn test_bertology_unpack_keeps_fields() {
        let batch = DepBatcher::<TestBackend>::new(Default::default()).batch(vec![sample(3), sample(4)]);
        let unpacked = BertologyUnpacker.unpack(batch).unwrap();
        assert_eq!(unpacked.sent_len, vec![3, 4]);
        assert_eq!(unpacked.inputs.start_pos.dims(), [2, 4]);
        let pads: Vec<bool> = unpacked.word_pad_mask().into_data().to_vec().unwrap();
        assert_eq!(pads, vec![false, false, false, true, false, false, false, false]);
    }

    #[test]
    fn test_length_count_mismatch_is_shape_error() {
        let mut batch = DepBatcher::<TestBackend>::new(Default::default()).batch(vec![sample(3), sample(4)]);
        batch.sent_len.pop();
        assert!(matches!(BertologyUnpacker.unpack(batch), Err(ParserError::Shape(_))));
    }

    #[test]
    fn test_only_bertology_has_an_unpacker() {
        assert!(unpacker_for(EncoderType::Bertology).is_ok());
        assert!(unpacker_for(EncoderType::Gru).unwrap_err().is_config());
    }
}
