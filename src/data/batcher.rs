// ============================================================
// Layer 4 — Dependency Batcher
// ============================================================
// Implements Burn's Batcher trait to stack a Vec<DepSample>
// into device tensors.
//
// Shapes (N = batch size, T = L = max_seq_len):
//   input_ids, attention_mask, token_type_ids   [N, T]
//   start_pos, end_pos, word_mask, pos_ids      [N, L]
//   dep_ids                                     [N, L, L]
//
// All samples are pre-padded to the same length by the
// feature builder, so batching is flatten + reshape.

use burn::{
    data::dataloader::batcher::Batcher,
    prelude::*,
};

use crate::data::dataset::DepSample;

/// A raw batch as it comes out of the data loader.
#[derive(Debug, Clone)]
pub struct DepBatch<B: Backend> {
    pub input_ids:      Tensor<B, 2, Int>,
    pub attention_mask: Tensor<B, 2, Int>,
    pub token_type_ids: Tensor<B, 2, Int>,
    pub start_pos:      Tensor<B, 2, Int>,
    pub end_pos:        Tensor<B, 2, Int>,
    /// 1 = real word (ROOT included), 0 = padding
    pub word_mask:      Tensor<B, 2, Int>,
    pub dep_ids:        Tensor<B, 3, Int>,
    pub pos_ids:        Tensor<B, 2, Int>,
    /// Word positions per sentence, ROOT included
    pub sent_len:       Vec<usize>,
}

impl<B: Backend> DepBatch<B> {
    /// Every tensor's name and shape, for failure diagnostics.
    pub fn shapes(&self) -> Vec<(&'static str, Vec<usize>)> {
        vec![
            ("input_ids", self.input_ids.dims().to_vec()),
            ("attention_mask", self.attention_mask.dims().to_vec()),
            ("token_type_ids", self.token_type_ids.dims().to_vec()),
            ("start_pos", self.start_pos.dims().to_vec()),
            ("end_pos", self.end_pos.dims().to_vec()),
            ("word_mask", self.word_mask.dims().to_vec()),
            ("dep_ids", self.dep_ids.dims().to_vec()),
            ("pos_ids", self.pos_ids.dims().to_vec()),
        ]
    }

    pub fn batch_size(&self) -> usize {
        self.sent_len.len()
    }
}

#[derive(Clone, Debug)]
pub struct DepBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> DepBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    fn stack2(&self, rows: Vec<&Vec<u32>>, cols: usize) -> Tensor<B, 2, Int> {
        let n = rows.len();
        let flat: Vec<i32> = rows.into_iter().flat_map(|r| r.iter().map(|&x| x as i32)).collect();
        Tensor::<B, 1, Int>::from_ints(flat.as_slice(), &self.device).reshape([n, cols])
    }
}

impl<B: Backend> Batcher<DepSample, DepBatch<B>> for DepBatcher<B> {
    fn batch(&self, items: Vec<DepSample>) -> DepBatch<B> {
        let n = items.len();
        let t = items[0].input_ids.len();
        let l = items[0].word_mask.len();

        let dep_flat: Vec<i32> = items
            .iter()
            .flat_map(|s| s.dep_ids.iter().map(|&x| x as i32))
            .collect();
        let dep_ids = Tensor::<B, 1, Int>::from_ints(dep_flat.as_slice(), &self.device)
            .reshape([n, l, l]);

        DepBatch {
            input_ids:      self.stack2(items.iter().map(|s| &s.input_ids).collect(), t),
            attention_mask: self.stack2(items.iter().map(|s| &s.attention_mask).collect(), t),
            token_type_ids: self.stack2(items.iter().map(|s| &s.token_type_ids).collect(), t),
            start_pos:      self.stack2(items.iter().map(|s| &s.start_pos).collect(), l),
            end_pos:        self.stack2(items.iter().map(|s| &s.end_pos).collect(), l),
            word_mask:      self.stack2(items.iter().map(|s| &s.word_mask).collect(), l),
            pos_ids:        self.stack2(items.iter().map(|s| &s.pos_ids).collect(), l),
            dep_ids,
            sent_len:       items.iter().map(|s| s.sent_len).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    fn sample(len: usize, l: usize) -> DepSample {
        let mut word_mask = vec![0; l];
        word_mask[..len].iter_mut().for_each(|m| *m = 1);
        let mut dep_ids = vec![0; l * l];
        dep_ids[1] = 3;
        DepSample {
            input_ids: vec![1; l],
            attention_mask: vec![1; l],
            token_type_ids: vec![0; l],
            start_pos: (0..l as u32).collect(),
            end_pos: (0..l as u32).collect(),
            word_mask,
            dep_ids,
            pos_ids: vec![0; l],
            sent_len: len,
        }
    }

    #[test]
    fn test_batch_shapes() {
        let batcher = DepBatcher::<TestBackend>::new(Default::default());
        let batch = batcher.batch(vec![sample(3, 4), sample(4, 4)]);
        assert_eq!(batch.input_ids.dims(), [2, 4]);
        assert_eq!(batch.dep_ids.dims(), [2, 4, 4]);
        assert_eq!(batch.sent_len, vec![3, 4]);
        let mask: Vec<i64> = batch.word_mask.into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(mask, vec![1, 1, 1, 0, 1, 1, 1, 1]);
    }
}
