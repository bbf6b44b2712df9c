use burn::data::dataset::Dataset;
use serde::{Deserialize, Serialize};

/// One aligned, padded sentence.
///
/// Token-level vectors have length `max_seq_len`; word-level vectors have
/// length `max_seq_len` as well, and `dep_ids` is the flattened
/// `[max_seq_len, max_seq_len]` grid indexed `[head, dependent]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepSample {
    pub input_ids:      Vec<u32>,
    pub attention_mask: Vec<u32>,
    pub token_type_ids: Vec<u32>,
    pub start_pos:      Vec<u32>,
    pub end_pos:        Vec<u32>,
    pub word_mask:      Vec<u32>,
    pub dep_ids:        Vec<u32>,
    pub pos_ids:        Vec<u32>,
    /// Word positions including ROOT.
    pub sent_len:       usize,
}

impl DepSample {
    pub fn arc_count(&self) -> usize {
        self.dep_ids.iter().filter(|&&d| d > 0).count()
    }
}

pub struct DepDataset {
    samples: Vec<DepSample>,
}

impl DepDataset {
    pub fn new(samples: Vec<DepSample>) -> Self { Self { samples } }

    pub fn sample_count(&self) -> usize { self.samples.len() }
}

impl Dataset<DepSample> for DepDataset {
    fn get(&self, index: usize) -> Option<DepSample> {
        self.samples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}
