// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The parser core talks to its collaborators only through
// these traits:
//
//   GraphDecoder      — probability grid → dependency graphs
//   AttachmentScorer  — predicted corpus vs gold → (UAS, LAS)
//   MetricsSink       — tagged scalar summaries
//
// All three are plain Rust: no tensors cross this boundary.

use std::path::Path;

use super::decoder::ProbGrid;
use super::error::Result;
use super::sentence::{Sentence, SemGraph};

/// Turns combined arc×label probabilities into concrete graphs.
pub trait GraphDecoder: Send + Sync {
    /// `lengths[b]` counts ROOT, so a sentence with 3 words has length 4.
    fn decode(&self, probs: &ProbGrid, lengths: &[usize]) -> Result<Vec<SemGraph>>;
}

/// Compares predicted arcs against gold arcs.
pub trait AttachmentScorer: Send + Sync {
    /// Score two in-memory corpora, sentence by sentence.
    fn score_sentences(&self, predicted: &[Sentence], gold: &[Sentence]) -> Result<(f64, f64)>;

    /// Score a written prediction file against the gold input file.
    fn score(&self, predicted_path: &Path, gold_path: &Path) -> Result<(f64, f64)>;
}

/// Destination for tagged scalar summaries (losses, learning rate, scores).
pub trait MetricsSink {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()>;
}
