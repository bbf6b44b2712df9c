// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from a CoNLL-U file to device tensor batches.
//
//   .conllu file
//       │
//       ▼
//   ConllFile         → rows, columns, comments (read + write)
//       │
//       ▼
//   FeatureBuilder    → word ↔ token alignment, gold arc grid
//       │
//       ▼
//   DepDataset        → implements Burn's Dataset trait
//       │
//       ▼
//   DepBatcher        → stacks samples into tensor batches
//       │
//       ▼
//   DataLoader        → feeds batches to the trainer
//
// Reference: Burn Book §4 (Datasets and Dataloaders)

/// CoNLL-U reading, field updates and writing
pub mod conllu;

/// Sentence → padded, aligned sample
pub mod features;

/// Implements Burn's Dataset trait for aligned samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;
