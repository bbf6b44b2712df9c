// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Filesystem-facing concerns shared by the other layers:
//
//   checkpoint.rs      — model weights via Burn's
//                        MessagePack recorder, plus the JSON side
//                        files (config, vocabularies) that let
//                        inference rebuild the parser
//
//   tokenizer_store.rs — word-level tokenizer built from the
//                        corpus, saved once and reloaded so
//                        training and inference share ids
//
//   metrics.rs         — tagged scalar summaries as CSV
//
//   scorer.rs          — UAS / LAS of predicted vs gold graphs

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Scalar summary writer
pub mod metrics;

/// Attachment scoring
pub mod scorer;
