// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Pure Rust structs and traits that define the parser's core
// concepts.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO ML-specific code
//   - Only plain Rust structs, enums, traits and the small
//     algorithms that work on them (decoding a host-side
//     probability grid, tracking the best result)

/// Error taxonomy shared by the library layers
pub mod error;

/// Sentences, arcs and decoded graphs
pub mod sentence;

/// Label ↔ id mapping for relations and POS tags
pub mod vocab;

/// Best (UAS, LAS, epoch) tracking across evaluations
pub mod best_result;

/// Probability grid and the default threshold decoder
pub mod decoder;

/// GraphDecoder, AttachmentScorer and MetricsSink abstractions
pub mod traits;
