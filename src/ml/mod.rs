// ============================================================
// Layer 5 — ML / Model Layer (Burn)
// ============================================================
// All tensor math of the parser lives here.
//
//   biaffine.rs  — bilinear pair scorer with bias augmentation
//                  and the projection front end
//
//   encoder.rs   — transformer encoder ("bertology") that
//                  returns one vector per word, ROOT first
//
//   model.rs     — encoder + unlabeled / labeled biaffine
//                  scorers + optional POS classifier
//
//   loss.rs      — padding masks, arc / label / POS losses
//                  and their weighted combination
//
//   engine.rs    — update_and_predict: loss, optional update,
//                  optional decode, in one call
//
//   unpack.rs    — batch → named encoder inputs + gold targets
//
//   optim.rs     — AdamW, warmup/linear-decay schedule and
//                  the single in-place update step
//
//   trainer.rs   — epochs, periodic dev evaluation, best
//                  result, checkpointing, early stop, inference
//
// Reference: Dozat & Manning (2017) Deep Biaffine Attention
//            Burn Book §5 (Training)

/// Biaffine pair scorer
pub mod biaffine;

/// Transformer word encoder
pub mod encoder;

/// Full parsing model
pub mod model;

/// Masked composite loss
pub mod loss;

/// Loss / update / decode decision engine
pub mod engine;

/// Batch unpacking per encoder family
pub mod unpack;

/// Optimizer, scheduler and update step
pub mod optim;

/// Training / evaluation controller
pub mod trainer;
