// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Workflow coordination only: no tensor math, no printing,
// no file formats. Each use case wires the other layers
// together for one goal.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// Run configuration and its validation
pub mod config;

// The training workflow
pub mod train_use_case;

// Evaluation and parsing with a trained model
pub mod parse_use_case;
