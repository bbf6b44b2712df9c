// ============================================================
// Layer 3 — Best Result Tracker
// ============================================================
// Remembers the best attachment scores seen across the
// evaluation points of one training run.
//
// UAS and LAS are tracked independently; only a strict LAS
// improvement counts as a new record. The LAS epoch is what
// the early-stop rule compares against.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BestResult {
    pub best_las:       f64,
    pub best_las_epoch: usize,
    pub best_uas:       f64,
    pub best_uas_epoch: usize,
}

impl Default for BestResult {
    fn default() -> Self {
        Self {
            best_las:       f64::NEG_INFINITY,
            best_las_epoch: 0,
            best_uas:       f64::NEG_INFINITY,
            best_uas_epoch: 0,
        }
    }
}

impl BestResult {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one evaluation into the tracker.
    /// Returns true when LAS strictly improved.
    pub fn is_new_record(&mut self, las: f64, uas: f64, epoch: usize) -> bool {
        if uas > self.best_uas {
            self.best_uas = uas;
            self.best_uas_epoch = epoch;
        }
        if las > self.best_las {
            self.best_las = las;
            self.best_las_epoch = epoch;
            return true;
        }
        false
    }

    /// True once at least one evaluation has been recorded.
    pub fn has_record(&self) -> bool {
        self.best_las.is_finite()
    }

    /// Epochs elapsed since the best LAS was observed.
    pub fn epochs_since_best(&self, epoch: usize) -> usize {
        epoch.saturating_sub(self.best_las_epoch)
    }
}

impl fmt::Display for BestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.has_record() {
            return write!(f, "no evaluation recorded");
        }
        writeln!(f, "best UAS: {:.4} (epoch {})", self.best_uas, self.best_uas_epoch)?;
        write!(f, "best LAS: {:.4} (epoch {})", self.best_las, self.best_las_epoch)
    }
}
