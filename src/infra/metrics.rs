// ============================================================
// Layer 6 — Summary Writer
// ============================================================
// Records tagged scalars (losses, learning rate, attachment
// scores) to a CSV file during training.
//
// Output file: {summary_dir}/summary.csv
//
// Example CSV output:
//   step,tag,value
//   10,train_loss/dep_arc_loss,4.812200
//   10,lr/group_0,0.000050
//   10,metrics/las,0.412300
//   1,epoch_loss,5.104300
//
// Step-level tags follow the "group/name" convention so the
// file can be pivoted per group when plotting learning curves.
// `epoch_loss` is keyed by epoch instead of global step.
//
// Only the primary process opens a writer; other ranks never
// touch the file.

use std::{
    fs::{self, File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use crate::domain::error::{ParserError, Result};
use crate::domain::traits::MetricsSink;

pub struct SummaryWriter {
    csv_path: PathBuf,
    out:      Option<BufWriter<File>>,
}

impl SummaryWriter {
    /// Open (or continue) the summary file in `dir`.
    /// Writes the CSV header if the file doesn't exist yet.
    pub fn new(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("summary.csv");
        let is_new = !csv_path.exists();

        let file = OpenOptions::new().create(true).append(true).open(&csv_path)?;
        let mut out = BufWriter::new(file);
        if is_new {
            writeln!(out, "step,tag,value")?;
            tracing::debug!("Created summary CSV: '{}'", csv_path.display());
        }
        Ok(Self { csv_path, out: Some(out) })
    }

    pub fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        let out = self
            .out
            .as_mut()
            .ok_or_else(|| ParserError::config(format!("summary writer for '{}' is closed", self.csv_path.display())))?;
        writeln!(out, "{step},{tag},{value:.6}")?;
        Ok(())
    }

    /// Flush and release the file. Further writes are errors.
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.out.take() {
            out.flush()?;
        }
        Ok(())
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }
}

impl MetricsSink for SummaryWriter {
    fn add_scalar(&mut self, tag: &str, value: f64, step: usize) -> Result<()> {
        SummaryWriter::add_scalar(self, tag, value, step)
    }
}

impl Drop for SummaryWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!("Summary writer for '{}' failed to flush: {e}", self.csv_path.display());
        }
    }
}
