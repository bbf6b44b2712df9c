// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores the parser with Burn's named MessagePack
// recorder at full precision, so a reloaded model scores
// exactly like the one that was saved.
//
// What gets saved in the model directory:
//   1. model.mpk           — all learned parameters (f32)
//   2. train_config.json   — the configuration the model was
//                            built from
//   3. relations.json      — relation label vocabulary
//   4. pos_tags.json       — POS vocabulary (only with use_pos)
//   5. tokenizer.json      — written by the TokenizerStore
//
// The weights are rewritten whenever the dev LAS reaches a new
// best, so the directory always holds the best model so far.
// Inference rebuilds the architecture from train_config.json
// and then loads the weights into it; loading fails if the two
// do not match.
//
// Nothing touches the filesystem before the first save.

use anyhow::{Context, Result};
use std::{fs, path::{Path, PathBuf}};
use burn::{
    prelude::*,
    record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder},
};

use crate::application::config::ParserConfig;
use crate::domain::vocab::LabelVocab;
use crate::ml::model::BiaffineDependencyModel;

type ModelRecorder = NamedMpkFileRecorder<FullPrecisionSettings>;

const MODEL_FILE: &str = "model";
const CONFIG_FILE: &str = "train_config.json";
const RELATIONS_FILE: &str = "relations.json";
const POS_TAGS_FILE: &str = "pos_tags.json";

/// Manages the files of one saved parser.
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create model directory '{}'", self.dir.display()))
    }

    /// Save model weights, replacing any previous snapshot.
    pub fn save_pretrained<B: Backend>(&self, model: &BiaffineDependencyModel<B>) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(MODEL_FILE);

        ModelRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save model to '{}'", path.display()))?;

        tracing::debug!("Saved model weights to '{}'", path.display());
        Ok(())
    }

    /// Load saved weights into a freshly built model of the same architecture.
    pub fn load_pretrained<B: Backend>(
        &self,
        model:  BiaffineDependencyModel<B>,
        device: &B::Device,
    ) -> Result<BiaffineDependencyModel<B>> {
        let path = self.dir.join(MODEL_FILE);
        tracing::info!("Loading model weights from '{}'", path.display());

        let record = ModelRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load model '{}'. Have you trained the parser first?", path.display())
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &ParserConfig) -> Result<()> {
        self.ensure_dir()?;
        let path = self.dir.join(CONFIG_FILE);
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;
        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<ParserConfig> {
        let path = self.dir.join(CONFIG_FILE);
        let json = fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read config from '{}'. Make sure you have run 'train' first.",
                path.display()
            )
        })?;
        Ok(serde_json::from_str(&json)?)
    }

    pub fn save_vocabs(&self, relations: &LabelVocab, pos_tags: Option<&LabelVocab>) -> Result<()> {
        self.ensure_dir()?;
        relations
            .save(&self.dir.join(RELATIONS_FILE))
            .context("Cannot save relation vocabulary")?;
        if let Some(tags) = pos_tags {
            tags.save(&self.dir.join(POS_TAGS_FILE)).context("Cannot save POS vocabulary")?;
        }
        Ok(())
    }

    pub fn load_vocabs(&self, use_pos: bool) -> Result<(LabelVocab, Option<LabelVocab>)> {
        let relations = LabelVocab::load(&self.dir.join(RELATIONS_FILE))
            .with_context(|| format!("Cannot load relation vocabulary from '{}'", self.dir.display()))?;
        let pos_tags = if use_pos {
            Some(
                LabelVocab::load(&self.dir.join(POS_TAGS_FILE))
                    .with_context(|| format!("Cannot load POS vocabulary from '{}'", self.dir.display()))?,
            )
        } else {
            None
        };
        Ok((relations, pos_tags))
    }
}
