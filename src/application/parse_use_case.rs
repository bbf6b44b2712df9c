// ============================================================
// Layer 2 — ParseUseCase
// ============================================================
// Runs a trained parser on a corpus:
//
//   evaluate  — parse a gold corpus, score it → (UAS, LAS)
//   parse     — fill DEPS (and UPOS with use_pos) of a
//               corpus, annotated or blank, and write it out
//
// Everything the parser needs is restored from the model
// directory written by training: train_config.json, the
// vocabularies, tokenizer.json and the weights.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use burn::{data::dataloader::DataLoaderBuilder, prelude::Backend};
use rand::{rngs::StdRng, SeedableRng};
use tokenizers::Tokenizer;

use crate::application::config::ValidatedConfig;
use crate::data::{batcher::DepBatcher, conllu::ConllFile, dataset::DepDataset, features::FeatureBuilder};
use crate::domain::{decoder::ThresholdDecoder, vocab::LabelVocab};
use crate::infra::{checkpoint::CheckpointManager, scorer::SdpScorer, tokenizer_store::TokenizerStore};
use crate::ml::{
    model::BiaffineDependencyModel,
    trainer::{DependencyTrainer, OutputPaths},
    unpack::{unpacker_for, BertologyUnpacker},
};

type InferBackend = burn::backend::Wgpu;

pub struct ParseUseCase {
    config:    ValidatedConfig,
    model_dir: PathBuf,
    tokenizer: Tokenizer,
    relations: LabelVocab,
    pos_tags:  Option<LabelVocab>,
    decoder:   ThresholdDecoder,
}

impl ParseUseCase {
    /// Restore config, vocabularies and tokenizer from a model directory.
    pub fn new(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let model_dir = model_dir.into();
        let checkpoints = CheckpointManager::new(&model_dir);
        let config = checkpoints.load_config()?.validate()?;
        let (relations, pos_tags) = checkpoints.load_vocabs(config.get().use_pos)?;
        let tokenizer = TokenizerStore::new(&model_dir).load()?;
        tracing::info!(
            "Loaded parser from '{}' ({} relation labels)",
            model_dir.display(),
            relations.len()
        );
        Ok(Self { config, model_dir, tokenizer, relations, pos_tags, decoder: ThresholdDecoder::default() })
    }

    fn trainer(&self, paths: OutputPaths, no_output: bool) -> Result<DependencyTrainer<'_, BertologyUnpacker>> {
        let mut settings = self.config.trainer_settings();
        settings.no_output = no_output;
        Ok(DependencyTrainer {
            settings,
            loss:      self.config.loss_settings(),
            optim:     self.config.optimizer_settings(),
            paths,
            unpacker:  unpacker_for(self.config.get().encoder_type)?,
            decoder:   &self.decoder,
            scorer:    &SdpScorer,
            relations: &self.relations,
            pos_tags:  self.pos_tags.as_ref(),
        })
    }

    fn dataset(&self, corpus: &ConllFile) -> Result<DepDataset> {
        let cfg = self.config.get();
        let builder = FeatureBuilder::new(
            &self.tokenizer,
            &self.relations,
            self.pos_tags.as_ref(),
            cfg.max_seq_len,
            cfg.root_representation,
        )?;
        let samples = builder.build_all(&corpus.sentences()?, false, &mut StdRng::seed_from_u64(cfg.seed))?;
        Ok(DepDataset::new(samples))
    }

    fn load_model<B: Backend>(&self, device: &B::Device) -> Result<BiaffineDependencyModel<B>> {
        // The checkpoint is rebuilt at the exact size it was trained with.
        let vocab_size = self.tokenizer.get_vocab(true).values().copied().max().unwrap_or(0) as usize + 1;
        let model = self
            .config
            .model_config(vocab_size, self.relations.len())
            .init::<B>(device)?;
        CheckpointManager::new(&self.model_dir).load_pretrained(model, device)
    }

    pub fn evaluate(&self, gold_path: &Path, output_dir: Option<&Path>) -> Result<(f64, f64)> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.evaluate_on::<InferBackend>(gold_path, output_dir, &device)
    }

    /// Score the parser on `gold_path`. With `output_dir`, predictions are
    /// written to `output_dir/dev_output.conllu`; otherwise scoring is in memory.
    pub fn evaluate_on<B: Backend>(
        &self,
        gold_path:  &Path,
        output_dir: Option<&Path>,
        device:     &B::Device,
    ) -> Result<(f64, f64)> {
        let gold = ConllFile::read(gold_path)
            .with_context(|| format!("Cannot read gold corpus '{}'", gold_path.display()))?;
        let dataset = self.dataset(&gold)?;
        let model = self.load_model::<B>(device)?;

        let paths = OutputPaths::under(output_dir.unwrap_or(self.config.get().output_dir.as_path()));
        let trainer = self.trainer(paths, output_dir.is_none())?;
        let loader = DataLoaderBuilder::new(DepBatcher::<B>::new(device.clone()))
            .batch_size(trainer.settings.batch_size)
            .build(dataset);

        let (uas, las) = trainer.dev(&model, loader, &gold, gold_path)?;
        tracing::info!("Evaluated '{}': UAS={uas:.4} LAS={las:.4}", gold_path.display());
        Ok((uas, las))
    }

    pub fn parse(&self, input: &Path, output: &Path) -> Result<usize> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.parse_on::<InferBackend>(input, output, &device)
    }

    /// Parse `input` and write the filled corpus to `output`.
    /// Returns the number of parsed sentences.
    pub fn parse_on<B: Backend>(&self, input: &Path, output: &Path, device: &B::Device) -> Result<usize> {
        let mut corpus = ConllFile::read(input)
            .with_context(|| format!("Cannot read corpus '{}'", input.display()))?;
        let dataset = self.dataset(&corpus)?;
        let model = self.load_model::<B>(device)?;

        let trainer = self.trainer(OutputPaths::under(&self.config.get().output_dir), false)?;
        let predictions = trainer.inference(&model, dataset, &mut corpus, output, device)?;
        Ok(predictions.len())
    }
}
