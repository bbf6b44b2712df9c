// ============================================================
// Layer 5 — Training / Evaluation Controller
// ============================================================
// Drives epochs and batches around the decision engine.
//
//   Idle ──► Epoch-Running ──► Evaluating ──► Epoch-Running
//                 │                               │
//                 ├──► Early-Stopped ─────────────┤
//                 └──► Completed ◄────────────────┘
//
// Per batch:  unpack → forward → engine(update) → running loss
//             → global_step += 1
// Every eval_interval steps (primary rank only): log loss and
// lr, run dev, track the best result, save on a new record.
// After every batch: early-stop check (single process only).
//
// Side effects gated by rank: logging, summaries, checkpoint
// writes, best-result tracking and scoring happen only on the
// primary process (local_rank −1 or 0). no_output suppresses
// every filesystem write of the run.
//
// Training runs on the autodiff backend; dev and inference run
// on model.valid() (inner backend, dropout off, no graph).

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use burn::{
    data::dataloader::{DataLoader, DataLoaderBuilder},
    module::AutodiffModule,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::{
    batcher::{DepBatch, DepBatcher},
    conllu::ConllFile,
    dataset::DepDataset,
};
use crate::domain::{
    best_result::BestResult,
    sentence::{Prediction, Sentence},
    traits::{AttachmentScorer, GraphDecoder, MetricsSink},
    vocab::LabelVocab,
};
use crate::infra::{checkpoint::CheckpointManager, metrics::SummaryWriter};
use crate::ml::{
    engine::{DecisionEngine, GoldTargets, StepFlags, SummaryTarget},
    loss::LossSettings,
    model::BiaffineDependencyModel,
    optim::{ModelUpdater, OptimizerSettings, ParameterUpdate},
    unpack::BatchUnpacker,
};

// ─── Run State ───────────────────────────────────────────────────────────────

/// Process rank in a data-parallel run; −1 means single process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankContext {
    pub local_rank: i64,
}

impl RankContext {
    pub fn is_primary(&self) -> bool {
        self.local_rank == -1 || self.local_rank == 0
    }

    pub fn is_distributed(&self) -> bool {
        self.local_rank != -1
    }
}

/// Mutable state of one training run, passed explicitly through the loop.
#[derive(Debug, Clone)]
pub struct TrainingRunState {
    pub best_result: BestResult,
    pub global_step: usize,
    pub rank:        RankContext,
}

impl TrainingRunState {
    pub fn new(rank: RankContext) -> Self {
        Self { best_result: BestResult::new(), global_step: 0, rank }
    }
}

/// Outcome of a training run.
#[derive(Debug, Clone)]
pub struct TrainingSummary {
    pub best_result:   BestResult,
    pub global_step:   usize,
    pub epochs_run:    usize,
    pub stopped_early: bool,
}

/// True when training must stop: enabled, single process, and more than
/// `early_stop_epochs` epochs since the best LAS.
pub fn should_early_stop(
    early_stop:        bool,
    early_stop_epochs: usize,
    epoch:             usize,
    state:             &TrainingRunState,
) -> bool {
    early_stop && !state.rank.is_distributed() && state.best_result.epochs_since_best(epoch) > early_stop_epochs
}

// ─── Epoch Hook ──────────────────────────────────────────────────────────────

/// Model customization at the start of every epoch
/// (e.g. freezing encoder layers for the first epochs).
pub trait EpochHook<M> {
    fn on_epoch_start(&mut self, epoch: usize, model: M) -> M;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEpochHook;

impl<M> EpochHook<M> for NoopEpochHook {
    fn on_epoch_start(&mut self, _epoch: usize, model: M) -> M {
        model
    }
}

impl<M, F> EpochHook<M> for F
where
    F: FnMut(usize, M) -> M,
{
    fn on_epoch_start(&mut self, epoch: usize, model: M) -> M {
        self(epoch, model)
    }
}

// ─── Settings ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct TrainerSettings {
    pub max_train_epochs:  usize,
    pub batch_size:        usize,
    pub eval_interval:     usize,
    pub early_stop:        bool,
    pub early_stop_epochs: usize,
    pub seed:              u64,
    pub no_output:         bool,
    pub local_rank:        i64,
    pub pos_pad_idx:       usize,
}

impl Default for TrainerSettings {
    fn default() -> Self {
        Self {
            max_train_epochs:  20,
            batch_size:        32,
            eval_interval:     100,
            early_stop:        false,
            early_stop_epochs: 5,
            seed:              42,
            no_output:         false,
            local_rank:        -1,
            pos_pad_idx:       0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputPaths {
    pub output_model_dir: PathBuf,
    pub summary_dir:      PathBuf,
    pub dev_output_path:  PathBuf,
    pub dev_result_path:  PathBuf,
}

impl OutputPaths {
    pub fn under(output_dir: &Path) -> Self {
        Self {
            output_model_dir: output_dir.join("saved_models"),
            summary_dir:      output_dir.join("summary"),
            dev_output_path:  output_dir.join("dev_output.conllu"),
            dev_result_path:  output_dir.join("dev_best_result.txt"),
        }
    }
}

/// Validation data: the aligned samples plus the gold corpus they came from.
pub struct DevSet {
    pub dataset:   DepDataset,
    pub corpus:    ConllFile,
    pub gold_path: PathBuf,
}

/// Corpus values with one entry per word: predictions for the words the
/// model saw, "_" for words cut off by max_seq_len.
fn align_to_corpus(predictions: Vec<Prediction>, sentences: &[Sentence]) -> Result<Vec<String>> {
    anyhow::ensure!(
        predictions.len() == sentences.len(),
        "{} predicted sentences for a corpus of {}",
        predictions.len(),
        sentences.len()
    );
    Ok(predictions
        .into_iter()
        .zip(sentences)
        .flat_map(|(mut cells, s)| {
            cells.resize(s.words.len(), "_".to_string());
            cells
        })
        .collect())
}

// ─── Controller ──────────────────────────────────────────────────────────────

pub struct DependencyTrainer<'a, U: BatchUnpacker> {
    pub settings:  TrainerSettings,
    pub loss:      LossSettings,
    pub optim:     OptimizerSettings,
    pub paths:     OutputPaths,
    pub unpacker:  U,
    pub decoder:   &'a dyn GraphDecoder,
    pub scorer:    &'a dyn AttachmentScorer,
    pub relations: &'a LabelVocab,
    pub pos_tags:  Option<&'a LabelVocab>,
}

impl<'a, U: BatchUnpacker> DependencyTrainer<'a, U> {
    fn engine(&self) -> DecisionEngine<'a> {
        DecisionEngine {
            loss:        self.loss.clone(),
            pos_pad_idx: self.settings.pos_pad_idx,
            decoder:     self.decoder,
            relations:   self.relations,
            pos_tags:    self.pos_tags,
        }
    }

    pub fn train<B: AutodiffBackend>(
        &self,
        model:   BiaffineDependencyModel<B>,
        train:   DepDataset,
        dev:     Option<DevSet>,
        hook:    &mut dyn EpochHook<BiaffineDependencyModel<B>>,
        device:  &B::Device,
    ) -> Result<(BiaffineDependencyModel<B>, TrainingSummary)> {
        let cfg = &self.settings;
        anyhow::ensure!(cfg.eval_interval > 0, "eval_interval must be positive");
        anyhow::ensure!(cfg.batch_size > 0, "batch_size must be positive");

        // ── Idle → Epoch-Running ─────────────────────────────────────────────
        B::seed(cfg.seed);
        let mut state = TrainingRunState::new(RankContext { local_rank: cfg.local_rank });
        let primary = state.rank.is_primary();
        let writes = primary && !cfg.no_output;

        let batches_per_epoch = train.sample_count().div_ceil(cfg.batch_size);
        let total_steps = batches_per_epoch * cfg.max_train_epochs;
        let optim = self.optim.adamw().init::<B, BiaffineDependencyModel<B>>();
        let mut updater = ModelUpdater::new(
            model,
            optim,
            self.optim.learning_rate,
            self.optim.max_grad_norm,
            Some(self.optim.scheduler(total_steps)),
        );

        let mut summary = if writes { Some(SummaryWriter::new(&self.paths.summary_dir)?) } else { None };
        let checkpoints = CheckpointManager::new(&self.paths.output_model_dir);

        let train_loader = DataLoaderBuilder::new(DepBatcher::<B>::new(device.clone()))
            .batch_size(cfg.batch_size)
            .shuffle(cfg.seed)
            .num_workers(1)
            .build(train);
        let dev = dev.map(|d| {
            let loader = DataLoaderBuilder::new(DepBatcher::<B::InnerBackend>::new(device.clone()))
                .batch_size(cfg.batch_size)
                .build(d.dataset);
            (loader, d.corpus, d.gold_path)
        });

        tracing::info!(
            "Training: {} batches/epoch, {} epochs, {} optimization steps",
            batches_per_epoch,
            cfg.max_train_epochs,
            total_steps
        );

        let engine = self.engine();
        let mut stopped_early = false;
        let mut epochs_run = 0;

        'epochs: for epoch in 1..=cfg.max_train_epochs {
            epochs_run = epoch;
            updater.map_model(|m| hook.on_epoch_start(epoch, m))?;

            let mut tr_loss = 0.0f64;
            let mut nb_steps = 0usize;

            for batch in train_loader.iter() {
                let unpacked = self.unpacker.unpack(batch)?;
                let pad_mask = unpacked.word_pad_mask();
                let scores = updater.model()?.forward(&unpacked.inputs)?;
                let gold = GoldTargets {
                    dep_ids: unpacked.dep_ids,
                    pos_ids: scores.pos_logits.as_ref().map(|_| unpacked.pos_ids),
                };

                let step = state.global_step;
                let out = engine.update_and_predict(
                    scores,
                    Some(gold),
                    pad_mask,
                    None,
                    StepFlags::TRAIN,
                    Some(&mut updater as &mut dyn ParameterUpdate<B>),
                    summary.as_mut().map(|s| SummaryTarget { sink: s as &mut dyn MetricsSink, global_step: step }),
                )?;

                tr_loss += out.loss.unwrap_or_default();
                nb_steps += 1;
                state.global_step += 1;

                // ── Periodic evaluation ──────────────────────────────────────
                if state.global_step % cfg.eval_interval == 0 && primary {
                    let avg = tr_loss / nb_steps as f64;
                    let lr = updater.learning_rate();
                    tracing::info!(
                        "epoch {epoch} | step {} | train_loss={avg:.4} | lr={lr:.3e}",
                        state.global_step
                    );
                    if let Some(s) = summary.as_mut() {
                        s.add_scalar("train_loss/loss", avg, state.global_step)?;
                        s.add_scalar("lr/group_0", lr, state.global_step)?;
                    }

                    if let Some((loader, corpus, gold_path)) = &dev {
                        let valid = updater.model()?.valid();
                        let (uas, las) = self.dev(&valid, loader.clone(), corpus, gold_path)?;
                        tracing::info!("epoch {epoch} | step {} | dev UAS={uas:.4} LAS={las:.4}", state.global_step);
                        if let Some(s) = summary.as_mut() {
                            s.add_scalar("metrics/uas", uas, state.global_step)?;
                            s.add_scalar("metrics/las", las, state.global_step)?;
                        }
                        if state.best_result.is_new_record(las, uas, epoch) {
                            tracing::info!("New best LAS {las:.4} at epoch {epoch}");
                            if writes {
                                checkpoints.save_pretrained(&valid)?;
                            }
                        }
                    }
                }

                // ── Early stop ───────────────────────────────────────────────
                if should_early_stop(cfg.early_stop, cfg.early_stop_epochs, epoch, &state) {
                    tracing::info!(
                        "Early stop at epoch {epoch}: no LAS gain since epoch {}",
                        state.best_result.best_las_epoch
                    );
                    stopped_early = true;
                    break 'epochs;
                }
            }

            if primary {
                let avg = if nb_steps > 0 { tr_loss / nb_steps as f64 } else { f64::NAN };
                tracing::info!("Epoch {epoch}/{} done | avg_loss={avg:.4}", cfg.max_train_epochs);
                if let Some(s) = summary.as_mut() {
                    s.add_scalar("epoch_loss", avg, epoch)?;
                }
            }
        }

        // ── Completed ────────────────────────────────────────────────────────
        if writes {
            let path = &self.paths.dev_result_path;
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, format!("{}\n", state.best_result))
                .with_context(|| format!("Cannot write best result to '{}'", path.display()))?;
        }
        if let Some(mut s) = summary.take() {
            s.close()?;
        }
        tracing::info!("Training complete: {}", state.best_result.to_string().replace('\n', "; "));

        let summary = TrainingSummary {
            best_result: state.best_result,
            global_step: state.global_step,
            epochs_run,
            stopped_early,
        };
        Ok((updater.into_model()?, summary))
    }

    /// Decode every batch of `loader`, in loader order.
    fn decode_all<B: Backend>(
        &self,
        model:  &BiaffineDependencyModel<B>,
        loader: Arc<dyn DataLoader<DepBatch<B>>>,
    ) -> Result<(Vec<Prediction>, Option<Vec<Prediction>>)> {
        let engine = self.engine();
        let mut deps = Vec::new();
        let mut pos: Option<Vec<Prediction>> = None;

        for batch in loader.iter() {
            let shapes = batch.shapes();
            let result = self.unpacker.unpack(batch).and_then(|unpacked| {
                let pad_mask = unpacked.word_pad_mask();
                let scores = model.forward(&unpacked.inputs)?;
                engine.update_and_predict(
                    scores,
                    None,
                    pad_mask,
                    Some(unpacked.sent_len.as_slice()),
                    StepFlags::DECODE,
                    None,
                    None,
                )
            });

            let out = match result {
                Ok(out) => out,
                Err(e) => {
                    for (name, dims) in &shapes {
                        tracing::error!("{name}: {dims:?}");
                    }
                    return Err(e).context("decoding a batch failed");
                }
            };
            deps.extend(out.predictions.unwrap_or_default());
            if let Some(p) = out.pos_predictions {
                pos.get_or_insert_with(Vec::new).extend(p);
            }
        }
        Ok((deps, pos))
    }

    /// Evaluate on the dev set → (UAS, LAS).
    pub fn dev<B: Backend>(
        &self,
        model:     &BiaffineDependencyModel<B>,
        loader:    Arc<dyn DataLoader<DepBatch<B>>>,
        gold:      &ConllFile,
        gold_path: &Path,
    ) -> Result<(f64, f64)> {
        let (deps, _) = self.decode_all(model, loader)?;
        let gold_sentences = gold.sentences()?;

        let mut predicted = gold.clone();
        predicted.set_deps(&align_to_corpus(deps, &gold_sentences)?)?;

        if self.settings.no_output {
            return Ok(self.scorer.score_sentences(&predicted.sentences()?, &gold_sentences)?);
        }
        let out = &self.paths.dev_output_path;
        predicted
            .write(out)
            .with_context(|| format!("Cannot write dev predictions to '{}'", out.display()))?;
        Ok(self.scorer.score(out, gold_path)?)
    }

    /// Parse `corpus` and write the predictions to `output_path`.
    pub fn inference<B: Backend>(
        &self,
        model:       &BiaffineDependencyModel<B>,
        dataset:     DepDataset,
        corpus:      &mut ConllFile,
        output_path: &Path,
        device:      &B::Device,
    ) -> Result<Vec<Prediction>> {
        let loader = DataLoaderBuilder::new(DepBatcher::<B>::new(device.clone()))
            .batch_size(self.settings.batch_size.max(1))
            .build(dataset);
        let (deps, pos) = self.decode_all(model, loader)?;
        let sentences = corpus.sentences()?;

        corpus.set_deps(&align_to_corpus(deps.clone(), &sentences)?)?;
        if let Some(pos) = pos {
            corpus.set_pos(&align_to_corpus(pos, &sentences)?)?;
        }
        corpus
            .write(output_path)
            .with_context(|| format!("Cannot write predictions to '{}'", output_path.display()))?;
        tracing::info!("Wrote {} parsed sentences to '{}'", deps.len(), output_path.display());
        Ok(deps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::conllu::tests::SAMPLE;
    use crate::data::features::{FeatureBuilder, RootRepresentation};
    use crate::domain::decoder::{ProbGrid, ThresholdDecoder};
    use crate::domain::error::ParserError;
    use crate::domain::sentence::SemGraph;
    use crate::infra::scorer::SdpScorer;
    use crate::infra::tokenizer_store::build_word_level;
    use crate::ml::model::tests::tiny_config;
    use crate::ml::unpack::BertologyUnpacker;
    use burn::backend::{Autodiff, NdArray};
    use rand::{rngs::StdRng, SeedableRng};

    type TrainBackend = Autodiff<NdArray<f32>>;

    const LEN: usize = 8;

    struct Fixture {
        corpus:    ConllFile,
        relations: LabelVocab,
        samples:   Vec<crate::data::dataset::DepSample>,
    }

    fn fixture() -> Fixture {
        let corpus = ConllFile::parse(SAMPLE).unwrap();
        let sentences = corpus.sentences().unwrap();
        let words = sentences.iter().flat_map(|s| s.words.iter().map(|w| w.form.clone()));
        let tokenizer = build_word_level(words, 200).unwrap();
        let relations = LabelVocab::relations(
            sentences.iter().flat_map(|s| s.words.iter()).flat_map(|w| w.arcs.iter().flatten()).map(|a| a.label.clone()),
        );
        let builder = FeatureBuilder::new(&tokenizer, &relations, None, LEN, RootRepresentation::Unused).unwrap();
        let samples = builder.build_all(&sentences, false, &mut StdRng::seed_from_u64(0)).unwrap();
        Fixture { corpus, relations, samples }
    }

    fn trainer<'a>(
        relations: &'a LabelVocab,
        decoder: &'a dyn GraphDecoder,
        paths: OutputPaths,
        settings: TrainerSettings,
    ) -> DependencyTrainer<'a, BertologyUnpacker> {
        DependencyTrainer {
            settings,
            loss: LossSettings::default(),
            optim: OptimizerSettings { learning_rate: 1e-3, warmup_prop: 0.0, ..Default::default() },
            paths,
            unpacker: BertologyUnpacker,
            decoder,
            scorer: &SdpScorer,
            relations,
            pos_tags: None,
        }
    }

    fn settings(epochs: usize) -> TrainerSettings {
        TrainerSettings { max_train_epochs: epochs, batch_size: 1, eval_interval: 2, ..Default::default() }
    }

    fn model(relations: &LabelVocab) -> BiaffineDependencyModel<TrainBackend> {
        tiny_config(LEN, relations.len()).init(&Default::default()).unwrap()
    }

    #[test]
    fn test_early_stop_rule() {
        let mut state = TrainingRunState::new(RankContext { local_rank: -1 });
        state.best_result.is_new_record(0.5, 0.6, 2);
        assert!(!should_early_stop(true, 3, 5, &state));
        assert!(should_early_stop(true, 3, 6, &state));
        assert!(!should_early_stop(false, 3, 6, &state));

        let distributed = TrainingRunState { rank: RankContext { local_rank: 0 }, ..state.clone() };
        assert!(!should_early_stop(true, 3, 60, &distributed));
    }

    #[test]
    fn test_rank_gating() {
        assert!(RankContext { local_rank: -1 }.is_primary());
        assert!(RankContext { local_rank: 0 }.is_primary());
        assert!(!RankContext { local_rank: 1 }.is_primary());
        assert!(!RankContext { local_rank: -1 }.is_distributed());
    }

    #[test]
    fn test_closure_hook_sees_every_epoch() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainerSettings { no_output: true, ..settings(3) };
        let t = trainer(&fx.relations, &decoder, OutputPaths::under(dir.path()), cfg);

        let mut seen = Vec::new();
        let mut hook = |epoch: usize, m: BiaffineDependencyModel<TrainBackend>| {
            seen.push(epoch);
            m
        };
        let (_, summary) = t
            .train(model(&fx.relations), DepDataset::new(fx.samples.clone()), None, &mut hook, &Default::default())
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
        assert_eq!(summary.global_step, 6);
        assert!(!summary.stopped_early);
    }

    #[test]
    fn test_early_stop_breaks_out_after_first_batch() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        // no dev set: best LAS epoch stays 0, so epoch 1 is already past the limit
        let cfg = TrainerSettings { no_output: true, early_stop: true, early_stop_epochs: 0, ..settings(4) };
        let t = trainer(&fx.relations, &decoder, OutputPaths::under(dir.path()), cfg);
        let (_, summary) = t
            .train(model(&fx.relations), DepDataset::new(fx.samples.clone()), None, &mut NoopEpochHook, &Default::default())
            .unwrap();
        assert!(summary.stopped_early);
        assert_eq!(summary.global_step, 1);
        assert_eq!(summary.epochs_run, 1);
    }

    #[test]
    fn test_distributed_run_never_stops_early() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        let cfg = TrainerSettings {
            no_output: true,
            early_stop: true,
            early_stop_epochs: 0,
            local_rank: 0,
            ..settings(2)
        };
        let t = trainer(&fx.relations, &decoder, OutputPaths::under(dir.path()), cfg);
        let (_, summary) = t
            .train(model(&fx.relations), DepDataset::new(fx.samples.clone()), None, &mut NoopEpochHook, &Default::default())
            .unwrap();
        assert!(!summary.stopped_early);
        assert_eq!(summary.global_step, 4);
    }

    #[test]
    fn test_training_with_dev_writes_outputs() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        let gold_path = dir.path().join("dev.conllu");
        fx.corpus.write(&gold_path).unwrap();
        let paths = OutputPaths::under(&dir.path().join("out"));
        let t = trainer(&fx.relations, &decoder, paths.clone(), settings(2));

        let dev = DevSet { dataset: DepDataset::new(fx.samples.clone()), corpus: fx.corpus.clone(), gold_path };
        let (_, summary) = t
            .train(model(&fx.relations), DepDataset::new(fx.samples.clone()), Some(dev), &mut NoopEpochHook, &Default::default())
            .unwrap();

        assert!(summary.best_result.has_record());
        assert!((0.0..=1.0).contains(&summary.best_result.best_las));
        assert!(paths.dev_output_path.exists());
        assert!(paths.dev_result_path.exists());
        assert!(paths.output_model_dir.join("model.mpk").exists());
        let csv = std::fs::read_to_string(paths.summary_dir.join("summary.csv")).unwrap();
        assert!(csv.contains("lr/group_0"));
        assert!(csv.contains("metrics/las"));
        assert!(csv.contains("train_loss/loss"));
        // one line per epoch
        assert_eq!(csv.lines().filter(|l| l.contains(",epoch_loss,")).count(), 2);
    }

    #[test]
    fn test_secondary_rank_trains_without_writing() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        let gold_path = dir.path().join("dev.conllu");
        fx.corpus.write(&gold_path).unwrap();
        let paths = OutputPaths::under(&dir.path().join("out"));
        let cfg = TrainerSettings { local_rank: 1, ..settings(2) };
        let t = trainer(&fx.relations, &decoder, paths.clone(), cfg);

        let dev = DevSet { dataset: DepDataset::new(fx.samples.clone()), corpus: fx.corpus.clone(), gold_path };
        let (_, summary) = t
            .train(model(&fx.relations), DepDataset::new(fx.samples.clone()), Some(dev), &mut NoopEpochHook, &Default::default())
            .unwrap();

        assert_eq!(summary.global_step, 4);
        assert!(!summary.best_result.has_record());
        assert!(!paths.summary_dir.join("summary.csv").exists());
        assert!(!paths.dev_output_path.exists());
        assert!(!paths.dev_result_path.exists());
        assert!(!paths.output_model_dir.join("model.mpk").exists());
    }

    struct FailingDecoder;

    impl GraphDecoder for FailingDecoder {
        fn decode(&self, _probs: &ProbGrid, _lengths: &[usize]) -> crate::domain::error::Result<Vec<SemGraph>> {
            Err(ParserError::data("grid cannot be decoded"))
        }
    }

    #[test]
    fn test_decoder_failure_aborts_dev_before_writing() {
        let fx = fixture();
        let dir = tempfile::tempdir().unwrap();
        let gold_path = dir.path().join("dev.conllu");
        fx.corpus.write(&gold_path).unwrap();
        let paths = OutputPaths::under(&dir.path().join("out"));
        let t = trainer(&fx.relations, &FailingDecoder, paths.clone(), settings(1));

        let device = Default::default();
        let model = tiny_config(LEN, fx.relations.len()).init::<NdArray<f32>>(&device).unwrap();
        let loader = DataLoaderBuilder::new(DepBatcher::<NdArray<f32>>::new(device))
            .batch_size(1)
            .build(DepDataset::new(fx.samples.clone()));

        let err = t.dev(&model, loader, &fx.corpus, &gold_path).unwrap_err();
        assert!(format!("{err:#}").contains("grid cannot be decoded"));
        assert!(!paths.dev_output_path.exists());
    }

    #[test]
    fn test_no_output_leaves_filesystem_untouched() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        let gold_path = dir.path().join("dev.conllu");
        fx.corpus.write(&gold_path).unwrap();
        let out = dir.path().join("out");
        let cfg = TrainerSettings { no_output: true, ..settings(1) };
        let t = trainer(&fx.relations, &decoder, OutputPaths::under(&out), cfg);

        let dev = DevSet { dataset: DepDataset::new(fx.samples.clone()), corpus: fx.corpus.clone(), gold_path };
        let (_, summary) = t
            .train(model(&fx.relations), DepDataset::new(fx.samples.clone()), Some(dev), &mut NoopEpochHook, &Default::default())
            .unwrap();
        assert!(summary.best_result.has_record());
        assert!(!out.exists());
    }

    #[test]
    fn test_inference_fills_every_word() {
        let fx = fixture();
        let decoder = ThresholdDecoder::default();
        let dir = tempfile::tempdir().unwrap();
        let t = trainer(&fx.relations, &decoder, OutputPaths::under(dir.path()), settings(1));
        let device = Default::default();
        let model = tiny_config(LEN, fx.relations.len()).init::<NdArray<f32>>(&device).unwrap();

        let mut corpus = fx.corpus.clone();
        let out = dir.path().join("pred.conllu");
        let preds = t.inference(&model, DepDataset::new(fx.samples.clone()), &mut corpus, &out, &device).unwrap();
        assert_eq!(preds.len(), 2);
        assert_eq!(preds[1].len(), 3);
        let written = ConllFile::read(&out).unwrap().sentences().unwrap();
        assert!(written.iter().flat_map(|s| &s.words).all(|w| w.arcs.is_some()));
    }

    #[test]
    fn test_align_pads_truncated_sentences() {
        let sentences = ConllFile::parse(SAMPLE).unwrap().sentences().unwrap();
        let preds = vec![vec!["0:Root".to_string(), "1:Agt".to_string()], vec!["0:Root".to_string()]];
        let cells = align_to_corpus(preds, &sentences).unwrap();
        assert_eq!(cells, vec!["0:Root", "1:Agt", "0:Root", "_", "_"]);
        assert!(align_to_corpus(vec![], &sentences).is_err());
    }
}
