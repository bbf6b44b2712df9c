// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates a full training run in order:
//
//   Step 1: Read train / dev corpora      (Layer 4 - data)
//   Step 2: Build label vocabularies      (Layer 3 - domain)
//   Step 3: Build / load tokenizer        (Layer 6 - infra)
//   Step 4: Align words to tokens         (Layer 4 - data)
//   Step 5: Build the parser              (Layer 5 - ml)
//   Step 6: Save config and vocabularies  (Layer 6 - infra)
//   Step 7: Run the training controller   (Layer 5 - ml)

use anyhow::{Context, Result};
use burn::tensor::backend::AutodiffBackend;
use rand::{rngs::StdRng, SeedableRng};

use crate::application::config::ValidatedConfig;
use crate::data::{conllu::ConllFile, dataset::DepDataset, features::FeatureBuilder};
use crate::domain::{decoder::ThresholdDecoder, sentence::Sentence, vocab::LabelVocab};
use crate::infra::{
    checkpoint::CheckpointManager,
    scorer::SdpScorer,
    tokenizer_store::{build_word_level, TokenizerStore},
};
use crate::ml::{
    trainer::{DependencyTrainer, DevSet, NoopEpochHook, RankContext, TrainingSummary},
    unpack::unpacker_for,
};

type TrainBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

pub struct TrainUseCase {
    config: ValidatedConfig,
}

impl TrainUseCase {
    pub fn new(config: ValidatedConfig) -> Self {
        Self { config }
    }

    /// Train on the default GPU backend.
    pub fn execute(&self) -> Result<TrainingSummary> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        self.execute_on::<TrainBackend>(&device)
    }

    pub fn execute_on<B: AutodiffBackend>(&self, device: &B::Device) -> Result<TrainingSummary> {
        let cfg = self.config.get();
        let paths = self.config.output_paths();

        // ── Step 1: Read corpora ─────────────────────────────────────────────
        let train_path = cfg.train_file.as_ref().context("train_file is required for training")?;
        tracing::info!("Reading training corpus '{}'", train_path.display());
        let train_corpus = ConllFile::read(train_path)
            .with_context(|| format!("Cannot read training corpus '{}'", train_path.display()))?;
        let train_sentences = train_corpus.sentences()?;

        let dev_corpus = match &cfg.dev_file {
            Some(path) => {
                tracing::info!("Reading dev corpus '{}'", path.display());
                let corpus = ConllFile::read(path)
                    .with_context(|| format!("Cannot read dev corpus '{}'", path.display()))?;
                Some((corpus, path.clone()))
            }
            None => None,
        };
        let dev_sentences = match &dev_corpus {
            Some((corpus, _)) => corpus.sentences()?,
            None => Vec::new(),
        };
        tracing::info!(
            "Loaded {} training and {} dev sentences",
            train_sentences.len(),
            dev_sentences.len()
        );

        // ── Step 2: Label vocabularies ───────────────────────────────────────
        // Dev labels are included so dev features never hit an unknown label.
        let all: Vec<&Sentence> = train_sentences.iter().chain(&dev_sentences).collect();
        let relations = LabelVocab::relations(
            all.iter()
                .flat_map(|s| s.words.iter())
                .flat_map(|w| w.arcs.iter().flatten())
                .map(|a| a.label.clone()),
        );
        let pos_tags = cfg.use_pos.then(|| {
            LabelVocab::pos_tags(all.iter().flat_map(|s| s.words.iter()).filter_map(|w| w.pos.clone()))
        });
        let config = match &pos_tags {
            Some(tags) => self.config.clone().with_pos_label_num(tags.len())?,
            None => self.config.clone(),
        };
        tracing::info!(
            "{} relation labels, {} POS tags",
            relations.len(),
            pos_tags.as_ref().map_or(0, LabelVocab::len)
        );

        // ── Step 3: Tokenizer ────────────────────────────────────────────────
        let words = all.iter().flat_map(|s| s.words.iter().map(|w| w.form.clone()));
        // Only the primary rank owns the model directory; other ranks build
        // the same tokenizer from the same corpus in memory.
        let writes = !cfg.no_output && RankContext { local_rank: cfg.local_rank }.is_primary();
        let tokenizer = if writes {
            TokenizerStore::new(&paths.output_model_dir).load_or_build(words, cfg.vocab_size)?
        } else {
            build_word_level(words, cfg.vocab_size)?
        };
        let max_token_id = tokenizer.get_vocab(true).values().copied().max().unwrap_or(0) as usize;

        // ── Step 4: Word/token alignment ─────────────────────────────────────
        let builder = FeatureBuilder::new(
            &tokenizer,
            &relations,
            pos_tags.as_ref(),
            cfg.max_seq_len,
            cfg.root_representation,
        )?
        .with_input_mask_prob(cfg.input_mask_prob);
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let train_dataset = DepDataset::new(builder.build_all(&train_sentences, true, &mut rng)?);
        let dev = match dev_corpus {
            Some((corpus, gold_path)) => Some(DevSet {
                dataset: DepDataset::new(builder.build_all(&dev_sentences, false, &mut rng)?),
                corpus,
                gold_path,
            }),
            None => None,
        };

        // ── Step 5: Parser ───────────────────────────────────────────────────
        let model = config
            .model_config(max_token_id + 1, relations.len())
            .init::<B>(device)?;
        tracing::info!("Parser built: {} relation labels, POS head {}", relations.len(), model.uses_pos());

        // ── Step 6: Side files for inference ─────────────────────────────────
        if writes {
            let checkpoints = CheckpointManager::new(&paths.output_model_dir);
            checkpoints.save_config(config.get())?;
            checkpoints.save_vocabs(&relations, pos_tags.as_ref())?;
        }

        // ── Step 7: Train ────────────────────────────────────────────────────
        let decoder = ThresholdDecoder::default();
        let trainer = DependencyTrainer {
            settings:  config.trainer_settings(),
            loss:      config.loss_settings(),
            optim:     config.optimizer_settings(),
            paths,
            unpacker:  unpacker_for(cfg.encoder_type)?,
            decoder:   &decoder,
            scorer:    &SdpScorer,
            relations: &relations,
            pos_tags:  pos_tags.as_ref(),
        };
        let (_, summary) = trainer.train(model, train_dataset, dev, &mut NoopEpochHook, device)?;
        Ok(summary)
    }
}
