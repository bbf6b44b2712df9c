// ============================================================
// Layer 2 — Parser Configuration
// ============================================================
// Every option of a training or parsing run, in one
// serialisable struct.
//
//   ParserConfig     — raw options (JSON file or CLI flags)
//   ValidatedConfig  — the same options after validate();
//                      only this type can start a run
//
// The config is saved as train_config.json next to the model
// so inference rebuilds exactly the trained architecture.
//
// Output layout under output_dir:
//   saved_models/          weights, config, vocabularies, tokenizer
//   summary/summary.csv    tagged scalars
//   dev_output.conllu      last dev predictions
//   dev_best_result.txt    best UAS / LAS

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::features::RootRepresentation;
use crate::domain::error::{ParserError, Result};
use crate::ml::encoder::{BertologyEncoderConfig, WordSelect};
use crate::ml::loss::LossSettings;
use crate::ml::model::{EncoderType, ParserModelConfig};
use crate::ml::optim::OptimizerSettings;
use crate::ml::trainer::{OutputPaths, TrainerSettings};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    // ── Model ────────────────────────────────────────────────────────────────
    pub encoder_type:        EncoderType,
    pub direct_biaffine:     bool,
    pub biaffine_hidden_dim: usize,
    pub biaffine_dropout:    f64,
    pub use_pos:             bool,
    pub encoder_output_dim:  usize,
    pub encoder_layers:      usize,
    pub encoder_heads:       usize,
    pub encoder_ff_dim:      usize,
    pub encoder_dropout:     f64,
    pub vocab_size:          usize,
    pub max_seq_len:         usize,
    pub root_representation: RootRepresentation,
    pub word_select:         WordSelect,

    // ── Loss ─────────────────────────────────────────────────────────────────
    pub label_loss_ratio:          f64,
    pub pos_loss_ratio:            f64,
    pub average_loss_by_words_num: bool,
    pub scale_loss:                bool,
    pub loss_scaling_ratio:        f64,
    pub pos_label_pad_idx:         usize,
    /// Filled from the training corpus; `None` until then.
    pub pos_label_num:             Option<usize>,

    // ── Optimisation ─────────────────────────────────────────────────────────
    pub learning_rate:    f64,
    pub weight_decay:     f32,
    pub adam_epsilon:     f32,
    pub max_grad_norm:    f32,
    pub warmup_prop:      f64,
    pub batch_size:       usize,
    pub max_train_epochs: usize,
    pub input_mask_prob:  f64,
    pub seed:             u64,

    // ── Control ──────────────────────────────────────────────────────────────
    pub eval_interval:     usize,
    pub early_stop:        bool,
    pub early_stop_epochs: usize,
    pub local_rank:        i64,
    pub n_gpu:             usize,
    pub no_output:         bool,

    // ── Paths ────────────────────────────────────────────────────────────────
    pub train_file: Option<PathBuf>,
    pub dev_file:   Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            encoder_type:        EncoderType::Bertology,
            direct_biaffine:     false,
            biaffine_hidden_dim: 300,
            biaffine_dropout:    0.1,
            use_pos:             false,
            encoder_output_dim:  256,
            encoder_layers:      4,
            encoder_heads:       8,
            encoder_ff_dim:      1024,
            encoder_dropout:     0.1,
            vocab_size:          30522,
            max_seq_len:         160,
            root_representation: RootRepresentation::Unused,
            word_select:         WordSelect::Start,

            label_loss_ratio:          0.5,
            pos_loss_ratio:            1.0,
            average_loss_by_words_num: true,
            scale_loss:                false,
            loss_scaling_ratio:        2.0,
            pos_label_pad_idx:         0,
            pos_label_num:             None,

            learning_rate:    5e-5,
            weight_decay:     0.01,
            adam_epsilon:     1e-8,
            max_grad_norm:    5.0,
            warmup_prop:      0.1,
            batch_size:       32,
            max_train_epochs: 30,
            input_mask_prob:  0.0,
            seed:             1234,

            eval_interval:     200,
            early_stop:        false,
            early_stop_epochs: 5,
            local_rank:        -1,
            n_gpu:             1,
            no_output:         false,

            train_file: None,
            dev_file:   None,
            output_dir: PathBuf::from("output"),
        }
    }
}

impl ParserConfig {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }

    /// Check every option once, before any data or model work starts.
    pub fn validate(self) -> Result<ValidatedConfig> {
        if self.encoder_type != EncoderType::Bertology {
            return Err(ParserError::config(format!(
                "encoder_type {:?} is not supported, only bertology is implemented",
                self.encoder_type
            )));
        }
        if self.max_seq_len < 2 {
            return Err(ParserError::config("max_seq_len must be at least 2 (ROOT plus one word)"));
        }
        if self.eval_interval == 0 {
            return Err(ParserError::config("eval_interval must be positive"));
        }
        if self.batch_size == 0 {
            return Err(ParserError::config("batch_size must be positive"));
        }
        if self.encoder_heads == 0 || self.encoder_output_dim % self.encoder_heads != 0 {
            return Err(ParserError::config(format!(
                "encoder_output_dim {} must be divisible by encoder_heads {}",
                self.encoder_output_dim, self.encoder_heads
            )));
        }
        if !(0.0..1.0).contains(&self.input_mask_prob) {
            return Err(ParserError::config("input_mask_prob must lie in [0, 1)"));
        }
        if !(0.0..=1.0).contains(&self.warmup_prop) {
            return Err(ParserError::config("warmup_prop must lie in [0, 1]"));
        }
        if self.use_pos {
            if let Some(n) = self.pos_label_num {
                if n <= 1 {
                    return Err(ParserError::config("use_pos needs pos_label_num > 1"));
                }
                if self.pos_label_pad_idx >= n {
                    return Err(ParserError::config("pos_label_pad_idx must be a valid POS id"));
                }
            }
        }
        self.loss_settings().validate()?;
        Ok(ValidatedConfig(self))
    }

    fn loss_settings(&self) -> LossSettings {
        LossSettings {
            label_loss_ratio:          self.label_loss_ratio,
            pos_loss_ratio:            self.pos_loss_ratio,
            average_loss_by_words_num: self.average_loss_by_words_num,
            scale_loss:                self.scale_loss,
            loss_scaling_ratio:        self.loss_scaling_ratio,
            n_gpu:                     self.n_gpu,
        }
    }
}

/// A configuration that passed `ParserConfig::validate`.
#[derive(Debug, Clone)]
pub struct ValidatedConfig(ParserConfig);

impl ValidatedConfig {
    pub fn get(&self) -> &ParserConfig {
        &self.0
    }

    pub fn into_inner(self) -> ParserConfig {
        self.0
    }

    /// Fix the POS label count once the tag vocabulary is known.
    pub fn with_pos_label_num(self, n: usize) -> Result<Self> {
        ParserConfig { pos_label_num: Some(n), ..self.0 }.validate()
    }

    pub fn loss_settings(&self) -> LossSettings {
        self.0.loss_settings()
    }

    pub fn optimizer_settings(&self) -> OptimizerSettings {
        OptimizerSettings {
            learning_rate: self.0.learning_rate,
            weight_decay:  self.0.weight_decay,
            adam_epsilon:  self.0.adam_epsilon,
            max_grad_norm: self.0.max_grad_norm,
            warmup_prop:   self.0.warmup_prop,
        }
    }

    pub fn trainer_settings(&self) -> TrainerSettings {
        TrainerSettings {
            max_train_epochs:  self.0.max_train_epochs,
            batch_size:        self.0.batch_size,
            eval_interval:     self.0.eval_interval,
            early_stop:        self.0.early_stop,
            early_stop_epochs: self.0.early_stop_epochs,
            seed:              self.0.seed,
            no_output:         self.0.no_output,
            local_rank:        self.0.local_rank,
            pos_pad_idx:       self.0.pos_label_pad_idx,
        }
    }

    pub fn output_paths(&self) -> OutputPaths {
        OutputPaths::under(&self.0.output_dir)
    }

    /// Model architecture; `vocab_size` is at least one past the largest
    /// token id the tokenizer can produce.
    pub fn model_config(&self, vocab_size: usize, num_labels: usize) -> ParserModelConfig {
        let c = &self.0;
        let encoder = BertologyEncoderConfig::new(
            vocab_size.max(c.vocab_size),
            c.max_seq_len,
            c.encoder_output_dim,
            c.encoder_heads,
            c.encoder_layers,
            c.encoder_ff_dim,
            c.encoder_dropout,
        )
        .with_word_select(c.word_select);

        ParserModelConfig::new(encoder, num_labels)
            .with_encoder_type(c.encoder_type)
            .with_direct_biaffine(c.direct_biaffine)
            .with_biaffine_hidden_dim(c.biaffine_hidden_dim)
            .with_biaffine_dropout(c.biaffine_dropout)
            .with_pos_label_num(if c.use_pos { c.pos_label_num } else { None })
    }
}
