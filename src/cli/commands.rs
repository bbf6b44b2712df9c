// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Three subcommands:
//
//   train  — train a parser on a CoNLL-U corpus
//   eval   — score a trained parser on a gold corpus
//   infer  — fill DEPS of a corpus with a trained parser
//
// `train` takes either a JSON config (--config) or flags.
// With --config the JSON is the base and the path flags
// override it.

use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::application::config::ParserConfig;
use crate::data::features::RootRepresentation;
use crate::ml::encoder::WordSelect;
use crate::ml::model::EncoderType;

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train a biaffine parser
    Train(TrainArgs),

    /// Evaluate a trained parser against a gold corpus
    Eval(EvalArgs),

    /// Parse a corpus with a trained parser
    Infer(InferArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// JSON run configuration; flags below are ignored except paths
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Training corpus (CoNLL-U)
    #[arg(long)]
    pub train_file: Option<PathBuf>,

    /// Dev corpus evaluated every --eval-interval steps
    #[arg(long)]
    pub dev_file: Option<PathBuf>,

    /// Directory for the saved model, summaries and dev outputs
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = EncoderType::Bertology)]
    pub encoder_type: EncoderType,

    /// How ROOT is represented in the encoder input
    #[arg(long, value_enum, default_value_t = RootRepresentation::Unused)]
    pub root_representation: RootRepresentation,

    /// Which token of a multi-token word represents it
    #[arg(long, value_enum, default_value_t = WordSelect::Start)]
    pub word_select: WordSelect,

    /// Also predict POS tags (UPOS column)
    #[arg(long)]
    pub use_pos: bool,

    /// Score pairs on raw encoder output, without the projection
    #[arg(long)]
    pub direct_biaffine: bool,

    #[arg(long, default_value_t = 300)]
    pub biaffine_hidden_dim: usize,

    #[arg(long, default_value_t = 0.1)]
    pub biaffine_dropout: f64,

    #[arg(long, default_value_t = 256)]
    pub encoder_output_dim: usize,

    #[arg(long, default_value_t = 4)]
    pub encoder_layers: usize,

    #[arg(long, default_value_t = 8)]
    pub encoder_heads: usize,

    #[arg(long, default_value_t = 1024)]
    pub encoder_ff_dim: usize,

    #[arg(long, default_value_t = 0.1)]
    pub encoder_dropout: f64,

    /// Upper bound for the tokenizer vocabulary
    #[arg(long, default_value_t = 30522)]
    pub vocab_size: usize,

    /// Token positions per sentence, ROOT and special tokens included
    #[arg(long, default_value_t = 160)]
    pub max_seq_len: usize,

    /// Weight of the label loss against the arc loss, in [0, 1]
    #[arg(long, default_value_t = 0.5)]
    pub label_loss_ratio: f64,

    #[arg(long, default_value_t = 1.0)]
    pub pos_loss_ratio: f64,

    /// Sum the loss instead of dividing by the number of words
    #[arg(long)]
    pub no_average_loss: bool,

    #[arg(long)]
    pub scale_loss: bool,

    #[arg(long, default_value_t = 2.0)]
    pub loss_scaling_ratio: f64,

    #[arg(long, default_value_t = 5e-5)]
    pub learning_rate: f64,

    #[arg(long, default_value_t = 0.01)]
    pub weight_decay: f32,

    #[arg(long, default_value_t = 5.0)]
    pub max_grad_norm: f32,

    /// Fraction of all steps spent warming up the learning rate
    #[arg(long, default_value_t = 0.1)]
    pub warmup_prop: f64,

    #[arg(long, default_value_t = 32)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 30)]
    pub max_train_epochs: usize,

    /// Probability of replacing a training word by [MASK]
    #[arg(long, default_value_t = 0.0)]
    pub input_mask_prob: f64,

    /// Optimization steps between dev evaluations
    #[arg(long, default_value_t = 200)]
    pub eval_interval: usize,

    #[arg(long)]
    pub early_stop: bool,

    #[arg(long, default_value_t = 5)]
    pub early_stop_epochs: usize,

    /// Process rank; -1 for a single-process run
    #[arg(long, default_value_t = -1, allow_hyphen_values = true)]
    pub local_rank: i64,

    #[arg(long, default_value_t = 1)]
    pub n_gpu: usize,

    #[arg(long, default_value_t = 1234)]
    pub seed: u64,

    /// Do not write checkpoints, summaries or dev outputs
    #[arg(long)]
    pub no_output: bool,
}

impl TrainArgs {
    /// Build the run configuration: the JSON file when given, flags otherwise.
    pub fn into_config(self) -> crate::domain::error::Result<ParserConfig> {
        let Some(path) = self.config.clone() else {
            return Ok(self.into());
        };
        let mut cfg = ParserConfig::from_json_file(&path)?;
        if self.train_file.is_some() {
            cfg.train_file = self.train_file;
        }
        if self.dev_file.is_some() {
            cfg.dev_file = self.dev_file;
        }
        if let Some(dir) = self.output_dir {
            cfg.output_dir = dir;
        }
        Ok(cfg)
    }
}

/// The application layer never sees clap types.
impl From<TrainArgs> for ParserConfig {
    fn from(a: TrainArgs) -> Self {
        let defaults = ParserConfig::default();
        ParserConfig {
            encoder_type:              a.encoder_type,
            direct_biaffine:           a.direct_biaffine,
            biaffine_hidden_dim:       a.biaffine_hidden_dim,
            biaffine_dropout:          a.biaffine_dropout,
            use_pos:                   a.use_pos,
            encoder_output_dim:        a.encoder_output_dim,
            encoder_layers:            a.encoder_layers,
            encoder_heads:             a.encoder_heads,
            encoder_ff_dim:            a.encoder_ff_dim,
            encoder_dropout:           a.encoder_dropout,
            vocab_size:                a.vocab_size,
            max_seq_len:               a.max_seq_len,
            root_representation:       a.root_representation,
            word_select:               a.word_select,
            label_loss_ratio:          a.label_loss_ratio,
            pos_loss_ratio:            a.pos_loss_ratio,
            average_loss_by_words_num: !a.no_average_loss,
            scale_loss:                a.scale_loss,
            loss_scaling_ratio:        a.loss_scaling_ratio,
            learning_rate:             a.learning_rate,
            weight_decay:              a.weight_decay,
            max_grad_norm:             a.max_grad_norm,
            warmup_prop:               a.warmup_prop,
            batch_size:                a.batch_size,
            max_train_epochs:          a.max_train_epochs,
            input_mask_prob:           a.input_mask_prob,
            seed:                      a.seed,
            eval_interval:             a.eval_interval,
            early_stop:                a.early_stop,
            early_stop_epochs:         a.early_stop_epochs,
            local_rank:                a.local_rank,
            n_gpu:                     a.n_gpu,
            no_output:                 a.no_output,
            train_file:                a.train_file,
            dev_file:                  a.dev_file,
            output_dir:                a.output_dir.unwrap_or(defaults.output_dir),
            ..defaults
        }
    }
}

#[derive(Args, Debug)]
pub struct EvalArgs {
    /// Directory written by `train` (OUTPUT_DIR/saved_models)
    #[arg(long)]
    pub model_dir: PathBuf,

    /// Gold CoNLL-U corpus
    #[arg(long)]
    pub input: PathBuf,

    /// Write dev_output.conllu here; scores in memory when absent
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct InferArgs {
    /// Directory written by `train` (OUTPUT_DIR/saved_models)
    #[arg(long)]
    pub model_dir: PathBuf,

    /// CoNLL-U corpus to parse; DEPS may be blank
    #[arg(long)]
    pub input: PathBuf,

    /// Where the parsed corpus is written
    #[arg(long)]
    pub output: PathBuf,
}
