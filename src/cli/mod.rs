// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// Parses command line arguments with clap and hands off to
// the use cases of Layer 2. Printing happens here only.
//
//   1. `train` — train a parser on a CoNLL-U corpus
//   2. `eval`  — score a trained parser (UAS / LAS)
//   3. `infer` — write a parsed copy of a corpus
//
// Reference: Rust Book §7 (Modules), §12 (CLI programs)

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, EvalArgs, InferArgs, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "biaffine-sdp",
    version = "0.1.0",
    about = "Train and run a biaffine semantic dependency parser on CoNLL-U corpora."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args) => run_train(args),
            Commands::Eval(args)  => run_eval(args),
            Commands::Infer(args) => run_infer(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    let config = args.into_config()?.validate()?;
    tracing::info!("Writing outputs under '{}'", config.get().output_dir.display());

    let summary = TrainUseCase::new(config).execute()?;

    println!(
        "Training complete after {} epochs / {} steps{}.",
        summary.epochs_run,
        summary.global_step,
        if summary.stopped_early { " (early stop)" } else { "" }
    );
    if summary.best_result.has_record() {
        println!("{}", summary.best_result);
    }
    Ok(())
}

fn run_eval(args: EvalArgs) -> Result<()> {
    use crate::application::parse_use_case::ParseUseCase;

    let parser = ParseUseCase::new(&args.model_dir)?;
    let (uas, las) = parser.evaluate(&args.input, args.output_dir.as_deref())?;
    println!("UAS: {uas:.4}\nLAS: {las:.4}");
    Ok(())
}

fn run_infer(args: InferArgs) -> Result<()> {
    use crate::application::parse_use_case::ParseUseCase;

    let parser = ParseUseCase::new(&args.model_dir)?;
    let n = parser.parse(&args.input, &args.output)?;
    println!("Parsed {n} sentences into '{}'", args.output.display());
    Ok(())
}
