use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use faceattr::config::RunConfig;
use faceattr::data::CelebADataSource;
use faceattr::error::Result;
use faceattr::inference::AttributeClassifier;
use faceattr::trainer::TrainingLoop;

#[derive(Parser, Debug)]
#[command(name = "faceattr", about = "Train and run a multi-attribute facial attribute classifier")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train on the configured dataset and write the best model and reports.
    Train {
        /// JSON run configuration.
        #[arg(long)]
        config: PathBuf,
        /// Override the configured number of epochs.
        #[arg(long)]
        epochs: Option<usize>,
    },
    /// Print the attributes predicted for one image.
    Predict {
        /// JSON run configuration of the trained run.
        #[arg(long)]
        config: PathBuf,
        /// Image to classify.
        #[arg(long)]
        image: PathBuf,
    },
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Train { config, epochs } => {
            let mut config = RunConfig::load(&config)?;
            if let Some(epochs) = epochs {
                config.epoches = epochs;
            }
            let data = CelebADataSource::from_config(&config);
            let mut run = TrainingLoop::new(config, data)?;
            let summary = run.fit()?;
            info!(
                epochs = summary.epochs,
                best_epoch = ?summary.best_epoch,
                best_mean_accuracy = summary.best_mean_accuracy,
                checkpoint = %summary.checkpoint.display(),
                "training finished"
            );
            if let Some(test) = &summary.test {
                println!("test mean accuracy: {:.2}%", test.mean_accuracy());
            }
        }
        Command::Predict { config, image } => {
            let config = RunConfig::load(&config)?;
            let mut classifier = AttributeClassifier::from_config(&config)?;
            let predicted = classifier.predict_file(&image)?;
            if predicted.is_empty() {
                println!("no attributes above threshold");
            }
            for attr in predicted {
                println!("{}\t{:.4}", attr.name, attr.score);
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if err.is_fatal() {
                error!(error = %err, "training diverged");
            } else {
                error!(error = %err, "faceattr failed");
            }
            ExitCode::FAILURE
        }
    }
}
