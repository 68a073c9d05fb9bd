use anyhow::Result;
use clap::{Parser, Subcommand};
use image_studio::app::{App, Command, Outcome};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "image-studio")]
#[command(about = "Generate, edit and segment images with Gemini")]
struct CliArgs {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Debug, Subcommand)]
enum CliCommand {
    /// Check that an API key is accepted.
    TestKey {
        /// Key to check; defaults to the configured GEMINI_API_KEY.
        #[arg(long)]
        key: Option<String>,
    },
    /// Generate images from a prompt.
    Generate {
        prompt: String,
        #[arg(long = "reference", value_name = "FILE")]
        references: Vec<PathBuf>,
        #[arg(long, value_parser = parse_temperature)]
        temperature: Option<f32>,
        #[arg(long)]
        seed: Option<i64>,
    },
    /// Edit an image, optionally restricted to a mask.
    Edit {
        instruction: String,
        #[arg(long, value_name = "FILE")]
        image: PathBuf,
        #[arg(long = "reference", value_name = "FILE")]
        references: Vec<PathBuf>,
        /// White pixels mark the editable region.
        #[arg(long, value_name = "FILE")]
        mask: Option<PathBuf>,
        #[arg(long, value_parser = parse_temperature)]
        temperature: Option<f32>,
        #[arg(long)]
        seed: Option<i64>,
    },
    /// Find regions matching a description.
    Segment {
        query: String,
        #[arg(long, value_name = "FILE")]
        image: PathBuf,
    },
}

impl From<CliCommand> for Command {
    fn from(command: CliCommand) -> Self {
        match command {
            CliCommand::TestKey { key } => Command::TestKey { key },
            CliCommand::Generate {
                prompt,
                references,
                temperature,
                seed,
            } => Command::Generate {
                prompt,
                references,
                temperature,
                seed,
            },
            CliCommand::Edit {
                instruction,
                image,
                references,
                mask,
                temperature,
                seed,
            } => Command::Edit {
                instruction,
                image,
                references,
                mask,
                temperature,
                seed,
            },
            CliCommand::Segment { query, image } => Command::Segment { query, image },
        }
    }
}

fn parse_temperature(input: &str) -> std::result::Result<f32, String> {
    let value: f32 = input
        .parse()
        .map_err(|_| format!("Invalid temperature '{}'. Expected a number", input))?;
    if !(0.0..=2.0).contains(&value) {
        return Err(format!("Temperature {} is out of range 0.0-2.0", value));
    }
    Ok(value)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "image_studio=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = CliArgs::parse();

    let app = match App::new() {
        Ok(app) => app,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    match app.run(args.command.into()).await {
        Ok(Outcome::KeyValid) => {
            println!("API key is valid");
        }
        Ok(Outcome::Images(paths)) => {
            if paths.is_empty() {
                println!("The model returned no images");
            }
            for path in paths {
                println!("{}", path.display());
            }
        }
        Ok(Outcome::Segmentation { json, masks }) => {
            println!("{}", json.display());
            for path in masks {
                println!("{}", path.display());
            }
        }
        Err(e) => {
            error!("Command failed: {}", e);
            std::process::exit(1);
        }
    }

    info!("Done");
    Ok(())
}
