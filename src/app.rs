//! Command orchestration for the `image-studio` binary.
//!
//! Loads input images from disk, calls a [`StudioService`] and writes the
//! returned artifacts into a per-session output directory.

use crate::ai::{RemoteGenerationClient, StudioService};
use crate::models::{Config, EditRequest, GenerationRequest, SegmentationRequest};
use crate::{image, Result};
use chrono::Local;
use std::path::PathBuf;
use tracing::{info, warn};
use uuid::Uuid;

/// A single user request, already parsed from the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    TestKey {
        key: Option<String>,
    },
    Generate {
        prompt: String,
        references: Vec<PathBuf>,
        temperature: Option<f32>,
        seed: Option<i64>,
    },
    Edit {
        instruction: String,
        image: PathBuf,
        references: Vec<PathBuf>,
        mask: Option<PathBuf>,
        temperature: Option<f32>,
        seed: Option<i64>,
    },
    Segment {
        query: String,
        image: PathBuf,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::TestKey { .. } => "test-key",
            Command::Generate { .. } => "generate",
            Command::Edit { .. } => "edit",
            Command::Segment { .. } => "segment",
        }
    }
}

/// What a command produced.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    KeyValid,
    Images(Vec<PathBuf>),
    Segmentation { json: PathBuf, masks: Vec<PathBuf> },
}

pub struct App {
    service: Box<dyn StudioService>,
    api_key: String,
    output_dir: PathBuf,
}

impl App {
    /// Build an app around an arbitrary service, e.g. a mock in tests.
    pub fn with_service(
        service: Box<dyn StudioService>,
        api_key: String,
        output_dir: PathBuf,
    ) -> Self {
        Self {
            service,
            api_key,
            output_dir,
        }
    }

    /// Construct an app from environment configuration (`Config::from_env`).
    pub fn new() -> Result<Self> {
        let config = Config::from_env()?;
        if !config.is_configured() {
            warn!("GEMINI_API_KEY is not set; only `test-key --key` will work");
        }

        let date = Local::now().format("%Y-%m-%d").to_string();
        let output_dir = config
            .output_dir
            .join(format!("{}_{}", date, Uuid::new_v4()));

        let client = RemoteGenerationClient::from_config(&config);
        info!("Using model {}", client.model());

        Ok(Self::with_service(
            Box::new(client),
            config.api_key,
            output_dir,
        ))
    }

    pub async fn run(&self, command: Command) -> Result<Outcome> {
        let name = command.name();
        info!("Running {}", name);

        match command {
            Command::TestKey { key } => {
                let key = key.unwrap_or_else(|| self.api_key.clone());
                self.service.test_api_key(&key).await?;
                info!("API key is valid");
                Ok(Outcome::KeyValid)
            }
            Command::Generate {
                prompt,
                references,
                temperature,
                seed,
            } => {
                let request = GenerationRequest {
                    prompt,
                    reference_images: load_images(&references).await?,
                    temperature,
                    seed,
                };
                let images = self.service.generate_image(&request).await?;
                self.save_images(name, &images).await.map(Outcome::Images)
            }
            Command::Edit {
                instruction,
                image: original,
                references,
                mask,
                temperature,
                seed,
            } => {
                let mask_image = match mask {
                    Some(path) => Some(image::load_png_base64(&path).await?),
                    None => None,
                };
                let request = EditRequest {
                    instruction,
                    original_image: image::load_png_base64(&original).await?,
                    reference_images: load_images(&references).await?,
                    mask_image,
                    temperature,
                    seed,
                };
                let images = self.service.edit_image(&request).await?;
                self.save_images(name, &images).await.map(Outcome::Images)
            }
            Command::Segment { query, image: source } => {
                let request = SegmentationRequest {
                    image: image::load_png_base64(&source).await?,
                    query,
                };
                let result = self.service.segment_image(&request).await?;

                tokio::fs::create_dir_all(&self.output_dir).await?;
                let json = self.output_dir.join("segmentation.json");
                tokio::fs::write(&json, serde_json::to_string_pretty(&result)?).await?;
                info!("Saved segmentation result to {}", json.display());

                let mut masks = Vec::new();
                for (index, entry) in result.masks.iter().enumerate() {
                    let stem = format!("mask_{}", index);
                    match image::save_base64(&self.output_dir, &stem, &entry.mask).await {
                        Ok(path) => masks.push(path),
                        Err(e) => warn!("Skipping mask {} ({}): {}", index, entry.label, e),
                    }
                }

                Ok(Outcome::Segmentation { json, masks })
            }
        }
    }

    async fn save_images(&self, prefix: &str, images: &[String]) -> Result<Vec<PathBuf>> {
        if images.is_empty() {
            warn!("Model returned no images");
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.output_dir).await?;
        let mut paths = Vec::with_capacity(images.len());
        for (index, data) in images.iter().enumerate() {
            let path =
                image::save_base64(&self.output_dir, &format!("{}_{}", prefix, index), data)
                    .await?;
            info!("Saved image to {}", path.display());
            paths.push(path);
        }
        Ok(paths)
    }
}

async fn load_images(paths: &[PathBuf]) -> Result<Vec<String>> {
    let mut images = Vec::with_capacity(paths.len());
    for path in paths {
        images.push(image::load_png_base64(path).await?);
    }
    Ok(images)
}
