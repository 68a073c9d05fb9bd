//! Data models and structures
//!
//! Defines the request/response value objects for the generation, edit and
//! segmentation operations, plus environment-driven configuration.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::path::PathBuf;
use std::time::Duration;

/// Dummy key shipped in scaffolding templates; treated the same as no key.
pub const PLACEHOLDER_API_KEY: &str = "PLACEHOLDER_API_KEY";

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-2.5-flash-image-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Base64-encoded PNG images (a `data:` URL prefix is accepted).
    #[serde(default)]
    pub reference_images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Default::default()
        }
    }

    pub fn with_reference_image(mut self, image: impl Into<String>) -> Self {
        self.reference_images.push(image.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditRequest {
    pub instruction: String,
    pub original_image: String,
    #[serde(default)]
    pub reference_images: Vec<String>,
    /// White pixels mark the region the edit may touch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<i64>,
}

impl EditRequest {
    pub fn new(instruction: impl Into<String>, original_image: impl Into<String>) -> Self {
        Self {
            instruction: instruction.into(),
            original_image: original_image.into(),
            ..Default::default()
        }
    }

    pub fn with_reference_image(mut self, image: impl Into<String>) -> Self {
        self.reference_images.push(image.into());
        self
    }

    pub fn with_mask(mut self, mask: impl Into<String>) -> Self {
        self.mask_image = Some(mask.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationRequest {
    pub image: String,
    /// Free-text description of the region to segment.
    pub query: String,
}

impl SegmentationRequest {
    pub fn new(image: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            query: query.into(),
        }
    }
}

/// Structured output requested from the model by `segment_image`.
///
/// Serializes back to exactly the JSON the model produced: numbers keep
/// their integer/float form and keys outside the documented shape are
/// carried in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResult {
    pub masks: Vec<SegmentationMask>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationMask {
    pub label: String,
    /// `[x, y, width, height]` as reported by the model.
    pub box_2d: [Number; 4],
    /// Base64-encoded mask image.
    pub mask: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// Configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub image_model: String,
    pub base_url: String,
    pub timeout: Duration,
    pub output_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            output_dir: PathBuf::from("output"),
        }
    }
}

impl Config {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            ..Default::default()
        }
    }

    pub fn from_env() -> crate::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> crate::Result<Self> {
        // A missing key is not an error here; operations report NotConfigured.
        let api_key = lookup("GEMINI_API_KEY")
            .or_else(|| lookup("API_KEY"))
            .unwrap_or_default();

        let timeout_secs = match lookup("GEMINI_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                crate::Error::Config(format!("GEMINI_TIMEOUT_SECS must be a number, got '{}'", raw))
            })?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            api_key,
            image_model: lookup("GEMINI_IMAGE_MODEL")
                .unwrap_or_else(|| DEFAULT_IMAGE_MODEL.to_string()),
            base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            timeout: Duration::from_secs(timeout_secs),
            output_dir: lookup("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("output")),
        })
    }

    pub fn is_configured(&self) -> bool {
        is_usable_key(&self.api_key)
    }
}

/// False when the key is empty or still the template placeholder.
pub fn is_usable_key(api_key: &str) -> bool {
    let key = api_key.trim();
    !key.is_empty() && key != PLACEHOLDER_API_KEY
}
