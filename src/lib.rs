//! Client for Gemini image generation, editing and segmentation
//!
//! Formats prompts, reference images and masks into `generateContent`
//! payloads, performs one remote call per operation and returns the images or
//! structured results the model produced.

pub mod ai;
pub mod app;
pub mod error;
pub mod image;
pub mod models;
pub mod prompts;

pub use ai::{RemoteGenerationClient, StudioService};
pub use error::{Error, Result};
