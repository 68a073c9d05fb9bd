//! Gemini integration for image generation, editing and segmentation
//!
//! [`RemoteGenerationClient`] turns typed requests into `generateContent`
//! calls over a [`GenerationTransport`] and translates failures into the
//! crate's error kinds.

pub mod client;
pub mod fault;
pub mod gemini;
pub mod mime;
pub mod mock;

pub use client::RemoteGenerationClient;
pub use fault::{classify, Operation, RemoteFault};
pub use gemini::GeminiHttpClient;
pub use mock::{MockStudioClient, MockTransport};

use crate::models::{EditRequest, GenerationRequest, SegmentationRequest, SegmentationResult};
use crate::Result;
use async_trait::async_trait;
use gemini::{GenerateContentRequest, GenerateContentResponse};

/// One `generateContent` round trip. Failures come back as a [`RemoteFault`]
/// so the caller decides how to surface them.
#[async_trait]
pub trait GenerationTransport: Send + Sync {
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<GenerateContentResponse, RemoteFault>;
}

/// Operations exposed to application code.
#[async_trait]
pub trait StudioService: Send + Sync {
    async fn test_api_key(&self, api_key: &str) -> Result<bool>;
    async fn generate_image(&self, request: &GenerationRequest) -> Result<Vec<String>>;
    async fn edit_image(&self, request: &EditRequest) -> Result<Vec<String>>;
    async fn segment_image(&self, request: &SegmentationRequest) -> Result<SegmentationResult>;
}
