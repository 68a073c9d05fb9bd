use super::fault::RemoteFault;
use super::gemini::{GenerateContentRequest, GenerateContentResponse};
use super::{GenerationTransport, StudioService};
use crate::models::{EditRequest, GenerationRequest, SegmentationRequest, SegmentationResult};
use crate::{Error, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// A request seen by [`MockTransport`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub api_key: String,
    pub model: String,
    pub request: GenerateContentRequest,
}

/// Transport stub that records outgoing payloads and replays queued
/// outcomes. Once the queue is empty it answers with an empty response.
#[derive(Default)]
pub struct MockTransport {
    outcomes: Mutex<VecDeque<std::result::Result<GenerateContentResponse, RemoteFault>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_response(self, response: GenerateContentResponse) -> Self {
        self.outcomes.lock().unwrap().push_back(Ok(response));
        self
    }

    /// Queue a response given as raw `generateContent` JSON.
    pub fn with_response_json(self, body: serde_json::Value) -> Self {
        let response = serde_json::from_value(body).expect("invalid generateContent body");
        self.with_response(response)
    }

    pub fn with_fault(self, fault: RemoteFault) -> Self {
        self.outcomes.lock().unwrap().push_back(Err(fault));
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerationTransport for MockTransport {
    async fn generate_content(
        &self,
        api_key: &str,
        model: &str,
        request: &GenerateContentRequest,
    ) -> std::result::Result<GenerateContentResponse, RemoteFault> {
        self.calls.lock().unwrap().push(RecordedCall {
            api_key: api_key.to_string(),
            model: model.to_string(),
            request: request.clone(),
        });

        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(GenerateContentResponse::default()))
    }
}

/// Canned [`StudioService`] for exercising code built on top of the client.
pub struct MockStudioClient {
    image_responses: Mutex<Vec<Vec<String>>>,
    segmentation: Mutex<Option<SegmentationResult>>,
    valid_keys: Mutex<Vec<String>>,
    call_count: Mutex<usize>,
}

impl MockStudioClient {
    pub fn new() -> Self {
        Self {
            image_responses: Mutex::new(Vec::new()),
            segmentation: Mutex::new(None),
            valid_keys: Mutex::new(Vec::new()),
            call_count: Mutex::new(0),
        }
    }

    pub fn with_image_response(self, images: Vec<String>) -> Self {
        self.image_responses.lock().unwrap().push(images);
        self
    }

    pub fn with_segmentation(self, result: SegmentationResult) -> Self {
        *self.segmentation.lock().unwrap() = Some(result);
        self
    }

    pub fn with_valid_key(self, key: &str) -> Self {
        self.valid_keys.lock().unwrap().push(key.to_string());
        self
    }

    pub fn get_call_count(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    fn next_images(&self) -> Vec<String> {
        let mut count = self.call_count.lock().unwrap();
        *count += 1;

        let responses = self.image_responses.lock().unwrap();
        if responses.is_empty() {
            // Base64 PNG signature
            vec!["iVBORw0KGgo=".to_string()]
        } else {
            let index = (*count - 1) % responses.len();
            responses[index].clone()
        }
    }
}

impl Default for MockStudioClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StudioService for MockStudioClient {
    async fn test_api_key(&self, api_key: &str) -> Result<bool> {
        *self.call_count.lock().unwrap() += 1;
        if self.valid_keys.lock().unwrap().iter().any(|k| k == api_key) {
            Ok(true)
        } else {
            Err(Error::InvalidCredential)
        }
    }

    async fn generate_image(&self, _request: &GenerationRequest) -> Result<Vec<String>> {
        Ok(self.next_images())
    }

    async fn edit_image(&self, _request: &EditRequest) -> Result<Vec<String>> {
        Ok(self.next_images())
    }

    async fn segment_image(&self, _request: &SegmentationRequest) -> Result<SegmentationResult> {
        *self.call_count.lock().unwrap() += 1;
        Ok(self.segmentation.lock().unwrap().clone().unwrap_or_default())
    }
}
