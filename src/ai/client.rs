use super::fault::{classify, Operation};
use super::gemini::{
    GeminiHttpClient, GenerateContentRequest, GenerateContentResponse, GenerationConfig, Part,
};
use super::{GenerationTransport, StudioService};
use crate::models::{
    is_usable_key, Config, EditRequest, GenerationRequest, SegmentationRequest, SegmentationResult,
};
use crate::{prompts, Error, Result};
use async_trait::async_trait;
use std::sync::Arc;

/// Client for image generation, editing and segmentation against a single
/// fixed model. Every operation is exactly one remote call.
pub struct RemoteGenerationClient {
    api_key: String,
    model: String,
    transport: Arc<dyn GenerationTransport>,
}

impl RemoteGenerationClient {
    pub fn new(config: &Config, transport: Arc<dyn GenerationTransport>) -> Self {
        Self {
            api_key: config.api_key.trim().to_string(),
            model: config.image_model.clone(),
            transport,
        }
    }

    /// Build a client talking to Gemini over HTTP as described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let http = GeminiHttpClient::new(config.timeout).with_base_url(config.base_url.as_str());
        Self::new(config, Arc::new(http))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn is_configured(&self) -> bool {
        is_usable_key(&self.api_key)
    }

    fn configured_key(&self) -> Result<&str> {
        if !self.is_configured() {
            tracing::warn!("Refusing to call Gemini: API key is missing or a placeholder");
            return Err(Error::NotConfigured);
        }
        Ok(&self.api_key)
    }

    /// Payload for `generate_image`: prompt, then each reference image.
    pub fn build_generation_request(request: &GenerationRequest) -> Result<GenerateContentRequest> {
        let mut parts = Vec::with_capacity(1 + request.reference_images.len());
        parts.push(Part::text(request.prompt.as_str()));
        for image in &request.reference_images {
            parts.push(Part::inline_png(image)?);
        }

        Ok(GenerateContentRequest::from_parts(parts).with_generation_config(
            GenerationConfig::image_and_text(request.temperature, request.seed),
        ))
    }

    /// Payload for `edit_image`.
    ///
    /// Order is instruction, original, references, then the mask. The mask
    /// stays last so the model reads it as a region selector rather than as
    /// another reference.
    pub fn build_edit_request(request: &EditRequest) -> Result<GenerateContentRequest> {
        let instruction =
            prompts::edit_instruction(&request.instruction, request.mask_image.is_some());

        let mut parts = Vec::with_capacity(3 + request.reference_images.len());
        parts.push(Part::text(instruction));
        parts.push(Part::inline_png(&request.original_image)?);
        for image in &request.reference_images {
            parts.push(Part::inline_png(image)?);
        }
        if let Some(mask) = &request.mask_image {
            parts.push(Part::inline_png(mask)?);
        }

        Ok(GenerateContentRequest::from_parts(parts).with_generation_config(
            GenerationConfig::image_and_text(request.temperature, request.seed),
        ))
    }

    /// Payload for `segment_image`: fixed instructions embedding the query,
    /// then the image.
    pub fn build_segmentation_request(
        request: &SegmentationRequest,
    ) -> Result<GenerateContentRequest> {
        let parts = vec![
            Part::text(prompts::segmentation(&request.query)),
            Part::inline_png(&request.image)?,
        ];
        Ok(GenerateContentRequest::from_parts(parts))
    }

    async fn call(
        &self,
        api_key: &str,
        request: &GenerateContentRequest,
        operation: Operation,
    ) -> Result<GenerateContentResponse> {
        self.transport
            .generate_content(api_key, &self.model, request)
            .await
            .map_err(|fault| {
                tracing::error!("Gemini {} request failed: {}", operation, fault);
                classify(&fault, operation)
            })
    }

    /// Every inline-data payload of the first candidate, in response order.
    fn collect_images(response: &GenerateContentResponse) -> Vec<String> {
        response
            .first_parts()
            .iter()
            .filter_map(|p| p.inline_data.as_ref())
            .map(|d| d.data.clone())
            .collect()
    }

    fn parse_segmentation(response: &GenerateContentResponse) -> Result<SegmentationResult> {
        let part = response
            .first_parts()
            .first()
            .ok_or_else(|| Error::malformed("model returned no content"))?;
        let text = part
            .text
            .as_deref()
            .ok_or_else(|| Error::malformed("first response part carries no text"))?;

        serde_json::from_str(strip_code_fence(text)).map_err(|e| {
            tracing::error!("Failed to parse segmentation output: {}\nText: {}", e, text);
            Error::MalformedResponse {
                message: format!("segmentation output is not valid JSON: {}", e),
                source: Some(e),
            }
        })
    }
}

/// Unwrap a Markdown code fence (```` ```json ... ``` ````) if present,
/// including the single-line form.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    // Drop the info string (`json`) whether it ends in a newline or a space.
    let info_len = rest
        .find(|c: char| !c.is_ascii_alphanumeric())
        .unwrap_or(rest.len());
    rest[info_len..].trim()
}

#[async_trait]
impl StudioService for RemoteGenerationClient {
    async fn test_api_key(&self, api_key: &str) -> Result<bool> {
        let api_key = api_key.trim();
        if !is_usable_key(api_key) {
            return Err(Error::InvalidCredential);
        }

        let request =
            GenerateContentRequest::from_parts(vec![Part::text(prompts::KEY_CHECK.trim_end())]);
        match self
            .transport
            .generate_content(api_key, &self.model, &request)
            .await
        {
            Ok(_) => {
                tracing::info!("API key accepted by Gemini");
                Ok(true)
            }
            Err(fault) => {
                tracing::error!("API key check failed: {}", fault);
                Err(Error::InvalidCredential)
            }
        }
    }

    async fn generate_image(&self, request: &GenerationRequest) -> Result<Vec<String>> {
        let api_key = self.configured_key()?;
        let payload = Self::build_generation_request(request)?;

        let response = self.call(api_key, &payload, Operation::Generate).await?;
        let images = Self::collect_images(&response);
        tracing::info!("Gemini returned {} image(s) for generation", images.len());
        Ok(images)
    }

    async fn edit_image(&self, request: &EditRequest) -> Result<Vec<String>> {
        let api_key = self.configured_key()?;
        let payload = Self::build_edit_request(request)?;

        let response = self.call(api_key, &payload, Operation::Edit).await?;
        let images = Self::collect_images(&response);
        tracing::info!("Gemini returned {} image(s) for edit", images.len());
        Ok(images)
    }

    async fn segment_image(&self, request: &SegmentationRequest) -> Result<SegmentationResult> {
        let api_key = self.configured_key()?;
        let payload = Self::build_segmentation_request(request)?;

        let response = self.call(api_key, &payload, Operation::Segment).await?;
        let result = Self::parse_segmentation(&response)?;
        tracing::info!("Gemini returned {} segmentation mask(s)", result.masks.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::fault::RemoteFault;
    use crate::ai::gemini::GENERATE_CONTENT_PATH_REGEX;
    use crate::ai::mock::MockTransport;
    use crate::models::PLACEHOLDER_API_KEY;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORIGINAL: &str = "T1JJR0lOQUw=";
    const REF_1: &str = "UkVGMQ==";
    const REF_2: &str = "UkVGMg==";
    const MASK: &str = "TUFTSw==";

    fn make_client(transport: &Arc<MockTransport>, api_key: &str) -> RemoteGenerationClient {
        RemoteGenerationClient::new(&Config::new(api_key), transport.clone())
    }

    fn image_response(parts: serde_json::Value) -> serde_json::Value {
        serde_json::json!({ "candidates": [{ "content": { "parts": parts } }] })
    }

    fn inline_data(part: &Part) -> &str {
        match part {
            Part::InlineData { inline_data } => &inline_data.data,
            Part::Text { text } => panic!("expected inline data, got text {:?}", text),
        }
    }

    fn text(part: &Part) -> &str {
        match part {
            Part::Text { text } => text,
            Part::InlineData { .. } => panic!("expected text part"),
        }
    }

    #[tokio::test]
    async fn test_unconfigured_key_fails_before_network() {
        for key in ["", "  ", PLACEHOLDER_API_KEY] {
            let transport = Arc::new(MockTransport::new());
            let client = make_client(&transport, key);

            let err = client
                .generate_image(&GenerationRequest::new("a cat"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotConfigured));

            let err = client
                .edit_image(&EditRequest::new("make it blue", ORIGINAL))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotConfigured));

            let err = client
                .segment_image(&SegmentationRequest::new(ORIGINAL, "the cat"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::NotConfigured));

            assert_eq!(transport.call_count(), 0);
        }
    }

    #[tokio::test]
    async fn test_generate_image_collects_inline_data_in_order() {
        let transport = Arc::new(MockTransport::new().with_response_json(image_response(
            serde_json::json!([
                { "inlineData": { "mimeType": "image/png", "data": "Rk9P" } },
                { "text": "Here is a second take." },
                { "inlineData": { "mimeType": "image/png", "data": "QkFS" } }
            ]),
        )));
        let client = make_client(&transport, "key");

        let images = client
            .generate_image(&GenerationRequest::new("two foxes"))
            .await
            .unwrap();
        assert_eq!(images, vec!["Rk9P".to_string(), "QkFS".to_string()]);
    }

    #[tokio::test]
    async fn test_generate_image_without_images_returns_empty() {
        let transport = Arc::new(MockTransport::new().with_response_json(image_response(
            serde_json::json!([{ "text": "I can't draw that." }]),
        )));
        let client = make_client(&transport, "key");

        let images = client
            .generate_image(&GenerationRequest::new("something"))
            .await
            .unwrap();
        assert!(images.is_empty());
    }

    #[tokio::test]
    async fn test_generate_image_payload_prompt_then_references() {
        let transport = Arc::new(MockTransport::new());
        let client = make_client(&transport, "key");

        let request = GenerationRequest::new("a lighthouse")
            .with_reference_image(REF_1)
            .with_reference_image(REF_2)
            .with_temperature(0.4)
            .with_seed(42);
        client.generate_image(&request).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].api_key, "key");
        assert_eq!(calls[0].model, crate::models::DEFAULT_IMAGE_MODEL);

        let parts = calls[0].request.parts();
        assert_eq!(parts.len(), 3);
        assert_eq!(text(&parts[0]), "a lighthouse");
        assert_eq!(inline_data(&parts[1]), REF_1);
        assert_eq!(inline_data(&parts[2]), REF_2);

        let config = calls[0].request.generation_config.as_ref().unwrap();
        assert_eq!(config.temperature, Some(0.4));
        assert_eq!(config.seed, Some(42));
    }

    #[tokio::test]
    async fn test_edit_image_payload_order_with_mask_last() {
        let transport = Arc::new(MockTransport::new());
        let client = make_client(&transport, "key");

        let request = EditRequest::new("replace the sky with a sunset", ORIGINAL)
            .with_reference_image(REF_1)
            .with_reference_image(REF_2)
            .with_mask(MASK);
        client.edit_image(&request).await.unwrap();

        let calls = transport.calls();
        let parts = calls[0].request.parts();
        assert_eq!(parts.len(), 5);
        assert!(text(&parts[0]).contains("replace the sky with a sunset"));
        assert!(text(&parts[0]).ends_with(prompts::EDIT_MASK.trim_end()));
        assert_eq!(inline_data(&parts[1]), ORIGINAL);
        assert_eq!(inline_data(&parts[2]), REF_1);
        assert_eq!(inline_data(&parts[3]), REF_2);
        assert_eq!(inline_data(&parts[4]), MASK);
    }

    #[test]
    fn test_edit_request_without_mask_omits_clause() {
        let payload =
            RemoteGenerationClient::build_edit_request(&EditRequest::new("add snow", ORIGINAL))
                .unwrap();
        let parts = payload.parts();
        assert_eq!(parts.len(), 2);
        assert!(!text(&parts[0]).contains(prompts::EDIT_MASK.trim_end()));
        assert_eq!(inline_data(&parts[1]), ORIGINAL);
    }

    #[tokio::test]
    async fn test_edit_image_rejects_invalid_image_before_network() {
        let transport = Arc::new(MockTransport::new());
        let client = make_client(&transport, "key");

        let err = client
            .edit_image(&EditRequest::new("add snow", "not base64 at all!"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(transport.call_count(), 0);
    }

    #[tokio::test]
    async fn test_segment_image_returns_model_json_unchanged() {
        let output = r#"{"masks":[{"label":"dog","box_2d":[1,2,3,4],"mask":"TUFTSw==","confidence":0.9}],"note":"one dog"}"#;
        let transport = Arc::new(MockTransport::new().with_response_json(image_response(
            serde_json::json!([{ "text": output }]),
        )));
        let client = make_client(&transport, "key");

        let result = client
            .segment_image(&SegmentationRequest::new(ORIGINAL, "the dog"))
            .await
            .unwrap();
        assert_eq!(result.masks.len(), 1);
        assert_eq!(result.masks[0].label, "dog");
        assert_eq!(result.masks[0].mask, MASK);
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            serde_json::from_str::<serde_json::Value>(output).unwrap()
        );

        let calls = transport.calls();
        let parts = calls[0].request.parts();
        assert!(text(&parts[0]).contains("the dog"));
        assert_eq!(inline_data(&parts[1]), ORIGINAL);
        assert!(calls[0].request.generation_config.is_none());
    }

    #[tokio::test]
    async fn test_segment_image_accepts_single_line_fence() {
        let transport = Arc::new(MockTransport::new().with_response_json(image_response(
            serde_json::json!([{ "text": "```json {\"masks\":[]}```" }]),
        )));
        let client = make_client(&transport, "key");

        let result = client
            .segment_image(&SegmentationRequest::new(ORIGINAL, "anything"))
            .await
            .unwrap();
        assert!(result.masks.is_empty());
    }

    #[tokio::test]
    async fn test_segment_image_accepts_fenced_json() {
        let transport = Arc::new(MockTransport::new().with_response_json(image_response(
            serde_json::json!([{ "text": "```json\n{\"masks\": []}\n```" }]),
        )));
        let client = make_client(&transport, "key");

        let result = client
            .segment_image(&SegmentationRequest::new(ORIGINAL, "anything"))
            .await
            .unwrap();
        assert!(result.masks.is_empty());
    }

    #[tokio::test]
    async fn test_segment_image_invalid_json_is_malformed() {
        let transport = Arc::new(MockTransport::new().with_response_json(image_response(
            serde_json::json!([{ "text": "Sorry, I found two dogs." }]),
        )));
        let client = make_client(&transport, "key");

        let err = client
            .segment_image(&SegmentationRequest::new(ORIGINAL, "the dog"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::MalformedResponse {
                source: Some(_),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_segment_image_without_text_is_malformed() {
        for parts in [
            serde_json::json!([{ "inlineData": { "mimeType": "image/png", "data": "AAAA" } }]),
            serde_json::json!([]),
        ] {
            let transport = Arc::new(MockTransport::new().with_response_json(image_response(parts)));
            let client = make_client(&transport, "key");

            let err = client
                .segment_image(&SegmentationRequest::new(ORIGINAL, "the dog"))
                .await
                .unwrap_err();
            assert!(matches!(err, Error::MalformedResponse { source: None, .. }));
        }
    }

    #[tokio::test]
    async fn test_remote_faults_are_classified_per_operation() {
        let cases = [
            (RemoteFault::new(Some(429), None, ""), "quota"),
            (RemoteFault::new(None, Some("INVALID_ARGUMENT"), ""), "invalid"),
            (RemoteFault::new(Some(401), Some("UNAUTHENTICATED"), ""), "auth"),
            (RemoteFault::new(Some(500), Some("INTERNAL"), ""), "generic"),
        ];

        for (fault, expected) in cases {
            let transport = Arc::new(MockTransport::new().with_fault(fault));
            let client = make_client(&transport, "key");
            let err = client
                .edit_image(&EditRequest::new("x", ORIGINAL))
                .await
                .unwrap_err();

            match (expected, &err) {
                ("quota", Error::QuotaExceeded)
                | ("invalid", Error::InvalidRequest)
                | ("auth", Error::AuthenticationFailed) => {}
                ("generic", Error::GenericFailure(msg)) => {
                    assert_eq!(msg, Operation::Edit.failure_message())
                }
                _ => panic!("expected {} error, got {:?}", expected, err),
            }
        }
    }

    #[tokio::test]
    async fn test_test_api_key_uses_given_key() {
        let transport = Arc::new(MockTransport::new());
        let client = make_client(&transport, "");

        assert!(client.test_api_key("candidate-key").await.unwrap());

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].api_key, "candidate-key");
        assert_eq!(calls[0].request.parts().len(), 1);
    }

    #[tokio::test]
    async fn test_test_api_key_failure_is_invalid_credential() {
        let transport = Arc::new(
            MockTransport::new().with_fault(RemoteFault::new(Some(429), None, "quota")),
        );
        let client = make_client(&transport, "configured");

        let err = client.test_api_key("bad-key").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));

        let err = client.test_api_key("").await.unwrap_err();
        assert!(matches!(err, Error::InvalidCredential));
        assert_eq!(transport.call_count(), 1);
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\n{}\n```\n"), "{}");
        assert_eq!(strip_code_fence("```json {\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```{\"a\":1}```"), "{\"a\":1}");
        assert_eq!(strip_code_fence("```\ntrue\n```"), "true");
    }

    #[tokio::test]
    async fn test_http_quota_error_maps_to_quota_exceeded() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(GENERATE_CONTENT_PATH_REGEX))
            .and(header("x-goog-api-key", "key"))
            .respond_with(ResponseTemplate::new(429).set_body_json(serde_json::json!({
                "error": {
                    "code": 429,
                    "message": "Resource has been exhausted (e.g. check quota).",
                    "status": "RESOURCE_EXHAUSTED"
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::new("key");
        config.base_url = server.uri();
        let client = RemoteGenerationClient::from_config(&config);

        let err = client
            .generate_image(&GenerationRequest::new("a dream"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::QuotaExceeded));
    }

    #[tokio::test]
    async fn test_http_generate_image_round_trip() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path_regex(GENERATE_CONTENT_PATH_REGEX))
            .and(wiremock::matchers::body_string_contains(
                "\"responseModalities\":[\"IMAGE\",\"TEXT\"]",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(image_response(
                serde_json::json!([
                    { "text": "A quiet harbor at dawn." },
                    { "inlineData": { "mimeType": "image/png", "data": "iVBORw0KGgo=" } }
                ]),
            )))
            .expect(1)
            .mount(&server)
            .await;

        let mut config = Config::new("key");
        config.base_url = server.uri();
        let client = RemoteGenerationClient::from_config(&config);

        let images = client
            .generate_image(&GenerationRequest::new("a harbor"))
            .await
            .unwrap();
        assert_eq!(images, vec!["iVBORw0KGgo=".to_string()]);
    }
}
