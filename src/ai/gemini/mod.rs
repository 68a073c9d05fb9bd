pub mod client;
pub mod types;

pub use client::GeminiHttpClient;
pub use types::{
    Content, GenerateContentRequest, GenerateContentResponse, GenerationConfig, InlineData, Part,
    ResponsePart,
};

#[cfg(test)]
pub(crate) const GENERATE_CONTENT_PATH_REGEX: &str = r"/v1beta/models/.+:generateContent";
