//! OpenAI Chat Completions provider.
//!
//! - Auth via Bearer token
//! - Images are sent inline as `data:` URLs in `image_url` parts
//! - Usage only arrives in a final chunk when `stream_options.include_usage`
//!   is set, so every request sets it

use crate::dialect::EventLineDecoder;
use crate::error::Error;
use crate::models::ProviderKind;
use crate::providers::{credential_header, Provider, RequestConfig};
use crate::stream::UnitDecoder;
use crate::types::*;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::{json, Value};

/// OpenAI API provider.
pub struct OpenAIProvider {
    base_url: String,
}

impl OpenAIProvider {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn convert_part(part: &ContentPart) -> Value {
        match part {
            ContentPart::Text(text) => json!({"type": "text", "text": text}),
            ContentPart::Image { data, format } => json!({
                "type": "image_url",
                "image_url": {"url": data_url(data, *format)}
            }),
            ContentPart::ImageUrl(url) => json!({
                "type": "image_url",
                "image_url": {"url": url}
            }),
        }
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for OpenAIProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAI
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            credential_header(self.kind(), &format!("Bearer {api_key}"))?,
        );
        Ok(headers)
    }

    fn build_body(&self, model: &str, message: &Message, config: &RequestConfig) -> Value {
        let content: Vec<Value> = message.parts.iter().map(Self::convert_part).collect();

        json!({
            "model": model,
            "messages": [{
                "role": message.role.as_str(),
                "content": content
            }],
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "stream": true,
            "stream_options": {"include_usage": true}
        })
    }

    fn stream_url(&self, _model: &str) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    fn create_decoder(&self) -> Box<dyn UnitDecoder + Send> {
        Box::new(EventLineDecoder::new())
    }
}
