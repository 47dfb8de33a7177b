//! Anthropic Messages API provider.
//!
//! - Auth via `x-api-key` header (not Bearer token)
//! - Requires `anthropic-version` header
//! - Streams `data:` lines tagged message_start, content_block_delta,
//!   message_delta, ...; decoded by [`EventLineDecoder`]

use crate::dialect::EventLineDecoder;
use crate::error::Error;
use crate::models::ProviderKind;
use crate::providers::{credential_header, Provider, RequestConfig};
use crate::stream::UnitDecoder;
use crate::types::*;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde_json::{json, Value};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API provider.
pub struct AnthropicProvider {
    base_url: String,
}

impl AnthropicProvider {
    pub fn new() -> Self {
        Self {
            base_url: "https://api.anthropic.com".to_string(),
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
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": format.mime_type(),
                    "data": encode_base64(data)
                }
            }),
            ContentPart::ImageUrl(url) => match split_data_url(url) {
                Some((media_type, data)) => json!({
                    "type": "image",
                    "source": {
                        "type": "base64",
                        "media_type": media_type,
                        "data": data
                    }
                }),
                None => json!({
                    "type": "image",
                    "source": {"type": "url", "url": url}
                }),
            },
        }
    }
}

impl Default for AnthropicProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for AnthropicProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        headers.insert("x-api-key", credential_header(self.kind(), api_key)?);
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
            "stream": true
        })
    }

    fn stream_url(&self, _model: &str) -> String {
        format!("{}/v1/messages", self.base_url)
    }

    fn create_decoder(&self) -> Box<dyn UnitDecoder + Send> {
        Box::new(EventLineDecoder::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_body() {
        let provider = AnthropicProvider::new();
        let message = Message::new_user()
            .with_part(ContentPart::text("Describe this"))
            .with_part(ContentPart::image(&b"abc"[..], ImageFormat::Png))
            .with_part(ContentPart::text("briefly"));
        let config = RequestConfig {
            max_tokens: 100,
            temperature: 0.5,
        };

        let body = provider.build_body("claude-3-haiku-20240307", &message, &config);

        assert_eq!(body["model"], "claude-3-haiku-20240307");
        assert_eq!(body["max_tokens"], 100);
        assert_eq!(body["temperature"], 0.5);
        assert_eq!(body["stream"], true);
        assert!(body.get("stream_options").is_none());

        let msg = &body["messages"][0];
        assert_eq!(msg["role"], "user");
        let content = msg["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert_eq!(content[0]["text"], "Describe this");
        assert_eq!(content[1]["type"], "image");
        assert_eq!(content[1]["source"]["type"], "base64");
        assert_eq!(content[1]["source"]["media_type"], "image/png");
        assert_eq!(content[1]["source"]["data"], "YWJj");
        assert_eq!(content[2]["text"], "briefly");
    }

    #[test]
    fn test_native_image_url() {
        let part = AnthropicProvider::convert_part(&ContentPart::ImageUrl(
            "data:image/gif;base64,R0lG".into(),
        ));
        assert_eq!(part["source"]["media_type"], "image/gif");
        assert_eq!(part["source"]["data"], "R0lG");

        let part = AnthropicProvider::convert_part(&ContentPart::ImageUrl(
            "https://example.com/cat.png".into(),
        ));
        assert_eq!(part["source"]["type"], "url");
    }

    #[test]
    fn test_headers() {
        let provider = AnthropicProvider::new();
        let headers = provider.headers("test-key").unwrap();
        assert_eq!(headers["x-api-key"], "test-key");
        assert_eq!(headers["anthropic-version"], ANTHROPIC_VERSION);
        assert!(!headers.contains_key("authorization"));
    }

    #[test]
    fn test_stream_url() {
        let provider = AnthropicProvider::with_base_url("http://127.0.0.1:9999");
        assert_eq!(provider.stream_url("any"), "http://127.0.0.1:9999/v1/messages");
    }
}
