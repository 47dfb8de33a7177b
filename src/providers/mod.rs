//! Provider adapters for the supported LLM APIs.

pub mod anthropic;
pub mod gemini;
pub mod openai;

use crate::error::Error;
use crate::models::ProviderKind;
use crate::stream::UnitDecoder;
use crate::types::Message;
use reqwest::header::{HeaderMap, HeaderValue};
use serde_json::Value;

/// Request-building and stream-decoding for one backend.
pub trait Provider: Send + Sync {
    /// Provider family.
    fn kind(&self) -> ProviderKind;

    /// Build request headers including auth.
    fn headers(&self, api_key: &str) -> Result<HeaderMap, Error>;

    /// Build the streaming request body.
    fn build_body(&self, model: &str, message: &Message, config: &RequestConfig) -> Value;

    /// Full URL for the streaming request.
    fn stream_url(&self, model: &str) -> String;

    /// Create a decoder for this provider's streaming dialect.
    fn create_decoder(&self) -> Box<dyn UnitDecoder + Send>;

    /// Assemble a ready-to-send request.
    fn build_request(
        &self,
        model: &str,
        message: &Message,
        config: &RequestConfig,
        api_key: &str,
    ) -> Result<ProviderRequest, Error> {
        Ok(ProviderRequest {
            url: self.stream_url(model),
            headers: self.headers(api_key)?,
            body: self.build_body(model, message, config),
        })
    }
}

/// Sampling parameters shared across providers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RequestConfig {
    pub max_tokens: u32,
    pub temperature: f64,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            max_tokens: 4096,
            temperature: 0.1,
        }
    }
}

/// A fully built request. Immutable once constructed.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    url: String,
    headers: HeaderMap,
    body: Value,
}

impl ProviderRequest {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Value {
        &self.body
    }
}

/// Convert a credential into a header value, rejecting control characters.
pub(crate) fn credential_header(kind: ProviderKind, value: &str) -> Result<HeaderValue, Error> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        Error::config(format!(
            "{} contains characters not allowed in an HTTP header",
            kind.credential_var()
        ))
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Get the adapter for a provider family.
pub fn for_kind(kind: ProviderKind) -> Box<dyn Provider> {
    for_kind_with_base_url(kind, None)
}

/// Get the adapter for a provider family with an optional custom base URL.
pub fn for_kind_with_base_url(kind: ProviderKind, base_url: Option<&str>) -> Box<dyn Provider> {
    match kind {
        ProviderKind::Anthropic => Box::new(match base_url {
            Some(url) => anthropic::AnthropicProvider::with_base_url(url),
            None => anthropic::AnthropicProvider::new(),
        }),
        ProviderKind::OpenAI => Box::new(match base_url {
            Some(url) => openai::OpenAIProvider::with_base_url(url),
            None => openai::OpenAIProvider::new(),
        }),
        ProviderKind::Google => Box::new(match base_url {
            Some(url) => gemini::GeminiProvider::with_base_url(url),
            None => gemini::GeminiProvider::new(),
        }),
    }
}
