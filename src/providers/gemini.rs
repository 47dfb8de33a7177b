//! Google Gemini provider.
//!
//! Gemini has no event tags: the streaming call yields whole
//! `GenerateContentResponse` objects, one per `data:` line with `?alt=sse`.
//! - Auth via `x-goog-api-key` header
//! - Messages are `contents` with `parts`
//! - Every safety category is set to `BLOCK_NONE`; the defaults silently
//!   truncate technical answers
//! - No `[DONE]` marker; the stream ends on connection close

use crate::error::Error;
use crate::models::ProviderKind;
use crate::providers::{credential_header, Provider, RequestConfig};
use crate::sse::data_payload;
use crate::stream::{Segments, Step, UnitDecoder};
use crate::types::*;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_DANGEROUS_CONTENT",
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
];

/// Gemini API provider.
pub struct GeminiProvider {
    base_url: String,
}

impl GeminiProvider {
    pub fn new() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
        }
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn convert_part(part: &ContentPart) -> Value {
        match part {
            ContentPart::Text(text) => json!({"text": text}),
            ContentPart::Image { data, format } => json!({
                "inline_data": {
                    "mime_type": format.mime_type(),
                    "data": encode_base64(data)
                }
            }),
            ContentPart::ImageUrl(url) => match split_data_url(url) {
                Some((mime_type, data)) => json!({
                    "inline_data": {"mime_type": mime_type, "data": data}
                }),
                None => json!({"file_data": {"file_uri": url}}),
            },
        }
    }

    fn safety_settings() -> Value {
        SAFETY_CATEGORIES
            .iter()
            .map(|category| json!({"category": category, "threshold": "BLOCK_NONE"}))
            .collect()
    }
}

impl Default for GeminiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for GeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn headers(&self, api_key: &str) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert("x-goog-api-key", credential_header(self.kind(), api_key)?);
        Ok(headers)
    }

    fn build_body(&self, _model: &str, message: &Message, config: &RequestConfig) -> Value {
        let role = match message.role {
            Role::User => "user",
            Role::Assistant => "model",
        };
        let parts: Vec<Value> = message.parts.iter().map(Self::convert_part).collect();

        json!({
            "contents": [{"role": role, "parts": parts}],
            "generationConfig": {
                "temperature": config.temperature,
                "maxOutputTokens": config.max_tokens
            },
            "safetySettings": Self::safety_settings()
        })
    }

    fn stream_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:streamGenerateContent?alt=sse",
            self.base_url, model
        )
    }

    fn create_decoder(&self) -> Box<dyn UnitDecoder + Send> {
        Box::new(ResponseObjectDecoder::new())
    }
}

/// Decoder for streamed `GenerateContentResponse` objects.
#[derive(Debug, Default)]
pub struct ResponseObjectDecoder {
    objects: usize,
}

impl ResponseObjectDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one response object: add its token counts to `usage` once and
    /// return the text of every candidate's parts in yield order.
    pub fn decode_object(
        &mut self,
        response: GenerateContentResponse,
        usage: &mut Usage,
    ) -> Result<Segments, Error> {
        if let Some(err) = response.error {
            return Err(Error::Vendor(err.to_string()));
        }
        self.objects += 1;

        if let Some(meta) = response.usage_metadata {
            usage.add_input(meta.prompt_token_count);
            usage.add_output(meta.candidates_token_count);
        }

        Ok(response
            .candidates
            .into_iter()
            .filter_map(|c| c.content)
            .flat_map(|c| c.parts)
            .filter_map(|p| p.text)
            .filter(|t| !t.is_empty())
            .collect())
    }

    /// Number of response objects decoded so far.
    pub fn objects(&self) -> usize {
        self.objects
    }
}

impl UnitDecoder for ResponseObjectDecoder {
    fn decode_line(&mut self, line: &str, usage: &mut Usage) -> Result<Step, Error> {
        let Some(payload) = data_payload(line.trim_end()) else {
            return Ok(Step::Continue);
        };
        let Ok(response) = serde_json::from_str::<GenerateContentResponse>(payload) else {
            return Ok(Step::Skip);
        };

        let segments = self.decode_object(response, usage)?;
        if segments.is_empty() {
            Ok(Step::Continue)
        } else {
            Ok(Step::Emit(segments))
        }
    }
}

// --- Serde types for Gemini API ---

/// One object yielded by the streaming call.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    #[serde(default)]
    usage_metadata: Option<GeminiUsage>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl std::fmt::Display for GeminiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(code) = self.code {
            write!(f, "{code} ")?;
        }
        if let Some(status) = &self.status {
            write!(f, "{status}: ")?;
        }
        f.write_str(&self.message)
    }
}
