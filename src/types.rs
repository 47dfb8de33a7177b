use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use std::fmt;

/// Message role in conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A role-tagged, ordered sequence of content parts.
///
/// Part order is the order presented to the model and is preserved by every
/// provider adapter when serializing.
#[derive(Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<ContentPart>,
}

impl Message {
    /// Create an empty user message.
    pub fn new_user() -> Self {
        Self {
            role: Role::User,
            parts: Vec::new(),
        }
    }

    /// Create a user message with a single text part.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            parts: vec![ContentPart::Text(text.into())],
        }
    }

    /// Append a part, keeping insertion order.
    pub fn push(&mut self, part: ContentPart) {
        self.parts.push(part);
    }

    /// Builder-style append.
    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.parts.push(part);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Content part for multi-modal messages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    /// Raw image bytes with their encoding.
    Image { data: Bytes, format: ImageFormat },
    /// An image already expressed as a URL (`https://` or `data:`), passed
    /// through in the provider's native image shape.
    ImageUrl(String),
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text(text.into())
    }

    pub fn image(data: impl Into<Bytes>, format: ImageFormat) -> Self {
        ContentPart::Image {
            data: data.into(),
            format,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Image encodings accepted by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Webp,
}

impl ImageFormat {
    /// Match a file extension, case-insensitively, with or without the dot.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "webp" => Some(ImageFormat::Webp),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Webp => "image/webp",
        }
    }
}

/// Base64 (standard alphabet, padded) encoding of raw image bytes.
pub fn encode_base64(data: &[u8]) -> String {
    STANDARD.encode(data)
}

/// `data:` URL for inline image bytes.
pub fn data_url(data: &[u8], format: ImageFormat) -> String {
    format!("data:{};base64,{}", format.mime_type(), encode_base64(data))
}

/// Split a `data:<mime>;base64,<payload>` URL into its parts.
pub fn split_data_url(url: &str) -> Option<(&str, &str)> {
    url.strip_prefix("data:")?.split_once(";base64,")
}

/// Token usage accumulated over one exchange. Only ever incremented.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Usage {
    #[inline]
    pub fn add_input(&mut self, tokens: u64) {
        self.input_tokens = self.input_tokens.saturating_add(tokens);
    }

    #[inline]
    pub fn add_output(&mut self, tokens: u64) {
        self.output_tokens = self.output_tokens.saturating_add(tokens);
    }

    /// Total tokens used.
    #[inline]
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Input Tokens: {}, Output Tokens: {}",
            self.input_tokens, self.output_tokens
        )
    }
}

/// Unit flowing from the stream decoder to the console consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    /// The provider signalled completion.
    Done,
}

impl Fragment {
    /// Text content, if this is a text fragment.
    #[inline]
    pub fn text(&self) -> Option<&str> {
        match self {
            Fragment::Text(s) => Some(s),
            Fragment::Done => None,
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self, Fragment::Done)
    }
}
