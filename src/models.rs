//! Model aliases accepted on the command line.

use crate::error::Error;
use std::fmt;

/// Backend family a model is served by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
    Google,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 3] = [
        ProviderKind::Anthropic,
        ProviderKind::OpenAI,
        ProviderKind::Google,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::OpenAI => "openai",
            ProviderKind::Google => "google",
        }
    }

    /// Environment variable holding this provider's credential.
    pub fn credential_var(self) -> &'static str {
        match self {
            ProviderKind::Anthropic => "ANTHROPIC_API_KEY",
            ProviderKind::OpenAI => "OPENAI_API_KEY",
            ProviderKind::Google => "GEMINI_API_KEY",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A short alias resolved to a backend model and its provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpec {
    pub alias: &'static str,
    pub model: &'static str,
    pub provider: ProviderKind,
}

const MODELS: &[ModelSpec] = &[
    ModelSpec {
        alias: "opus",
        model: "claude-3-opus-20240229",
        provider: ProviderKind::Anthropic,
    },
    ModelSpec {
        alias: "sonnet",
        model: "claude-3-5-sonnet-20240620",
        provider: ProviderKind::Anthropic,
    },
    ModelSpec {
        alias: "haiku",
        model: "claude-3-haiku-20240307",
        provider: ProviderKind::Anthropic,
    },
    ModelSpec {
        alias: "gpt",
        model: "gpt-4o",
        provider: ProviderKind::OpenAI,
    },
    ModelSpec {
        alias: "mini",
        model: "gpt-4o-mini",
        provider: ProviderKind::OpenAI,
    },
    ModelSpec {
        alias: "flash",
        model: "gemini-1.5-flash-latest",
        provider: ProviderKind::Google,
    },
    ModelSpec {
        alias: "pro",
        model: "gemini-1.5-pro-latest",
        provider: ProviderKind::Google,
    },
];

impl ModelSpec {
    /// Resolve an alias. Unknown aliases fail before any network I/O.
    pub fn resolve(alias: &str) -> Result<&'static ModelSpec, Error> {
        MODELS
            .iter()
            .find(|m| m.alias == alias)
            .ok_or_else(|| Error::UnsupportedModel(alias.to_string()))
    }

    /// All registered aliases.
    pub fn all() -> &'static [ModelSpec] {
        MODELS
    }

    /// Comma-separated alias list, for help text.
    pub fn aliases() -> String {
        MODELS
            .iter()
            .map(|m| m.alias)
            .collect::<Vec<_>>()
            .join(", ")
    }
}
