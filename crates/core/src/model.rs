//! OpenAI → Gemini model mapping.

use serde::{Deserialize, Serialize};

use crate::openai::{ModelInfo, ModelList};

/// Header carrying the model selection on `StreamGenerate` requests.
pub const MODEL_HEADER: &str = "x-goog-ext-525001261-jspb";

/// Gemini web models the proxy can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GeminiModel {
    #[serde(rename = "gemini-2.5-pro")]
    Gemini25Pro,
    #[serde(rename = "gemini-2.5-flash")]
    Gemini25Flash,
    #[serde(rename = "gemini-2.0-flash")]
    Gemini20Flash,
    #[serde(rename = "gemini-2.0-flash-thinking")]
    Gemini20FlashThinking,
}

impl GeminiModel {
    pub fn name(&self) -> &'static str {
        match self {
            GeminiModel::Gemini25Pro => "gemini-2.5-pro",
            GeminiModel::Gemini25Flash => "gemini-2.5-flash",
            GeminiModel::Gemini20Flash => "gemini-2.0-flash",
            GeminiModel::Gemini20FlashThinking => "gemini-2.0-flash-thinking",
        }
    }

    /// Value of [`MODEL_HEADER`] for this model.
    pub fn header(&self) -> &'static str {
        match self {
            GeminiModel::Gemini25Pro => {
                r#"[1,null,null,null,"4af6c7f5da75d65d",null,null,0,[4]]"#
            }
            GeminiModel::Gemini25Flash => {
                r#"[1,null,null,null,"71c2d248d3b102ff",null,null,0,[4]]"#
            }
            GeminiModel::Gemini20Flash => r#"[1,null,null,null,"f299729663a2343f"]"#,
            GeminiModel::Gemini20FlashThinking => r#"[null,null,null,null,"7ca48d02d802f20a"]"#,
        }
    }

    fn from_exact(name: &str) -> Option<Self> {
        match name {
            "gemini-2.5-pro" => Some(GeminiModel::Gemini25Pro),
            "gemini-2.5-flash" => Some(GeminiModel::Gemini25Flash),
            "gemini-2.0-flash" => Some(GeminiModel::Gemini20Flash),
            "gemini-2.0-flash-thinking" => Some(GeminiModel::Gemini20FlashThinking),
            _ => None,
        }
    }
}

impl std::fmt::Display for GeminiModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a requested model name was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    /// The name is a Gemini model name.
    Exact,
    /// The name is a known OpenAI model.
    Alias,
    /// Resolved by a substring of the name.
    Partial,
    /// Nothing matched; the default model was chosen.
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelMatch {
    pub model: GeminiModel,
    pub kind: MatchKind,
}

/// Maps an OpenAI model name to a Gemini model.
///
/// Precedence: exact Gemini name, then OpenAI alias, then substring match,
/// then `gemini-2.5-flash`.
pub fn map_openai_model(name: &str) -> ModelMatch {
    if let Some(model) = GeminiModel::from_exact(name) {
        return ModelMatch {
            model,
            kind: MatchKind::Exact,
        };
    }

    let alias = match name {
        "gpt-4" | "gpt-4-turbo" | "gpt-4o" => Some(GeminiModel::Gemini25Pro),
        "gpt-3.5-turbo" | "gpt-3.5" => Some(GeminiModel::Gemini25Flash),
        _ => None,
    };
    if let Some(model) = alias {
        return ModelMatch {
            model,
            kind: MatchKind::Alias,
        };
    }

    let lower = name.to_lowercase();
    let partial = if lower.contains("pro") || lower.contains("gpt-4") {
        Some(GeminiModel::Gemini25Pro)
    } else if lower.contains("flash") || lower.contains("gpt-3.5") || lower.contains("turbo") {
        Some(GeminiModel::Gemini25Flash)
    } else if lower.contains("thinking") {
        Some(GeminiModel::Gemini20FlashThinking)
    } else {
        None
    };

    match partial {
        Some(model) => ModelMatch {
            model,
            kind: MatchKind::Partial,
        },
        None => ModelMatch {
            model: GeminiModel::Gemini25Flash,
            kind: MatchKind::Fallback,
        },
    }
}

/// Models advertised on `GET /v1/models`.
pub fn available_models() -> ModelList {
    ModelList {
        object: "list".to_string(),
        data: ["gpt-4", "gpt-4-turbo", "gpt-3.5-turbo", "gemini-2.5-flash"]
            .into_iter()
            .map(ModelInfo::new)
            .collect(),
    }
}
