use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported AI provider names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    #[default]
    OpenAi,
    Gemini,
    DeepSeek,
}

impl ProviderName {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderName::OpenAi),
            "gemini" => Some(ProviderName::Gemini),
            "deepseek" => Some(ProviderName::DeepSeek),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::OpenAi => "openai",
            ProviderName::Gemini => "gemini",
            ProviderName::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static configuration for an AI provider including available models.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: ProviderName,
    pub display_name: String,
    pub api_endpoint: String,
    pub models: Vec<String>,
    pub default_model: String,
}

/// Everything the provider is told about one link.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassificationRequest {
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    /// Normalized names of folders that already exist in the tree.
    pub existing_folders: Vec<String>,
}

/// Validated provider answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReply {
    pub category: String,
    pub confidence: f64,
    pub reasoning: Option<String>,
    pub suggested_title: Option<String>,
}
