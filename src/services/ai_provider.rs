//! AI provider adapter.
//!
//! Providers only turn a [`ClassificationRequest`] into raw model text;
//! [`parse_reply`] turns that text into a validated [`ProviderReply`].

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::services::http_client;
use crate::types::ai::{ClassificationRequest, ProviderConfig, ProviderName, ProviderReply};
use crate::types::errors::ProviderError;
use crate::types::settings::ProviderSettings;

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEEPSEEK_ENDPOINT: &str = "https://api.deepseek.com/v1/chat/completions";
const GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta/models";

const TEMPERATURE: f64 = 0.3;
const MAX_TOKENS: u32 = 200;

/// Confidence assumed when the model omits one.
const DEFAULT_REPLY_CONFIDENCE: f64 = 0.5;

static FLAT_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^{}]+\}").expect("static regex"));

/// One AI backend.
#[async_trait]
pub trait AiProvider: Send + Sync {
    fn name(&self) -> ProviderName;

    /// Sends the classification prompt and returns the model's text answer.
    async fn complete(&self, request: &ClassificationRequest) -> Result<String, ProviderError>;
}

/// Builds a provider from the current settings.
pub trait ProviderFactory: Send + Sync {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn AiProvider>, ProviderError>;
}

/// Asks `provider` and validates the answer.
pub async fn classify_with(
    provider: &dyn AiProvider,
    request: &ClassificationRequest,
) -> Result<ProviderReply, ProviderError> {
    let raw = provider.complete(request).await?;
    debug!(provider = %provider.name(), chars = raw.len(), "provider answered");
    parse_reply(&raw)
}

/// Static configuration for every supported backend.
pub fn available_providers() -> Vec<ProviderConfig> {
    vec![
        ProviderConfig {
            name: ProviderName::OpenAi,
            display_name: "OpenAI".to_string(),
            api_endpoint: OPENAI_ENDPOINT.to_string(),
            models: vec!["gpt-4o-mini".to_string(), "gpt-4o".to_string()],
            default_model: "gpt-4o-mini".to_string(),
        },
        ProviderConfig {
            name: ProviderName::Gemini,
            display_name: "Google Gemini".to_string(),
            api_endpoint: GEMINI_ENDPOINT.to_string(),
            models: vec!["gemini-1.5-flash".to_string(), "gemini-1.5-pro".to_string()],
            default_model: "gemini-1.5-flash".to_string(),
        },
        ProviderConfig {
            name: ProviderName::DeepSeek,
            display_name: "DeepSeek".to_string(),
            api_endpoint: DEEPSEEK_ENDPOINT.to_string(),
            models: vec!["deepseek-chat".to_string()],
            default_model: "deepseek-chat".to_string(),
        },
    ]
}

fn default_model(name: ProviderName) -> String {
    available_providers()
        .into_iter()
        .find(|p| p.name == name)
        .map(|p| p.default_model)
        .unwrap_or_default()
}

// ─── Prompt ───

/// System and user prompt for one link.
pub fn build_prompt(request: &ClassificationRequest) -> (String, String) {
    let folders = if request.existing_folders.is_empty() {
        "（暂无）".to_string()
    } else {
        request
            .existing_folders
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };

    let system = format!(
        "你是一个智能书签分类助手。根据书签的标题、URL和描述，把它归入最合适的文件夹。\n\n\
         现有的文件夹列表：\n{}\n\n\
         分类规则：\n\
         1. 优先选择现有文件夹\n\
         2. 现有文件夹都不合适时，建议一个简洁的中文文件夹名称\n\
         3. 考虑书签的主要用途和内容类型\n\n\
         只返回JSON：{{\"category\": \"文件夹名称\", \"confidence\": 0.8, \"reasoning\": \"分类理由\", \"suggestedTitle\": \"可选的更好标题\"}}",
        folders
    );

    let mut user = format!("请对以下书签进行分类：\n标题：{}\nURL：{}", request.title, request.url);
    if let Some(desc) = request.description.as_deref().filter(|d| !d.trim().is_empty()) {
        user.push_str(&format!("\n描述：{}", desc));
    }
    if !request.keywords.is_empty() {
        user.push_str(&format!("\n关键词：{}", request.keywords.join(", ")));
    }
    (system, user)
}

// ─── Reply parsing ───

fn extract_object(raw: &str) -> Option<Value> {
    let trimmed = raw.trim();
    if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(trimmed) {
        return Some(v);
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if start < end {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(&trimmed[start..=end]) {
                return Some(v);
            }
        }
    }
    FLAT_OBJECT
        .find(trimmed)
        .and_then(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object)
}

fn optional_text(obj: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| obj.get(*k))
        .filter_map(|v| v.as_str())
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

/// Validates a model answer. The category is required; a missing confidence
/// defaults to 0.5 and any confidence is clamped to `[0, 1]`.
pub fn parse_reply(raw: &str) -> Result<ProviderReply, ProviderError> {
    let obj = extract_object(raw)
        .ok_or_else(|| ProviderError::Malformed("no JSON object in reply".to_string()))?;

    let category = optional_text(&obj, &["category"])
        .ok_or_else(|| ProviderError::Malformed("missing category".to_string()))?;

    let confidence = match obj.get("confidence") {
        None | Some(Value::Null) => DEFAULT_REPLY_CONFIDENCE,
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ProviderError::Malformed("confidence out of range".to_string()))?,
        Some(Value::String(s)) => s
            .trim()
            .trim_end_matches('%')
            .parse::<f64>()
            .map(|v| if s.trim().ends_with('%') { v / 100.0 } else { v })
            .map_err(|_| ProviderError::Malformed(format!("confidence is not a number: {:?}", s)))?,
        Some(other) => {
            return Err(ProviderError::Malformed(format!(
                "confidence has unexpected type: {}",
                other
            )))
        }
    };

    if !confidence.is_finite() {
        return Err(ProviderError::Malformed(format!("confidence is not finite: {}", confidence)));
    }

    Ok(ProviderReply {
        category,
        confidence: confidence.clamp(0.0, 1.0),
        reasoning: optional_text(&obj, &["reasoning"]),
        suggested_title: optional_text(&obj, &["suggestedTitle", "suggested_title"]),
    })
}

async fn error_message(response: reqwest::Response) -> ProviderError {
    let status = response.status().as_u16();
    let reason = response
        .status()
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();
    let message = match response.json::<Value>().await {
        Ok(body) => body
            .pointer("/error/message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or(reason),
        Err(_) => reason,
    };
    ProviderError::Status { status, message }
}

// ─── OpenAI-compatible chat completions (OpenAI, DeepSeek) ───

pub struct ChatCompletionsProvider {
    name: ProviderName,
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl ChatCompletionsProvider {
    pub fn openai(client: Client, api_key: &str, model: &str) -> Self {
        Self::with_endpoint(ProviderName::OpenAi, client, OPENAI_ENDPOINT, api_key, model)
    }

    pub fn deepseek(client: Client, api_key: &str, model: &str) -> Self {
        Self::with_endpoint(ProviderName::DeepSeek, client, DEEPSEEK_ENDPOINT, api_key, model)
    }

    pub fn with_endpoint(
        name: ProviderName,
        client: Client,
        endpoint: &str,
        api_key: &str,
        model: &str,
    ) -> Self {
        let model = if model.trim().is_empty() {
            default_model(name)
        } else {
            model.trim().to_string()
        };
        Self {
            name,
            client,
            endpoint: endpoint.to_string(),
            api_key: api_key.trim().to_string(),
            model,
        }
    }
}

#[async_trait]
impl AiProvider for ChatCompletionsProvider {
    fn name(&self) -> ProviderName {
        self.name
    }

    async fn complete(&self, request: &ClassificationRequest) -> Result<String, ProviderError> {
        let (system, user) = build_prompt(request);
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
            "response_format": {"type": "json_object"},
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_message(response).await);
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        data.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("missing choices[0].message.content".to_string()))
    }
}

// ─── Gemini ───

pub struct GeminiProvider {
    client: Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(client: Client, api_key: &str, model: &str) -> Self {
        let model = if model.trim().is_empty() {
            default_model(ProviderName::Gemini)
        } else {
            model.trim().to_string()
        };
        Self {
            client,
            endpoint: GEMINI_ENDPOINT.to_string(),
            api_key: api_key.trim().to_string(),
            model,
        }
    }
}

#[async_trait]
impl AiProvider for GeminiProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Gemini
    }

    async fn complete(&self, request: &ClassificationRequest) -> Result<String, ProviderError> {
        let (system, user) = build_prompt(request);
        let body = json!({
            "contents": [{"parts": [{"text": format!("{}\n\n{}", system, user)}]}],
            "generationConfig": {
                "temperature": TEMPERATURE,
                "topK": 1,
                "topP": 0.8,
                "maxOutputTokens": MAX_TOKENS,
            },
        });

        let url = format!("{}/{}:generateContent", self.endpoint, self.model);
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(error_message(response).await);
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;
        data.pointer("/candidates/0/content/parts/0/text")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::Malformed("missing candidates[0].content.parts[0].text".to_string()))
    }
}

/// Creates HTTP-backed providers sharing one pooled client.
#[derive(Default)]
pub struct HttpProviderFactory;

impl ProviderFactory for HttpProviderFactory {
    fn create(&self, settings: &ProviderSettings) -> Result<Arc<dyn AiProvider>, ProviderError> {
        if !settings.has_api_key() {
            return Err(ProviderError::MissingApiKey(settings.provider.to_string()));
        }
        let client = http_client::provider_client().clone();
        let provider: Arc<dyn AiProvider> = match settings.provider {
            ProviderName::OpenAi => Arc::new(ChatCompletionsProvider::openai(
                client,
                &settings.api_key,
                &settings.model,
            )),
            ProviderName::DeepSeek => Arc::new(ChatCompletionsProvider::deepseek(
                client,
                &settings.api_key,
                &settings.model,
            )),
            ProviderName::Gemini => Arc::new(GeminiProvider::new(client, &settings.api_key, &settings.model)),
        };
        Ok(provider)
    }
}
