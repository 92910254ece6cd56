//! LLM 提供商 - 业务能力层
//!
//! 每个提供商封装一个具体的聊天/生成端点，向路由器统一暴露
//! `generate(prompt, image?) -> text` 能力：
//!
//! - Gemini - generateContent 端点（视觉，配额宽裕，优先级最高）
//! - OpenRouter - OpenAI 兼容端点（视觉）
//! - Cerebras - OpenAI 兼容端点（纯文本）

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImage,
        ChatCompletionRequestMessageContentPartText, ChatCompletionRequestUserMessageArgs,
        ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrl,
    },
    Client,
};
use async_trait::async_trait;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

/// LLM 提供商能力
///
/// 路由器按固定优先级遍历提供商，对它们一视同仁。
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 提供商名称（用于日志与限流账本）
    fn name(&self) -> &str;

    /// 是否支持视觉输入
    fn supports_vision(&self) -> bool;

    /// 滑动窗口限流上限（每 60 秒）
    fn rate_ceiling(&self) -> u32;

    /// 生成文本；`image_base64` 为 PNG 截图的 base64 编码
    async fn generate(&self, prompt: &str, image_base64: Option<&str>) -> WorkerResult<String>;
}

// ========== Gemini ==========

/// Google Gemini 提供商（generateContent 端点）
pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn rate_ceiling(&self) -> u32 {
        15
    }

    async fn generate(&self, prompt: &str, image_base64: Option<&str>) -> WorkerResult<String> {
        debug!("调用 Gemini API，模型: {}", self.model);

        let url = format!(
            "https://generativelanguage.googleapis.com/v1beta/models/{}:generateContent?key={}",
            self.model, self.api_key
        );

        let mut parts = vec![json!({ "text": prompt })];
        if let Some(image) = image_base64 {
            parts.push(json!({
                "inline_data": { "mime_type": "image/png", "data": image }
            }));
        }
        let payload = json!({ "contents": [{ "parts": parts }] });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .timeout(std::time::Duration::from_secs(60))
            .send()
            .await
            .map_err(|e| WorkerError::provider("gemini", e))?;

        if !response.status().is_success() {
            return Err(WorkerError::provider(
                "gemini",
                format!("HTTP {}", response.status()),
            ));
        }

        let data: JsonValue = response
            .json()
            .await
            .map_err(|e| WorkerError::provider("gemini", e))?;

        let text = data
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .trim()
            .to_string();

        Ok(text)
    }
}

// ========== OpenAI 兼容提供商 ==========

/// OpenAI 兼容端点的通用封装（OpenRouter / Cerebras）
struct OpenAiCompatClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiCompatClient {
    fn new(api_key: &str, api_base: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);
        Self {
            client: Client::with_config(config),
        }
    }

    /// 发送聊天请求（可选携带一张 base64 图片）
    async fn chat(
        &self,
        provider: &str,
        model: &str,
        prompt: &str,
        image_base64: Option<&str>,
    ) -> WorkerResult<String> {
        debug!("调用 {} API，模型: {}", provider, model);

        // 构建用户消息内容（支持图片）
        let user_msg = if let Some(image) = image_base64 {
            let mut content_parts: Vec<ChatCompletionRequestUserMessageContentPart> = Vec::new();

            content_parts.push(ChatCompletionRequestUserMessageContentPart::Text(
                ChatCompletionRequestMessageContentPartText {
                    text: prompt.to_string(),
                },
            ));
            content_parts.push(ChatCompletionRequestUserMessageContentPart::ImageUrl(
                ChatCompletionRequestMessageContentPartImage {
                    image_url: ImageUrl {
                        url: format!("data:image/png;base64,{}", image),
                        detail: Some(ImageDetail::Auto),
                    },
                },
            ));

            ChatCompletionRequestUserMessageArgs::default()
                .content(ChatCompletionRequestUserMessageContent::Array(content_parts))
                .build()
                .map_err(|e| WorkerError::provider(provider, e))?
        } else {
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt)
                .build()
                .map_err(|e| WorkerError::provider(provider, e))?
        };

        let messages = vec![ChatCompletionRequestMessage::User(user_msg)];

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .temperature(0.3)
            .max_tokens(1024u32)
            .build()
            .map_err(|e| WorkerError::provider(provider, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("{} API 调用失败: {}", provider, e);
            WorkerError::provider(provider, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_default();

        Ok(content.trim().to_string())
    }
}

/// OpenRouter 提供商（视觉走 qwen2.5-vl，文本走 qwen2.5-72b）
pub struct OpenRouterProvider {
    inner: OpenAiCompatClient,
}

const OPENROUTER_TEXT_MODEL: &str = "qwen/qwen2.5-72b-instruct";
const OPENROUTER_VISION_MODEL: &str = "qwen/qwen2.5-vl-7b-instruct";

impl OpenRouterProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            inner: OpenAiCompatClient::new(api_key, "https://openrouter.ai/api/v1"),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn supports_vision(&self) -> bool {
        true
    }

    fn rate_ceiling(&self) -> u32 {
        20
    }

    async fn generate(&self, prompt: &str, image_base64: Option<&str>) -> WorkerResult<String> {
        let model = if image_base64.is_some() {
            OPENROUTER_VISION_MODEL
        } else {
            OPENROUTER_TEXT_MODEL
        };
        self.inner.chat(self.name(), model, prompt, image_base64).await
    }
}

/// Cerebras 提供商（纯文本，低延迟）
pub struct CerebrasProvider {
    inner: OpenAiCompatClient,
}

const CEREBRAS_MODEL: &str = "llama-3.3-70b";

impl CerebrasProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            inner: OpenAiCompatClient::new(api_key, "https://api.cerebras.ai/v1"),
        }
    }
}

#[async_trait]
impl LlmProvider for CerebrasProvider {
    fn name(&self) -> &str {
        "cerebras"
    }

    fn supports_vision(&self) -> bool {
        false
    }

    fn rate_ceiling(&self) -> u32 {
        30
    }

    async fn generate(&self, prompt: &str, image_base64: Option<&str>) -> WorkerResult<String> {
        // 纯文本提供商，忽略图片参数（路由器在 require_vision 时不会选到这里）
        let _ = image_base64;
        self.inner.chat(self.name(), CEREBRAS_MODEL, prompt, None).await
    }
}
