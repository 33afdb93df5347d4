/// Lyra, the portal's AI assistant
///
/// Prompts go to Google's Generative Language REST API
/// (`models/{model}:generateContent`) with a fixed system instruction. The
/// HTTP details stay in [`GeminiAssistant`]; handlers only see the
/// [`Assistant`] trait so tests can swap in a canned responder.
///
/// # Example
///
/// ```no_run
/// use lynix_shared::assistant::{Assistant, AssistantConfig, GeminiAssistant};
///
/// # async fn example() -> Result<(), lynix_shared::assistant::AssistantError> {
/// let assistant = GeminiAssistant::new(AssistantConfig {
///     api_key: Some(std::env::var("GEMINI_API_KEY").unwrap_or_default()),
///     ..Default::default()
/// })?;
///
/// let reply = assistant.reply("What does Lynix do?").await?;
/// println!("{}", reply);
/// # Ok(())
/// # }
/// ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

/// System instruction sent with every prompt
pub const SYSTEM_INSTRUCTION: &str = "You are a helpful assistant for Lynix, a technology and \
     coding company. Your name is Lyra. Be friendly, concise, and helpful.";

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Upper bound on a prompt, in characters
pub const MAX_PROMPT_CHARS: usize = 8_000;

/// Prompt used for the personalised greeting
pub fn greeting_prompt(username: &str) -> String {
    format!("Please introduce yourself to {}.", username)
}

#[derive(Debug, thiserror::Error)]
pub enum AssistantError {
    /// No API key configured
    #[error("The AI assistant is not configured.")]
    NotConfigured,

    /// Transport failure, timeout or non-success status
    #[error("AI upstream request failed: {0}")]
    Upstream(String),

    /// The upstream answered with nothing usable
    #[error("AI upstream returned an empty response")]
    EmptyResponse,
}

#[async_trait]
pub trait Assistant: Send + Sync {
    /// Sends one prompt and returns the reply text
    async fn reply(&self, prompt: &str) -> Result<String, AssistantError>;
}

#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    system_instruction: Content<'a>,
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

fn build_request(prompt: &str) -> GenerateContentRequest<'_> {
    GenerateContentRequest {
        system_instruction: Content {
            role: None,
            parts: vec![Part {
                text: SYSTEM_INSTRUCTION,
            }],
        },
        contents: vec![Content {
            role: Some("user"),
            parts: vec![Part { text: prompt }],
        }],
    }
}

/// Joins the text parts of the first candidate
fn extract_text(response: GenerateContentResponse) -> Result<String, AssistantError> {
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| {
            content
                .parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(AssistantError::EmptyResponse);
    }

    Ok(text)
}

/// Gemini-backed assistant
pub struct GeminiAssistant {
    client: Client,
    config: AssistantConfig,
}

impl GeminiAssistant {
    pub fn new(config: AssistantConfig) -> Result<Self, AssistantError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AssistantError::Upstream(format!("failed to build HTTP client: {}", e)))?;

        if config.api_key.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("No Gemini API key set; assistant endpoints will answer 503");
        }

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url.trim_end_matches('/'),
            self.config.model
        )
    }
}

#[async_trait]
impl Assistant for GeminiAssistant {
    async fn reply(&self, prompt: &str) -> Result<String, AssistantError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .ok_or(AssistantError::NotConfigured)?;

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", api_key)
            .json(&build_request(prompt))
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, model = %self.config.model, "Gemini request failed");
                AssistantError::Upstream(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                status = status.as_u16(),
                body = %body.chars().take(500).collect::<String>(),
                "Gemini returned an error status"
            );
            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    AssistantError::Upstream("API key rejected".to_string())
                }
                _ => AssistantError::Upstream(format!("status {}", status.as_u16())),
            });
        }

        let decoded: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AssistantError::Upstream(format!("invalid response body: {}", e)))?;

        extract_text(decoded)
    }
}
