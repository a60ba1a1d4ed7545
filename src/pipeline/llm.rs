//! Structured extraction: OCR text → medical fields as JSON.
//!
//! The model call sits behind [`ExtractionBackend`]. Two backends exist:
//!
//! * [`GeminiBackend`] — the Generative Language REST API with
//!   `responseMimeType: application/json`, so the model is constrained to
//!   emit JSON rather than merely asked to.
//! * [`ProviderBackend`] — any `edgequake-llm` provider (OpenAI, Anthropic,
//!   Ollama, …); JSON is requested through a system instruction.
//!
//! [`extract_entities`] never fails: transport errors and unparseable replies
//! become [`ExtractionOutcome`] variants that render to fallback objects.
//! There are no retries; a failed extraction is reported once, in the payload.

use crate::config::ServiceConfig;
use crate::error::{ExtractionError, MedocrError};
use crate::output::ExtractionOutcome;
use crate::pipeline::postprocess::clean_json_reply;
use crate::prompts::{build_extraction_prompt, JSON_ONLY_SYSTEM_PROMPT};
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Sends one prompt to a model and returns its raw text reply.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    async fn generate_json(&self, prompt: &str) -> Result<String, ExtractionError>;
}

/// Build the backend selected by `config.provider`.
pub fn backend_from_config(
    config: &ServiceConfig,
) -> Result<Arc<dyn ExtractionBackend>, MedocrError> {
    if config.uses_gemini() {
        Ok(Arc::new(GeminiBackend::from_config(config)?))
    } else {
        Ok(Arc::new(ProviderBackend::from_config(config)?))
    }
}

/// Run structured extraction over `text`.
pub async fn extract_entities(backend: &dyn ExtractionBackend, text: &str) -> ExtractionOutcome {
    let prompt = build_extraction_prompt(text);
    let start = Instant::now();
    info!(
        "Sending {} chars of OCR text to {} for entity extraction",
        text.len(),
        backend.name()
    );

    match backend.generate_json(&prompt).await {
        Ok(raw) => {
            debug!("{} replied in {:?}", backend.name(), start.elapsed());
            parse_reply(raw)
        }
        Err(e) => {
            warn!("Entity extraction failed: {e}");
            ExtractionOutcome::Failed {
                message: e.to_string(),
                raw_text: e.raw_response().map(str::to_string),
            }
        }
    }
}

/// Parse a raw model reply; anything that is not JSON becomes `Malformed`.
pub fn parse_reply(raw: String) -> ExtractionOutcome {
    match serde_json::from_str::<Value>(&clean_json_reply(&raw)) {
        Ok(v) => ExtractionOutcome::Parsed(v),
        Err(e) => {
            warn!("Model response was not valid JSON ({e}). Raw text: {raw}");
            ExtractionOutcome::Malformed { raw_text: raw }
        }
    }
}

// ── Gemini REST backend ──────────────────────────────────────────────────────

/// [`ExtractionBackend`] calling `models/{model}:generateContent`.
pub struct GeminiBackend {
    client: reqwest::Client,
    api_key: String,
    endpoint: String,
    generation_config: Value,
}

impl GeminiBackend {
    pub fn new(
        api_key: impl Into<String>,
        model: &str,
        api_base_url: &str,
    ) -> Result<Self, MedocrError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("medocr/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| MedocrError::ProviderNotConfigured {
                provider: "gemini".into(),
                hint: format!("HTTP client could not be built: {e}"),
            })?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            endpoint: format!(
                "{}/models/{}:generateContent",
                api_base_url.trim_end_matches('/'),
                model
            ),
            generation_config: json!({ "responseMimeType": "application/json" }),
        })
    }

    pub fn from_config(config: &ServiceConfig) -> Result<Self, MedocrError> {
        let api_key = config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| MedocrError::MissingApiKey {
                provider: config.provider.clone(),
                env_var: crate::config::GEMINI_API_KEY_ENV,
            })?;

        let mut backend = Self::new(api_key, &config.model, &config.api_base_url)?;
        if let Some(t) = config.temperature {
            backend.generation_config["temperature"] = json!(t);
        }
        if let Some(n) = config.max_output_tokens {
            backend.generation_config["maxOutputTokens"] = json!(n);
        }
        Ok(backend)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": self.generation_config,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<Content>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Result<String, ExtractionError> {
        let block_reason = self.prompt_feedback.and_then(|f| f.block_reason);
        let candidate = self.candidates.into_iter().next().ok_or_else(|| {
            ExtractionError::EmptyResponse {
                reason: match block_reason {
                    Some(r) => format!("prompt blocked ({r})"),
                    None => "no candidates returned".into(),
                },
            }
        })?;

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ExtractionError::EmptyResponse {
                reason: format!(
                    "candidate finished with {}",
                    candidate.finish_reason.as_deref().unwrap_or("no reason")
                ),
            });
        }
        Ok(text)
    }
}

#[async_trait]
impl ExtractionBackend for GeminiBackend {
    fn name(&self) -> &str {
        "gemini"
    }

    async fn generate_json(&self, prompt: &str) -> Result<String, ExtractionError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(ExtractionError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.text().await?;
        let parsed: GenerateContentResponse =
            serde_json::from_str(&body).map_err(|e| ExtractionError::UnexpectedBody {
                detail: e.to_string(),
                body: body.clone(),
            })?;
        parsed.into_text()
    }
}

// ── edgequake-llm provider backend ───────────────────────────────────────────

/// [`ExtractionBackend`] over any `edgequake-llm` provider.
pub struct ProviderBackend {
    provider: Arc<dyn LLMProvider>,
    label: String,
    options: CompletionOptions,
}

impl ProviderBackend {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>, config: &ServiceConfig) -> Self {
        Self {
            provider,
            label: label.into(),
            options: build_options(config),
        }
    }

    /// Construct the provider named by `config.provider`; its API key is read
    /// from that provider's own environment variable.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, MedocrError> {
        let provider = ProviderFactory::create_llm_provider(&config.provider, &config.model)
            .map_err(|e| MedocrError::ProviderNotConfigured {
                provider: config.provider.clone(),
                hint: format!("{e}"),
            })?;
        Ok(Self::new(provider, config.provider.clone(), config))
    }
}

/// Build `CompletionOptions` from the service config.
fn build_options(config: &ServiceConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: config.temperature,
        max_tokens: config.max_output_tokens,
        ..Default::default()
    }
}

#[async_trait]
impl ExtractionBackend for ProviderBackend {
    fn name(&self) -> &str {
        &self.label
    }

    async fn generate_json(&self, prompt: &str) -> Result<String, ExtractionError> {
        let messages = vec![
            ChatMessage::system(JSON_ONLY_SYSTEM_PROMPT),
            ChatMessage::user(prompt),
        ];
        let response = self
            .provider
            .chat(&messages, Some(&self.options))
            .await
            .map_err(|e| ExtractionError::Provider(e.to_string()))?;
        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );
        Ok(response.content)
    }
}
