use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde_json::Value;

use crate::config::PipelineConfig;
use crate::error::{AnalysisError, Result};
use crate::llm::model::LanguageModel;
use crate::llm::types::*;
use crate::retrieval::Embedder;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Schema keywords the generateContent endpoint rejects.
const UNSUPPORTED_SCHEMA_KEYS: &[&str] = &[
    "$schema",
    "$id",
    "definitions",
    "title",
    "format",
    "default",
    "additionalProperties",
    "minimum",
    "maximum",
];

#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl GeminiClient {
    pub fn new(api_key: String) -> Self {
        Self::from_config(api_key, &PipelineConfig::default())
    }

    pub fn from_config(api_key: String, config: &PipelineConfig) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: GEMINI_BASE_URL.to_string(),
            model: config.generation_model.clone(),
            embedding_model: config.embedding_model.clone(),
        }
    }

    /// Reads `GEMINI_API_KEY` from the environment.
    pub fn from_env(config: &PipelineConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            AnalysisError::InvalidConfig("GEMINI_API_KEY must be set".to_string())
        })?;
        Ok(Self::from_config(api_key, config))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub(crate) async fn generate_content(
        &self,
        system_prompt: &str,
        messages: Vec<Content>,
        response_mime_type: &str,
        response_schema: Option<Value>,
    ) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let payload = GenerateContentRequest {
            contents: messages,
            system_instruction: Some(Content::user(system_prompt)),
            generation_config: GenerationConfig {
                response_mime_type: response_mime_type.to_string(),
                response_schema,
                temperature: Some(0.0),
            },
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();

        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(AnalysisError::UpstreamService(format!(
                "Gemini API Error (status {}): {}",
                status, err_text
            )));
        }

        let body: GenerateContentResponse = res.json().await?;

        let content = body
            .candidates
            .ok_or_else(|| AnalysisError::UpstreamService("No candidates returned".to_string()))?
            .into_iter()
            .next()
            .ok_or_else(|| AnalysisError::UpstreamService("Empty candidates list".to_string()))?
            .content
            .ok_or_else(|| {
                AnalysisError::UpstreamService("Candidate has no content".to_string())
            })?;

        let text = content
            .parts
            .into_iter()
            .map(|part| match part {
                Part::Text { text } => text,
            })
            .collect::<String>();

        if text.is_empty() {
            return Err(AnalysisError::UpstreamService(
                "No parts in content".to_string(),
            ));
        }
        Ok(text)
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn extract_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &Value,
    ) -> Result<Value> {
        let raw = self
            .generate_content(
                system_prompt,
                vec![Content::user(user_prompt)],
                "application/json",
                Some(sanitize_schema(schema)),
            )
            .await?;
        debug!("Structured reply: {raw}");
        Ok(serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
    }

    async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String> {
        self.generate_content(
            system_prompt,
            vec![Content::user(user_prompt)],
            "text/plain",
            None,
        )
        .await
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for GeminiClient {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, self.embedding_model, self.api_key
        );
        let payload = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedContentRequest {
                    model: format!("models/{}", self.embedding_model),
                    content: Content::user(text.as_str()),
                    task_type: None,
                })
                .collect(),
        };

        let res = self.client.post(&url).json(&payload).send().await?;
        let status = res.status();
        if !status.is_success() {
            let err_text = res.text().await?;
            return Err(AnalysisError::UpstreamService(format!(
                "Gemini embedding error (status {}): {}",
                status, err_text
            )));
        }

        let body: BatchEmbedResponse = res.json().await?;
        Ok(body.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn model_name(&self) -> &str {
        &self.embedding_model
    }
}

/// Strips JSON-schema keywords outside the subset Gemini accepts.
pub fn sanitize_schema(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(key, _)| !UNSUPPORTED_SCHEMA_KEYS.contains(&key.as_str()))
                .map(|(key, value)| {
                    // property names are data, not keywords
                    let value = if key == "properties" {
                        match value {
                            Value::Object(props) => Value::Object(
                                props
                                    .iter()
                                    .map(|(name, prop)| (name.clone(), sanitize_schema(prop)))
                                    .collect(),
                            ),
                            other => other.clone(),
                        }
                    } else {
                        sanitize_schema(value)
                    };
                    (key.clone(), value)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_schema).collect()),
        other => other.clone(),
    }
}
