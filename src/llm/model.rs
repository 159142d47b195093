use async_trait::async_trait;
use schemars::gen::SchemaSettings;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::config::RetryPolicy;
use crate::error::{AnalysisError, Result};
use crate::llm::retry::with_retry;
use crate::utils::clean_json_output;

/// The text-interpretation capability the pipeline delegates to.
///
/// Implementations may fail with rate limits, timeouts or malformed output;
/// callers treat all of them the same way.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns a JSON value conforming to `schema`.
    async fn extract_structured(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        schema: &serde_json::Value,
    ) -> Result<serde_json::Value>;

    async fn generate_text(&self, system_prompt: &str, user_prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// JSON schema for `T` in the OpenAPI 3 dialect accepted by structured-output
/// endpoints: subschemas inlined, no `$schema` header.
pub fn response_schema<T: JsonSchema>() -> serde_json::Value {
    let settings = SchemaSettings::openapi3().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None;
    });
    let schema = settings.into_generator().into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}

/// Parses a structured reply, tolerating replies that arrive as a JSON string
/// wrapped in prose or code fences.
pub fn parse_structured<T: DeserializeOwned>(value: serde_json::Value) -> Result<T> {
    let value = match value {
        serde_json::Value::String(text) => serde_json::from_str(&clean_json_output(&text))?,
        other => other,
    };
    Ok(serde_json::from_value(value)?)
}

/// Structured request with retry, decoded into `T`.
///
/// A reply that cannot be decoded counts as a failed attempt and is retried.
pub async fn request_structured<T>(
    model: &dyn LanguageModel,
    retry: &RetryPolicy,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T>
where
    T: JsonSchema + DeserializeOwned,
{
    let schema = response_schema::<T>();
    let schema = &schema;
    with_retry(retry, "structured request", || async move {
        let value = model
            .extract_structured(system_prompt, user_prompt, schema)
            .await?;
        parse_structured::<T>(value).map_err(|e| {
            AnalysisError::UpstreamService(format!("malformed structured output: {e}"))
        })
    })
    .await
}

pub async fn request_text(
    model: &dyn LanguageModel,
    retry: &RetryPolicy,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<String> {
    with_retry(retry, "text request", || async move {
        let text = model.generate_text(system_prompt, user_prompt).await?;
        if text.trim().is_empty() {
            return Err(AnalysisError::UpstreamService(
                "model returned an empty response".to_string(),
            ));
        }
        Ok(text)
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawExtraction, Unit};

    #[test]
    fn test_response_schema_is_inlined() {
        let schema = response_schema::<RawExtraction>();
        let text = schema.to_string();
        assert!(!text.contains("$ref"));
        assert!(!text.contains("$schema"));
        assert!(text.contains("crore"));
    }

    #[test]
    fn test_parse_structured_accepts_fenced_string() {
        let value = serde_json::Value::String(
            "```json\n{\"value\": 150, \"unit\": \"lakh\"}\n```".to_string(),
        );
        let raw: RawExtraction = parse_structured(value).unwrap();
        assert_eq!(raw, RawExtraction::new(150.0, Unit::Lakh));
    }

    #[test]
    fn test_parse_structured_rejects_wrong_shape() {
        let value = serde_json::json!({"value": "twelve", "unit": "crore"});
        assert!(parse_structured::<RawExtraction>(value).is_err());
    }
}
