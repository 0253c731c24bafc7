pub mod error;

pub use error::{OpenAiError, Result};

use serde_json::{json, Value};
use tracing::debug;

const BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl OpenAiClient {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Override the API base URL (test servers).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a system + user prompt to the responses endpoint and parse the
    /// model's text output as a JSON object.
    pub async fn generate_json_response(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        model_override: Option<&str>,
    ) -> Result<Value> {
        if self.api_key.is_empty() {
            return Err(OpenAiError::MissingApiKey);
        }
        let model = model_override.unwrap_or(&self.model);

        let body = json!({
            "model": model,
            "input": [
                {
                    "role": "system",
                    "content": [{"type": "input_text", "text": system_prompt}],
                },
                {
                    "role": "user",
                    "content": [{"type": "input_text", "text": user_prompt}],
                },
            ],
            "text": {"format": {"type": "text"}},
        });

        let resp = self
            .client
            .post(format!("{}/responses", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(OpenAiError::Api { status: status.as_u16(), message });
        }

        let payload: Value = resp.json().await?;
        debug!(model, "OpenAI response received");
        extract_json_result(&payload)
    }
}

/// Pull the JSON object out of a responses-API payload: the first
/// `output_text` block inside the first `message` output.
fn extract_json_result(payload: &Value) -> Result<Value> {
    if let Some(outputs) = payload.get("output").and_then(Value::as_array) {
        for output in outputs {
            if output.get("type").and_then(Value::as_str) != Some("message") {
                continue;
            }
            let blocks = output.get("content").and_then(Value::as_array);
            for block in blocks.into_iter().flatten() {
                if block.get("type").and_then(Value::as_str) == Some("output_text") {
                    let text = block.get("text").and_then(Value::as_str).unwrap_or("");
                    return Ok(serde_json::from_str(text)?);
                }
            }
        }
    }
    // Legacy field name fallback
    if let Some(text) = payload
        .get("output_text")
        .and_then(Value::as_array)
        .and_then(|arr| arr.first())
        .and_then(Value::as_str)
    {
        return Ok(serde_json::from_str(text)?);
    }
    Err(OpenAiError::Parse(
        "unable to locate JSON output in responses payload".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_json_from_message_output() {
        let payload = json!({
            "output": [
                {"type": "reasoning"},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"experiments\": []}"}
                ]},
            ]
        });
        let value = extract_json_result(&payload).unwrap();
        assert_eq!(value, json!({"experiments": []}));
    }

    #[test]
    fn falls_back_to_legacy_output_text() {
        let payload = json!({"output_text": ["{\"ok\": true}"]});
        let value = extract_json_result(&payload).unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[test]
    fn rejects_payload_without_text() {
        let payload = json!({"output": []});
        assert!(extract_json_result(&payload).is_err());
    }
}
