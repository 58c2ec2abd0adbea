use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use super::provider::LlmProvider;
use super::types::{ChatRequest, Completion, Pricing, TokenUsage};
use crate::core::config::LlmSettings;
use crate::core::errors::RagError;

/// Client for OpenAI-compatible `/v1/chat/completions` and `/v1/embeddings` endpoints.
#[derive(Clone)]
pub struct OpenAiProvider {
    base_url: String,
    api_key: Option<String>,
    model: String,
    embedding_model: String,
    pricing: Pricing,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(settings: &LlmSettings) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(RagError::internal)?;

        Ok(Self {
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            model: settings.model.clone(),
            embedding_model: settings.embedding_model.clone(),
            pricing: Pricing {
                prompt_per_1k: settings.prompt_cost_per_1k,
                completion_per_1k: settings.completion_cost_per_1k,
            },
            client,
        })
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<Value, RagError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.post(&url).json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let res = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                RagError::ServiceUnavailable
            } else {
                RagError::Generation(format!("Request to {} failed: {}", url, e))
            }
        })?;

        let status = res.status();
        if !status.is_success() {
            let text = res.text().await.unwrap_or_default();
            return Err(status_error(status, &text));
        }

        res.json().await.map_err(RagError::internal)
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn pricing(&self) -> Pricing {
        self.pricing
    }

    async fn chat(&self, request: ChatRequest) -> Result<Completion, RagError> {
        let mut body = json!({
            "model": self.model,
            "messages": request.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            if let Some(t) = request.temperature { obj.insert("temperature".to_string(), json!(t)); }
            if let Some(t) = request.max_tokens { obj.insert("max_tokens".to_string(), json!(t)); }
            if let Some(s) = request.stop { obj.insert("stop".to_string(), json!(s)); }
        }

        let payload = self.post_json("/v1/chat/completions", &body).await?;
        parse_chat_response(&payload)
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }

        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });

        let payload = self.post_json("/v1/embeddings", &body).await?;
        let embeddings = parse_embedding_response(&payload)?;
        if embeddings.len() != inputs.len() {
            return Err(RagError::Retrieval(format!(
                "Embedding count mismatch: sent {}, received {}",
                inputs.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

fn status_error(status: StatusCode, body: &str) -> RagError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => RagError::RateLimited(error_message(body, status)),
        StatusCode::SERVICE_UNAVAILABLE | StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => {
            RagError::ServiceUnavailable
        }
        _ => RagError::Generation(format!(
            "OpenAI API error ({}): {}",
            status.as_u16(),
            error_message(body, status)
        )),
    }
}

fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            }
        })
}

fn parse_chat_response(payload: &Value) -> Result<Completion, RagError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| RagError::Generation("Completion response has no message content".to_string()))?
        .to_string();

    let usage = &payload["usage"];
    let prompt_tokens = usage["prompt_tokens"].as_u64().unwrap_or(0);
    let completion_tokens = usage["completion_tokens"].as_u64().unwrap_or(0);
    let total_tokens = usage["total_tokens"]
        .as_u64()
        .unwrap_or(prompt_tokens + completion_tokens);

    Ok(Completion {
        content,
        usage: TokenUsage {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        },
    })
}

fn parse_embedding_response(payload: &Value) -> Result<Vec<Vec<f32>>, RagError> {
    let data = payload["data"]
        .as_array()
        .ok_or_else(|| RagError::Retrieval("Embedding response has no data".to_string()))?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());
    for (position, item) in data.iter().enumerate() {
        let index = item["index"].as_u64().map(|i| i as usize).unwrap_or(position);
        let Some(vals) = item["embedding"].as_array() else {
            return Err(RagError::Retrieval(format!(
                "Embedding item {} has no vector",
                index
            )));
        };
        let vector: Vec<f32> = vals
            .iter()
            .filter_map(|v| v.as_f64().map(|f| f as f32))
            .collect();
        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}
