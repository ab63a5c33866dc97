use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use super::pricing::PricingTable;
use crate::domain::llm::{LlmError, LlmInvocation, LlmInvoker, LlmRequest, LlmUsage};

/// Longest provider error body echoed into step errors
const MAX_ERROR_BODY: usize = 500;

/// Chat-completions client for OpenAI and compatible providers
#[derive(Debug)]
pub struct OpenAiInvoker {
    client: reqwest::Client,
    auth_header: String,
    base_url: String,
    pricing: PricingTable,
}

impl OpenAiInvoker {
    pub fn new(
        base_url: &str,
        api_key: &str,
        timeout: Duration,
        pricing: PricingTable,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            auth_header: format!("Bearer {}", api_key),
            base_url: base_url.trim_end_matches('/').to_string(),
            pricing,
        })
    }

    fn chat_completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn build_request(request: &LlmRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": [{"role": "user", "content": request.prompt}],
        });

        if let Value::Object(fields) = &mut body {
            for (key, value) in &request.parameters {
                if key != "model" && key != "messages" {
                    fields.insert(key.clone(), value.clone());
                }
            }
        }

        body
    }
}

fn map_status(status: StatusCode, body: String) -> LlmError {
    let message: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status {
        StatusCode::TOO_MANY_REQUESTS => LlmError::RateLimited(message),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => LlmError::Auth(message),
        other => LlmError::provider_with_status(other.as_u16(), message),
    }
}

#[async_trait]
impl LlmInvoker for OpenAiInvoker {
    async fn invoke(&self, request: LlmRequest) -> Result<LlmInvocation, LlmError> {
        let started = Instant::now();
        let body = Self::build_request(&request);

        let response = self
            .client
            .post(self.chat_completions_url())
            .header("Authorization", &self.auth_header)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::provider(format!("request failed: {}", e.without_url())))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(map_status(status, error_body));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::provider(format!("failed to parse response: {}", e)))?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::provider("no choices in response"))?;

        let usage = parsed
            .usage
            .map(|u| LlmUsage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();
        let model = parsed.model.unwrap_or(request.model);

        Ok(LlmInvocation {
            cost_cents: self.pricing.cost_cents(&model, &usage),
            latency_ms: started.elapsed().as_millis() as u64,
            text,
            model,
            usage,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u64,
    completion_tokens: u64,
}
