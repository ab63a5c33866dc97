use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::chain::ChainError;
use crate::domain::http::{redact_url, HttpClient, HttpMethod, HttpRequest, HttpResponse};

/// `HttpClient` backed by a shared reqwest connection pool
#[derive(Debug, Clone, Default)]
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> ChainError {
    let target = redact_url(url);
    let reason = if error.is_timeout() {
        "request timed out".to_string()
    } else if error.is_connect() {
        "connection failed".to_string()
    } else {
        error.without_url().to_string()
    };

    ChainError::external("http", format!("{} {}", reason, target))
}

/// JSON when the body parses, otherwise the raw text
fn parse_body(text: String) -> Value {
    if text.is_empty() {
        return Value::Null;
    }
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ChainError> {
        let has_content_type = request
            .headers
            .keys()
            .any(|name| name.eq_ignore_ascii_case("content-type"));

        let mut builder = self
            .client
            .request(Self::method(request.method), &request.url)
            .timeout(request.timeout);

        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(body) = &request.body {
            builder = match body {
                Value::String(text) if has_content_type => builder.body(text.clone()),
                _ if has_content_type => builder.body(body.to_string()),
                _ => builder.json(body),
            };
        }

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let text = response
            .text()
            .await
            .map_err(|e| transport_error(&request.url, e))?;

        Ok(HttpResponse {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: parse_body(text),
        })
    }
}
