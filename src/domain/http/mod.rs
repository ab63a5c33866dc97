//! Outbound HTTP contract used by api_call steps

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::chain::ChainError;

/// HTTP method for api_call steps
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A fully interpolated outbound request
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Value>,
    pub timeout: Duration,
}

/// Response with the body parsed as JSON when possible, else kept as text
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub status_text: String,
    pub headers: HashMap<String, String>,
    pub body: Value,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Sends requests for api_call steps. Transport failures map to
/// `ChainError::ExternalService`; non-2xx responses are returned as-is.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ChainError>;
}

/// Strip the query string and fragment so credentials passed as URL
/// parameters never end up in error messages or logs
pub fn redact_url(url: &str) -> String {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    let (base, rest) = url.split_at(end);

    if rest.is_empty() {
        base.to_string()
    } else {
        format!("{}?[REDACTED]", base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_serialization() {
        assert_eq!(serde_json::to_string(&HttpMethod::Post).unwrap(), "\"POST\"");
        let parsed: HttpMethod = serde_json::from_str("\"DELETE\"").unwrap();
        assert_eq!(parsed, HttpMethod::Delete);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("https://api.example.com/v1/items?api_key=secret"),
            "https://api.example.com/v1/items?[REDACTED]"
        );
        assert_eq!(
            redact_url("https://api.example.com/v1/items"),
            "https://api.example.com/v1/items"
        );
    }

    #[test]
    fn test_response_success_range() {
        let mut response = HttpResponse {
            status: 204,
            status_text: "No Content".to_string(),
            headers: HashMap::new(),
            body: Value::Null,
        };
        assert!(response.is_success());

        response.status = 404;
        assert!(!response.is_success());
    }
}
