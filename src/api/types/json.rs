//! JSON extractor whose rejections use the API error envelope

use axum::{
    extract::{rejection::JsonRejection as AxumRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json as AxumJson,
};
use serde::de::DeserializeOwned;

use super::error::{ApiError, ApiErrorType};

/// Drop-in for `axum::Json`; malformed bodies come back as `{"error": {...}}`
#[derive(Debug, Clone, Copy, Default)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> std::ops::Deref for Json<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Body rejection mapped onto [`ApiError`]
#[derive(Debug)]
pub struct JsonRejection(ApiError);

impl IntoResponse for JsonRejection {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

impl<S, T> FromRequest<S> for Json<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = JsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        AxumJson::<T>::from_request(req, state)
            .await
            .map(|AxumJson(value)| Json(value))
            .map_err(|rejection| {
                let status = rejection.status();
                JsonRejection(
                    ApiError::new(status, ApiErrorType::InvalidRequestError, describe(&rejection))
                        .with_code("json_parse_error"),
                )
            })
    }
}

fn describe(rejection: &AxumRejection) -> String {
    match rejection {
        AxumRejection::JsonDataError(err) => format!("Invalid JSON data: {}", err.body_text()),
        AxumRejection::JsonSyntaxError(err) => format!("Invalid JSON syntax: {}", err.body_text()),
        AxumRejection::MissingJsonContentType(_) => {
            "Missing Content-Type header. Expected 'application/json'.".to_string()
        }
        AxumRejection::BytesRejection(err) => {
            format!("Failed to read request body: {}", err.body_text())
        }
        _ => "Invalid JSON request".to_string(),
    }
}

impl<T> IntoResponse for Json<T>
where
    T: serde::Serialize,
{
    fn into_response(self) -> Response {
        AxumJson(self.0).into_response()
    }
}

/// `(StatusCode, Json)` helper for endpoints that answer 201/202
pub fn with_status<T: serde::Serialize>(status: StatusCode, body: T) -> Response {
    (status, AxumJson(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    fn request(body: &'static str) -> Request {
        Request::builder()
            .method("POST")
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_valid_body_is_extracted() {
        let Json(named) = Json::<Named>::from_request(request(r#"{"name":"a"}"#), &())
            .await
            .unwrap();
        assert_eq!(named.name, "a");
    }

    #[tokio::test]
    async fn test_syntax_error_uses_error_envelope() {
        let rejection = Json::<Named>::from_request(request("{not json"), &())
            .await
            .unwrap_err();

        assert_eq!(rejection.0.status, StatusCode::BAD_REQUEST);
        assert_eq!(rejection.0.response.error.code.as_deref(), Some("json_parse_error"));
        assert!(rejection.0.response.error.message.starts_with("Invalid JSON syntax"));
    }

    #[tokio::test]
    async fn test_missing_field_is_unprocessable() {
        let rejection = Json::<Named>::from_request(request("{}"), &())
            .await
            .unwrap_err();

        assert_eq!(rejection.0.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
