//! RFC 9457 `application/problem+json` error shape (§6, §7), shared by both handlers.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_uri: String,
    pub title: String,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl ProblemDetails {
    pub fn new(type_uri: impl Into<String>, title: impl Into<String>, status: StatusCode) -> Self {
        Self {
            type_uri: type_uri.into(),
            title: title.into(),
            status: status.as_u16(),
            detail: None,
            instance: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn missing_header(header: &str) -> Self {
        let status = StatusCode::BAD_REQUEST;
        Self::new(
            "https://signal-relay.example.com/errors/missing-header",
            status.canonical_reason().unwrap_or("Bad Request"),
            status,
        )
        .with_detail(format!("missing required header {header}"))
    }

    pub fn unauthorized(detail: impl Into<String>) -> Self {
        let status = StatusCode::UNAUTHORIZED;
        Self::new(
            "https://signal-relay.example.com/errors/unauthorized",
            status.canonical_reason().unwrap_or("Unauthorized"),
            status,
        )
        .with_detail(detail)
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        let status = StatusCode::NOT_FOUND;
        Self::new(
            "https://signal-relay.example.com/errors/not-found",
            status.canonical_reason().unwrap_or("Not Found"),
            status,
        )
        .with_detail(format!("{} not found", resource.into()))
    }

    pub fn validation_error(detail: impl Into<String>) -> Self {
        let status = StatusCode::BAD_REQUEST;
        Self::new(
            "https://signal-relay.example.com/errors/validation",
            status.canonical_reason().unwrap_or("Bad Request"),
            status,
        )
        .with_detail(detail)
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        let status = StatusCode::INTERNAL_SERVER_ERROR;
        Self::new(
            "https://signal-relay.example.com/errors/internal",
            status.canonical_reason().unwrap_or("Internal Server Error"),
            status,
        )
        .with_detail(detail)
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut response = (status, Json(self)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

pub type ApiResult<T> = Result<T, ProblemDetails>;

impl From<crate::errors::RepositoryError> for ProblemDetails {
    fn from(err: crate::errors::RepositoryError) -> Self {
        ProblemDetails::internal_error(err.to_string())
    }
}

impl From<crate::errors::StoreError> for ProblemDetails {
    fn from(err: crate::errors::StoreError) -> Self {
        ProblemDetails::internal_error(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_has_404_status() {
        let problem = ProblemDetails::not_found("session");
        assert_eq!(problem.status, 404);
        assert_eq!(problem.title, "Not Found");
    }

    #[test]
    fn unauthorized_has_401_status() {
        let problem = ProblemDetails::unauthorized("unknown copy setup token");
        assert_eq!(problem.status, 401);
    }

    #[test]
    fn serializes_per_rfc9457_shape() {
        let problem = ProblemDetails::missing_header("X-Refresh-Token").with_instance("/poll");
        let json = serde_json::to_value(&problem).unwrap();
        assert_eq!(json["status"], 400);
        assert_eq!(json["instance"], "/poll");
    }
}
