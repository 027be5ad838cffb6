//! HTTP polling surface (§4.5): the two stateless endpoints clients poll to obtain a
//! session and drain their pending-queue entries.

mod client_init;
mod error;
mod poll;

pub use error::ProblemDetails;

use std::sync::Arc;

use axum::http::HeaderMap;
use axum::routing::post;
use axum::Router;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tower_http::cors::CorsLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tower_http::LatencyUnit;

use crate::config::Config;
use crate::db::Database;
use crate::store::PendingQueueStore;

pub(crate) const COPY_SETUP_TOKEN_HEADER: &str = "x-copysetup-token";
pub(crate) const REFRESH_TOKEN_HEADER: &str = "x-refresh-token";

/// Process-scoped singletons handed down to every handler (§5 "Shared-resource policy").
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub queue_store: Arc<dyn PendingQueueStore>,
    pub config: Arc<Config>,
}

pub fn create_router(state: AppState) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(tracing::Level::DEBUG))
        .on_response(
            DefaultOnResponse::new()
                .level(tracing::Level::DEBUG)
                .latency_unit(LatencyUnit::Millis),
        );

    let cors = if state.config.cors.disable {
        tracing::warn!("CORS is DISABLED - allowing all origins. This should only be used in development!");
        CorsLayer::permissive()
    } else {
        let origins = state.config.allowed_origins();
        CorsLayer::new()
            .allow_origin(
                origins
                    .iter()
                    .filter_map(|origin| origin.parse().ok())
                    .collect::<Vec<_>>(),
            )
            .allow_methods([axum::http::Method::POST])
            .allow_headers([
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderName::from_static(COPY_SETUP_TOKEN_HEADER),
                axum::http::HeaderName::from_static(REFRESH_TOKEN_HEADER),
            ])
    };

    Router::new()
        .route("/client/init", post(client_init::client_init))
        .route("/poll", post(poll::poll))
        .layer(cors)
        .layer(trace_layer)
        .with_state(state)
}

/// Mints a cryptographically random, URL-safe refresh token (§4.5: "≥16 bytes").
pub(crate) fn generate_refresh_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

pub(crate) fn token_from_header<'a>(
    headers: &'a HeaderMap,
    name: &str,
) -> Result<&'a str, ProblemDetails> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ProblemDetails::missing_header(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_tokens_are_at_least_16_bytes_and_url_safe() {
        let token = generate_refresh_token();
        assert!(token.len() >= 16);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn refresh_tokens_are_not_constant() {
        assert_ne!(generate_refresh_token(), generate_refresh_token());
    }
}
