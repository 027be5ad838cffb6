//! `POST /poll` (§4.5): session rotation plus a drain of up to 100 pending trades and
//! 100 pending replies.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use crate::models::Session;
use crate::wire::{PollBody, PollResponse};

use super::error::{ApiResult, ProblemDetails};
use super::{token_from_header, AppState, REFRESH_TOKEN_HEADER};

const PENDING_PAGE_LIMIT: usize = 100;

pub async fn poll(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<PollBody>,
) -> ApiResult<Json<PollResponse>> {
    let old_token = token_from_header(&headers, REFRESH_TOKEN_HEADER)?;

    let session = state
        .queue_store
        .get_session(old_token)
        .await
        .map_err(ProblemDetails::from)?
        .ok_or_else(|| ProblemDetails::not_found("session"))?;

    let ttl_secs = state.config.queue_store.session_ttl_secs;
    let new_session = Session {
        refresh_token: super::generate_refresh_token(),
        ..session.clone()
    };
    state
        .queue_store
        .update_session(old_token, &new_session, ttl_secs)
        .await
        .map_err(ProblemDetails::from)?;

    if !body.trade_ack_ids.is_empty() {
        state
            .queue_store
            .delete_pending_trades(&session.client_instance_id, &body.trade_ack_ids)
            .await
            .map_err(ProblemDetails::from)?;
    }
    if !body.signal_reply_ack_ids.is_empty() {
        state
            .queue_store
            .delete_pending_signal_replies(&session.client_instance_id, &body.signal_reply_ack_ids)
            .await
            .map_err(ProblemDetails::from)?;
    }

    // Client-uploaded trade state is persisted for observability only (§4.5) -- there is
    // no durable store for it beyond the structured log record.
    if !body.trades.is_empty() {
        tracing::debug!(
            client_instance_id = %session.client_instance_id,
            account_id = body.account_id,
            uploaded_trade_count = body.trades.len(),
            account_balance = body.account_balance,
            account_equity = body.account_equity,
            "received client trade state upload"
        );
    }

    let trades = state
        .queue_store
        .pending_trades(&session.client_instance_id, Some(PENDING_PAGE_LIMIT))
        .await
        .map_err(ProblemDetails::from)?;
    let signal_replies = state
        .queue_store
        .pending_signal_replies(&session.client_instance_id, Some(PENDING_PAGE_LIMIT))
        .await
        .map_err(ProblemDetails::from)?;

    Ok(Json(PollResponse {
        refresh_token: new_session.refresh_token,
        trades,
        signal_replies,
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::Database;
    use crate::store::test_support::FakeQueueStore;
    use crate::store::PendingQueueStore;

    use super::super::{create_router, AppState, REFRESH_TOKEN_HEADER};
    use super::*;

    async fn test_state() -> (AppState, Arc<FakeQueueStore>) {
        let db = Database::in_memory().await;
        let queue_store = Arc::new(FakeQueueStore::new());
        let state = AppState {
            db: Arc::new(db),
            queue_store: queue_store.clone(),
            config: Arc::new(Config::default()),
        };
        (state, queue_store)
    }

    fn poll_request(token: &str) -> Request<Body> {
        let body = serde_json::json!({
            "account_id": 1,
            "client_instance_id": "client-1",
            "account_balance": 1000.0,
            "account_equity": 1000.0,
        });
        Request::builder()
            .method("POST")
            .uri("/poll")
            .header("content-type", "application/json")
            .header(REFRESH_TOKEN_HEADER, token)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn rotates_the_refresh_token_and_invalidates_the_old_one() {
        let (state, queue_store) = test_state().await;
        let session = Session {
            refresh_token: "r0".to_string(),
            client_instance_id: "client-1".to_string(),
            copy_setup_id: 1,
            client_ip: "127.0.0.1".to_string(),
            poll_interval: 5,
        };
        queue_store.add_session(&session, 3600).await.unwrap();

        let app = create_router(state);
        let response = app.clone().oneshot(poll_request("r0")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let parsed: PollResponse = serde_json::from_slice(&bytes).unwrap();
        assert_ne!(parsed.refresh_token, "r0");
        assert!(parsed.trades.is_empty());
        assert!(parsed.signal_replies.is_empty());

        let stale = app.clone().oneshot(poll_request("r0")).await.unwrap();
        assert_eq!(stale.status(), StatusCode::NOT_FOUND);

        let fresh = app.oneshot(poll_request(&parsed.refresh_token)).await.unwrap();
        assert_eq!(fresh.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_refresh_token_is_a_404() {
        let (state, _queue_store) = test_state().await;
        let app = create_router(state);
        let response = app.oneshot(poll_request("does-not-exist")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
