//! `POST /client/init` (§4.5): idempotent session issuance against a `CopySetup` token.

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::models::Session;
use crate::wire::{ClientInitBody, ClientInitResponse};

use super::error::{ApiResult, ProblemDetails};
use super::{token_from_header, AppState, COPY_SETUP_TOKEN_HEADER};

pub async fn client_init(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<ClientInitBody>,
) -> ApiResult<(StatusCode, Json<ClientInitResponse>)> {
    let token = token_from_header(&headers, COPY_SETUP_TOKEN_HEADER)?;

    let mut tx = state.db.begin().await.map_err(ProblemDetails::from)?;
    let copy_setup = tx
        .get_copy_setup_by_token(token)
        .await
        .map_err(ProblemDetails::from)?
        .ok_or_else(|| ProblemDetails::unauthorized("unknown copy setup token"))?;
    tx.commit().await.map_err(ProblemDetails::from)?;

    let client_instance_id = body
        .client_instance_id
        .clone()
        .unwrap_or_else(|| format!("cid-{}", Uuid::new_v4()));

    let session = Session {
        refresh_token: super::generate_refresh_token(),
        client_instance_id: client_instance_id.clone(),
        copy_setup_id: copy_setup.id,
        client_ip: addr.ip().to_string(),
        poll_interval: body.poll_interval,
    };

    let ttl_secs = state.config.queue_store.session_ttl_secs;
    state
        .queue_store
        .add_session(&session, ttl_secs)
        .await
        .map_err(ProblemDetails::from)?;

    tracing::info!(
        copy_setup_id = copy_setup.id,
        client_instance_id = %client_instance_id,
        account_id = body.account_id,
        "client session issued"
    );

    let config = &copy_setup.config;
    let response = ClientInitResponse {
        client_instance_id,
        refresh_token: session.refresh_token,
        expire_sec: ttl_secs,
        server_caps: serde_json::json!({}),
        lot_mode: match config.lot_mode {
            crate::models::LotMode::Fixed => "fixed".to_string(),
            crate::models::LotMode::MirrorSource => "mirror_source".to_string(),
        },
        fixed_lot: config.fixed_lot,
        breakeven_on_tp_layer: config.breakeven_on_tp_layer,
        close_trades_before_everyday_swap: config.close_trades_before_everyday_swap,
        close_trades_before_wednesday_swap: config.close_trades_before_wednesday_swap,
        close_trades_before_weekend: config.close_trades_before_weekend,
        trailingstop_on_tps: config.trailingstop_on_tps,
        tradeprofit_percent_from_balans_for_breakeven: config
            .tradeprofit_percent_from_balans_for_breakeven,
        expire_minutes_pending_trade: config.expire_minutes_pending_trade,
        expire_minutes_active_trade: config.expire_minutes_active_trade,
        expire_at_tp_hit_before_entry: config.expire_at_tp_hit_before_entry,
    };

    Ok((StatusCode::CREATED, Json(response)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::extract::connect_info::MockConnectInfo;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::Config;
    use crate::db::Database;
    use crate::models::CopySetupConfig;
    use crate::store::test_support::FakeQueueStore;

    use super::super::{create_router, AppState, COPY_SETUP_TOKEN_HEADER};
    use super::*;

    async fn test_state_with_copy_setup(token: &str) -> AppState {
        let db = Database::in_memory().await;
        let mut tx = db.begin().await.unwrap();
        let room = tx.upsert_chat_room("chat-1", crate::models::ChatKind::Group, None, None)
            .await
            .unwrap();
        tx.create_copy_setup(token, &CopySetupConfig::default(), &[room.id])
            .await
            .unwrap();
        tx.commit().await.unwrap();

        AppState {
            db: Arc::new(db),
            queue_store: Arc::new(FakeQueueStore::new()),
            config: Arc::new(Config::default()),
        }
    }

    fn test_router(state: AppState) -> axum::Router {
        create_router(state).layer(MockConnectInfo(SocketAddr::from(([127, 0, 0, 1], 4000))))
    }

    #[tokio::test]
    async fn issues_a_session_for_a_known_copy_setup_token() {
        let state = test_state_with_copy_setup("setup-token").await;
        let app = test_router(state);

        let body = serde_json::json!({
            "account_id": 1,
            "account_name": "acct",
            "account_server": "broker",
            "account_balance": 1000.0,
            "account_equity": 1000.0,
            "account_open_pnl": 0.0,
            "poll_interval": 5,
            "client_version": 1.0,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/client/init")
                    .header("content-type", "application/json")
                    .header(COPY_SETUP_TOKEN_HEADER, "setup-token")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn rejects_an_unknown_copy_setup_token() {
        let state = test_state_with_copy_setup("setup-token").await;
        let app = test_router(state);

        let body = serde_json::json!({
            "account_id": 1,
            "account_name": "acct",
            "account_server": "broker",
            "account_balance": 1000.0,
            "account_equity": 1000.0,
            "account_open_pnl": 0.0,
            "poll_interval": 5,
            "client_version": 1.0,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/client/init")
                    .header("content-type", "application/json")
                    .header(COPY_SETUP_TOKEN_HEADER, "wrong-token")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_token_header_is_a_400() {
        let state = test_state_with_copy_setup("setup-token").await;
        let app = test_router(state);

        let body = serde_json::json!({
            "account_id": 1,
            "account_name": "acct",
            "account_server": "broker",
            "account_balance": 1000.0,
            "account_equity": 1000.0,
            "account_open_pnl": 0.0,
            "poll_interval": 5,
            "client_version": 1.0,
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/client/init")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
