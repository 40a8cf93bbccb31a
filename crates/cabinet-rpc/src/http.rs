//! HTTP transport
//!
//! `POST /api/v1` carries JSON-RPC bodies, `GET /health` reports liveness.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::error::RpcError;
use crate::server::{CallContext, JsonRpcResponse, RpcServer};

pub const RPC_PATH: &str = "/api/v1";
pub const HEALTH_PATH: &str = "/health";
pub const SESSION_COOKIE: &str = "cabinet_session";
pub const TOKEN_HEADER: &str = "token";

type SharedServer = Arc<RpcServer>;

pub fn create_router(server: SharedServer) -> Router {
    Router::new()
        .route(RPC_PATH, post(rpc_handler))
        .route(HEALTH_PATH, get(health))
        .with_state(server)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

async fn rpc_handler(
    State(server): State<SharedServer>,
    jar: CookieJar,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => {
            let err = RpcError::ParseError(e.to_string());
            warn!("Rejected body: {}", err);
            return Json(JsonRpcResponse::from_error(Value::Null, &err).to_value()).into_response();
        }
    };

    let session_id = jar.get(SESSION_COOKIE).map(|c| c.value().to_string());
    let token = headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let mut ctx = CallContext::new(session_id, token);
    let response = server.handle_body(&mut ctx, body).await;

    let jar = match ctx.session_id.filter(|_| ctx.issued_session) {
        Some(id) => {
            let max_age = server.state().sessions.lifetime().num_seconds();
            jar.add(session_cookie(id, max_age))
        }
        None => jar,
    };

    match response {
        Some(body) => (jar, Json(body)).into_response(),
        None => (StatusCode::NO_CONTENT, jar).into_response(),
    }
}

fn session_cookie(id: String, max_age_secs: i64) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, id))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(max_age_secs))
        .build()
}

/// Serve until Ctrl-C
pub async fn serve(server: SharedServer, addr: &str) -> std::io::Result<()> {
    let app = create_router(server);
    let listener = TcpListener::bind(addr).await?;
    info!("Cabinet RPC listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
