//! JSON-RPC dispatcher
//!
//! Turns request bodies into method calls: version check, lookup, the auth
//! gate for gated methods, argument binding and finally the handler.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::auth::authorized;
use crate::error::{RpcError, RpcResult};
use crate::handlers::MethodHandler;
use crate::registry::MethodRegistry;
use crate::state::AppState;

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Absent for 1.0-style requests
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonrpc: Option<String>,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    /// `None` only when the key is missing; `"id": null` is `Some(Null)`
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub id: Option<Value>,
}

fn present<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl JsonRpcRequest {
    /// A 2.0 request without an id expects no response
    pub fn is_notification(&self) -> bool {
        self.id.is_none() && self.jsonrpc.as_deref() == Some(JSONRPC_VERSION)
    }
}

/// JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Value,
}

/// JSON-RPC error
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn from_error(id: Value, err: &RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(JsonRpcError {
                code: err.code(),
                message: err.public_message(),
                data: Some(json!({ "type": err.kind() })),
            }),
            id,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|e| {
            error!("Failed to serialize response: {}", e);
            Value::Null
        })
    }
}

/// Per-request context threaded from the HTTP layer through dispatch
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    /// Session id carried by the request cookie
    pub session_id: Option<String>,
    /// Value of the `token` header
    pub presented_token: Option<String>,
    /// Set when a login bound a new session id that the client must receive
    pub issued_session: bool,
}

impl CallContext {
    pub fn new(session_id: Option<String>, presented_token: Option<String>) -> Self {
        Self {
            session_id,
            presented_token,
            issued_session: false,
        }
    }
}

/// RPC server
pub struct RpcServer {
    registry: Arc<MethodRegistry>,
    handler: MethodHandler,
    state: AppState,
}

impl RpcServer {
    pub fn new(state: AppState, registry: MethodRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            handler: MethodHandler::new(state.clone(), registry.clone()),
            registry,
            state,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn registry(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Handle a parsed body, single or batch. `None` means nothing to send back.
    pub async fn handle_body(&self, ctx: &mut CallContext, body: Value) -> Option<Value> {
        match body {
            Value::Array(calls) if calls.is_empty() => Some(
                JsonRpcResponse::from_error(
                    Value::Null,
                    &RpcError::InvalidRequest("empty batch".to_string()),
                )
                .to_value(),
            ),
            Value::Array(calls) => {
                let mut responses = Vec::with_capacity(calls.len());
                for call in calls {
                    if let Some(response) = self.handle_value(ctx, call).await {
                        responses.push(response);
                    }
                }
                if responses.is_empty() {
                    None
                } else {
                    Some(Value::Array(responses))
                }
            }
            other => self.handle_value(ctx, other).await,
        }
    }

    async fn handle_value(&self, ctx: &mut CallContext, value: Value) -> Option<Value> {
        let id = value.get("id").cloned().unwrap_or(Value::Null);

        let request: JsonRpcRequest = match serde_json::from_value(value) {
            Ok(request) => request,
            Err(e) => {
                let err = RpcError::InvalidRequest(e.to_string());
                warn!("Rejected request: {}", err);
                return Some(JsonRpcResponse::from_error(id, &err).to_value());
            }
        };

        let notification = request.is_notification();
        let response = self.handle_request(ctx, request).await;

        if notification {
            None
        } else {
            Some(response.to_value())
        }
    }

    /// Handle a single request
    pub async fn handle_request(
        &self,
        ctx: &mut CallContext,
        request: JsonRpcRequest,
    ) -> JsonRpcResponse {
        debug!("Handling request: {}", request.method);

        let id = request.id.clone().unwrap_or(Value::Null);
        let method = request.method.clone();

        match self.dispatch(ctx, request).await {
            Ok(result) => JsonRpcResponse::success(id, result),
            Err(err) => {
                match &err {
                    RpcError::Internal(_) | RpcError::VaultOpenFailure(_) => {
                        error!("{} failed: {}", method, err)
                    }
                    RpcError::Unauthorized | RpcError::InvalidCredentials => {
                        warn!("{} rejected: {}", method, err)
                    }
                    _ => debug!("{} failed: {}", method, err),
                }
                JsonRpcResponse::from_error(id, &err)
            }
        }
    }

    async fn dispatch(&self, ctx: &mut CallContext, request: JsonRpcRequest) -> RpcResult<Value> {
        if let Some(version) = request.jsonrpc.as_deref() {
            if version != JSONRPC_VERSION {
                return Err(RpcError::InvalidRequest(format!(
                    "unsupported jsonrpc version {version:?}"
                )));
            }
        }

        let method = self
            .registry
            .get(&request.method)
            .ok_or_else(|| RpcError::MethodNotFound(request.method.clone()))?;

        if method.authenticated {
            self.authenticate(ctx).await?;
        }

        let args = method.bind(request.params)?;
        self.handler.handle(method, args, ctx).await
    }

    /// The auth gate: the presented token must equal the session's token
    /// and still carry a valid signature.
    async fn authenticate(&self, ctx: &CallContext) -> RpcResult<()> {
        let session = match ctx.session_id.as_deref() {
            Some(id) => self.state.sessions.get_session(id).await,
            None => None,
        };

        let presented = ctx.presented_token.as_deref();
        if !authorized(session.as_ref(), presented) {
            return Err(RpcError::Unauthorized);
        }

        if let Some(token) = presented {
            self.state.issuer.verify(token)?;
        }
        Ok(())
    }
}
