//! Method handlers
//!
//! Executes a bound call against the cabinet and the session store.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use zeroize::Zeroizing;

use cabinet_core::crypto::DerivedKeys;

use crate::error::{RpcError, RpcResult};
use crate::registry::{MethodDefinition, MethodId, MethodRegistry};
use crate::server::CallContext;
use crate::session::Session;
use crate::state::AppState;

/// Bound call arguments
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MethodArgs {
    #[serde(flatten)]
    pub args: HashMap<String, Value>,
}

impl MethodArgs {
    /// Get a string argument
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.args.get(key).and_then(|v| v.as_str()).map(String::from)
    }

    /// Get a required string argument
    pub fn require_string(&self, key: &str) -> RpcResult<String> {
        self.get_string(key).ok_or_else(|| {
            RpcError::ValidationFailure(format!("param `{}` must be a string", key))
        })
    }

    /// Get an object argument
    pub fn get_object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.args.get(key).and_then(|v| v.as_object())
    }

    /// Get a required object argument
    pub fn require_object(&self, key: &str) -> RpcResult<Map<String, Value>> {
        self.get_object(key).cloned().ok_or_else(|| {
            RpcError::ValidationFailure(format!("param `{}` must be an object", key))
        })
    }
}

/// Method handler
pub struct MethodHandler {
    state: AppState,
    registry: Arc<MethodRegistry>,
}

impl MethodHandler {
    pub fn new(state: AppState, registry: Arc<MethodRegistry>) -> Self {
        Self { state, registry }
    }

    /// Run `method` with already bound arguments
    pub async fn handle(
        &self,
        method: &MethodDefinition,
        args: MethodArgs,
        ctx: &mut CallContext,
    ) -> RpcResult<Value> {
        match method.id {
            MethodId::Login => self.handle_login(args, ctx).await,
            MethodId::GetAll => self.handle_get_all().await,
            MethodId::Get => self.handle_get(args).await,
            MethodId::Add => self.handle_add(args).await,
            MethodId::Test => Ok(json!("hello world!")),
            MethodId::Echo => {
                let name = args.require_string("name")?;
                Ok(json!(format!("Hello {}", name)))
            }
            MethodId::Describe => Ok(self.registry.describe()),
        }
    }

    /// Check credentials, mint a token and bind it to the caller's session
    async fn handle_login(&self, args: MethodArgs, ctx: &mut CallContext) -> RpcResult<Value> {
        let username = args.require_string("username")?;
        let password = Zeroizing::new(args.require_string("password")?.into_bytes());
        let vault_path = args.require_string("vault_path")?;

        let (salt, config) = self.state.cabinet.read().await.key_params()?;
        let candidate = DerivedKeys::derive_blocking(password, salt, config).await?;

        let checked = self
            .state
            .cabinet
            .read()
            .await
            .check_credentials(&username, &candidate, &vault_path);
        if let Err(e) = checked {
            warn!("Login failed for {}", username);
            return Err(e.into());
        }

        let token = self.state.issuer.issue(&username, &vault_path)?;
        let session = Session::login(
            username.clone(),
            vault_path,
            token.clone(),
            self.state.sessions.lifetime(),
        );

        let session_id = self
            .state
            .sessions
            .establish(ctx.session_id.as_deref(), session)
            .await;
        ctx.session_id = Some(session_id);
        ctx.issued_session = true;

        info!("Login succeeded for {}", username);
        Ok(json!(token))
    }

    async fn handle_get_all(&self) -> RpcResult<Value> {
        let cabinet = self.state.cabinet.read().await;
        let items = cabinet.get_all()?;
        Ok(Value::Array(items.into_iter().map(Value::Object).collect()))
    }

    async fn handle_get(&self, args: MethodArgs) -> RpcResult<Value> {
        let name = args.require_string("name")?;
        let cabinet = self.state.cabinet.read().await;
        Ok(Value::Object(cabinet.get(&name)?))
    }

    async fn handle_add(&self, args: MethodArgs) -> RpcResult<Value> {
        let item = args.require_object("item")?;
        let mut cabinet = self.state.cabinet.write().await;
        let added = cabinet.add(item).await?;
        info!("Added entry {}", added.name);
        serde_json::to_value(added).map_err(|e| RpcError::Internal(e.to_string()))
    }
}
