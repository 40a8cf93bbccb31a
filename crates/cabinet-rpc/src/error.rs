//! RPC error taxonomy and its JSON-RPC error codes

use cabinet_core::CabinetError;
use thiserror::Error;
use tracing::error;

/// Error codes
pub mod error_codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const UNAUTHORIZED: i32 = -32000;
    pub const ENTRY_NOT_FOUND: i32 = -32001;
    pub const INVALID_CREDENTIALS: i32 = -32002;
    pub const VAULT_OPEN_FAILURE: i32 = -32003;
    pub const DUPLICATE_ENTRY: i32 = -32004;
}

/// Errors surfaced to RPC callers
#[derive(Error, Debug)]
pub enum RpcError {
    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid params: {0}")]
    ValidationFailure(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Entry not found: {0}")]
    EntryNotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Vault unavailable: {0}")]
    VaultOpenFailure(String),

    #[error("Entry already exists: {0}")]
    DuplicateEntry(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RpcError {
    /// JSON-RPC error code for this kind
    pub fn code(&self) -> i32 {
        match self {
            RpcError::ParseError(_) => error_codes::PARSE_ERROR,
            RpcError::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            RpcError::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            RpcError::ValidationFailure(_) => error_codes::INVALID_PARAMS,
            RpcError::Unauthorized => error_codes::UNAUTHORIZED,
            RpcError::EntryNotFound(_) => error_codes::ENTRY_NOT_FOUND,
            RpcError::InvalidCredentials => error_codes::INVALID_CREDENTIALS,
            RpcError::VaultOpenFailure(_) => error_codes::VAULT_OPEN_FAILURE,
            RpcError::DuplicateEntry(_) => error_codes::DUPLICATE_ENTRY,
            RpcError::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    /// Stable name of the kind, sent as `error.data.type`
    pub fn kind(&self) -> &'static str {
        match self {
            RpcError::ParseError(_) => "ParseError",
            RpcError::InvalidRequest(_) => "InvalidRequest",
            RpcError::MethodNotFound(_) => "MethodNotFound",
            RpcError::ValidationFailure(_) => "ValidationFailure",
            RpcError::Unauthorized => "Unauthorized",
            RpcError::EntryNotFound(_) => "EntryNotFound",
            RpcError::InvalidCredentials => "InvalidCredentials",
            RpcError::VaultOpenFailure(_) => "VaultOpenFailure",
            RpcError::DuplicateEntry(_) => "DuplicateEntry",
            RpcError::Internal(_) => "InternalError",
        }
    }

    /// Message safe to show to the caller
    pub fn public_message(&self) -> String {
        match self {
            RpcError::VaultOpenFailure(_) => "Vault unavailable".to_string(),
            RpcError::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<CabinetError> for RpcError {
    fn from(err: CabinetError) -> Self {
        match err {
            CabinetError::InvalidCredentials => RpcError::InvalidCredentials,
            CabinetError::EntryNotFound(name) => RpcError::EntryNotFound(name),
            CabinetError::DuplicateEntry(name) => RpcError::DuplicateEntry(name),
            CabinetError::InvalidEntry(reason) => RpcError::ValidationFailure(reason),
            CabinetError::VaultOpenFailure(reason) => RpcError::VaultOpenFailure(reason),
            other => {
                error!("Cabinet error: {}", other);
                RpcError::Internal(other.to_string())
            }
        }
    }
}

pub type RpcResult<T> = Result<T, RpcError>;
