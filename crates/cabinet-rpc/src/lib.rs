//! Cabinet RPC - authenticated JSON-RPC front end for a cabinet
//!
//! This crate provides:
//! - A static method table with argument binding and validation
//! - Token login bound to server-side sessions
//! - An auth gate in front of the gated methods
//! - The axum transport serving `/api/v1`

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod http;
pub mod registry;
pub mod server;
pub mod session;
pub mod state;

pub use auth::*;
pub use config::*;
pub use error::*;
pub use handlers::*;
pub use http::*;
pub use registry::*;
pub use server::*;
pub use session::*;
pub use state::*;
