//! Cabinet Core - a password-protected secret container
//!
//! This crate provides:
//! - AES-256-GCM encryption for entries at rest
//! - Argon2id key derivation from the cabinet password
//! - Atomic, backed-up writes of the cabinet file
//! - The `Cabinet` service object with an explicit open/close lifecycle

pub mod cabinet;
pub mod crypto;
pub mod error;
pub mod models;
pub mod storage;

pub use cabinet::*;
pub use error::*;
pub use models::*;
