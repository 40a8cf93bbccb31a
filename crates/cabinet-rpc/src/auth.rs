//! Token issuing and the authentication gate
//!
//! Tokens are `base64url(claims) "." base64url(HMAC-SHA256(key, claims_part))`.
//! Claims identify the user and the cabinet; they never carry the password.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{RpcError, RpcResult};
use crate::session::Session;

type HmacSha256 = Hmac<Sha256>;

/// Random salt mixed into every token so two logins never share one
const TOKEN_SALT_SIZE: usize = 16;

/// Non-secret claims carried by a token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub uid: String,
    pub vault_path: String,
    /// Issued at (unix seconds)
    pub iat: i64,
    /// Expires at (unix seconds)
    pub exp: i64,
    pub salt: String,
}

/// Mints and verifies signed session tokens
pub struct TokenIssuer {
    key: Secret<[u8; 32]>,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(key: [u8; 32], ttl: Duration) -> Self {
        Self {
            key: Secret::new(key),
            ttl,
        }
    }

    /// Issuer with a per-process random key; tokens die with the process
    pub fn random(ttl: Duration) -> Self {
        let mut key = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut key);
        Self::new(key, ttl)
    }

    /// Issuer keyed from a configured secret string
    pub fn from_secret(secret: &str, ttl: Duration) -> Self {
        let key: [u8; 32] = Sha256::digest(secret.as_bytes()).into();
        Self::new(key, ttl)
    }

    fn mac(&self) -> RpcResult<HmacSha256> {
        HmacSha256::new_from_slice(self.key.expose_secret())
            .map_err(|_| RpcError::Internal("invalid token key".to_string()))
    }

    /// Mint a token for `uid` bound to `vault_path`
    pub fn issue(&self, uid: &str, vault_path: &str) -> RpcResult<String> {
        let mut salt = [0u8; TOKEN_SALT_SIZE];
        rand::rngs::OsRng.fill_bytes(&mut salt);

        let now = Utc::now();
        let claims = TokenClaims {
            uid: uid.to_string(),
            vault_path: vault_path.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            salt: URL_SAFE_NO_PAD.encode(salt),
        };

        let payload = serde_json::to_vec(&claims)
            .map_err(|e| RpcError::Internal(e.to_string()))?;
        let claims_part = URL_SAFE_NO_PAD.encode(payload);

        let mut mac = self.mac()?;
        mac.update(claims_part.as_bytes());
        let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

        Ok(format!("{claims_part}.{signature}"))
    }

    /// Check signature and expiry, returning the claims
    pub fn verify(&self, token: &str) -> RpcResult<TokenClaims> {
        let (claims_part, signature) = token.split_once('.').ok_or(RpcError::Unauthorized)?;
        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| RpcError::Unauthorized)?;

        let mut mac = self.mac()?;
        mac.update(claims_part.as_bytes());
        mac.verify_slice(&signature)
            .map_err(|_| RpcError::Unauthorized)?;

        let payload = URL_SAFE_NO_PAD
            .decode(claims_part)
            .map_err(|_| RpcError::Unauthorized)?;
        let claims: TokenClaims =
            serde_json::from_slice(&payload).map_err(|_| RpcError::Unauthorized)?;

        if Utc::now().timestamp() >= claims.exp {
            return Err(RpcError::Unauthorized);
        }

        Ok(claims)
    }
}

/// Whether a request may proceed: the session must hold a token and the
/// presented token must equal it.
pub fn authorized(session: Option<&Session>, presented: Option<&str>) -> bool {
    match (session.and_then(|s| s.token.as_deref()), presented) {
        (Some(stored), Some(presented)) => stored.as_bytes().ct_eq(presented.as_bytes()).into(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issuer() -> TokenIssuer {
        TokenIssuer::random(Duration::hours(1))
    }

    fn session_with(token: &str) -> Session {
        Session::login(
            "alice".to_string(),
            "/vaults/alice".to_string(),
            token.to_string(),
            Duration::hours(1),
        )
    }

    #[test]
    fn test_issue_and_verify() {
        let issuer = issuer();
        let token = issuer.issue("alice", "/vaults/alice").unwrap();

        let claims = issuer.verify(&token).unwrap();
        assert_eq!(claims.uid, "alice");
        assert_eq!(claims.vault_path, "/vaults/alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_tokens_are_unique() {
        let issuer = issuer();
        assert_ne!(
            issuer.issue("alice", "/v").unwrap(),
            issuer.issue("alice", "/v").unwrap()
        );
    }

    #[test]
    fn test_claims_do_not_carry_password() {
        let issuer = issuer();
        let token = issuer.issue("alice", "/vaults/alice").unwrap();
        let (claims_part, _) = token.split_once('.').unwrap();
        let payload: serde_json::Value =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(claims_part).unwrap()).unwrap();

        assert!(payload.get("password").is_none());
    }

    #[test]
    fn test_foreign_or_tampered_token_rejected() {
        let token = issuer().issue("alice", "/v").unwrap();
        assert!(issuer().verify(&token).is_err());

        let issuer = issuer();
        let token = issuer.issue("alice", "/v").unwrap();
        let tampered = format!("x{token}");
        assert!(issuer.verify(&tampered).is_err());
        assert!(issuer.verify("not-a-token").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let issuer = TokenIssuer::random(Duration::seconds(-1));
        let token = issuer.issue("alice", "/v").unwrap();
        assert!(matches!(issuer.verify(&token), Err(RpcError::Unauthorized)));
    }

    #[test]
    fn test_from_secret_is_stable() {
        let a = TokenIssuer::from_secret("s3cret", Duration::hours(1));
        let b = TokenIssuer::from_secret("s3cret", Duration::hours(1));
        let token = a.issue("alice", "/v").unwrap();
        assert!(b.verify(&token).is_ok());
    }

    #[test]
    fn test_authorized() {
        let session = session_with("T");

        assert!(authorized(Some(&session), Some("T")));
        assert!(!authorized(Some(&session), Some("wrong")));
        assert!(!authorized(Some(&session), None));
        assert!(!authorized(None, Some("T")));

        let mut no_token = session_with("T");
        no_token.token = None;
        assert!(!authorized(Some(&no_token), Some("T")));
    }
}
