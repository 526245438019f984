//! Accounts and access tokens.
//!
//! The chat core only ever sees an already-authenticated user id; this
//! module is the thin boundary producing it. Passwords are hashed with
//! Argon2, and access tokens are HMAC-SHA256 signed `user_id:expiry`
//! payloads: self-contained, so verification needs no database read.

use anyhow::{anyhow, bail, Result};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use rand_core::OsRng;
use sha2::Sha256;
use sqlx::{Row, SqlitePool};

use crate::config::AuthConfig;
use crate::models::UserInfo;

type HmacSha256 = Hmac<Sha256>;

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok()
}

/// Issue a bearer token for `user_id`, valid for the configured TTL.
///
/// Format: `base64url(user_id:expiry_unix) . hex(hmac_sha256(payload))`.
pub fn issue_token(cfg: &AuthConfig, user_id: i64) -> Result<String> {
    let expiry = (Utc::now() + Duration::minutes(cfg.token_ttl_minutes)).timestamp();
    let payload = format!("{}:{}", user_id, expiry);

    let mut mac = HmacSha256::new_from_slice(cfg.secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC secret: {}", e))?;
    mac.update(payload.as_bytes());
    let signature = hex::encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", URL_SAFE_NO_PAD.encode(payload), signature))
}

/// Verify a token's signature and expiry, returning the embedded user id.
pub fn verify_token(cfg: &AuthConfig, token: &str) -> Result<i64> {
    let (encoded, signature_hex) = token
        .split_once('.')
        .ok_or_else(|| anyhow!("Malformed token"))?;

    let payload = URL_SAFE_NO_PAD
        .decode(encoded)
        .map_err(|_| anyhow!("Malformed token payload"))?;

    let mut mac = HmacSha256::new_from_slice(cfg.secret.as_bytes())
        .map_err(|e| anyhow!("Invalid HMAC secret: {}", e))?;
    mac.update(&payload);
    let signature = hex::decode(signature_hex).map_err(|_| anyhow!("Malformed token signature"))?;
    // Constant-time comparison via the Mac verifier.
    mac.verify_slice(&signature)
        .map_err(|_| anyhow!("Invalid token signature"))?;

    let payload = String::from_utf8(payload).map_err(|_| anyhow!("Malformed token payload"))?;
    let (user_id, expiry) = payload
        .split_once(':')
        .ok_or_else(|| anyhow!("Malformed token payload"))?;
    let user_id: i64 = user_id.parse().map_err(|_| anyhow!("Malformed user id"))?;
    let expiry: i64 = expiry.parse().map_err(|_| anyhow!("Malformed expiry"))?;

    if Utc::now().timestamp() >= expiry {
        bail!("Token expired");
    }

    Ok(user_id)
}

/// User account queries over the shared SQLite pool.
#[derive(Clone)]
pub struct UserStore {
    pool: SqlitePool,
}

impl UserStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Register a new account. Fails if the username is already taken.
    pub async fn create_user(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserInfo> {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        if existing.is_some() {
            bail!("Username already registered");
        }

        let password_hash = hash_password(password)?;
        let result =
            sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)")
                .bind(username)
                .bind(email)
                .bind(&password_hash)
                .execute(&self.pool)
                .await?;

        Ok(UserInfo {
            id: result.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
        })
    }

    /// Check credentials; returns the user id on success, `None` on unknown
    /// user or wrong password.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id, password_hash FROM users WHERE username = ?")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let hash: String = row.get("password_hash");
        if verify_password(password, &hash) {
            Ok(Some(row.get("id")))
        } else {
            Ok(None)
        }
    }
}
