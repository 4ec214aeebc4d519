pub mod password;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::db::database::Database;

pub const CREDENTIALS_KEY: &str = "userCredentials";

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("Lỗi hệ thống: Không tìm thấy thông tin đăng nhập.")]
    Missing,
    #[error("Lỗi hệ thống: Dữ liệu đăng nhập không hợp lệ.")]
    Corrupt,
    #[error("Tài khoản hoặc mật khẩu không chính xác.")]
    InvalidCredentials,
    #[error("Mật khẩu hiện tại không chính xác.")]
    WrongCurrentPassword,
    #[error("Mật khẩu mới không khớp.")]
    PasswordMismatch,
    #[error("Tên đăng nhập không được để trống.")]
    EmptyUsername,
    #[error("{0}")]
    WeakPassword(String),
    #[error("Lỗi hệ thống: Không thể truy cập dữ liệu đăng nhập.")]
    Storage(#[source] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub username: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredCredentials {
    username: String,
    password_hash: String,
}

/// Changes requested from the account settings. An empty `new_password`
/// keeps the current one.
#[derive(Debug, Clone, Default)]
pub struct AccountUpdate {
    pub current_password: String,
    pub new_username: Option<String>,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Clone)]
pub struct CredentialStore {
    db: Database,
    min_password_length: usize,
}

impl CredentialStore {
    pub fn new(db: Database, min_password_length: usize) -> Self {
        Self {
            db,
            min_password_length,
        }
    }

    /// Seeds the account on first run. Existing credentials, even corrupt
    /// ones, are never overwritten.
    pub async fn ensure_default_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<bool, CredentialError> {
        if self
            .db
            .get_value(CREDENTIALS_KEY)
            .await
            .map_err(CredentialError::Storage)?
            .is_some()
        {
            return Ok(false);
        }

        let stored = StoredCredentials {
            username: username.trim().to_string(),
            password_hash: hash_blocking(password.to_string()).await?,
        };
        let inserted = self
            .db
            .insert_if_absent(CREDENTIALS_KEY, &encode(&stored)?)
            .await
            .map_err(CredentialError::Storage)?;
        if inserted {
            info!(username = %stored.username, "Seeded default credentials");
        }
        Ok(inserted)
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<User, CredentialError> {
        let stored = self.load().await?;
        let matches = verify_blocking(password.to_string(), stored.password_hash.clone()).await?;
        if stored.username != username || !matches {
            warn!(username = username, "Rejected login");
            return Err(CredentialError::InvalidCredentials);
        }
        Ok(User {
            username: stored.username,
        })
    }

    pub async fn update_account(&self, update: AccountUpdate) -> Result<User, CredentialError> {
        let stored = self.load().await?;

        let matches =
            verify_blocking(update.current_password.clone(), stored.password_hash.clone()).await?;
        if !matches {
            return Err(CredentialError::WrongCurrentPassword);
        }

        if !update.new_password.is_empty() && update.new_password != update.confirm_password {
            return Err(CredentialError::PasswordMismatch);
        }

        let username = match update.new_username.as_deref() {
            Some(name) => name.trim().to_string(),
            None => stored.username.clone(),
        };
        if username.is_empty() {
            return Err(CredentialError::EmptyUsername);
        }

        let password_hash = if update.new_password.is_empty() {
            stored.password_hash
        } else {
            password::validate_password_strength(&update.new_password, self.min_password_length)
                .map_err(CredentialError::WeakPassword)?;
            hash_blocking(update.new_password).await?
        };

        let updated = StoredCredentials {
            username,
            password_hash,
        };
        self.db
            .put_value(CREDENTIALS_KEY, &encode(&updated)?)
            .await
            .map_err(CredentialError::Storage)?;
        info!(username = %updated.username, "Account updated");

        Ok(User {
            username: updated.username,
        })
    }

    async fn load(&self) -> Result<StoredCredentials, CredentialError> {
        let raw = self
            .db
            .get_value(CREDENTIALS_KEY)
            .await
            .map_err(CredentialError::Storage)?
            .ok_or(CredentialError::Missing)?;
        serde_json::from_str(&raw).map_err(|err| {
            warn!("Stored credentials are not valid JSON: {err}");
            CredentialError::Corrupt
        })
    }
}

fn encode(stored: &StoredCredentials) -> Result<String, CredentialError> {
    serde_json::to_string(stored).map_err(|err| CredentialError::Storage(err.into()))
}

// Argon2 runs on the blocking pool.
async fn hash_blocking(password: String) -> Result<String, CredentialError> {
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|err| CredentialError::Storage(err.into()))?
        .map_err(|err| CredentialError::Storage(anyhow::anyhow!("Password hashing failed: {err}")))
}

async fn verify_blocking(password: String, hash: String) -> Result<bool, CredentialError> {
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|err| CredentialError::Storage(err.into()))?
        .map_err(|err| {
            warn!("Stored password hash is unusable: {err}");
            CredentialError::Corrupt
        })
}
