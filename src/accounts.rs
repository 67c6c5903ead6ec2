use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use async_trait::async_trait;
use rand_core::OsRng;
use sqlx::PgPool;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::AuthSettings;

#[derive(Clone, Debug, sqlx::FromRow)]
pub struct Account {
    pub username: String,
    pub password_hash: String,
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>>;

    /// Inserts the account unless the username is already taken. Returns whether a row was added.
    async fn insert(&self, username: &str, password_hash: &str) -> Result<bool>;
}

#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: RwLock<HashMap<String, Account>>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        Ok(self.accounts.read().await.get(username).cloned())
    }

    async fn insert(&self, username: &str, password_hash: &str) -> Result<bool> {
        let mut guard = self.accounts.write().await;
        if guard.contains_key(username) {
            return Ok(false);
        }
        guard.insert(
            username.to_string(),
            Account {
                username: username.to_string(),
                password_hash: password_hash.to_string(),
            },
        );
        Ok(true)
    }
}

#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<Account>> {
        sqlx::query_as::<_, Account>(
            "SELECT username, password_hash FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .context("failed to fetch user by username")
    }

    async fn insert(&self, username: &str, password_hash: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO users (id, username, password_hash) VALUES ($1, $2, $3)
             ON CONFLICT (username) DO NOTHING",
        )
        .bind(Uuid::new_v4())
        .bind(username)
        .bind(password_hash)
        .execute(&self.pool)
        .await
        .context("failed to insert user")?;

        Ok(result.rows_affected() == 1)
    }
}

pub fn hash_password(password: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(_) => false,
    }
}

/// Look up `username` and check `password`. Returns the account only on a match.
pub async fn authenticate(
    store: &dyn AccountStore,
    username: &str,
    password: &str,
) -> Result<Option<Account>> {
    let Some(account) = store.find_by_username(username.trim()).await? else {
        return Ok(None);
    };

    let password = password.to_string();
    let hash = account.password_hash.clone();
    let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
        .await
        .context("password verification task failed")?;

    Ok(matches.then_some(account))
}

pub async fn ensure_seed_user(store: &dyn AccountStore, settings: &AuthSettings) -> Result<()> {
    if store
        .find_by_username(&settings.seed_username)
        .await?
        .is_some()
    {
        return Ok(());
    }

    let password_hash = hash_password(&settings.seed_password)
        .map_err(|err| anyhow!("failed to hash seed user password: {err}"))?;

    if store.insert(&settings.seed_username, &password_hash).await? {
        info!(username = %settings.seed_username, "seeded default user account");
        if settings.seed_password == "change-me" {
            warn!("seed user is using the default password; set SEED_PASSWORD");
        }
    }

    Ok(())
}
