//! Profile store: durable mapping from user id to profile record
//!
//! The core only needs load/save; registration, authentication and
//! credential updates are built on top. Backend is in-memory by default
//! and Postgres when POSTGRES_URL/DATABASE_URL is set.

use crate::error::AuthError;
use crate::models::UserProfile;
use crate::Result;
use chrono::Utc;
use sha2::{Digest, Sha256};
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

const MIN_CREDENTIAL_LEN: usize = 8;

/// Trait for profile persistence. The on-disk format is an external
/// concern; the core requires only these two operations.
#[async_trait::async_trait]
pub trait ProfileStore: Send + Sync {
    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>>;
    async fn save(&self, profile: UserProfile) -> Result<()>;
}

/// Salted SHA-256 credential hash. A configurable default, not a
/// hardened scheme; hardened credential storage is explicitly deferred.
pub fn hash_credential(user_id: &str, credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(user_id.as_bytes());
    hasher.update(b":");
    hasher.update(credential.as_bytes());
    hex::encode(hasher.finalize())
}

/// Score a password 0-5: length, uppercase, lowercase, digit, symbol.
pub fn password_strength(password: &str) -> u8 {
    let mut strength = 0u8;
    if password.len() >= MIN_CREDENTIAL_LEN {
        strength += 1;
    }
    if password.chars().any(|c| c.is_uppercase()) {
        strength += 1;
    }
    if password.chars().any(|c| c.is_lowercase()) {
        strength += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        strength += 1;
    }
    if password.chars().any(|c| "!@#$%^&*()_+-=[]{}|;:,.<>?".contains(c)) {
        strength += 1;
    }
    strength
}

/// In-memory profile store for development and tests
pub struct InMemoryProfileStore {
    profiles: Arc<RwLock<HashMap<String, UserProfile>>>,
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            profiles: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Store seeded with the demo account.
    pub fn with_demo_user() -> Self {
        let user_id = "demo@assistant.local".to_string();
        let profile = UserProfile {
            credential_hash: hash_credential(&user_id, "Demo@12345"),
            user_id,
            display_name: "Demo User".to_string(),
            created_at: Utc::now(),
        };

        let mut profiles = HashMap::new();
        profiles.insert(profile.user_id.clone(), profile);
        Self {
            profiles: Arc::new(RwLock::new(profiles)),
        }
    }
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let profiles = self.profiles.read().await;
        Ok(profiles.get(user_id).cloned())
    }

    async fn save(&self, profile: UserProfile) -> Result<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.user_id.clone(), profile);
        Ok(())
    }
}

/// Postgres-backed profile store. Schema is bootstrapped lazily on
/// first use so a fresh database works without migration tooling.
pub struct PostgresProfileStore {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PostgresProfileStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS user_profiles (
                      user_id TEXT PRIMARY KEY,
                      display_name TEXT NOT NULL,
                      credential_hash TEXT NOT NULL,
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| {
                crate::error::AssistantError::Profile(format!(
                    "failed to initialize profile schema: {}",
                    e
                ))
            })?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl ProfileStore for PostgresProfileStore {
    async fn load(&self, user_id: &str) -> Result<Option<UserProfile>> {
        self.ensure_schema().await?;

        let row = sqlx::query(
            "SELECT user_id, display_name, credential_hash, created_at \
             FROM user_profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            crate::error::AssistantError::Profile(format!("failed to load profile: {}", e))
        })?;

        Ok(row.map(|row| UserProfile {
            user_id: row.try_get("user_id").unwrap_or_default(),
            display_name: row.try_get("display_name").unwrap_or_default(),
            credential_hash: row.try_get("credential_hash").unwrap_or_default(),
            created_at: row.try_get("created_at").unwrap_or_else(|_| Utc::now()),
        }))
    }

    async fn save(&self, profile: UserProfile) -> Result<()> {
        self.ensure_schema().await?;

        sqlx::query(
            r#"
            INSERT INTO user_profiles (user_id, display_name, credential_hash, created_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (user_id) DO UPDATE
              SET display_name = EXCLUDED.display_name,
                  credential_hash = EXCLUDED.credential_hash
            "#,
        )
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(&profile.credential_hash)
        .bind(profile.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            crate::error::AssistantError::Profile(format!("failed to save profile: {}", e))
        })?;

        Ok(())
    }
}

/// Pick the profile backend from the environment, falling back to
/// in-memory when no database is configured or the pool cannot be built.
pub fn profile_store_from_env() -> Arc<dyn ProfileStore> {
    let database_url = env::var("POSTGRES_URL")
        .or_else(|_| env::var("DATABASE_URL"))
        .ok();

    if let Some(url) = database_url {
        match sqlx::postgres::PgPoolOptions::new()
            .max_connections(5)
            .connect_lazy(&url)
        {
            Ok(pool) => {
                info!("profile store backend: postgres");
                return Arc::new(PostgresProfileStore::new(pool));
            }
            Err(error) => {
                warn!(
                    "failed to initialize postgres profile store, falling back to in-memory: {}",
                    error
                );
            }
        }
    }

    info!("profile store backend: in-memory");
    Arc::new(InMemoryProfileStore::with_demo_user())
}

/// Registration, authentication and credential update over any backend.
#[derive(Clone)]
pub struct ProfileService {
    store: Arc<dyn ProfileStore>,
}

impl ProfileService {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Create a profile. Rejects blank fields, short credentials and
    /// already-registered user ids.
    pub async fn register(
        &self,
        user_id: &str,
        display_name: &str,
        credential: &str,
    ) -> Result<UserProfile> {
        if user_id.trim().is_empty() || display_name.trim().is_empty() {
            return Err(crate::error::AssistantError::Profile(
                "user id and display name are required".to_string(),
            ));
        }
        if credential.len() < MIN_CREDENTIAL_LEN {
            return Err(crate::error::AssistantError::Profile(format!(
                "credential must be at least {} characters",
                MIN_CREDENTIAL_LEN
            )));
        }
        if self.store.load(user_id).await?.is_some() {
            return Err(crate::error::AssistantError::Profile(format!(
                "user already registered: {}",
                user_id
            )));
        }

        let profile = UserProfile {
            user_id: user_id.to_string(),
            display_name: display_name.to_string(),
            credential_hash: hash_credential(user_id, credential),
            created_at: Utc::now(),
        };
        self.store.save(profile.clone()).await?;

        info!(user_id = %profile.user_id, "profile registered");
        Ok(profile)
    }

    /// Check a credential against the stored hash. Failed attempts
    /// mutate nothing.
    pub async fn verify(
        &self,
        user_id: &str,
        credential: &str,
    ) -> Result<std::result::Result<UserProfile, AuthError>> {
        let Some(profile) = self.store.load(user_id).await? else {
            return Ok(Err(AuthError::UnknownUser(user_id.to_string())));
        };

        if profile.credential_hash == hash_credential(user_id, credential) {
            Ok(Ok(profile))
        } else {
            Ok(Err(AuthError::InvalidCredential))
        }
    }

    /// Replace a user's credential. The only mutation a profile sees
    /// after registration.
    pub async fn update_credential(&self, user_id: &str, new_credential: &str) -> Result<()> {
        if new_credential.len() < MIN_CREDENTIAL_LEN {
            return Err(crate::error::AssistantError::Profile(format!(
                "credential must be at least {} characters",
                MIN_CREDENTIAL_LEN
            )));
        }

        let Some(mut profile) = self.store.load(user_id).await? else {
            return Err(AuthError::UnknownUser(user_id.to_string()).into());
        };

        profile.credential_hash = hash_credential(user_id, new_credential);
        self.store.save(profile).await
    }
}
