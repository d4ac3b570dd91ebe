//! Process-wide service object: pool, document store and auth-state channel.
//! Built once at startup, handed to Rocket as managed state and closed by
//! [`BackendShutdown`].

use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use rocket::fairing::{Fairing, Info, Kind};
use rocket::{Orbit, Rocket};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::auth::AuthStateChange;
use crate::env::Config;
use crate::error::AppError;
use crate::store::{DocumentStore, SqliteStore};

const AUTH_EVENT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSettings {
    pub session_ttl: TimeDelta,
    pub reset_ttl: TimeDelta,
    pub bcrypt_cost: u32,
}

impl AuthSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            session_ttl: TimeDelta::hours(config.session_hours),
            reset_ttl: TimeDelta::minutes(config.password_reset_minutes),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            session_ttl: TimeDelta::hours(12),
            reset_ttl: TimeDelta::minutes(30),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

pub struct Backend {
    pool: SqlitePool,
    store: Arc<SqliteStore>,
    auth_events: broadcast::Sender<AuthStateChange>,
    settings: AuthSettings,
}

impl Backend {
    pub fn new(pool: SqlitePool, settings: AuthSettings) -> Self {
        let (auth_events, _) = broadcast::channel(AUTH_EVENT_CAPACITY);
        Self {
            store: Arc::new(SqliteStore::new(pool.clone())),
            pool,
            auth_events,
            settings,
        }
    }

    #[instrument(skip(config))]
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        info!("Connecting to database");
        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_secs(10))
            .connect(&config.database_url)
            .await?;

        let backend = Self::new(pool, AuthSettings::from_config(config));
        backend.migrate().await?;
        Ok(backend)
    }

    pub async fn migrate(&self) -> Result<(), AppError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn settings(&self) -> AuthSettings {
        self.settings
    }

    pub fn auth_changes(&self) -> broadcast::Receiver<AuthStateChange> {
        self.auth_events.subscribe()
    }

    pub(crate) fn announce(&self, change: AuthStateChange) {
        // No subscribers is fine.
        let _ = self.auth_events.send(change);
    }

    pub async fn close(&self) {
        info!("Closing database pool");
        self.pool.close().await;
    }
}

/// Closes the managed backend once Rocket has stopped serving.
pub struct BackendShutdown;

#[rocket::async_trait]
impl Fairing for BackendShutdown {
    fn info(&self) -> Info {
        Info {
            name: "Backend shutdown",
            kind: Kind::Shutdown,
        }
    }

    async fn on_shutdown(&self, rocket: &Rocket<Orbit>) {
        match rocket.state::<Backend>() {
            Some(backend) => backend.close().await,
            None => tracing::warn!("No backend to close on shutdown"),
        }
    }
}
