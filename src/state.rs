use std::sync::Arc;

use sqlx::PgPool;
use tracing::warn;

use crate::auth::repo::{AccountStore, PgAccountStore};
use crate::config::AppConfig;
use crate::db;
use crate::memory::{MemoryAccountStore, MemorySnapshotStore};
use crate::snapshots::repo::{PgSnapshotStore, SnapshotStore};

#[derive(Clone)]
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub snapshots: Arc<dyn SnapshotStore>,
}

impl AppState {
    pub async fn init(config: &AppConfig) -> anyhow::Result<Self> {
        match &config.database {
            Some(database) => {
                let pool = db::connect(database).await?;
                db::run_migrations(&pool).await;
                Ok(Self::postgres(pool))
            }
            None => {
                warn!("DATABASE_URL not set; data is kept in memory and lost on restart");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            accounts: Arc::new(PgAccountStore::new(pool.clone())),
            snapshots: Arc::new(PgSnapshotStore::new(pool)),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(MemoryAccountStore::default()),
            snapshots: Arc::new(MemorySnapshotStore::default()),
        }
    }
}
