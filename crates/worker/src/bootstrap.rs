//! Store selection and account seeding.
//!
//! With `DATABASE_URL` set, the PostgreSQL stores are used and migrations
//! are applied on startup. Otherwise everything lives in memory and the
//! caller's account is seeded from `RELAY_*` variables.
//!
//! | Variable              | Default | Notes                                  |
//! |-----------------------|---------|----------------------------------------|
//! | `DATABASE_URL`        | unset   | in-memory stores when unset            |
//! | `RELAY_API_KEY`       | none    | credential the seeded account uses     |
//! | `RELAY_LABEL`         | key     | display label                          |
//! | `RELAY_SERVER_ID`     | none    | guild the bot runs in                  |
//! | `RELAY_CHANNEL_ID`    | none    | channel generations are posted to      |
//! | `RELAY_SALAI_TOKEN`   | none    | user token for the backend             |
//! | `RELAY_MONTHLY_LIMIT` | `100`   | negative for unlimited                 |
//! | `RELAY_ADMIN`         | `false` | privileged account                     |

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use relay_core::account::{Account, AccountRole};
use relay_core::config::{env_opt, env_or, ConfigError};
use relay_core::store::{AccountStore, RecordStore};
use relay_db::models::account::UpsertAccount;
use relay_db::repositories::AccountRepo;
use relay_db::{MemoryStore, PgStore};

const DEFAULT_MONTHLY_LIMIT: i32 = 100;

/// Account described by `RELAY_*` variables.
#[derive(Debug, Clone)]
pub struct AccountSeed {
    pub api_key: String,
    pub label: String,
    pub server_id: String,
    pub channel_id: String,
    pub token: String,
    pub monthly_limit: i32,
    pub admin: bool,
}

impl AccountSeed {
    /// Read the seed, or `None` when the key or backend coordinates are
    /// missing.
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        let (Some(api_key), Some(server_id), Some(channel_id), Some(token)) = (
            env_opt("RELAY_API_KEY"),
            env_opt("RELAY_SERVER_ID"),
            env_opt("RELAY_CHANNEL_ID"),
            env_opt("RELAY_SALAI_TOKEN"),
        ) else {
            return Ok(None);
        };
        Ok(Some(Self {
            label: env_opt("RELAY_LABEL").unwrap_or_else(|| api_key.clone()),
            api_key,
            server_id,
            channel_id,
            token,
            monthly_limit: env_or("RELAY_MONTHLY_LIMIT", DEFAULT_MONTHLY_LIMIT)?,
            admin: env_or("RELAY_ADMIN", false)?,
        }))
    }

    pub fn into_account(self) -> Account {
        Account {
            credential: self.api_key,
            label: self.label,
            server_id: self.server_id,
            channel_id: self.channel_id,
            token: self.token,
            monthly_limit: self.monthly_limit,
            usage_count: 0,
            role: if self.admin { AccountRole::Admin } else { AccountRole::User },
            blocked: false,
            usage_reset_at: Utc::now(),
        }
    }

    fn into_upsert(self) -> UpsertAccount {
        UpsertAccount {
            api_key: self.api_key,
            label: self.label,
            server_id: self.server_id,
            channel_id: self.channel_id,
            salai_token: self.token,
            monthly_limit: self.monthly_limit,
            is_admin: self.admin,
        }
    }
}

/// The two store seams, backed by the same implementation.
pub struct Stores {
    pub accounts: Arc<dyn AccountStore>,
    pub records: Arc<dyn RecordStore>,
}

/// Open the configured stores and seed the account, if described.
pub async fn open_stores(
    database_url: Option<&str>,
    seed: Option<AccountSeed>,
) -> anyhow::Result<Stores> {
    let Some(database_url) = database_url else {
        let store = Arc::new(MemoryStore::new());
        match seed {
            Some(seed) => {
                tracing::info!(label = %seed.label, "Seeding in-memory account");
                store.insert_account(seed.into_account()).await;
            }
            None => {
                tracing::warn!("No RELAY_* account configured; every credential will be rejected")
            }
        }
        return Ok(Stores {
            accounts: store.clone(),
            records: store,
        });
    };

    let pool = relay_db::create_pool(database_url)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    relay_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    relay_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    if let Some(seed) = seed {
        let row = AccountRepo::upsert(&pool, &seed.into_upsert())
            .await
            .context("Failed to upsert account")?;
        tracing::info!(label = %row.label, "Account upserted");
    }

    let store = Arc::new(PgStore::new(pool));
    Ok(Stores {
        accounts: store.clone(),
        records: store,
    })
}
