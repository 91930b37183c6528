//! Application state shared by all handlers: store, cache, OpenAI client,
//! prompts and auth/limit settings.
//!
//! Storage backends are chosen from the environment: PostgreSQL when a
//! database URL is configured, Redis when REDIS_URL is set, in-process
//! implementations otherwise.

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::cache::{Cache, MemoryCache, RedisCache};
use crate::config::{AppConfig, AuthSettings, Limits, Prompts};
use crate::openai::OpenAI;
use crate::store::{MemoryStore, PgStore, Store};

pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Arc<dyn Cache>,
    pub openai: Option<OpenAI>,
    pub prompts: Prompts,
    pub auth: AuthSettings,
    pub limits: Limits,
}

impl AppState {
    /// Connect backends described by `cfg` and init OpenAI from env.
    #[instrument(level = "info", skip_all)]
    pub async fn connect(cfg: &AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let store: Arc<dyn Store> = match &cfg.database_url {
            Some(url) => {
                let pg = PgStore::connect(url, cfg.db_max_connections).await?;
                pg.ensure_schema().await?;
                Arc::new(pg)
            }
            None => {
                warn!(target: "recall_backend", "No DATABASE_URL/DB_NAME; using in-memory store (data is lost on restart)");
                Arc::new(MemoryStore::new())
            }
        };

        let cache: Arc<dyn Cache> = match &cfg.redis_url {
            Some(url) => Arc::new(RedisCache::connect(url).await?),
            None => {
                warn!(target: "recall_backend", "REDIS_URL not set; using in-process cache");
                Arc::new(MemoryCache::new())
            }
        };

        // Build optional OpenAI client (if API key present).
        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "recall_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "OpenAI enabled.");
        } else {
            warn!(target: "recall_backend", "OpenAI disabled (no OPENAI_API_KEY). Generation and feedback will fail.");
        }

        Ok(Self::from_parts(store, cache, openai, cfg.prompts.clone(), cfg.auth.clone(), cfg.limits))
    }

    pub fn from_parts(
        store: Arc<dyn Store>,
        cache: Arc<dyn Cache>,
        openai: Option<OpenAI>,
        prompts: Prompts,
        auth: AuthSettings,
        limits: Limits,
    ) -> Self {
        Self { store, cache, openai, prompts, auth, limits }
    }
}
