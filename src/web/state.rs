use std::sync::Arc;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    accounts::{AccountStore, InMemoryAccountStore, PgAccountStore, ensure_seed_user},
    audit::{AuditSink, FileAuditSink, TracingAuditSink},
    config::AppConfig,
    history::{HistoryStore, InMemoryHistoryStore, PgHistoryStore},
    llm::LlmClient,
    modules::summarizer::{Extractor, HistoryPolicy, SummarizationService},
    web::auth::TokenIssuer,
};

#[derive(Clone)]
pub struct AppState {
    config: Arc<AppConfig>,
    service: SummarizationService,
    history: Arc<dyn HistoryStore>,
    accounts: Arc<dyn AccountStore>,
    tokens: TokenIssuer,
}

impl AppState {
    pub async fn from_config(config: AppConfig) -> Result<Self> {
        let (history, accounts): (Arc<dyn HistoryStore>, Arc<dyn AccountStore>) =
            match config.database_url.as_deref() {
                Some(database_url) => {
                    let pool = PgPoolOptions::new()
                        .max_connections(10)
                        .connect(database_url)
                        .await
                        .context("failed to connect to Postgres")?;

                    sqlx::migrate!("./migrations")
                        .run(&pool)
                        .await
                        .context("failed to run database migrations")?;

                    info!("using Postgres for history and accounts");
                    (
                        Arc::new(PgHistoryStore::new(pool.clone())),
                        Arc::new(PgAccountStore::new(pool)),
                    )
                }
                None => {
                    info!("DATABASE_URL not set; history and accounts are kept in memory");
                    (
                        Arc::new(InMemoryHistoryStore::new()),
                        Arc::new(InMemoryAccountStore::new()),
                    )
                }
            };

        let audit: Arc<dyn AuditSink> = match config.audit_log_path.as_deref() {
            Some(path) => Arc::new(
                FileAuditSink::open(path)
                    .await
                    .context("failed to open audit log")?,
            ),
            None => Arc::new(TracingAuditSink),
        };

        let llm = LlmClient::new(config.provider.clone()).context("failed to initialize LLM client")?;
        let extractor = Extractor::new(&config.limits, &config.fetch)?;
        let service = SummarizationService::new(
            extractor,
            Arc::new(llm),
            history.clone(),
            audit,
            HistoryPolicy {
                record_failed_single: config.record_failed_single,
            },
            config.limits.max_batch_files,
        );

        ensure_seed_user(accounts.as_ref(), &config.auth)
            .await
            .context("failed to seed default user")?;

        Ok(Self::from_parts(config, service, history, accounts))
    }

    pub fn from_parts(
        config: AppConfig,
        service: SummarizationService,
        history: Arc<dyn HistoryStore>,
        accounts: Arc<dyn AccountStore>,
    ) -> Self {
        let tokens = TokenIssuer::new(&config.auth);
        Self {
            config: Arc::new(config),
            service,
            history,
            accounts,
            tokens,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> &SummarizationService {
        &self.service
    }

    pub fn history(&self) -> &dyn HistoryStore {
        self.history.as_ref()
    }

    pub fn accounts(&self) -> &dyn AccountStore {
        self.accounts.as_ref()
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }
}
