use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use trusty_agent::coordinator::AgentTaskCoordinator;
use trusty_agent::extractor::{ConstraintExtractor, LlmConstraintExtractor, UnavailableExtractor};
use trusty_agent::llm::OpenAiChatClient;
use trusty_agent::shopper::CatalogOfferSource;
use trusty_agent::verifier::PolicyVerifier;
use trusty_agent::wallet::{MockBridgeWallet, WalletService};
use trusty_core::config::{AppConfig, ConfigError, LoadOptions};
use trusty_db::repositories::{
    AgentRepository, SqlAgentRepository, SqlLifecycleStepStore, SqlTransactionRepository,
    SqlUserRepository, TransactionRepository, UserRepository,
};
use trusty_db::{connect, migrations, DbPool};

use crate::api::ApiState;
use crate::auth::AuthService;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub api_state: ApiState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("llm client initialization failed: {0}")]
    LlmClient(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let users: Arc<dyn UserRepository> = Arc::new(SqlUserRepository::new(db_pool.clone()));
    let agents: Arc<dyn AgentRepository> = Arc::new(SqlAgentRepository::new(db_pool.clone()));
    let transactions: Arc<dyn TransactionRepository> =
        Arc::new(SqlTransactionRepository::new(db_pool.clone()));
    let wallet: Arc<dyn WalletService> = Arc::new(MockBridgeWallet);

    // Without an API key every setup resolves through the fallback
    // constraint set instead of failing.
    let extractor: Arc<dyn ConstraintExtractor> = match &config.llm.api_key {
        Some(api_key) => {
            let client = OpenAiChatClient::new(
                api_key.clone(),
                config.llm.model.clone(),
                config.llm.base_url.clone(),
                config.llm.timeout_secs,
            )
            .map_err(|error| BootstrapError::LlmClient(error.to_string()))?;
            Arc::new(LlmConstraintExtractor::new(Arc::new(client)))
        }
        None => {
            info!(
                event_name = "system.bootstrap.llm_disabled",
                "no llm api key configured, constraint extraction will use the fallback set"
            );
            Arc::new(UnavailableExtractor)
        }
    };

    let coordinator = Arc::new(AgentTaskCoordinator::new(
        users.clone(),
        agents,
        transactions,
        Arc::new(SqlLifecycleStepStore::new(db_pool.clone())),
        extractor,
        Arc::new(PolicyVerifier),
        wallet.clone(),
        Arc::new(CatalogOfferSource::default()),
    ));

    let api_state = ApiState {
        coordinator,
        auth: Arc::new(AuthService::new(&config.auth)),
        users,
        wallet,
    };

    Ok(Application { config, db_pool, api_state })
}
