//! Shared handler state.

use std::sync::Arc;

use mojarung_core::{CompanyPipelineConfig, JobRegistry, NewsPipelineConfig};
use mojarung_dedup::{Embedder, embedder_from_config};
use mojarung_invest::{PulseClient, SandboxClient};
use mojarung_llm::ChatModel;
use mojarung_parsers::{Fetcher, SourceRegistry};
use mojarung_shared::{AppConfig, Result, User};
use mojarung_storage::Storage;

use crate::auth::TokenKeys;
use crate::error::{ApiError, ApiResult};

/// Everything a handler may need. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub storage: Arc<Storage>,
    pub llm: Arc<dyn ChatModel>,
    pub embedder: Arc<dyn Embedder>,
    pub fetcher: Fetcher,
    pub sources: Arc<SourceRegistry>,
    pub pulse: Arc<PulseClient>,
    pub tokens: Arc<TokenKeys>,
    pub jobs: JobRegistry,
    pub news_pipeline: Arc<NewsPipelineConfig>,
    pub company_pipeline: Arc<CompanyPipelineConfig>,
}

impl AppState {
    /// Build the state from config, an open database, a chat model and the
    /// JWT signing secret.
    pub fn new(
        config: AppConfig,
        storage: Storage,
        llm: Arc<dyn ChatModel>,
        secret_key: &str,
    ) -> Result<Self> {
        let embedder: Arc<dyn Embedder> = Arc::from(embedder_from_config(&config)?);
        Ok(Self {
            storage: Arc::new(storage),
            llm,
            embedder,
            fetcher: Fetcher::from_config(&config.parsers)?,
            sources: Arc::new(SourceRegistry::from_config(&config.parsers)?),
            pulse: Arc::new(PulseClient::from_config(&config.invest)?),
            tokens: Arc::new(TokenKeys::new(
                secret_key,
                config.auth.access_token_expire_minutes,
            )),
            jobs: JobRegistry::new(),
            news_pipeline: Arc::new(NewsPipelineConfig::from_config(&config)?),
            company_pipeline: Arc::new(CompanyPipelineConfig::from_config(&config)?),
            config: Arc::new(config),
        })
    }

    /// Sandbox client authorised with the user's own brokerage token.
    pub fn sandbox_for(&self, user: &User) -> ApiResult<SandboxClient> {
        let token = user
            .invest_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| {
                ApiError::bad_request("Brokerage API token is not configured for the user.")
            })?;
        Ok(SandboxClient::from_config(&self.config.invest, token)?)
    }
}
