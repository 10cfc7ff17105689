use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;

use trendline_core::analysis::NarrativeGenerator;
use trendline_core::analytics::AnalyticsSource;
use trendline_core::config::Config;
use trendline_core::report::{ReportStore, ReportSummary};
use trendline_duckdb::DuckDbBackend;

use crate::google::analytics::GaClient;
use crate::narrative::OpenAiNarrator;

/// Shared application state injected into every Axum handler via
/// [`axum::extract::State`].
///
/// Collaborators sit behind trait objects so tests can swap in fakes with
/// [`AppState::with_analytics`] and [`AppState::with_narrator`].
pub struct AppState {
    pub store: Arc<dyn ReportStore>,

    pub analytics: Arc<dyn AnalyticsSource>,

    /// `None` when no language-model key is configured.
    pub narrator: Option<Arc<dyn NarrativeGenerator>>,

    /// Parsed configuration, loaded once at startup from environment variables.
    pub config: Arc<Config>,

    /// Outbound HTTP client shared by the OAuth routes and the collaborators.
    pub http: reqwest::Client,

    /// Report listings keyed by page limit. Cleared on every write.
    listing_cache: Arc<RwLock<HashMap<usize, Vec<ReportSummary>>>>,
}

impl AppState {
    /// Wire the production collaborators around `db`.
    pub fn new(db: DuckDbBackend, config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()?;
        let analytics = Arc::new(GaClient::new(config.google.clone(), http.clone()));
        let narrator = OpenAiNarrator::try_new(&config.openai, http.clone()).map(|n| {
            info!(model = n.model(), "Narratives enabled");
            Arc::new(n) as Arc<dyn NarrativeGenerator>
        });

        Ok(Self {
            store: Arc::new(db),
            analytics,
            narrator,
            config: Arc::new(config),
            http,
            listing_cache: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn with_store(mut self, store: Arc<dyn ReportStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSource>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_narrator(mut self, narrator: Option<Arc<dyn NarrativeGenerator>>) -> Self {
        self.narrator = narrator;
        self
    }

    pub fn narrator(&self) -> Option<&dyn NarrativeGenerator> {
        self.narrator.as_deref()
    }

    pub async fn cached_listing(&self, limit: usize) -> Option<Vec<ReportSummary>> {
        self.listing_cache.read().await.get(&limit).cloned()
    }

    pub async fn put_listing(&self, limit: usize, reports: Vec<ReportSummary>) {
        self.listing_cache.write().await.insert(limit, reports);
    }

    pub async fn invalidate_listing(&self) {
        self.listing_cache.write().await.clear();
    }
}
