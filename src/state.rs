//! Application state: the shared catalog, live study sessions, the paragraph
//! generator and the proxy's upstream settings.
//!
//! The catalog is loaded once here and handed to the session store and the
//! generator by `Arc`; nothing reaches for it as a global.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::catalog::VocabularyCatalog;
use crate::config::{AppConfig, SessionCfg};
use crate::paragraph::ParagraphGenerator;
use crate::session::{SessionAction, SessionError, StudyMode, StudySession};
use crate::upstream::{ChatCompletionsClient, GenerationError, TextGenerator};

/// What the proxy gateway needs to forward a request.
#[derive(Clone)]
pub struct ProxyState {
    pub client: reqwest::Client,
    pub upstream_url: String,
    pub credential: Option<String>,
}

/// A live session plus when a request last reached it.
#[derive(Clone)]
pub struct TrackedSession {
    pub session: StudySession,
    pub touched: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<VocabularyCatalog>,
    pub sessions: Arc<RwLock<HashMap<Uuid, TrackedSession>>>,
    pub paragraphs: Arc<ParagraphGenerator>,
    pub proxy: Arc<ProxyState>,
    session_ttl: Duration,
    max_sessions: usize,
}

/// Stand-in when the HTTP client cannot be built; every call fails visibly.
struct UnavailableGenerator(String);

#[async_trait]
impl TextGenerator for UnavailableGenerator {
    async fn complete(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Transport(self.0.clone()))
    }
}

impl AppState {
    /// Build state from config: load the catalog, then the generator and proxy client.
    #[instrument(level = "info", skip_all)]
    pub fn new(config: &AppConfig) -> Self {
        let catalog = Arc::new(VocabularyCatalog::from_path(&config.vocabulary.path));
        if catalog.is_empty() {
            warn!(target: "onestep", path = %config.vocabulary.path.display(), "Catalog is empty; days will show their empty state");
        }

        let generator: Arc<dyn TextGenerator> =
            match ChatCompletionsClient::new(&config.generation, config.credential.clone()) {
                Ok(client) => {
                    info!(target: "onestep", base_url = %client.base_url, model = %client.model, authenticated = client.api_key.is_some(), "Paragraph generation enabled.");
                    Arc::new(client)
                }
                Err(e) => {
                    error!(target: "onestep", error = %e, "Failed to build generation client; generation will report errors");
                    Arc::new(UnavailableGenerator(e.to_string()))
                }
            };

        Self::with_parts(catalog, generator, config)
    }

    /// Assemble state from explicit parts (synthetic catalogs and fake generators in tests).
    pub fn with_parts(
        catalog: Arc<VocabularyCatalog>,
        generator: Arc<dyn TextGenerator>,
        config: &AppConfig,
    ) -> Self {
        let paragraphs = Arc::new(ParagraphGenerator::new(
            catalog.clone(),
            generator,
            &config.generation,
        ));
        if config.credential.is_none() {
            warn!(target: "proxy", "HF_TOKEN not set; proxied requests will be sent without credentials");
        }
        let proxy = Arc::new(ProxyState {
            client: reqwest::Client::new(),
            upstream_url: config.proxy.upstream_url.clone(),
            credential: config.credential.clone(),
        });

        let SessionCfg { idle_ttl_secs, max_sessions } = &config.sessions;
        Self {
            catalog,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            paragraphs,
            proxy,
            session_ttl: Duration::from_secs(*idle_ttl_secs),
            max_sessions: (*max_sessions).max(1),
        }
    }

    /// Every entry into a day creates a fresh session; earlier results are not carried over.
    /// Idle sessions are swept first, then the least recently touched one is
    /// evicted if the store is still full.
    #[instrument(level = "info", skip(self))]
    pub async fn start_session(&self, day: u32, mode: StudyMode) -> Result<(Uuid, StudySession), SessionError> {
        let session = StudySession::start(&self.catalog, day, mode)?;
        let id = Uuid::new_v4();
        let now = Instant::now();

        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, tracked| now.saturating_duration_since(tracked.touched) < self.session_ttl);
        if sessions.len() < before {
            info!(target: "onestep", swept = before - sessions.len(), "Idle study sessions swept");
        }
        while sessions.len() >= self.max_sessions {
            let Some(oldest) = sessions.iter().min_by_key(|(_, t)| t.touched).map(|(id, _)| *id) else {
                break;
            };
            sessions.remove(&oldest);
            warn!(target: "onestep", id = %oldest, cap = self.max_sessions, "Session store full; evicted least recently used session");
        }
        sessions.insert(id, TrackedSession { session: session.clone(), touched: now });
        drop(sessions);

        info!(target: "onestep", %id, day, ?mode, words = session.word_count(), "Study session started");
        Ok((id, session))
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn get_session(&self, id: Uuid) -> Result<StudySession, SessionError> {
        let mut sessions = self.sessions.write().await;
        let tracked = sessions
            .get_mut(&id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        tracked.touched = Instant::now();
        Ok(tracked.session.clone())
    }

    #[instrument(level = "debug", skip(self, action), fields(%id, action = action.name()))]
    pub async fn apply_action(&self, id: Uuid, action: SessionAction) -> Result<StudySession, SessionError> {
        let mut sessions = self.sessions.write().await;
        let tracked = sessions
            .get_mut(&id)
            .ok_or_else(|| SessionError::NotFound(id.to_string()))?;
        tracked.touched = Instant::now();
        tracked.session.apply(action)?;
        Ok(tracked.session.clone())
    }

    /// Backing out of a session discards its state.
    #[instrument(level = "info", skip(self))]
    pub async fn end_session(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(target: "onestep", %id, "Study session ended");
        }
        removed
    }
}
