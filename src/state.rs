//! Application state: the dare store, the challenge generator, and the
//! preview slot holding the outcome of the last generation request.
//!
//! This module owns:
//!   - the dare store (behind an async mutex: one mutation in flight at a time)
//!   - the optional generator (absent when no provider key is configured)
//!   - the generation slot and its ticket counter
//!   - the category catalogue (from TOML or defaults)
//!
//! Generation requests are ticketed. A newer request or a reset supersedes
//! older tickets, and a superseded result is dropped instead of being applied.

use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{error, info, instrument, warn};

use crate::config::AppConfig;
use crate::domain::{Category, Challenge, Collection, Dare, DareId, Difficulty};
use crate::error::{CommandError, GenerationError, StoreError, TransportError};
use crate::generator::ChallengeGenerator;
use crate::openai::OpenAI;
use crate::store::{DareStore, FileKvStore, KeyValueStore, LoadReport, MemoryKvStore};

/// Outcome of the last generation request, as shown to the user.
#[derive(Clone, Debug, PartialEq)]
pub enum GenerationOutcome {
    Idle,
    Pending { ticket: u64, category: String, difficulty: Difficulty },
    Success { ticket: u64, challenge: Challenge },
    Failure { ticket: u64, error: GenerationError },
}

/// Result of `request_generation`: the outcome for this ticket, and whether it
/// was applied to the slot (false when a newer request or a reset superseded it).
#[derive(Clone, Debug)]
pub struct GenerationReport {
    pub ticket: u64,
    pub applied: bool,
    pub result: Result<Challenge, GenerationError>,
}

struct GenerationSlot {
    next_ticket: u64,
    outcome: GenerationOutcome,
}

impl GenerationSlot {
    fn current_ticket(&self) -> Option<u64> {
        match &self.outcome {
            GenerationOutcome::Pending { ticket, .. } => Some(*ticket),
            _ => None,
        }
    }
}

/// Read-only snapshot of everything the presentation layer renders.
#[derive(Clone, Debug)]
pub struct ViewSnapshot {
    pub ongoing: Vec<Dare>,
    pub completed: Vec<Dare>,
    pub generation: GenerationOutcome,
}

pub struct AppState {
    pub config: AppConfig,
    pub generator: Option<ChallengeGenerator>,
    pub openai: Option<OpenAI>,
    store: Mutex<DareStore>,
    slot: RwLock<GenerationSlot>,
}

impl AppState {
    /// Build state from env: load config, open the store medium, init the provider client.
    /// The store is NOT loaded yet; call `load_store` before serving.
    #[instrument(level = "info", skip_all)]
    pub fn from_env() -> Self {
        let config = AppConfig::from_env();

        let kv: Arc<dyn KeyValueStore> = if config.storage.ephemeral {
            info!(target: "dare_yourself", "Ephemeral storage: dares are kept in memory only.");
            Arc::new(MemoryKvStore::default())
        } else {
            let fs = FileKvStore::new(config.storage.data_dir.clone());
            info!(target: "dare_yourself", data_dir = %fs.dir().display(), "File storage enabled.");
            Arc::new(fs)
        };

        let openai = OpenAI::from_env(config.generation.temperature, config.generation.timeout());
        let generator = match &openai {
            Some(oa) => {
                info!(target: "dare_yourself", base_url = %oa.base_url, model = %oa.model, timeout = ?oa.timeout, "Model provider enabled.");
                Some(ChallengeGenerator::new(Arc::new(oa.clone()), config.prompts.clone(), &config.generation))
            }
            None => {
                warn!(target: "dare_yourself", "No OPENAI_API_KEY / GOOGLE_GENERATIVE_AI_API_KEY; generation is disabled.");
                None
            }
        };

        Self::new(config, kv, generator, openai)
    }

    pub fn new(
        config: AppConfig,
        kv: Arc<dyn KeyValueStore>,
        generator: Option<ChallengeGenerator>,
        openai: Option<OpenAI>,
    ) -> Self {
        Self {
            config,
            generator,
            openai,
            store: Mutex::new(DareStore::new(kv)),
            slot: RwLock::new(GenerationSlot { next_ticket: 1, outcome: GenerationOutcome::Idle }),
        }
    }

    /// Load persisted dares. Until this returns, store commands fail with NotLoaded.
    pub async fn load_store(&self) -> LoadReport {
        self.store.lock().await.load()
    }

    pub async fn store_loaded(&self) -> bool {
        self.store.lock().await.is_loaded()
    }

    pub fn categories(&self) -> &[Category] {
        &self.config.categories
    }

    #[instrument(level = "debug", skip(self))]
    pub async fn snapshot(&self) -> ViewSnapshot {
        let generation = self.slot.read().await.outcome.clone();
        let store = self.store.lock().await;
        ViewSnapshot {
            ongoing: store.ongoing().to_vec(),
            completed: store.completed().to_vec(),
            generation,
        }
    }

    pub async fn generation(&self) -> GenerationOutcome {
        self.slot.read().await.outcome.clone()
    }

    /// Run one generation. The slot shows Pending while the model call is in
    /// flight; the result is applied only if this ticket is still current.
    #[instrument(level = "info", skip(self, context), fields(%category, %difficulty, context_len = context.len()))]
    pub async fn request_generation(&self, category: &str, context: &str, difficulty: Difficulty) -> GenerationReport {
        let category = self.config.resolve_category(category);

        let ticket = {
            let mut slot = self.slot.write().await;
            let ticket = slot.next_ticket;
            slot.next_ticket += 1;
            slot.outcome = GenerationOutcome::Pending { ticket, category: category.clone(), difficulty };
            ticket
        };

        let result = match &self.generator {
            Some(g) => g.generate(&category, context, difficulty).await,
            None => Err(GenerationError::Transport(TransportError::NotConfigured)),
        };

        let mut slot = self.slot.write().await;
        let applied = slot.current_ticket() == Some(ticket);
        if applied {
            slot.outcome = match &result {
                Ok(challenge) => GenerationOutcome::Success { ticket, challenge: challenge.clone() },
                Err(error) => GenerationOutcome::Failure { ticket, error: error.clone() },
            };
            info!(target: "generation", ticket, ok = result.is_ok(), "Generation outcome applied");
        } else {
            warn!(target: "generation", ticket, current = ?slot.current_ticket(), "Discarding stale generation result");
        }

        GenerationReport { ticket, applied, result }
    }

    /// Accept the current preview as a new ongoing dare and clear the preview.
    #[instrument(level = "info", skip(self))]
    pub async fn accept_preview(&self) -> Result<Dare, CommandError> {
        let mut slot = self.slot.write().await;
        let challenge = match &slot.outcome {
            GenerationOutcome::Success { challenge, .. } => challenge.clone(),
            _ => return Err(CommandError::NoPreview),
        };
        let dare = self.store.lock().await.accept(challenge)?;
        slot.outcome = GenerationOutcome::Idle;
        Ok(dare)
    }

    /// Drop the preview and supersede any pending request.
    #[instrument(level = "info", skip(self))]
    pub async fn reset(&self) {
        let mut slot = self.slot.write().await;
        if let Some(ticket) = slot.current_ticket() {
            info!(target: "generation", ticket, "Pending generation abandoned");
        }
        slot.outcome = GenerationOutcome::Idle;
    }

    #[instrument(level = "info", skip(self), fields(%id))]
    pub async fn complete_dare(&self, id: DareId) -> Result<Dare, StoreError> {
        self.store.lock().await.complete(id).inspect_err(|e| log_store_error(e, id))
    }

    #[instrument(level = "info", skip(self), fields(%id, %origin))]
    pub async fn delete_dare(&self, id: DareId, origin: Collection) -> Result<Dare, StoreError> {
        self.store.lock().await.delete(id, origin).inspect_err(|e| log_store_error(e, id))
    }
}

fn log_store_error(e: &StoreError, id: DareId) {
    match e {
        StoreError::Persistence { .. } => error!(target: "dares", %id, error = %e, "Dare mutation could not be persisted"),
        _ => warn!(target: "dares", %id, error = %e, "Dare command rejected"),
    }
}
