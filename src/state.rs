//! Application state management
//!
//! This module contains the shared application state that is passed
//! to all request handlers via Axum's State extractor.

use std::sync::Arc;

use crate::config::Config;
use crate::judge::{Dispatcher, TranscriptStore};
use crate::models::Declarations;
use crate::queue::QueueManager;
use crate::store::Stores;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

/// Inner state (wrapped in Arc for cheap cloning)
struct AppStateInner {
    /// Persistent stores
    pub stores: Stores,

    /// Queue fabric
    pub queues: Arc<QueueManager>,

    /// Judge dispatcher
    pub dispatcher: Arc<Dispatcher>,

    /// Run transcript store
    pub transcripts: TranscriptStore,

    /// Language/compiler declarations
    pub declarations: Arc<Declarations>,

    /// Application configuration
    pub config: Config,
}

impl AppState {
    /// Create a new application state
    pub fn new(
        stores: Stores,
        queues: Arc<QueueManager>,
        dispatcher: Arc<Dispatcher>,
        transcripts: TranscriptStore,
        declarations: Arc<Declarations>,
        config: Config,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                stores,
                queues,
                dispatcher,
                transcripts,
                declarations,
                config,
            }),
        }
    }

    /// Get the persistent stores
    pub fn stores(&self) -> &Stores {
        &self.inner.stores
    }

    /// Get the queue manager
    pub fn queues(&self) -> &QueueManager {
        &self.inner.queues
    }

    /// Get the judge dispatcher
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.inner.dispatcher
    }

    /// Get the transcript store
    pub fn transcripts(&self) -> &TranscriptStore {
        &self.inner.transcripts
    }

    /// Get the declaration documents
    pub fn declarations(&self) -> &Arc<Declarations> {
        &self.inner.declarations
    }

    /// Get a reference to the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }
}
