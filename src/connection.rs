// src/connection.rs
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use tokio::{sync::Mutex, task};
use tracing::{info, warn};

use crate::error::DataSourceError;
use crate::extractor::{RecordExtractor, SqliteExtractor};

/// Where the provider stands with the transaction store
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionState {
    Connected,
    Reconnecting,
    Failed(String),
}

impl ConnectionState {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub since: DateTime<Utc>,
}

/// Owns the store handle and hands out ready extractors, reopening the store
/// when the current handle stops answering.
pub struct ConnectionProvider {
    path: String,
    status: RwLock<ConnectionStatus>,
    handle: Mutex<Option<Arc<SqliteExtractor>>>,
}

impl ConnectionProvider {
    /// Create a provider without touching the store yet
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            status: RwLock::new(ConnectionStatus {
                state: ConnectionState::Reconnecting,
                since: Utc::now(),
            }),
            handle: Mutex::new(None),
        }
    }

    /// Create a provider and open the store immediately
    pub async fn connect(path: impl Into<String>) -> Result<Self, DataSourceError> {
        let provider = Self::new(path);
        provider.extractor().await?;
        Ok(provider)
    }

    pub fn status(&self) -> ConnectionStatus {
        match self.status.read() {
            Ok(status) => status.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    fn set_state(&self, state: ConnectionState) {
        let mut status = match self.status.write() {
            Ok(status) => status,
            Err(poisoned) => poisoned.into_inner(),
        };
        if status.state != state {
            status.state = state;
            status.since = Utc::now();
        }
    }

    /// A live extractor, reconnecting first if needed
    pub async fn extractor(&self) -> Result<Arc<dyn RecordExtractor>, DataSourceError> {
        let mut handle = self.handle.lock().await;

        if let Some(current) = handle.as_ref() {
            match current.ping().await {
                Ok(()) => return Ok(Arc::clone(current) as Arc<dyn RecordExtractor>),
                Err(e) => warn!("Transaction store ping failed: {}", e),
            }
        }

        self.set_state(ConnectionState::Reconnecting);
        info!("Connecting to transaction store at {}...", self.path);

        match open(&self.path).await {
            Ok(extractor) => {
                let extractor = Arc::new(extractor);
                *handle = Some(Arc::clone(&extractor));
                self.set_state(ConnectionState::Connected);
                info!("Transaction store connection: SUCCESS");
                Ok(extractor as Arc<dyn RecordExtractor>)
            }
            Err(e) => {
                *handle = None;
                warn!("Transaction store connection: FAILED {}", e);
                self.set_state(ConnectionState::Failed(e.to_string()));
                Err(DataSourceError::Unavailable(e.to_string()))
            }
        }
    }
}

async fn open(path: &str) -> Result<SqliteExtractor, DataSourceError> {
    let path = path.to_string();
    task::spawn_blocking(move || SqliteExtractor::open(&path))
    .await
    .map_err(|e| DataSourceError::Worker(e.to_string()))?
}
