// src/extractor.rs
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use rusqlite::Connection;
use tokio::{sync::mpsc, task};
use tracing::{debug, error};

use crate::error::DataSourceError;
use crate::models::TransferRecord;
use crate::store;

/// Records in store order; an `Err` item ends the request.
pub type RecordStream = BoxStream<'static, Result<TransferRecord, DataSourceError>>;

const CHANNEL_CAPACITY: usize = 256;

/// Source of mosaic transfer records for a set of addresses
#[async_trait]
pub trait RecordExtractor: Send + Sync {
    async fn query_transfers(
        &self,
        addresses: &[String],
        mosaic_id: u64,
        divisibility: u8,
    ) -> Result<RecordStream, DataSourceError>;
}

/// Extractor backed by the SQLite transaction store.
///
/// The long-lived connection only answers pings; every query opens its own
/// reader so extractions never queue behind each other (WAL allows concurrent
/// readers).
pub struct SqliteExtractor {
    path: String,
    conn: Arc<Mutex<Connection>>,
    active: Arc<AtomicUsize>,
}

/// Decrements the active query count when the worker exits, panics included
struct ActiveQuery(Arc<AtomicUsize>);

impl Drop for ActiveQuery {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SqliteExtractor {
    /// Open the store at `path`, running migrations
    pub fn open(path: &str) -> Result<Self, DataSourceError> {
        let conn = store::connect(path)?;
        store::run_migrations(&conn)?;
        Ok(Self {
            path: path.to_string(),
            conn: Arc::new(Mutex::new(conn)),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// Extraction workers still running
    pub fn active_queries(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub async fn ping(&self) -> Result<(), DataSourceError> {
        let conn = Arc::clone(&self.conn);
        task::spawn_blocking(move || {
            let db = conn
                .lock()
                .map_err(|_| DataSourceError::Unavailable("store connection poisoned".into()))?;
            store::ping(&db).map_err(DataSourceError::from)
        })
        .await
        .map_err(|e| DataSourceError::Worker(e.to_string()))?
    }
}

#[async_trait]
impl RecordExtractor for SqliteExtractor {
    async fn query_transfers(
        &self,
        addresses: &[String],
        mosaic_id: u64,
        divisibility: u8,
    ) -> Result<RecordStream, DataSourceError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let path = self.path.clone();
        let addresses = addresses.to_vec();

        self.active.fetch_add(1, Ordering::SeqCst);
        let guard = ActiveQuery(Arc::clone(&self.active));

        let worker = task::spawn_blocking(move || {
            let _guard = guard;
            let db = match store::connect(&path) {
                Ok(db) => db,
                Err(e) => {
                    error!("Opening store reader failed: {:?}", e);
                    let _ = tx.blocking_send(Err(e.into()));
                    return;
                }
            };

            let result = store::query_transfers(&db, &addresses, mosaic_id, divisibility, |record| {
                // receiver gone means the request was abandoned
                tx.blocking_send(Ok(record)).is_ok()
            });

            match result {
                Ok(count) => debug!("Extracted {} transfers for {:?}", count, addresses),
                Err(e) => {
                    error!("Transfer query failed: {:?}", e);
                    let _ = tx.blocking_send(Err(e.into()));
                }
            }
        });

        let records = stream::unfold((rx, Some(worker)), |(mut rx, mut worker)| async move {
            if let Some(item) = rx.recv().await {
                return Some((item, (rx, worker)));
            }
            // channel closed: only a clean worker exit counts as end of data
            match worker.take()?.await {
                Ok(()) => None,
                Err(e) => Some((Err(DataSourceError::Worker(e.to_string())), (rx, None))),
            }
        });

        Ok(records.boxed())
    }
}
