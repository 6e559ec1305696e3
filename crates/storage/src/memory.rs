use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};

use crate::{AggregateId, Result, StoreConfig, TransactionError, TransactionManager};

#[derive(Debug, Clone)]
struct Document {
    id: AggregateId,
    body: Value,
}

#[derive(Debug, Clone)]
enum StagedWrite {
    Put {
        collection: String,
        id: AggregateId,
        body: Value,
    },
    Delete {
        collection: String,
        id: AggregateId,
    },
}

impl StagedWrite {
    fn collection(&self) -> &str {
        match self {
            StagedWrite::Put { collection, .. } | StagedWrite::Delete { collection, .. } => {
                collection
            }
        }
    }

    fn apply(&self, documents: &mut Vec<Document>) {
        match self {
            StagedWrite::Put { id, body, .. } => {
                match documents.iter_mut().find(|doc| doc.id == *id) {
                    Some(doc) => doc.body = body.clone(),
                    None => documents.push(Document {
                        id: *id,
                        body: body.clone(),
                    }),
                }
            }
            StagedWrite::Delete { id, .. } => documents.retain(|doc| doc.id != *id),
        }
    }
}

/// A transaction against an [`InMemoryStore`].
///
/// Writes are staged on the handle and only become visible to other
/// transactions once the store commits it. Dropping the handle without
/// committing discards the staged writes and frees its slot.
#[derive(Debug)]
pub struct InMemoryTransaction {
    id: u64,
    writes: Vec<StagedWrite>,
    _permit: OwnedSemaphorePermit,
}

impl InMemoryTransaction {
    /// Returns the transaction's sequence number.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stages an insert-or-replace of a document.
    pub fn put<T: Serialize>(
        &mut self,
        collection: &str,
        id: AggregateId,
        document: &T,
    ) -> Result<()> {
        let body = serde_json::to_value(document)?;
        self.writes.push(StagedWrite::Put {
            collection: collection.to_string(),
            id,
            body,
        });
        Ok(())
    }

    /// Stages the removal of a document.
    pub fn delete(&mut self, collection: &str, id: AggregateId) {
        self.writes.push(StagedWrite::Delete {
            collection: collection.to_string(),
            id,
        });
    }

    /// Returns the number of writes waiting for commit.
    pub fn staged_writes(&self) -> usize {
        self.writes.len()
    }
}

/// Counters describing the transactions a store has served.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub begun: u64,
    pub committed: u64,
    pub rolled_back: u64,
    pub open: usize,
}

struct Inner {
    collections: RwLock<HashMap<String, Vec<Document>>>,
    permits: Arc<Semaphore>,
    limit: usize,
    next_id: AtomicU64,
    begun: AtomicU64,
    committed: AtomicU64,
    rolled_back: AtomicU64,
}

/// In-memory transactional document store.
///
/// Documents are JSON values grouped by collection and keyed by aggregate
/// id. The number of simultaneously open transactions is bounded by
/// [`StoreConfig::max_open_transactions`], which stands in for a
/// connection pool.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

impl InMemoryStore {
    /// Creates a new empty store with the default configuration.
    pub fn new() -> Self {
        Self::with_config(&StoreConfig::default())
    }

    /// Creates a new empty store with the given limits.
    pub fn with_config(config: &StoreConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                collections: RwLock::new(HashMap::new()),
                permits: Arc::new(Semaphore::new(config.max_open_transactions)),
                limit: config.max_open_transactions,
                next_id: AtomicU64::new(1),
                begun: AtomicU64::new(0),
                committed: AtomicU64::new(0),
                rolled_back: AtomicU64::new(0),
            }),
        }
    }

    /// Reads a document as seen from inside `transaction`.
    pub async fn get<T: DeserializeOwned>(
        &self,
        transaction: &InMemoryTransaction,
        collection: &str,
        id: AggregateId,
    ) -> Result<Option<T>> {
        self.visible(transaction, collection)
            .await
            .into_iter()
            .find(|doc| doc.id == id)
            .map(|doc| serde_json::from_value(doc.body))
            .transpose()
            .map_err(Into::into)
    }

    /// Lists every document of a collection as seen from inside `transaction`.
    pub async fn list<T: DeserializeOwned>(
        &self,
        transaction: &InMemoryTransaction,
        collection: &str,
    ) -> Result<Vec<T>> {
        self.visible(transaction, collection)
            .await
            .into_iter()
            .map(|doc| serde_json::from_value(doc.body).map_err(Into::into))
            .collect()
    }

    /// Returns true if the document is visible from inside `transaction`.
    pub async fn exists(
        &self,
        transaction: &InMemoryTransaction,
        collection: &str,
        id: AggregateId,
    ) -> bool {
        self.visible(transaction, collection)
            .await
            .iter()
            .any(|doc| doc.id == id)
    }

    /// Reads a committed document, ignoring any open transaction.
    pub async fn committed<T: DeserializeOwned>(
        &self,
        collection: &str,
        id: AggregateId,
    ) -> Result<Option<T>> {
        let collections = self.inner.collections.read().await;
        collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|doc| doc.id == id))
            .map(|doc| serde_json::from_value(doc.body.clone()))
            .transpose()
            .map_err(Into::into)
    }

    /// Returns the number of committed documents in a collection.
    pub async fn committed_count(&self, collection: &str) -> usize {
        self.inner
            .collections
            .read()
            .await
            .get(collection)
            .map_or(0, Vec::len)
    }

    /// Returns transaction counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            begun: self.inner.begun.load(Ordering::Relaxed),
            committed: self.inner.committed.load(Ordering::Relaxed),
            rolled_back: self.inner.rolled_back.load(Ordering::Relaxed),
            open: self.inner.limit - self.inner.permits.available_permits(),
        }
    }

    /// Removes every committed document.
    pub async fn clear(&self) {
        self.inner.collections.write().await.clear();
    }

    async fn visible(&self, transaction: &InMemoryTransaction, collection: &str) -> Vec<Document> {
        let mut documents = self
            .inner
            .collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default();

        for write in transaction
            .writes
            .iter()
            .filter(|w| w.collection() == collection)
        {
            write.apply(&mut documents);
        }
        documents
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionManager for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> std::result::Result<InMemoryTransaction, TransactionError> {
        let permit = Arc::clone(&self.inner.permits)
            .try_acquire_owned()
            .map_err(|_| TransactionError::Exhausted {
                limit: self.inner.limit,
            })?;

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.begun.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(transaction_id = id, "in-memory transaction started");

        Ok(InMemoryTransaction {
            id,
            writes: Vec::new(),
            _permit: permit,
        })
    }

    async fn commit(
        &self,
        transaction: InMemoryTransaction,
    ) -> std::result::Result<(), TransactionError> {
        let mut collections = self.inner.collections.write().await;
        for write in &transaction.writes {
            let documents = collections
                .entry(write.collection().to_string())
                .or_default();
            write.apply(documents);
        }
        drop(collections);

        self.inner.committed.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("storage_transactions_committed_total").increment(1);
        tracing::debug!(
            transaction_id = transaction.id,
            writes = transaction.writes.len(),
            "in-memory transaction committed"
        );
        Ok(())
    }

    async fn rollback(
        &self,
        transaction: InMemoryTransaction,
    ) -> std::result::Result<(), TransactionError> {
        self.inner.rolled_back.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("storage_transactions_rolled_back_total").increment(1);
        tracing::debug!(
            transaction_id = transaction.id,
            discarded = transaction.writes.len(),
            "in-memory transaction rolled back"
        );
        Ok(())
    }
}
