//! Transaction-scoped registry of touched aggregates.

use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use storage::{TransactionError, TransactionManager};
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

use crate::aggregate::{AggregateRoot, TrackedAggregate};
use crate::event::DomainEvent;

/// Lifecycle of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOfWorkState {
    /// Created, no transaction opened yet.
    Pending,
    /// Holding an open transaction.
    Active,
    /// The transaction was committed.
    Committed,
    /// The transaction was rolled back.
    RolledBack,
    /// Opening or committing the transaction failed.
    Failed,
}

impl std::fmt::Display for UnitOfWorkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            UnitOfWorkState::Pending => "Pending",
            UnitOfWorkState::Active => "Active",
            UnitOfWorkState::Committed => "Committed",
            UnitOfWorkState::RolledBack => "RolledBack",
            UnitOfWorkState::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

struct Slot<T> {
    transaction: Option<T>,
    state: UnitOfWorkState,
}

/// One atomic transaction attempt and the aggregates it touched.
///
/// A unit of work is single-use: it opens at most one transaction and
/// cannot be restarted once committed or rolled back. Cloning yields another
/// handle onto the same unit of work, which is how repositories receive it.
///
/// Repositories must release the guard returned by
/// [`transaction`](Self::transaction) before awaiting any other operation on
/// the same unit of work.
pub struct UnitOfWork<S: TransactionManager, E> {
    store: S,
    slot: Arc<Mutex<Slot<S::Transaction>>>,
    aggregates: Arc<StdMutex<Vec<TrackedAggregate<E>>>>,
}

impl<S, E> UnitOfWork<S, E>
where
    S: TransactionManager + Clone,
    E: DomainEvent,
{
    /// Creates a unit of work that will draw its transaction from `store`.
    pub fn new(store: S) -> Self {
        Self {
            store,
            slot: Arc::new(Mutex::new(Slot {
                transaction: None,
                state: UnitOfWorkState::Pending,
            })),
            aggregates: Arc::new(StdMutex::new(Vec::new())),
        }
    }

    /// Opens the transaction.
    ///
    /// On failure the unit of work is left in the `Failed` state and cannot
    /// be used any further.
    pub async fn start(&self) -> Result<(), TransactionError> {
        let mut slot = self.slot.lock().await;
        match slot.state {
            UnitOfWorkState::Pending => {}
            UnitOfWorkState::Active => return Err(TransactionError::AlreadyStarted),
            _ => return Err(TransactionError::Finished),
        }

        match self.store.begin().await {
            Ok(transaction) => {
                slot.transaction = Some(transaction);
                slot.state = UnitOfWorkState::Active;
                tracing::debug!("unit of work started");
                Ok(())
            }
            Err(e) => {
                slot.state = UnitOfWorkState::Failed;
                tracing::warn!(error = %e, "failed to open transaction");
                Err(e)
            }
        }
    }

    /// Returns the open transaction handle.
    ///
    /// Storage collaborators pass it to every read and write so that all of
    /// them share this unit of work's transaction.
    pub async fn transaction(&self) -> Result<MappedMutexGuard<'_, S::Transaction>, TransactionError> {
        let slot = self.slot.lock().await;
        match slot.state {
            UnitOfWorkState::Active => {}
            UnitOfWorkState::Pending => return Err(TransactionError::NotStarted),
            _ => return Err(TransactionError::Finished),
        }
        MutexGuard::try_map(slot, |slot| slot.transaction.as_mut())
            .map_err(|_| TransactionError::Finished)
    }

    /// Records that `aggregate` was touched inside this unit of work.
    ///
    /// Registering the same instance again is a no-op.
    pub fn register_aggregate<A>(&self, aggregate: &A)
    where
        A: AggregateRoot<Event = E>,
    {
        self.register_tracked(TrackedAggregate::of(aggregate));
    }

    /// Registers an already tracked aggregate instance.
    pub fn register_tracked(&self, tracked: TrackedAggregate<E>) {
        let mut aggregates = self.lock_aggregates();
        if aggregates.iter().any(|a| a.is_same_instance(&tracked)) {
            return;
        }
        tracing::trace!(
            aggregate_type = tracked.aggregate_type(),
            aggregate_id = %tracked.aggregate_id(),
            "aggregate registered"
        );
        aggregates.push(tracked);
    }

    /// Snapshot of the touched aggregates in first-registration order.
    pub fn touched_aggregates(&self) -> Vec<TrackedAggregate<E>> {
        self.lock_aggregates().clone()
    }

    /// Commits the transaction.
    pub async fn commit(&self) -> Result<(), TransactionError> {
        let mut slot = self.slot.lock().await;
        match slot.state {
            UnitOfWorkState::Active => {}
            UnitOfWorkState::Pending => return Err(TransactionError::NotStarted),
            _ => return Err(TransactionError::Finished),
        }
        let transaction = slot.transaction.take().ok_or(TransactionError::Finished)?;

        match self.store.commit(transaction).await {
            Ok(()) => {
                slot.state = UnitOfWorkState::Committed;
                tracing::debug!("unit of work committed");
                Ok(())
            }
            Err(e) => {
                slot.state = UnitOfWorkState::Failed;
                Err(e)
            }
        }
    }

    /// Aborts the transaction if one is still open.
    ///
    /// Errors reported by the store are logged and discarded.
    pub async fn rollback(&self) {
        let mut slot = self.slot.lock().await;
        let Some(transaction) = slot.transaction.take() else {
            tracing::debug!(state = %slot.state, "no open transaction to roll back");
            if slot.state == UnitOfWorkState::Pending {
                slot.state = UnitOfWorkState::RolledBack;
            }
            return;
        };

        if let Err(e) = self.store.rollback(transaction).await {
            tracing::warn!(error = %e, "rollback failed");
        }
        slot.state = UnitOfWorkState::RolledBack;
        tracing::debug!("unit of work rolled back");
    }

    /// Returns the current lifecycle state.
    pub async fn state(&self) -> UnitOfWorkState {
        self.slot.lock().await.state
    }

    fn lock_aggregates(&self) -> StdMutexGuard<'_, Vec<TrackedAggregate<E>>> {
        self.aggregates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S, E> Clone for UnitOfWork<S, E>
where
    S: TransactionManager + Clone,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            slot: Arc::clone(&self.slot),
            aggregates: Arc::clone(&self.aggregates),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::EventLedger;
    use crate::event::EventMetadata;
    use common::AggregateId;
    use storage::{InMemoryStore, StoreConfig};

    #[derive(Debug)]
    struct Touched {
        metadata: EventMetadata,
    }

    impl DomainEvent for Touched {
        fn event_type(&self) -> &'static str {
            "Touched"
        }

        fn metadata(&self) -> &EventMetadata {
            &self.metadata
        }
    }

    struct Thing {
        id: AggregateId,
        events: EventLedger<Touched>,
    }

    impl Thing {
        fn new() -> Self {
            Self {
                id: AggregateId::new(),
                events: EventLedger::new(),
            }
        }
    }

    impl AggregateRoot for Thing {
        type Event = Touched;

        fn aggregate_type() -> &'static str {
            "Thing"
        }

        fn id(&self) -> AggregateId {
            self.id
        }

        fn ledger(&self) -> &EventLedger<Touched> {
            &self.events
        }
    }

    fn unit_of_work(store: &InMemoryStore) -> UnitOfWork<InMemoryStore, Touched> {
        UnitOfWork::new(store.clone())
    }

    #[tokio::test]
    async fn test_start_opens_transaction() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);

        assert_eq!(uow.state().await, UnitOfWorkState::Pending);
        uow.start().await.unwrap();

        assert_eq!(uow.state().await, UnitOfWorkState::Active);
        assert_eq!(store.stats().open, 1);
    }

    #[tokio::test]
    async fn test_transaction_before_start_is_usage_error() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);

        assert!(matches!(
            uow.transaction().await,
            Err(TransactionError::NotStarted)
        ));
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);

        uow.start().await.unwrap();
        assert!(matches!(
            uow.start().await,
            Err(TransactionError::AlreadyStarted)
        ));
    }

    #[tokio::test]
    async fn test_failed_start_leaves_unit_unusable() {
        let store = InMemoryStore::with_config(&StoreConfig::default().with_max_open_transactions(0));
        let uow = unit_of_work(&store);

        assert!(matches!(
            uow.start().await,
            Err(TransactionError::Exhausted { .. })
        ));
        assert_eq!(uow.state().await, UnitOfWorkState::Failed);
        assert!(matches!(
            uow.transaction().await,
            Err(TransactionError::Finished)
        ));
    }

    #[tokio::test]
    async fn test_writes_through_handle_are_committed() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);
        let id = AggregateId::new();

        uow.start().await.unwrap();
        {
            let mut tx = uow.transaction().await.unwrap();
            tx.put("things", id, &"value").unwrap();
        }
        uow.commit().await.unwrap();

        let stored: Option<String> = store.committed("things", id).await.unwrap();
        assert_eq!(stored.as_deref(), Some("value"));
        assert_eq!(uow.state().await, UnitOfWorkState::Committed);
    }

    #[tokio::test]
    async fn test_unit_is_single_use_after_commit() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);

        uow.start().await.unwrap();
        uow.commit().await.unwrap();

        assert!(matches!(uow.commit().await, Err(TransactionError::Finished)));
        assert!(matches!(uow.start().await, Err(TransactionError::Finished)));
        assert!(matches!(
            uow.transaction().await,
            Err(TransactionError::Finished)
        ));
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);
        let id = AggregateId::new();

        uow.start().await.unwrap();
        uow.transaction().await.unwrap().put("things", id, &1).unwrap();
        uow.rollback().await;

        assert_eq!(store.committed_count("things").await, 0);
        assert_eq!(store.stats().rolled_back, 1);
        assert_eq!(uow.state().await, UnitOfWorkState::RolledBack);
    }

    #[tokio::test]
    async fn test_register_deduplicates_by_instance() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);
        let first = Thing::new();
        let second = Thing::new();

        uow.register_aggregate(&first);
        uow.register_aggregate(&second);
        uow.register_aggregate(&first);

        let touched = uow.touched_aggregates();
        assert_eq!(touched.len(), 2);
        assert_eq!(touched[0].aggregate_id(), first.id());
        assert_eq!(touched[1].aggregate_id(), second.id());
    }

    #[tokio::test]
    async fn test_clones_share_registry() {
        let store = InMemoryStore::new();
        let uow = unit_of_work(&store);
        let handle = uow.clone();
        let thing = Thing::new();

        handle.register_aggregate(&thing);

        assert_eq!(uow.touched_aggregates().len(), 1);
        thing.ledger().record(Touched {
            metadata: EventMetadata::new(thing.id()),
        });
        assert_eq!(uow.touched_aggregates()[0].ledger().len(), 1);
    }
}
