//! Application service sequencing a unit of work around business logic.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use common::EventId;
use storage::TransactionManager;

use crate::aggregate::TrackedAggregate;
use crate::error::{ApplicationError, HandlerError};
use crate::event::DomainEvent;
use crate::mediator::EventMediator;
use crate::unit_of_work::UnitOfWork;

/// Runs business logic inside a transaction and publishes the events it
/// produced.
///
/// Every call to [`run`](Self::run) goes through the same sequence:
/// 1. open a fresh [`UnitOfWork`]
/// 2. run the callback, which touches aggregates through repositories
/// 3. dispatch domain events of every touched aggregate, transaction still open
/// 4. commit
/// 5. deliver integration events of every touched aggregate
///
/// A failure in steps 2 to 4 rolls the transaction back and leaves the
/// events it dispatched pending again. Domain event handlers can therefore
/// veto the write, while integration event handlers only ever see committed
/// data.
pub struct ApplicationService<S, E> {
    store: S,
    mediator: Arc<EventMediator<E>>,
}

impl<S, E> ApplicationService<S, E>
where
    S: TransactionManager + Clone,
    E: DomainEvent,
{
    /// Creates a new service over the given store and mediator.
    pub fn new(store: S, mediator: Arc<EventMediator<E>>) -> Self {
        Self { store, mediator }
    }

    /// Returns a reference to the mediator.
    pub fn mediator(&self) -> &EventMediator<E> {
        &self.mediator
    }

    /// Runs `callback` in a new unit of work.
    ///
    /// The callback receives a handle to the unit of work to pass to
    /// repositories. Its error is returned unchanged after a rollback; errors
    /// of the service itself are converted into the callback's error type.
    ///
    /// An integration handler failure is returned even though the write is
    /// already committed; see [`ApplicationError::is_post_commit`].
    #[tracing::instrument(skip_all)]
    pub async fn run<T, Err, F, Fut>(&self, callback: F) -> Result<T, Err>
    where
        F: FnOnce(UnitOfWork<S, E>) -> Fut,
        Fut: Future<Output = Result<T, Err>>,
        Err: From<ApplicationError>,
    {
        metrics::counter!("application_runs_total").increment(1);
        let started = std::time::Instant::now();

        let result = self.run_unit_of_work(callback).await;
        metrics::histogram!("application_run_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn run_unit_of_work<T, Err, F, Fut>(&self, callback: F) -> Result<T, Err>
    where
        F: FnOnce(UnitOfWork<S, E>) -> Fut,
        Fut: Future<Output = Result<T, Err>>,
        Err: From<ApplicationError>,
    {
        let uow = UnitOfWork::new(self.store.clone());
        uow.start().await.map_err(ApplicationError::from)?;

        let output = match callback(uow.clone()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::info!("callback failed, rolling back");
                self.abort(&uow).await;
                return Err(e);
            }
        };

        let touched = uow.touched_aggregates();
        let marks: Vec<_> = touched
            .iter()
            .map(|aggregate| aggregate.ledger().dispatch_marks())
            .collect();

        for aggregate in &touched {
            if let Err(e) = self.mediator.publish_domain_events(aggregate).await {
                self.abort(&uow).await;
                restore_dispatch_marks(&touched, marks);
                return Err(ApplicationError::DomainEventHandler(e).into());
            }
        }

        if let Err(e) = uow.commit().await {
            // The store consumed the transaction, there is nothing to roll back.
            tracing::warn!(error = %e, "commit failed");
            restore_dispatch_marks(&touched, marks);
            return Err(ApplicationError::Transaction(e).into());
        }
        tracing::debug!(aggregates = touched.len(), "transaction committed");

        match self.publish_integration_events(&touched).await {
            Ok(()) => Ok(output),
            Err(e) => Err(ApplicationError::IntegrationEventHandler(e).into()),
        }
    }

    async fn publish_integration_events(
        &self,
        touched: &[TrackedAggregate<E>],
    ) -> Result<(), HandlerError> {
        for aggregate in touched {
            self.mediator.publish_integration_events(aggregate).await?;
        }
        Ok(())
    }

    async fn abort(&self, uow: &UnitOfWork<S, E>) {
        metrics::counter!("application_rollbacks_total").increment(1);
        uow.rollback().await;
    }
}

/// Makes the events dispatched by a failed attempt pending again, so a retry
/// runs the domain handlers on them.
fn restore_dispatch_marks<E: DomainEvent>(
    touched: &[TrackedAggregate<E>],
    marks: Vec<HashSet<EventId>>,
) {
    for (aggregate, marks) in touched.iter().zip(marks) {
        aggregate.ledger().restore_dispatch_marks(marks);
    }
}

impl<S: Clone, E> Clone for ApplicationService<S, E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            mediator: Arc::clone(&self.mediator),
        }
    }
}
