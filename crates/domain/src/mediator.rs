//! Event mediator routing domain and integration events to handlers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::aggregate::TrackedAggregate;
use crate::error::HandlerError;
use crate::event::{DomainEvent, IntegrationEvent, ProjectableEvent};

/// A handler for events of type `Ev`.
///
/// Domain event handlers run before commit and can veto the transaction by
/// failing. Integration event handlers run after commit; their failures are
/// reported but cannot undo the write.
#[async_trait]
pub trait EventHandler<Ev: ?Sized + Sync>: Send + Sync {
    /// Handles a single event.
    async fn handle(&self, event: &Ev) -> Result<(), HandlerError>;

    /// Returns the handler's name for logging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}

/// Registry of event handlers keyed by event kind.
///
/// Handlers for the same kind run in registration order, each one awaited
/// before the next starts. Registering the same handler twice makes it run
/// twice.
pub struct EventMediator<E> {
    domain_handlers: HashMap<String, Vec<Arc<dyn EventHandler<E>>>>,
    integration_handlers: HashMap<String, Vec<Arc<dyn EventHandler<IntegrationEvent>>>>,
}

impl<E: DomainEvent> EventMediator<E> {
    /// Creates a mediator with no handlers.
    pub fn new() -> Self {
        Self {
            domain_handlers: HashMap::new(),
            integration_handlers: HashMap::new(),
        }
    }

    /// Registers a handler for a domain event kind.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn EventHandler<E>>) {
        let kind = kind.into();
        tracing::debug!(kind = %kind, handler = handler.name(), "domain event handler registered");
        self.domain_handlers.entry(kind).or_default().push(handler);
    }

    /// Registers a handler for an integration event kind.
    pub fn register_integration(
        &mut self,
        kind: impl Into<String>,
        handler: Arc<dyn EventHandler<IntegrationEvent>>,
    ) {
        let kind = kind.into();
        tracing::debug!(
            kind = %kind,
            handler = handler.name(),
            "integration event handler registered"
        );
        self.integration_handlers
            .entry(kind)
            .or_default()
            .push(handler);
    }

    /// Returns the number of domain handlers registered for `kind`.
    pub fn handler_count(&self, kind: &str) -> usize {
        self.domain_handlers.get(kind).map_or(0, Vec::len)
    }

    /// Returns the number of integration handlers registered for `kind`.
    pub fn integration_handler_count(&self, kind: &str) -> usize {
        self.integration_handlers.get(kind).map_or(0, Vec::len)
    }

    /// Dispatches the aggregate's pending domain events.
    ///
    /// Walks the events pending when the pass starts, in recording order.
    /// Each event is marked dispatched before its handlers run, so it is
    /// never delivered twice, even if a handler publishes the same aggregate
    /// again. Events recorded by a handler during the pass stay pending for
    /// the next pass. The first handler failure stops the pass and is
    /// returned; the remaining events stay pending.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = aggregate.aggregate_type(),
            aggregate_id = %aggregate.aggregate_id()
        )
    )]
    pub async fn publish_domain_events(
        &self,
        aggregate: &TrackedAggregate<E>,
    ) -> Result<(), HandlerError> {
        for event in aggregate.ledger().pending_events() {
            if !aggregate.ledger().claim_for_dispatch(&event) {
                continue;
            }
            let kind = event.event_type();
            let Some(handlers) = self.domain_handlers.get(kind) else {
                tracing::trace!(kind, "no domain handler registered");
                continue;
            };

            for handler in handlers {
                if let Err(e) = handler.handle(event.as_ref()).await {
                    tracing::warn!(
                        kind,
                        handler = handler.name(),
                        error = %e,
                        "domain event handler failed"
                    );
                    return Err(e);
                }
            }
            metrics::counter!("domain_events_dispatched_total", "event_type" => kind).increment(1);
        }
        Ok(())
    }

    /// Delivers integration projections of the aggregate's events.
    ///
    /// Covers every recorded event, dispatched or not, that has not yet been
    /// delivered from this ledger. Events without an integration projection
    /// are skipped. Runs after commit: a handler failure is returned to the
    /// caller but cannot undo anything.
    #[tracing::instrument(
        skip(self, aggregate),
        fields(
            aggregate_type = aggregate.aggregate_type(),
            aggregate_id = %aggregate.aggregate_id()
        )
    )]
    pub async fn publish_integration_events(
        &self,
        aggregate: &TrackedAggregate<E>,
    ) -> Result<(), HandlerError> {
        while let Some(event) = aggregate.ledger().take_next_undelivered() {
            let Some(integration) = event
                .as_projectable()
                .map(ProjectableEvent::to_integration_event)
            else {
                continue;
            };
            let Some(handlers) = self.integration_handlers.get(&integration.event_name) else {
                tracing::trace!(
                    kind = %integration.event_name,
                    "no integration handler registered"
                );
                continue;
            };

            for handler in handlers {
                if let Err(e) = handler.handle(&integration).await {
                    tracing::warn!(
                        kind = %integration.event_name,
                        handler = handler.name(),
                        error = %e,
                        "integration event handler failed"
                    );
                    return Err(e);
                }
            }
            metrics::counter!(
                "integration_events_dispatched_total",
                "event_name" => integration.event_name.clone()
            )
            .increment(1);
        }
        Ok(())
    }
}

impl<E: DomainEvent> Default for EventMediator<E> {
    fn default() -> Self {
        Self::new()
    }
}
