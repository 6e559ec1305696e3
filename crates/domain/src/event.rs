//! Domain and integration event types.

use chrono::{DateTime, Utc};
use common::{AggregateId, EventId};
use serde::{Deserialize, Serialize};

/// Metadata every domain event carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Identity of this event instance.
    pub event_id: EventId,

    /// The aggregate that raised the event.
    pub aggregate_id: AggregateId,

    /// Schema version of the event. Starts at 1.
    pub event_version: u32,

    /// When the event was raised.
    pub occurred_on: DateTime<Utc>,
}

impl EventMetadata {
    /// Creates metadata for a new event raised by `aggregate_id`.
    pub fn new(aggregate_id: AggregateId) -> Self {
        Self {
            event_id: EventId::new(),
            aggregate_id,
            event_version: 1,
            occurred_on: Utc::now(),
        }
    }
}

/// Trait for domain events.
///
/// Domain events represent facts that have happened in the domain.
/// They are immutable and should be named in past tense.
pub trait DomainEvent: std::fmt::Debug + Send + Sync + 'static {
    /// Returns the event kind.
    ///
    /// Handlers are registered under this name.
    fn event_type(&self) -> &'static str;

    /// Returns the event's metadata.
    fn metadata(&self) -> &EventMetadata;

    /// Returns the integration projection capability, if this event has one.
    ///
    /// Events that stay inside the bounded context keep the default.
    fn as_projectable(&self) -> Option<&dyn ProjectableEvent> {
        None
    }

    /// Shorthand for `metadata().event_id`.
    fn event_id(&self) -> EventId {
        self.metadata().event_id
    }
}

/// Capability of a domain event to project itself for external consumers.
pub trait ProjectableEvent: Send + Sync {
    fn to_integration_event(&self) -> IntegrationEvent;
}

/// External-facing projection of a domain event.
///
/// Published only after the transaction that produced it has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationEvent {
    /// Kind of the integration event; handlers are registered under it.
    pub event_name: String,
    pub event_version: u32,
    pub occurred_on: DateTime<Utc>,
    /// Flattened payload.
    pub payload: serde_json::Value,
}

impl IntegrationEvent {
    /// Builds an integration event carrying over version and timestamp from
    /// the source event's metadata.
    pub fn from_metadata(
        event_name: impl Into<String>,
        metadata: &EventMetadata,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            event_version: metadata.event_version,
            occurred_on: metadata.occurred_on,
            payload,
        }
    }
}
