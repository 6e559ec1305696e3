//! Aggregate roots and their event ledger.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use common::{AggregateId, EventId};

use crate::event::DomainEvent;

struct LedgerState<E> {
    events: Vec<Arc<E>>,
    recorded: HashSet<EventId>,
    dispatched: HashSet<EventId>,
    delivered: HashSet<EventId>,
}

impl<E> Default for LedgerState<E> {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            recorded: HashSet::new(),
            dispatched: HashSet::new(),
            delivered: HashSet::new(),
        }
    }
}

/// Append-only, duplicate-free log of the events an aggregate raised.
///
/// Events keep their recording order and are identified by
/// [`EventId`], never by payload equality: recording the same event
/// instance twice is a no-op, while two equal-looking events with
/// different ids are both kept.
///
/// The ledger also remembers which events were dispatched to domain
/// handlers and which were delivered as integration events, so neither
/// publish pass delivers an event twice.
///
/// The state sits behind a shared handle so the unit of work can publish
/// events of an aggregate that the caller still owns.
pub struct EventLedger<E> {
    state: Arc<Mutex<LedgerState<E>>>,
}

impl<E: DomainEvent> EventLedger<E> {
    /// Creates an empty ledger.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(LedgerState::default())),
        }
    }

    /// Appends an event unless the same instance is already recorded.
    ///
    /// Returns true if the event was appended.
    pub fn record(&self, event: impl Into<Arc<E>>) -> bool {
        let event = event.into();
        let mut state = self.lock();
        if !state.recorded.insert(event.event_id()) {
            return false;
        }
        state.events.push(event);
        true
    }

    /// Marks a recorded event as dispatched. Idempotent.
    ///
    /// Events that were never recorded are ignored.
    pub fn mark_dispatched(&self, event: &E) {
        let mut state = self.lock();
        let id = event.event_id();
        if state.recorded.contains(&id) {
            state.dispatched.insert(id);
        }
    }

    /// Returns, in recording order, every event not yet dispatched.
    pub fn pending_events(&self) -> Vec<Arc<E>> {
        let state = self.lock();
        state
            .events
            .iter()
            .filter(|e| !state.dispatched.contains(&e.event_id()))
            .cloned()
            .collect()
    }

    /// Returns every recorded event in recording order.
    pub fn all_events(&self) -> Vec<Arc<E>> {
        self.lock().events.clone()
    }

    /// Empties the ledger, including dispatch and delivery marks.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.recorded.clear();
        state.dispatched.clear();
        state.delivered.clear();
    }

    /// Returns the number of recorded events.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Returns true if no event is recorded.
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Returns true if the event was already dispatched to domain handlers.
    pub fn is_dispatched(&self, event: &E) -> bool {
        self.lock().dispatched.contains(&event.event_id())
    }

    /// Marks `event` dispatched and returns true, unless it already was.
    pub(crate) fn claim_for_dispatch(&self, event: &E) -> bool {
        let mut state = self.lock();
        let id = event.event_id();
        state.recorded.contains(&id) && state.dispatched.insert(id)
    }

    /// Returns the ids currently marked dispatched.
    pub(crate) fn dispatch_marks(&self) -> HashSet<EventId> {
        self.lock().dispatched.clone()
    }

    /// Resets the dispatched set to `marks`. Events marked since the
    /// matching [`dispatch_marks`](Self::dispatch_marks) call become
    /// pending again.
    pub(crate) fn restore_dispatch_marks(&self, marks: HashSet<EventId>) {
        self.lock().dispatched = marks;
    }

    /// Takes the oldest event not yet delivered as an integration event and
    /// marks it delivered.
    pub(crate) fn take_next_undelivered(&self) -> Option<Arc<E>> {
        let mut state = self.lock();
        let next = state
            .events
            .iter()
            .find(|e| !state.delivered.contains(&e.event_id()))
            .cloned()?;
        state.delivered.insert(next.event_id());
        Some(next)
    }

    /// Returns a second handle onto the same ledger.
    pub(crate) fn share(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }

    /// Returns true if both handles point to the same ledger.
    pub(crate) fn same_as(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState<E>> {
        // The state is never left half-updated, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: DomainEvent> Default for EventLedger<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: DomainEvent> std::fmt::Debug for EventLedger<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("EventLedger")
            .field("recorded", &state.events.len())
            .field("dispatched", &state.dispatched.len())
            .field("delivered", &state.delivered.len())
            .finish()
    }
}

/// Trait for aggregate roots.
///
/// An aggregate is a cluster of domain objects that can be treated as a single unit.
/// The aggregate root ensures consistency of changes being made within the aggregate
/// and records a domain event for each change through its [`EventLedger`].
pub trait AggregateRoot: Send + Sync {
    /// The type of events this aggregate records.
    type Event: DomainEvent;

    /// Returns the aggregate type name.
    fn aggregate_type() -> &'static str;

    /// Returns the aggregate's unique identifier.
    fn id(&self) -> AggregateId;

    /// Returns the aggregate's event ledger.
    fn ledger(&self) -> &EventLedger<Self::Event>;

    /// Records a domain event on the ledger.
    fn record_event(&mut self, event: Self::Event) {
        self.ledger().record(event);
    }
}

/// An aggregate instance registered with a unit of work.
///
/// Holds the aggregate's identity and a handle onto its ledger, which is
/// all the mediator needs to publish its events.
pub struct TrackedAggregate<E> {
    aggregate_type: &'static str,
    aggregate_id: AggregateId,
    ledger: EventLedger<E>,
}

impl<E: DomainEvent> TrackedAggregate<E> {
    /// Tracks the given aggregate instance.
    pub fn of<A>(aggregate: &A) -> Self
    where
        A: AggregateRoot<Event = E>,
    {
        Self {
            aggregate_type: A::aggregate_type(),
            aggregate_id: aggregate.id(),
            ledger: aggregate.ledger().share(),
        }
    }

    pub fn aggregate_type(&self) -> &'static str {
        self.aggregate_type
    }

    pub fn aggregate_id(&self) -> AggregateId {
        self.aggregate_id
    }

    pub fn ledger(&self) -> &EventLedger<E> {
        &self.ledger
    }

    /// Returns true if both track the same aggregate instance.
    ///
    /// Two instances loaded separately for the same id are different
    /// instances.
    pub fn is_same_instance(&self, other: &Self) -> bool {
        self.ledger.same_as(&other.ledger)
    }
}

impl<E: DomainEvent> Clone for TrackedAggregate<E> {
    fn clone(&self) -> Self {
        Self {
            aggregate_type: self.aggregate_type,
            aggregate_id: self.aggregate_id,
            ledger: self.ledger.share(),
        }
    }
}

impl<E: DomainEvent> std::fmt::Debug for TrackedAggregate<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrackedAggregate")
            .field("aggregate_type", &self.aggregate_type)
            .field("aggregate_id", &self.aggregate_id)
            .field("ledger", &self.ledger)
            .finish()
    }
}
