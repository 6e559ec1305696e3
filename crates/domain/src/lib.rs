//! Domain layer for the transactional event pipeline.
//!
//! This crate provides:
//! - [`AggregateRoot`] and the [`EventLedger`] every aggregate records into
//! - [`DomainEvent`] and its optional integration projection
//! - [`UnitOfWork`], which tracks the aggregates touched in one transaction
//! - [`EventMediator`], which routes events to registered handlers
//! - [`ApplicationService`], which ties them together around business logic

pub mod aggregate;
pub mod error;
pub mod event;
pub mod mediator;
pub mod service;
pub mod unit_of_work;

pub use aggregate::{AggregateRoot, EventLedger, TrackedAggregate};
pub use error::{ApplicationError, HandlerError};
pub use event::{DomainEvent, EventMetadata, IntegrationEvent, ProjectableEvent};
pub use mediator::{EventHandler, EventMediator};
pub use service::ApplicationService;
pub use unit_of_work::{UnitOfWork, UnitOfWorkState};
