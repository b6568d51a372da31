//! Eventstage - staged event-sourcing persistence
//!
//! Domain code publishes payloads on a [`Mediator`]; a [`UnitOfWork`]
//! stages them per subject and, on commit, ships them to durable storage
//! with a per-subject conflict check and compensating rollback, then
//! broadcasts the shipped events on an [`EventStream`].

pub mod bus;
pub mod config;
pub mod event;
pub mod interfaces;
pub mod mediator;
pub mod registry;
pub mod retrieve;
pub mod stage;
pub mod storage;
pub mod unit_of_work;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_utils;

pub use event::{Event, EventData, Payload, Snapshot, SubjectId, Timestamp, Version};
pub use interfaces::{EventStore, EventStream, StoreError, StreamError, VersionSource};
pub use mediator::{Mediator, Publication};
pub use registry::PayloadRegistry;
pub use retrieve::RetrieveOptions;
pub use unit_of_work::{UnitOfWork, UnitOfWorkError};
