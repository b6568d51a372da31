//! Abstract interfaces for eventstage components.
//!
//! These traits define the contracts for:
//! - Event storage (staging, shipping, replay)
//! - Version lookup (used by the event and snapshot factories)
//! - Event streams (broker fan-out after shipping)
//!
//! The unit of work depends only on these seams, so any conforming
//! implementation (a different database or broker) can be substituted.

pub mod event_store;
pub mod event_stream;

pub use event_store::{EventStore, StoreError, VersionSource};
pub use event_stream::{EventStream, StreamError};
