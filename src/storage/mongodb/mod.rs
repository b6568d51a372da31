//! MongoDB warehouse.
//!
//! Each document wraps one record under a single top-level key:
//! `{ "event": { ... } }` in the events collection and
//! `{ "snapshot": { ... } }` in the snapshots collection. Queries filter and
//! sort on fields inside that wrapper (`event.subject`, `event.version`, ...).

mod warehouse;

pub use warehouse::MongoWarehouse;

/// Wrapper keys.
pub(crate) const EVENT_KEY: &str = "event";
pub(crate) const SNAPSHOT_KEY: &str = "snapshot";

/// Field paths inside the wrappers.
pub(crate) const EVENT_SUBJECT: &str = "event.subject";
pub(crate) const EVENT_PRODUCER: &str = "event.producer";
pub(crate) const EVENT_VERSION: &str = "event.version";
pub(crate) const EVENT_SNAPSHOT_VERSION: &str = "event.snapshotVersion";
pub(crate) const EVENT_TIMESTAMP: &str = "event.timestamp";
pub(crate) const SNAPSHOT_SUBJECT: &str = "snapshot.subject";
pub(crate) const SNAPSHOT_VERSION: &str = "snapshot.version";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_paths_match_wire_names() {
        let event = crate::test_utils::sample_event("acct-1", 0);
        let value = serde_json::to_value(&event).unwrap();

        for path in [
            EVENT_SUBJECT,
            EVENT_PRODUCER,
            EVENT_VERSION,
            EVENT_SNAPSHOT_VERSION,
            EVENT_TIMESTAMP,
        ] {
            let field = path.trim_start_matches("event.");
            assert!(value.get(field).is_some(), "missing field {field}");
        }
        assert!(EVENT_SUBJECT.starts_with(EVENT_KEY));
        assert!(SNAPSHOT_SUBJECT.starts_with(SNAPSHOT_KEY));
        assert!(SNAPSHOT_VERSION.starts_with(SNAPSHOT_KEY));
    }
}
