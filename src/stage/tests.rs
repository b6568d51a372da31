use super::*;
use crate::test_utils::{sample_event, sample_snapshot};

#[test]
fn test_add_event_creates_open_group() {
    let mut stage = Stage::new();

    stage.add_event(sample_event("acct-1", 0));

    assert_eq!(stage.event_stages("acct-1").len(), 1);
    assert_eq!(stage.event_stages("acct-1")[0].events().len(), 1);
    assert!(stage.has_subject("acct-1"));
    assert!(!stage.is_empty("acct-1"));
}

#[test]
fn test_snapshot_closes_group() {
    let mut stage = Stage::new();
    stage.add_event(sample_event("acct-1", 0));
    stage.add_event(sample_event("acct-1", 1));
    stage.add_snapshot(sample_snapshot("acct-1", 1));
    stage.add_event(sample_event("acct-1", 2));

    let groups = stage.event_stages("acct-1");
    assert_eq!(groups.len(), 2);
    assert_eq!(groups[0].events().len(), 2);
    assert_eq!(groups[0].snapshot().map(|s| s.version), Some(1));
    assert_eq!(groups[1].events().len(), 1);
    assert!(groups[1].snapshot().is_none());
}

#[test]
fn test_latest_snapshot_is_second_to_last_group() {
    let mut stage = Stage::new();
    assert!(stage.latest_snapshot("acct-1").is_none());

    stage.add_snapshot(sample_snapshot("acct-1", 1));
    stage.add_snapshot(sample_snapshot("acct-1", 2));

    assert_eq!(stage.latest_snapshot("acct-1").map(|s| s.version), Some(2));
    assert_eq!(stage.event_stages("acct-1").len(), 3);
}

#[test]
fn test_first_and_latest_event_span_groups() {
    let mut stage = Stage::new();
    stage.add_snapshot(sample_snapshot("acct-1", 1));
    stage.add_event(sample_event("acct-1", 3));
    stage.add_snapshot(sample_snapshot("acct-1", 2));
    stage.add_event(sample_event("acct-1", 4));
    stage.add_snapshot(sample_snapshot("acct-1", 3));

    assert_eq!(stage.first_event("acct-1").map(|e| e.version), Some(3));
    assert_eq!(stage.latest_event("acct-1").map(|e| e.version), Some(4));
}

#[test]
fn test_clear_resets_subject() {
    let mut stage = Stage::new();
    stage.add_event(sample_event("acct-1", 0));
    stage.add_snapshot(sample_snapshot("acct-1", 1));
    stage.add_event(sample_event("acct-2", 0));

    stage.clear("acct-1");

    assert!(stage.is_empty("acct-1"));
    assert_eq!(stage.event_stages("acct-1").len(), 1);
    assert!(stage.latest_snapshot("acct-1").is_none());
    assert!(!stage.is_empty("acct-2"));
}

#[test]
fn test_clear_unknown_subject_is_noop() {
    let mut stage = Stage::new();

    stage.clear("acct-9");

    assert!(!stage.has_subject("acct-9"));
    assert!(stage.is_all_empty());
}

#[test]
fn test_snapshot_only_subject_is_not_empty() {
    let mut stage = Stage::new();

    stage.add_snapshot(sample_snapshot("acct-1", 1));

    assert!(!stage.is_empty("acct-1"));
    assert!(!stage.has_events("acct-1"));
    assert!(!stage.is_all_empty());
}

#[test]
fn test_events_flatten_in_version_order_per_subject() {
    let mut stage = Stage::new();
    stage.add_event(sample_event("b", 0));
    stage.add_event(sample_event("a", 0));
    stage.add_event(sample_event("a", 1));
    stage.add_snapshot(sample_snapshot("a", 1));
    stage.add_event(sample_event("a", 2));

    let events = stage.events();
    let keys: Vec<_> = events
        .iter()
        .map(|e| (e.subject.as_str(), e.version))
        .collect();

    assert_eq!(keys, vec![("a", 0), ("a", 1), ("a", 2), ("b", 0)]);
    assert_eq!(stage.subjects(), vec!["a".to_string(), "b".to_string()]);
}

#[test]
fn test_clear_all_drops_subjects() {
    let mut stage = Stage::new();
    stage.add_event(sample_event("a", 0));

    stage.clear_all();

    assert!(stage.subjects().is_empty());
    assert!(stage.is_all_empty());
}
