//! In-memory staging of uncommitted events.
//!
//! Each subject owns an ordered list of [`EventStage`] groups. Adding a
//! snapshot closes the trailing group and opens a new, empty one, so the
//! last group of a touched subject is always open and snapshot-less.

use std::collections::HashMap;

use crate::event::{Event, Snapshot, SubjectId};

/// A run of events bounded by a snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventStage {
    events: Vec<Event>,
    snapshot: Option<Snapshot>,
}

impl EventStage {
    /// An open group holding `events`, used for writes that bypass the stage.
    pub(crate) fn from_events(events: Vec<Event>) -> Self {
        Self {
            events,
            snapshot: None,
        }
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.snapshot.is_none()
    }
}

/// Per-subject buffer of events awaiting shipment.
#[derive(Debug, Default)]
pub struct Stage {
    subjects: HashMap<SubjectId, Vec<EventStage>>,
}

impl Stage {
    pub fn new() -> Self {
        Self::default()
    }

    fn groups_mut(&mut self, subject: &str) -> &mut Vec<EventStage> {
        let groups = self.subjects.entry(subject.to_string()).or_default();
        if groups.is_empty() {
            groups.push(EventStage::default());
        }
        groups
    }

    /// Append to the subject's open group.
    pub fn add_event(&mut self, event: Event) {
        let groups = self.groups_mut(&event.subject);
        if let Some(open) = groups.last_mut() {
            open.events.push(event);
        }
    }

    /// Close the subject's open group with `snapshot` and open a new one.
    pub fn add_snapshot(&mut self, snapshot: Snapshot) {
        let groups = self.groups_mut(&snapshot.subject);
        if let Some(open) = groups.last_mut() {
            open.snapshot = Some(snapshot);
        }
        groups.push(EventStage::default());
    }

    /// Reset the subject to a single open group. Untouched subjects are left alone.
    pub fn clear(&mut self, subject: &str) {
        if let Some(groups) = self.subjects.get_mut(subject) {
            *groups = vec![EventStage::default()];
        }
    }

    pub fn clear_all(&mut self) {
        self.subjects.clear();
    }

    pub fn has_subject(&self, subject: &str) -> bool {
        self.subjects.contains_key(subject)
    }

    /// True when the subject has neither events nor snapshots staged.
    pub fn is_empty(&self, subject: &str) -> bool {
        self.subjects
            .get(subject)
            .map_or(true, |groups| groups.iter().all(EventStage::is_empty))
    }

    /// True when no subject has anything staged.
    pub fn is_all_empty(&self) -> bool {
        self.subjects.keys().all(|subject| self.is_empty(subject))
    }

    /// True when the subject has at least one staged event.
    pub fn has_events(&self, subject: &str) -> bool {
        self.first_event(subject).is_some()
    }

    /// Subjects ever touched, sorted.
    pub fn subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<_> = self.subjects.keys().cloned().collect();
        subjects.sort();
        subjects
    }

    pub fn event_stages(&self, subject: &str) -> &[EventStage] {
        self.subjects
            .get(subject)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn first_event(&self, subject: &str) -> Option<&Event> {
        self.event_stages(subject)
            .iter()
            .find_map(|group| group.events.first())
    }

    pub fn latest_event(&self, subject: &str) -> Option<&Event> {
        self.event_stages(subject)
            .iter()
            .rev()
            .find_map(|group| group.events.last())
    }

    /// Snapshot closing the second-to-last group.
    pub fn latest_snapshot(&self, subject: &str) -> Option<&Snapshot> {
        let groups = self.event_stages(subject);
        groups
            .len()
            .checked_sub(2)
            .and_then(|idx| groups[idx].snapshot.as_ref())
    }

    /// Events staged for one subject in version order.
    pub fn subject_events(&self, subject: &str) -> Vec<Event> {
        self.event_stages(subject)
            .iter()
            .flat_map(|group| group.events.iter().cloned())
            .collect()
    }

    /// Every staged event, subject by subject.
    pub fn events(&self) -> Vec<Event> {
        self.subjects()
            .iter()
            .flat_map(|subject| self.subject_events(subject))
            .collect()
    }
}

#[cfg(test)]
mod tests;
