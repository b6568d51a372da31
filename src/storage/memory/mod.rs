//! In-memory warehouse.
//!
//! Keeps both collections in process and mirrors the MongoDB unique
//! indexes on (subject, version). Failure injection makes ship and
//! rollback paths testable without a database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{Warehouse, EVENTS_COLLECTION, SNAPSHOTS_COLLECTION};
use crate::event::{Event, Snapshot, Version};
use crate::interfaces::event_store::{Result, StoreError};
use crate::retrieve::EventQuery;

/// Session marker. The memory warehouse applies writes immediately.
#[derive(Debug, Default)]
pub struct MemorySession;

#[derive(Default)]
struct Collections {
    next_id: u64,
    events: BTreeMap<u64, Event>,
    snapshots: BTreeMap<u64, Snapshot>,
}

impl Collections {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Warehouse backed by in-process maps.
#[derive(Default)]
pub struct MemoryWarehouse {
    collections: RwLock<Collections>,
    /// Remaining inserts before every insert fails.
    fail_on_insert_after: RwLock<Option<usize>>,
    fail_on_delete: RwLock<bool>,
    fail_on_read: RwLock<bool>,
    sessions_started: AtomicUsize,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Let `remaining` more inserts succeed, then fail every insert.
    pub async fn set_fail_on_insert_after(&self, remaining: usize) {
        *self.fail_on_insert_after.write().await = Some(remaining);
    }

    pub async fn clear_fail_on_insert(&self) {
        *self.fail_on_insert_after.write().await = None;
    }

    pub async fn set_fail_on_delete(&self, fail: bool) {
        *self.fail_on_delete.write().await = fail;
    }

    pub async fn set_fail_on_read(&self, fail: bool) {
        *self.fail_on_read.write().await = fail;
    }

    pub fn sessions_started(&self) -> usize {
        self.sessions_started.load(Ordering::SeqCst)
    }

    pub async fn event_count(&self) -> usize {
        self.collections.read().await.events.len()
    }

    pub async fn snapshot_count(&self) -> usize {
        self.collections.read().await.snapshots.len()
    }

    async fn check_insert(&self) -> Result<()> {
        let mut budget = self.fail_on_insert_after.write().await;
        match budget.as_mut() {
            Some(0) => Err(StoreError::Insertion(
                "injected insert failure".to_string(),
            )),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    async fn check_read(&self) -> Result<()> {
        if *self.fail_on_read.read().await {
            return Err(StoreError::MalformedDocument(
                "injected read failure".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    type Session = MemorySession;
    type DocumentId = u64;

    async fn start_session(&self) -> Result<MemorySession> {
        self.sessions_started.fetch_add(1, Ordering::SeqCst);
        Ok(MemorySession)
    }

    async fn insert_event(&self, _session: &mut MemorySession, event: &Event) -> Result<u64> {
        self.check_insert().await?;
        let mut collections = self.collections.write().await;
        let duplicate = collections
            .events
            .values()
            .any(|e| e.subject == event.subject && e.version == event.version);
        if duplicate {
            return Err(StoreError::Insertion(format!(
                "duplicate key: subject {} version {}",
                event.subject, event.version
            )));
        }
        let id = collections.allocate();
        collections.events.insert(id, event.clone());
        Ok(id)
    }

    async fn insert_snapshot(
        &self,
        _session: &mut MemorySession,
        snapshot: &Snapshot,
    ) -> Result<u64> {
        self.check_insert().await?;
        let mut collections = self.collections.write().await;
        let duplicate = collections
            .snapshots
            .values()
            .any(|s| s.subject == snapshot.subject && s.version == snapshot.version);
        if duplicate {
            return Err(StoreError::Insertion(format!(
                "duplicate key: subject {} snapshot {}",
                snapshot.subject, snapshot.version
            )));
        }
        let id = collections.allocate();
        collections.snapshots.insert(id, snapshot.clone());
        Ok(id)
    }

    async fn delete_documents(
        &self,
        _session: &mut MemorySession,
        collection: &str,
        ids: &[u64],
    ) -> Result<()> {
        if *self.fail_on_delete.read().await {
            return Err(StoreError::Deletion("injected delete failure".to_string()));
        }
        let mut collections = self.collections.write().await;
        match collection {
            EVENTS_COLLECTION => ids.iter().for_each(|id| {
                collections.events.remove(id);
            }),
            SNAPSHOTS_COLLECTION => ids.iter().for_each(|id| {
                collections.snapshots.remove(id);
            }),
            other => {
                return Err(StoreError::Deletion(format!("unknown collection {other}")));
            }
        }
        Ok(())
    }

    async fn tail_version(
        &self,
        _session: &mut MemorySession,
        subject: &str,
    ) -> Result<Option<Version>> {
        Ok(self.latest_event(subject).await?.map(|e| e.version))
    }

    async fn latest_event(&self, subject: &str) -> Result<Option<Event>> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .events
            .values()
            .filter(|e| e.subject == subject)
            .max_by_key(|e| e.version)
            .cloned())
    }

    async fn latest_snapshot(&self, subject: &str) -> Result<Option<Snapshot>> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        Ok(collections
            .snapshots
            .values()
            .filter(|s| s.subject == subject)
            .max_by_key(|s| s.version)
            .cloned())
    }

    async fn find_events(&self, query: &EventQuery) -> Result<Vec<Event>> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        let mut events: Vec<Event> = collections
            .events
            .values()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        events.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then_with(|| a.subject.cmp(&b.subject))
        });
        Ok(events)
    }

    async fn find_snapshots(&self, subject: &str) -> Result<Vec<Snapshot>> {
        self.check_read().await?;
        let collections = self.collections.read().await;
        let mut snapshots: Vec<Snapshot> = collections
            .snapshots
            .values()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect();
        snapshots.sort_by_key(|s| s.version);
        Ok(snapshots)
    }

    fn events_collection(&self) -> &str {
        EVENTS_COLLECTION
    }

    fn snapshots_collection(&self) -> &str {
        SNAPSHOTS_COLLECTION
    }
}

#[cfg(test)]
mod tests;
