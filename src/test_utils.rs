//! Test utilities and sample payloads.
//!
//! Shared by unit tests across modules so each test builds events the
//! same way.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::event::{Event, Payload, Snapshot};
use crate::interfaces::event_store::{Result, StoreError, VersionSource};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub owner: String,
}

impl AccountOpened {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
        }
    }
}

impl Payload for AccountOpened {
    const NAME: &'static str = "AccountOpened";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deposited {
    pub amount: u64,
}

impl Payload for Deposited {
    const NAME: &'static str = "Deposited";
}

pub fn sample_event(subject: &str, version: u64) -> Event {
    Event {
        id: format!("{subject}-event-{version}"),
        producer: "test-producer".to_string(),
        subject: subject.to_string(),
        version,
        schema_version: 0,
        snapshot_version: 0,
        name: Deposited::NAME.to_string(),
        timestamp: 1_000 + version as i64,
        data: json!({"amount": version}),
    }
}

pub fn sample_snapshot(subject: &str, version: u64) -> Snapshot {
    Snapshot {
        id: format!("{subject}-snapshot-{version}"),
        producer: "test-producer".to_string(),
        subject: subject.to_string(),
        version,
        schema_version: 0,
        name: "Balance".to_string(),
        timestamp: 2_000 + version as i64,
        data: json!({"balance": version * 10}),
    }
}

/// Version source answering with fixed values.
#[derive(Debug, Default)]
pub struct FixedSource {
    pub event: Option<Event>,
    pub snapshot: Option<Snapshot>,
    pub fail: bool,
}

#[async_trait]
impl VersionSource for FixedSource {
    async fn latest_event(&self, subject: &str) -> Result<Event> {
        if self.fail {
            return Err(StoreError::Insertion("lookup failed".to_string()));
        }
        self.event.clone().ok_or_else(|| StoreError::NoEvents {
            subject: subject.to_string(),
        })
    }

    async fn latest_snapshot(&self, subject: &str) -> Result<Snapshot> {
        if self.fail {
            return Err(StoreError::Insertion("lookup failed".to_string()));
        }
        self.snapshot.clone().ok_or_else(|| StoreError::NoSnapshots {
            subject: subject.to_string(),
        })
    }
}
