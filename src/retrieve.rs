//! Range filters for event reads.

use crate::event::{Event, Timestamp, Version};
use crate::interfaces::event_store::{Result, StoreError};

/// Optional inclusive bounds on version and timestamp.
///
/// Each setter rejects a bound that would cross its counterpart, so a
/// constructed value never describes an empty range by accident.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetrieveOptions {
    pub min_version: Option<Version>,
    pub max_version: Option<Version>,
    pub min_timestamp: Option<Timestamp>,
    pub max_timestamp: Option<Timestamp>,
}

impl RetrieveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_min_version(&mut self, version: Version) -> Result<()> {
        if matches!(self.max_version, Some(max) if version > max) {
            return Err(StoreError::InvalidOptions(
                "min version cannot be greater than the max".to_string(),
            ));
        }
        self.min_version = Some(version);
        Ok(())
    }

    pub fn set_max_version(&mut self, version: Version) -> Result<()> {
        if matches!(self.min_version, Some(min) if version < min) {
            return Err(StoreError::InvalidOptions(
                "max version cannot be less than the min".to_string(),
            ));
        }
        self.max_version = Some(version);
        Ok(())
    }

    pub fn set_min_timestamp(&mut self, timestamp: Timestamp) -> Result<()> {
        if matches!(self.max_timestamp, Some(max) if timestamp > max) {
            return Err(StoreError::InvalidOptions(
                "min timestamp cannot be greater than the max".to_string(),
            ));
        }
        self.min_timestamp = Some(timestamp);
        Ok(())
    }

    pub fn set_max_timestamp(&mut self, timestamp: Timestamp) -> Result<()> {
        if matches!(self.min_timestamp, Some(min) if timestamp < min) {
            return Err(StoreError::InvalidOptions(
                "max timestamp cannot be less than the min".to_string(),
            ));
        }
        self.max_timestamp = Some(timestamp);
        Ok(())
    }

    /// Versions in `[from, to]`.
    pub fn versions(from: Version, to: Version) -> Result<Self> {
        let mut options = Self::new();
        options.set_min_version(from)?;
        options.set_max_version(to)?;
        Ok(options)
    }

    /// Timestamps in `[from, to]`.
    pub fn timestamps(from: Timestamp, to: Timestamp) -> Result<Self> {
        let mut options = Self::new();
        options.set_min_timestamp(from)?;
        options.set_max_timestamp(to)?;
        Ok(options)
    }

    /// Timestamps strictly before `point_in_time`.
    pub fn before(point_in_time: Timestamp) -> Self {
        Self {
            max_timestamp: Some(point_in_time.saturating_sub(1)),
            ..Self::default()
        }
    }

    /// Timestamps strictly after `point_in_time`.
    pub fn after(point_in_time: Timestamp) -> Self {
        Self {
            min_timestamp: Some(point_in_time.saturating_add(1)),
            ..Self::default()
        }
    }

    /// Fold several option sets into one; later bounds overwrite earlier ones.
    ///
    /// Fails if any overwrite would cross the opposite bound.
    pub fn merge<'a>(options: impl IntoIterator<Item = &'a RetrieveOptions>) -> Result<Self> {
        let mut merged = Self::new();
        for opt in options {
            if let Some(v) = opt.min_version {
                merged.set_min_version(v)?;
            }
            if let Some(v) = opt.max_version {
                merged.set_max_version(v)?;
            }
            if let Some(t) = opt.min_timestamp {
                merged.set_min_timestamp(t)?;
            }
            if let Some(t) = opt.max_timestamp {
                merged.set_max_timestamp(t)?;
            }
        }
        Ok(merged)
    }

    pub fn is_unbounded(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.min_version.map_or(true, |min| event.version >= min)
            && self.max_version.map_or(true, |max| event.version <= max)
            && self.min_timestamp.map_or(true, |min| event.timestamp >= min)
            && self.max_timestamp.map_or(true, |max| event.timestamp <= max)
    }
}

/// A read against the events collection.
///
/// Every field narrows the result; `None` leaves that dimension open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventQuery {
    pub subject: Option<String>,
    pub producer: Option<String>,
    pub snapshot_version: Option<Version>,
    pub options: RetrieveOptions,
}

impl EventQuery {
    pub fn subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            ..Self::default()
        }
    }

    pub fn producer(producer: impl Into<String>) -> Self {
        Self {
            producer: Some(producer.into()),
            ..Self::default()
        }
    }

    pub fn with_snapshot_version(mut self, version: Version) -> Self {
        self.snapshot_version = Some(version);
        self
    }

    pub fn with_options(mut self, options: RetrieveOptions) -> Self {
        self.options = options;
        self
    }

    pub fn matches(&self, event: &Event) -> bool {
        self.subject.as_ref().map_or(true, |s| &event.subject == s)
            && self.producer.as_ref().map_or(true, |p| &event.producer == p)
            && self
                .snapshot_version
                .map_or(true, |v| event.snapshot_version == v)
            && self.options.matches(event)
    }
}
