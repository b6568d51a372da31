//! Payload registry.
//!
//! Maps a stable payload tag to a decode function. Consumers that receive
//! events of many kinds (replay, stream subscribers) register each payload
//! type once at startup and decode by tag instead of guessing the type.

use std::any::Any;
use std::collections::HashMap;

use tracing::warn;

use crate::event::{Event, Payload};

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No payload registered for name {0}")]
    UnknownName(String),

    #[error("Failed to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Decoded {actual} where {expected} was requested")]
    NameMismatch { expected: String, actual: String },
}

type Decoder = fn(&serde_json::Value) -> std::result::Result<Box<dyn Any + Send>, serde_json::Error>;

fn decode_into<P: Payload>(
    value: &serde_json::Value,
) -> std::result::Result<Box<dyn Any + Send>, serde_json::Error> {
    let payload: P = serde_json::from_value(value.clone())?;
    Ok(Box::new(payload))
}

/// Registry of payload decoders keyed by tag.
#[derive(Default)]
pub struct PayloadRegistry {
    decoders: HashMap<&'static str, Decoder>,
}

impl PayloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `P` under `P::NAME`.
    ///
    /// A second registration for the same name replaces the first.
    pub fn register<P: Payload>(&mut self) -> &mut Self {
        if self.decoders.insert(P::NAME, decode_into::<P>).is_some() {
            warn!(name = P::NAME, "Payload decoder replaced");
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.decoders.contains_key(name)
    }

    /// Registered tags, sorted.
    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.decoders.keys().copied().collect();
        names.sort_unstable();
        names
    }

    /// Decode an event's payload using the decoder registered for its tag.
    pub fn decode(&self, event: &Event) -> Result<Box<dyn Any + Send>> {
        let decoder = self
            .decoders
            .get(event.name.as_str())
            .ok_or_else(|| RegistryError::UnknownName(event.name.clone()))?;

        decoder(&event.data).map_err(|source| RegistryError::Decode {
            name: event.name.clone(),
            source,
        })
    }

    /// Decode and downcast to a concrete payload type.
    pub fn decode_as<P: Payload>(&self, event: &Event) -> Result<P> {
        let decoded = self.decode(event)?;
        decoded
            .downcast::<P>()
            .map(|boxed| *boxed)
            .map_err(|_| RegistryError::NameMismatch {
                expected: P::NAME.to_string(),
                actual: event.name.clone(),
            })
    }
}

impl std::fmt::Debug for PayloadRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadRegistry")
            .field("names", &self.names())
            .finish()
    }
}
