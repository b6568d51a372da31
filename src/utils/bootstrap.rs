//! Bootstrap utilities for eventstage binaries.
//!
//! Shared initialization: tracing, backend connection with retry, and
//! wiring a [`UnitOfWork`] from [`Config`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::warn;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::bus::{init_stream, EventStream};
use crate::config::{Config, LOG_ENV_VAR};
use crate::interfaces::EventStore;
use crate::mediator::Mediator;
use crate::storage::init_store;
use crate::unit_of_work::UnitOfWork;

pub type BootstrapError = Box<dyn std::error::Error + Send + Sync>;

/// Initialize tracing with the EVENTSTAGE_LOG environment variable.
///
/// Defaults to "info" level if EVENTSTAGE_LOG is not set.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Retry schedule for [`connect_with_retry`].
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Connect to a backend with exponential backoff retry.
///
/// # Arguments
/// * `backend` - Human-readable name for logging (e.g., "event store")
/// * `policy` - Attempt limit and delay bounds
/// * `connect` - Async function that attempts to establish a connection
///
/// # Returns
/// The connected value on success, or the last error after max attempts.
pub async fn connect_with_retry<T, E, F, Fut>(
    backend: &str,
    policy: RetryPolicy,
    connect: F,
) -> Result<T, E>
where
    E: std::fmt::Display,
    F: Fn() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut delay = policy.initial_delay;
    let mut attempt = 0;

    loop {
        attempt += 1;
        match connect().await {
            Ok(connected) => {
                tracing::info!(backend = %backend, attempt, "Connected");
                return Ok(connected);
            }
            Err(e) if attempt < policy.max_attempts => {
                warn!(
                    backend = %backend,
                    attempt,
                    max_attempts = policy.max_attempts,
                    error = %e,
                    retry_in = ?delay,
                    "Connection failed, retrying"
                );
                tokio::time::sleep(delay).await;
                delay = std::cmp::min(delay * 2, policy.max_delay);
            }
            Err(e) => {
                tracing::error!(
                    backend = %backend,
                    attempts = attempt,
                    error = %e,
                    "Connection failed, giving up"
                );
                return Err(e);
            }
        }
    }
}

/// Build the store, optional stream and mediator described by `config` and
/// join them in a unit of work.
pub async fn build_unit_of_work(
    config: &Config,
    policy: RetryPolicy,
) -> Result<UnitOfWork, BootstrapError> {
    let store: Arc<dyn EventStore> =
        connect_with_retry("event store", policy, || init_store(&config.storage)).await?;

    let stream: Option<Arc<dyn EventStream>> = match &config.messaging {
        Some(messaging) => {
            Some(connect_with_retry("event stream", policy, || init_stream(messaging)).await?)
        }
        None => None,
    };

    let mediator = Arc::new(Mediator::new());
    Ok(UnitOfWork::new(store, stream, mediator, config.producer.clone()).await)
}
