//! eventstage-staging: end-to-end staging walkthrough
//!
//! Publishes a short account history through the mediator, snapshots it,
//! commits the unit of work and replays what was stored.
//!
//! ## Flow
//! ```text
//! Mediator.publish --> UnitOfWork listener --> Stage
//!                                                |
//!                             commit: ship ------+--> warehouse
//!                                                +--> event stream
//! ```
//!
//! ## Configuration
//! - EVENTSTAGE_CONFIG: Path to a YAML config file (optional)
//! - EVENTSTAGE__STORAGE__TYPE: `mongodb` or `memory`
//! - EVENTSTAGE_SUBJECT: Subject to write (default: random)
//! - EVENTSTAGE_LOG: Log filter (default: info)

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

use eventstage::bus::cancellation;
use eventstage::config::Config;
use eventstage::event::EventData;
use eventstage::utils::bootstrap::{build_unit_of_work, init_tracing, RetryPolicy};
use eventstage::{Payload, PayloadRegistry};

#[derive(Debug, Serialize, Deserialize)]
struct AccountOpened {
    owner: String,
}

impl Payload for AccountOpened {
    const NAME: &'static str = "AccountOpened";
}

#[derive(Debug, Serialize, Deserialize)]
struct Deposited {
    amount: u64,
}

impl Payload for Deposited {
    const NAME: &'static str = "Deposited";
}

#[derive(Debug, Serialize, Deserialize)]
struct Withdrawn {
    amount: u64,
}

impl Payload for Withdrawn {
    const NAME: &'static str = "Withdrawn";
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();

    let config = Config::load(None)?;
    let subject = std::env::var("EVENTSTAGE_SUBJECT")
        .unwrap_or_else(|_| format!("account-{}", uuid::Uuid::new_v4()));

    let uow = build_unit_of_work(&config, RetryPolicy::default()).await?;
    info!(subject = %subject, producer = %uow.producer(), "eventstage-staging started");

    // Watch the stream so the broadcast is visible in the logs
    let mut cancel_handle = None;
    let mut watcher = None;
    if let (Some(stream), Some(messaging)) = (uow.stream(), &config.messaging) {
        let (handle, cancel) = cancellation();
        match stream.subscribe(&messaging.topic, cancel).await {
            Ok(mut subscription) => {
                watcher = Some(tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            Some(event) = subscription.events.recv() => {
                                info!(subject = %event.subject, version = event.version, name = %event.name, "Broadcast received");
                            }
                            Some(error) = subscription.errors.recv() => {
                                warn!(error = %error, "Subscription error");
                            }
                            else => break,
                        }
                    }
                }));
                cancel_handle = Some(handle);
            }
            Err(e) => warn!(error = %e, "Not watching the event stream"),
        }
    }

    let mediator = uow.mediator();
    mediator
        .publish(&subject, &AccountOpened { owner: "erin".to_string() })
        .await?;
    mediator.publish(&subject, &Deposited { amount: 100 }).await?;
    mediator.publish(&subject, &Withdrawn { amount: 30 }).await?;

    let snapshot = uow
        .store()
        .snapshot(
            uow.producer(),
            &subject,
            EventData::new("Balance", json!({ "balance": 70 })),
        )
        .await?;
    info!(version = snapshot.version, "Snapshot staged");

    mediator.publish(&subject, &Deposited { amount: 5 }).await?;

    let shipped = uow.commit().await?;
    info!(count = shipped.len(), "Committed");

    let mut registry = PayloadRegistry::new();
    registry
        .register::<AccountOpened>()
        .register::<Deposited>()
        .register::<Withdrawn>();

    for event in uow.store().concerning(&subject).await? {
        let payload = registry.decode(&event)?;
        if let Some(deposit) = payload.downcast_ref::<Deposited>() {
            info!(version = event.version, amount = deposit.amount, "Replayed deposit");
        } else if let Some(withdrawal) = payload.downcast_ref::<Withdrawn>() {
            info!(version = event.version, amount = withdrawal.amount, "Replayed withdrawal");
        } else {
            info!(version = event.version, name = %event.name, "Replayed event");
        }
    }

    let since_snapshot = uow.store().with(&subject, snapshot.version).await?;
    info!(
        snapshot_version = snapshot.version,
        events = since_snapshot.len(),
        "Events to apply on top of latest snapshot"
    );

    if let Some(handle) = cancel_handle {
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        handle.cancel();
    }
    if let Some(watcher) = watcher {
        let _ = watcher.await;
    }

    Ok(())
}
