use super::*;
use crate::test_utils::{AccountOpened, Deposited};
use std::sync::Mutex;
use std::time::Duration;

type Log = Arc<Mutex<Vec<String>>>;

fn recorder(log: &Log, label: &'static str) -> impl Listener + 'static {
    let log = Arc::clone(log);
    move |publication: Arc<Publication>| {
        let log = Arc::clone(&log);
        async move {
            log.lock()
                .unwrap()
                .push(format!("{label}:{}", publication.subject));
            Ok::<(), ListenerError>(())
        }
    }
}

#[tokio::test]
async fn test_publish_routes_by_topic() {
    let mediator = Mediator::new();
    let log: Log = Arc::default();
    mediator
        .listen_to(AccountOpened::NAME, recorder(&log, "opened"))
        .await;
    mediator
        .listen_to(Deposited::NAME, recorder(&log, "deposited"))
        .await;

    mediator
        .publish("acct-1", &AccountOpened::new("dave"))
        .await
        .unwrap();

    assert_eq!(*log.lock().unwrap(), vec!["opened:acct-1".to_string()]);
}

#[tokio::test]
async fn test_topic_listeners_run_before_universal() {
    let mediator = Mediator::new();
    let log: Log = Arc::default();
    mediator.listen(recorder(&log, "universal-1")).await;
    mediator
        .listen_to(Deposited::NAME, recorder(&log, "topic-1"))
        .await;
    mediator.listen(recorder(&log, "universal-2")).await;
    mediator
        .listen_to(Deposited::NAME, recorder(&log, "topic-2"))
        .await;

    mediator
        .publish("acct-1", &Deposited { amount: 3 })
        .await
        .unwrap();

    assert_eq!(
        *log.lock().unwrap(),
        vec![
            "topic-1:acct-1".to_string(),
            "topic-2:acct-1".to_string(),
            "universal-1:acct-1".to_string(),
            "universal-2:acct-1".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_listener_error_propagates() {
    let mediator = Mediator::new();
    let log: Log = Arc::default();
    mediator
        .listen(|_publication: Arc<Publication>| async {
            Err::<(), ListenerError>("rejected".into())
        })
        .await;
    mediator.listen(recorder(&log, "after")).await;

    let err = mediator
        .publish("acct-1", &Deposited { amount: 3 })
        .await
        .unwrap_err();

    assert!(matches!(err, MediatorError::Listener { ref topic, .. } if topic == Deposited::NAME));
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_channel_receives_publication() {
    let mediator = Arc::new(Mediator::new());
    let mut topic_rx = mediator.channel_to(Deposited::NAME).await;
    let mut all_rx = mediator.channel().await;

    let publisher = Arc::clone(&mediator);
    let handle = tokio::spawn(async move {
        publisher
            .publish("acct-1", &Deposited { amount: 9 })
            .await
            .unwrap();
    });

    let from_topic = topic_rx.recv().await.unwrap();
    let from_all = all_rx.recv().await.unwrap();
    handle.await.unwrap();

    assert_eq!(from_topic.subject, "acct-1");
    assert_eq!(from_all.topic(), Deposited::NAME);
    assert_eq!(from_all.data.data, serde_json::json!({"amount": 9}));
}

#[tokio::test]
async fn test_dropped_connector_is_skipped() {
    let mediator = Mediator::new();
    let log: Log = Arc::default();
    drop(mediator.channel().await);
    mediator.listen(recorder(&log, "listener")).await;

    mediator
        .publish("acct-1", &Deposited { amount: 1 })
        .await
        .unwrap();

    assert_eq!(log.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_publish_waits_until_connector_takes_publication() {
    let mediator = Arc::new(Mediator::new());
    let mut rx = mediator.channel().await;

    let publisher = Arc::clone(&mediator);
    let mut handle = tokio::spawn(async move {
        publisher
            .publish("acct-1", &Deposited { amount: 4 })
            .await
    });

    let pending = tokio::time::timeout(Duration::from_millis(100), &mut handle).await;
    assert!(pending.is_err());

    let publication = rx.recv().await.unwrap();
    handle.await.unwrap().unwrap();
    assert_eq!(publication.subject, "acct-1");
}

#[tokio::test]
async fn test_publish_resumes_when_waiting_receiver_is_dropped() {
    let mediator = Arc::new(Mediator::new());
    let rx = mediator.channel_to(Deposited::NAME).await;

    let publisher = Arc::clone(&mediator);
    let handle = tokio::spawn(async move {
        publisher
            .publish("acct-1", &Deposited { amount: 4 })
            .await
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    drop(rx);

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(mediator.connector_count().await, 0);
}

#[tokio::test]
async fn test_dropped_connectors_are_pruned() {
    let mediator = Mediator::new();
    drop(mediator.channel().await);
    drop(mediator.channel_to(Deposited::NAME).await);
    assert_eq!(mediator.connector_count().await, 2);

    mediator
        .publish("acct-1", &Deposited { amount: 1 })
        .await
        .unwrap();

    assert_eq!(mediator.connector_count().await, 0);
}

#[tokio::test]
async fn test_publish_rejects_nil_data() {
    let mediator = Mediator::new();

    let err = mediator
        .publish_data("acct-1", EventData::new("Empty", serde_json::Value::Null))
        .await
        .unwrap_err();

    assert!(matches!(err, MediatorError::NilData));
}
