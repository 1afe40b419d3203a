mod common;

use common::{CollectSink, FakeProxy, RejectSink, AGENT};
use fingerprint_harvester::sink::result_channel;
use fingerprint_harvester::{FingerprintResult, TickOutcome, Worker};

use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn tick_without_usable_proxies_emits_nothing() {
    let config = common::config();
    let (pool, _trigger, mut shutdown) = common::pool(&config, &[]);
    let (sender, receiver) = result_channel();
    let worker = Worker::new(0, pool, &config, sender).unwrap();

    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::NoProxy);
    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::NoProxy);

    drop(worker);
    assert_eq!(receiver.drain(&CollectSink::default()).await, 0);
}

#[tokio::test]
async fn tick_emits_fingerprint_with_proxy_address() {
    let fake = FakeProxy::start(r#"{"fingerprint":"fp-1"}"#).await;
    let config = common::config();
    let (pool, _trigger, mut shutdown) = common::pool(&config, &[fake.address.as_str()]);
    let (sender, receiver) = result_channel();
    let sink = Arc::new(CollectSink::default());
    let consumer = {
        let sink = Arc::clone(&sink);
        tokio::spawn(async move { receiver.drain(sink.as_ref()).await })
    };

    let worker = Worker::new(0, Arc::clone(&pool), &config, sender).unwrap();
    let expected = FingerprintResult {
        fingerprint: "fp-1".to_string(),
        proxy_address: fake.address.clone(),
    };
    assert_eq!(
        worker.tick(&mut shutdown).await,
        TickOutcome::Emitted(expected.clone())
    );

    drop(worker);
    assert_eq!(consumer.await.unwrap(), 1);
    assert_eq!(sink.results(), vec![expected]);

    let requests = fake.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].contains("/api/v8/experiments"));
    assert!(requests[0]
        .to_lowercase()
        .contains(&format!("user-agent: {}", AGENT.to_lowercase())));

    let proxy = pool.get(&fake.address).unwrap();
    assert_eq!(proxy.usage_count(), 1);
    assert_eq!(proxy.failure_count(), 0);
}

#[tokio::test]
async fn missing_fingerprint_fails_without_penalty() {
    let fake = FakeProxy::start(r#"{"assignments":[]}"#).await;
    let config = common::config();
    let (pool, _trigger, mut shutdown) = common::pool(&config, &[fake.address.as_str()]);
    let (sender, _receiver) = result_channel();
    let worker = Worker::new(0, Arc::clone(&pool), &config, sender).unwrap();

    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::Failed);
    assert_eq!(fake.hits(), 1);
    assert_eq!(pool.get(&fake.address).unwrap().failure_count(), 0);
    assert!(!pool.is_unhealthy(&fake.address));
}

#[tokio::test]
async fn transport_failures_mark_proxy_unhealthy() {
    let dead = common::dead_address().await;
    let config = common::config();
    let (pool, _trigger, mut shutdown) = common::pool(&config, &[dead.as_str()]);
    let (sender, _receiver) = result_channel();
    let worker = Worker::new(0, Arc::clone(&pool), &config, sender).unwrap();

    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::Failed);
    assert!(!pool.is_unhealthy(&dead));

    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::Failed);
    assert!(pool.is_unhealthy(&dead));
    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::NoProxy);
}

#[tokio::test]
async fn stalled_sink_blocks_emission() {
    let fake = FakeProxy::start(r#"{"fingerprint":"fp-1"}"#).await;
    let config = common::config();
    let (pool, _trigger, mut shutdown) = common::pool(&config, &[fake.address.as_str()]);
    let (sender, _receiver) = result_channel();
    let worker = Worker::new(0, pool, &config, sender).unwrap();

    let blocked = tokio::time::timeout(Duration::from_millis(300), worker.tick(&mut shutdown)).await;
    assert!(blocked.is_err());
    assert_eq!(fake.hits(), 1);
}

#[tokio::test]
async fn stalled_sink_stops_further_probes() {
    let fake = FakeProxy::start(r#"{"fingerprint":"fp-1"}"#).await;
    let config = common::config();
    let (pool, trigger, shutdown) = common::pool(&config, &[fake.address.as_str()]);
    let (sender, _receiver) = result_channel();
    let worker = Worker::new(0, pool, &config, sender).unwrap();

    let running = tokio::spawn(worker.run(shutdown));
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(fake.hits(), 1);

    trigger.trigger();
    tokio::time::timeout(Duration::from_secs(2), running)
        .await
        .expect("worker did not stop")
        .unwrap();
}

#[tokio::test]
async fn shutdown_discards_pending_result() {
    let fake = FakeProxy::start(r#"{"fingerprint":"fp-1"}"#).await;
    let config = common::config();
    let (pool, trigger, mut shutdown) = common::pool(&config, &[fake.address.as_str()]);
    let (sender, receiver) = result_channel();
    let worker = Worker::new(0, pool, &config, sender).unwrap();

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.trigger();
    });
    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::Discarded);

    // a consumer that shows up late must not see the dropped result
    drop(worker);
    let sink = CollectSink::default();
    assert_eq!(receiver.drain(&sink).await, 0);
    assert!(sink.results().is_empty());
}

#[tokio::test]
async fn rejected_result_is_not_reported_as_emitted() {
    let fake = FakeProxy::start(r#"{"fingerprint":"fp-1"}"#).await;
    let config = common::config();
    let (pool, _trigger, mut shutdown) = common::pool(&config, &[fake.address.as_str()]);
    let (sender, receiver) = result_channel();
    let consumer = tokio::spawn(async move { receiver.drain(&RejectSink).await });

    let worker = Worker::new(0, pool, &config, sender).unwrap();
    assert_eq!(worker.tick(&mut shutdown).await, TickOutcome::Failed);
    assert_eq!(fake.hits(), 1);

    drop(worker);
    assert_eq!(consumer.await.unwrap(), 0);
}

#[tokio::test]
async fn invalid_probe_url_is_rejected() {
    let config = fingerprint_harvester::HarvesterConfig::builder()
        .probe_url("not a url")
        .build();
    let (pool, _trigger, _shutdown) = common::pool(&config, &[]);
    let (sender, _receiver) = result_channel();
    assert!(Worker::new(0, pool, &config, sender).is_err());
}
