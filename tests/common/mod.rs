#![allow(dead_code)]

use fingerprint_harvester::{
    shutdown, Error, FingerprintResult, HarvesterConfig, ProxyPool, Result, ResultSink, Shutdown,
    ShutdownTrigger, StaticSource,
};

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

pub const PROBE_URL: &str = "http://probe.test/api/v8/experiments";
pub const AGENT: &str = "harvester-test-agent/1.0";

/// A forward proxy that answers every request with the same json body.
pub struct FakeProxy {
    pub address: String,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl FakeProxy {
    pub async fn start(body: &'static str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let hits = Arc::new(AtomicUsize::new(0));
        let requests = Arc::new(Mutex::new(Vec::new()));

        let (task_hits, task_requests) = (Arc::clone(&hits), Arc::clone(&requests));
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                let hits = Arc::clone(&task_hits);
                let requests = Arc::clone(&task_requests);
                tokio::spawn(async move {
                    let mut head = Vec::new();
                    let mut chunk = [0u8; 1024];
                    loop {
                        let n = stream.read(&mut chunk).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        head.extend_from_slice(&chunk[..n]);
                        if head.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    requests.lock().push(String::from_utf8_lossy(&head).into_owned());
                    hits.fetch_add(1, Ordering::SeqCst);

                    let response = format!(
                        "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = stream.write_all(response.as_bytes()).await;
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            address,
            hits,
            requests,
        }
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }
}

/// An address nothing listens on.
pub async fn dead_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);
    address
}

pub fn config() -> HarvesterConfig {
    HarvesterConfig::builder()
        .probe_url(PROBE_URL)
        .tick_period(Duration::from_millis(20))
        .request_timeout(Duration::from_secs(5))
        .build()
}

pub fn pool(config: &HarvesterConfig, addresses: &[&str]) -> (Arc<ProxyPool>, ShutdownTrigger, Shutdown) {
    let (trigger, shutdown) = shutdown::channel();
    let pool = ProxyPool::new(config, Arc::new(StaticSource::new(vec![AGENT])), shutdown.clone());
    pool.initialize(addresses.iter().map(|a| a.to_string()).collect());
    (Arc::new(pool), trigger, shutdown)
}

/// Keeps every accepted result.
#[derive(Default)]
pub struct CollectSink {
    results: Mutex<Vec<FingerprintResult>>,
}

impl CollectSink {
    pub fn results(&self) -> Vec<FingerprintResult> {
        self.results.lock().clone()
    }
}

#[async_trait]
impl ResultSink for CollectSink {
    async fn accept(&self, result: FingerprintResult) -> Result<()> {
        self.results.lock().push(result);
        Ok(())
    }
}

/// Refuses every result, like a sink whose storage has gone away.
pub struct RejectSink;

#[async_trait]
impl ResultSink for RejectSink {
    async fn accept(&self, _result: FingerprintResult) -> Result<()> {
        Err(Error::Io(std::io::Error::other("storage unavailable")))
    }
}
