//! Periodic probe workers.

use crate::config::HarvesterConfig;
use crate::error::{Error, Result};
use crate::pool::ProxyPool;
use crate::probe;
use crate::proxy::Proxy;
use crate::shutdown::Shutdown;
use crate::sink::{FingerprintResult, ResultSender};
use crate::utils;

use log::{debug, error, info, warn};
use reqwest::{Method, Request};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use url::Url;

/// What a single tick ended with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Every proxy was saturated or unhealthy.
    NoProxy,
    /// The probe failed, returned no fingerprint, or the sink rejected the
    /// result.
    Failed,
    /// The sink accepted the result.
    Emitted(FingerprintResult),
    /// Shutdown arrived while waiting for the sink, or the sink was gone; the
    /// result was dropped.
    Discarded,
}

/// Probes once per tick through a proxy taken from the pool.
pub struct Worker {
    id: usize,
    pool: Arc<ProxyPool>,
    probe_url: Url,
    period: Duration,
    results: ResultSender,
}

impl Worker {
    pub fn new(
        id: usize,
        pool: Arc<ProxyPool>,
        config: &HarvesterConfig,
        results: ResultSender,
    ) -> Result<Self> {
        let probe_url = Url::parse(&config.probe_url).map_err(|source| Error::InvalidProbeUrl {
            url: config.probe_url.clone(),
            source,
        })?;

        Ok(Self {
            id,
            pool,
            probe_url,
            period: config.tick_period,
            results,
        })
    }

    /// Tick until shutdown. The first tick fires one period after start.
    ///
    /// Ticks that come due while a probe is still running are skipped, so a
    /// worker never has two probes in flight.
    pub async fn run(self, mut shutdown: Shutdown) {
        let mut ticker = time::interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => {
                    info!("[worker {}] exiting", self.id);
                    break;
                }
                _ = ticker.tick() => {
                    debug!("[worker {}] handling", self.id);
                    let outcome = self.tick(&mut shutdown).await;
                    debug!("[worker {}] handled: {:?}", self.id, outcome);
                }
            }
        }
    }

    /// Run one probe and hand its result to the sink.
    pub async fn tick(&self, shutdown: &mut Shutdown) -> TickOutcome {
        let proxy = match self.pool.select() {
            Ok(proxy) => proxy,
            Err(e) => {
                debug!("[worker {}] {}", self.id, e);
                return TickOutcome::NoProxy;
            }
        };

        let trace = utils::trace_id();
        let fingerprint = match self.probe(&proxy, &trace).await {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                match e {
                    Error::Request(_) => warn!("[worker {}] [{}] proxy error: {}", self.id, trace, e),
                    _ => error!("[worker {}] [{}] {}", self.id, trace, e),
                }
                return TickOutcome::Failed;
            }
        };

        let result = FingerprintResult {
            fingerprint,
            proxy_address: proxy.address().to_string(),
        };

        tokio::select! {
            emitted = self.results.emit(result.clone()) => match emitted {
                Ok(()) => TickOutcome::Emitted(result),
                Err(Error::SinkClosed) => {
                    error!("[worker {}] [{}] {}", self.id, trace, Error::SinkClosed);
                    TickOutcome::Discarded
                }
                Err(e) => {
                    error!("[worker {}] [{}] result not stored: {}", self.id, trace, e);
                    TickOutcome::Failed
                }
            },
            _ = shutdown.wait() => {
                debug!("[worker {}] [{}] shutting down, dropping result", self.id, trace);
                TickOutcome::Discarded
            }
        }
    }

    async fn probe(&self, proxy: &Proxy, trace: &str) -> Result<String> {
        info!(
            "[worker {}] [{}] GET {} via {}",
            self.id,
            trace,
            self.probe_url.path(),
            proxy.address()
        );

        let request = Request::new(Method::GET, self.probe_url.clone());
        let response = proxy.execute(request).await?;
        debug!("[worker {}] [{}] response {}", self.id, trace, response.status());

        let body = response.bytes().await?;
        probe::decode_fingerprint(&body)
    }
}
