//! A single forward proxy and its usage/failure state machine.

use crate::config::Thresholds;
use crate::error::{Error, Result, SaturationBreach};
use crate::pool::Membership;
use crate::shutdown::Shutdown;
use crate::utils;

use log::{debug, warn};
use parking_lot::Mutex;
use reqwest::header::{HeaderValue, USER_AGENT};
use std::sync::{Arc, Weak};
use std::time::Duration;

#[derive(Debug, Default)]
struct Counters {
    used: u8,
    failed: u8,
}

/// One upstream forward proxy bound to a single user agent.
///
/// Usage is charged by the pool when the proxy is selected. Failures are
/// charged by [`Proxy::execute`] when the request itself fails. Crossing a
/// limit excludes the proxy from selection and arms a one-shot timer that
/// lifts the exclusion once its window has passed.
pub struct Proxy {
    address: String,
    user_agent: String,
    client: reqwest::Client,
    thresholds: Thresholds,
    counters: Arc<Mutex<Counters>>,
    membership: Weak<Membership>,
    shutdown: Shutdown,
}

impl std::fmt::Debug for Proxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counters = self.counters.lock();
        f.debug_struct("Proxy")
            .field("address", &self.address)
            .field("user_agent", &self.user_agent)
            .field("used", &counters.used)
            .field("failed", &counters.failed)
            .finish()
    }
}

impl Proxy {
    pub(crate) fn new(
        address: String,
        user_agent: String,
        thresholds: Thresholds,
        timeout: Duration,
        membership: Weak<Membership>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let url = utils::proxy_url(&address)?;
        let client_error = |source| Error::Client {
            address: address.clone(),
            source,
        };

        let proxy = reqwest::Proxy::all(url.as_str()).map_err(client_error)?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(timeout)
            .build()
            .map_err(client_error)?;

        Ok(Self {
            address,
            user_agent,
            client,
            thresholds,
            counters: Arc::new(Mutex::new(Counters::default())),
            membership,
            shutdown,
        })
    }

    /// The address identifying this proxy in its pool.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The user agent sent with every request through this proxy.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Uses charged since the last reset.
    pub fn usage_count(&self) -> u8 {
        self.counters.lock().used
    }

    /// Transport failures since the last reset.
    pub fn failure_count(&self) -> u8 {
        self.counters.lock().failed
    }

    /// Send a request through this proxy with its assigned user agent.
    ///
    /// A transport-level failure is charged against the proxy before the
    /// error is returned.
    pub async fn execute(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        match HeaderValue::from_str(&self.user_agent) {
            Ok(agent) => {
                request.headers_mut().insert(USER_AGENT, agent);
            }
            Err(_) => warn!("Proxy {} has an unusable user agent, sending without", self.address),
        }

        match self.client.execute(request).await {
            Ok(response) => Ok(response),
            Err(e) => {
                self.record_failure();
                Err(Error::Request(e))
            }
        }
    }

    /// Charge one use against this proxy.
    ///
    /// The first use since the last reset arms the saturation window; reaching
    /// the limit excludes the proxy until that window ends. Charging a proxy
    /// that is already at its limit is a [`SaturationBreach`].
    ///
    /// Recovery timers are tokio tasks, so this must run inside a runtime.
    pub fn record_use(&self) -> std::result::Result<(), SaturationBreach> {
        let limit = self.thresholds.saturation_limit;
        let mut counters = self.counters.lock();

        if counters.used >= limit {
            return Err(SaturationBreach {
                address: self.address.clone(),
                limit,
            });
        }

        counters.used += 1;

        if counters.used == 1 {
            self.arm_usage_reset();
        }

        if counters.used == limit {
            debug!("Proxy {} saturated after {} uses", self.address, limit);
            if let Some(membership) = self.membership.upgrade() {
                membership.mark_saturated(&self.address);
            }
        }

        Ok(())
    }

    pub(crate) fn record_failure(&self) {
        let limit = self.thresholds.unhealthy_limit;
        let mut counters = self.counters.lock();

        // already excluded, the pending reset covers this failure too
        if counters.failed >= limit {
            return;
        }

        counters.failed += 1;

        if counters.failed == limit {
            warn!("Proxy {} may be unhealthy, ignoring for now", self.address);
            if let Some(membership) = self.membership.upgrade() {
                membership.mark_unhealthy(&self.address);
            }
            self.arm_failure_reset();
        }
    }

    fn arm_usage_reset(&self) {
        let counters = Arc::clone(&self.counters);
        let membership = self.membership.clone();
        let address = self.address.clone();

        self.arm(self.thresholds.saturation_window, move || {
            let mut counters = counters.lock();
            counters.used = 0;
            if let Some(membership) = membership.upgrade() {
                membership.clear_saturated(&address);
            }
            debug!("Proxy {} usage window reset", address);
        });
    }

    fn arm_failure_reset(&self) {
        let counters = Arc::clone(&self.counters);
        let membership = self.membership.clone();
        let address = self.address.clone();

        self.arm(self.thresholds.unhealthy_window, move || {
            let mut counters = counters.lock();
            counters.failed = 0;
            if let Some(membership) = membership.upgrade() {
                membership.clear_unhealthy(&address);
            }
            debug!("Proxy {} failure window reset", address);
        });
    }

    /// Run `on_expiry` once `window` has passed, unless shutdown comes first.
    fn arm<F>(&self, window: Duration, on_expiry: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(window) => on_expiry(),
                _ = shutdown.wait() => {}
            }
        });
    }
}
