//! Configuration for the harvester and its proxy pool.

use std::time::Duration;

/// Uses before a proxy is excluded as saturated.
pub const SATURATION_LIMIT: u8 = 3;
/// Time after the first use until the usage count resets.
pub const SATURATION_WINDOW: Duration = Duration::from_secs(3 * 60 + 20);
/// Failures before a proxy is excluded as unhealthy.
pub const UNHEALTHY_LIMIT: u8 = 2;
/// Time after reaching the failure limit until the failure count resets.
pub const UNHEALTHY_WINDOW: Duration = Duration::from_secs(10 * 60);
/// Interval between probe attempts, per worker.
pub const TICK_PERIOD: Duration = Duration::from_secs(20);

const DEFAULT_PROBE_URL: &str = "https://discord.com/api/v8/experiments";

/// Limits and recovery windows applied to every proxy in a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    /// Uses allowed before the proxy is saturated.
    pub saturation_limit: u8,
    /// Window, anchored at the first use, after which usage resets.
    pub saturation_window: Duration,
    /// Transport failures allowed before the proxy is unhealthy.
    pub unhealthy_limit: u8,
    /// Window, anchored at the limit-reaching failure, after which failures reset.
    pub unhealthy_window: Duration,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            saturation_limit: SATURATION_LIMIT,
            saturation_window: SATURATION_WINDOW,
            unhealthy_limit: UNHEALTHY_LIMIT,
            unhealthy_window: UNHEALTHY_WINDOW,
        }
    }
}

/// Configuration for the harvester.
#[derive(Debug, Clone)]
pub struct HarvesterConfig {
    /// Endpoint every probe is sent to.
    pub probe_url: String,
    /// Interval between probes of a single worker.
    pub tick_period: Duration,
    /// Number of concurrent workers.
    pub workers: usize,
    /// Timeout applied to each probe request.
    pub request_timeout: Duration,
    /// Per-proxy usage and failure thresholds.
    pub thresholds: Thresholds,
}

impl HarvesterConfig {
    /// Create a new configuration builder.
    pub fn builder() -> HarvesterConfigBuilder {
        HarvesterConfigBuilder::new()
    }
}

impl Default for HarvesterConfig {
    fn default() -> Self {
        HarvesterConfigBuilder::new().build()
    }
}

/// Builder for `HarvesterConfig`.
pub struct HarvesterConfigBuilder {
    probe_url: Option<String>,
    tick_period: Option<Duration>,
    workers: Option<usize>,
    request_timeout: Option<Duration>,
    saturation_limit: Option<u8>,
    saturation_window: Option<Duration>,
    unhealthy_limit: Option<u8>,
    unhealthy_window: Option<Duration>,
}

impl HarvesterConfigBuilder {
    /// Create a new builder with default values.
    pub fn new() -> Self {
        Self {
            probe_url: None,
            tick_period: None,
            workers: None,
            request_timeout: None,
            saturation_limit: None,
            saturation_window: None,
            unhealthy_limit: None,
            unhealthy_window: None,
        }
    }

    /// Set the endpoint probes are sent to.
    pub fn probe_url(mut self, url: impl Into<String>) -> Self {
        self.probe_url = Some(url.into());
        self
    }

    /// Set the interval between probes of a single worker.
    pub fn tick_period(mut self, period: Duration) -> Self {
        self.tick_period = Some(period);
        self
    }

    /// Set the number of concurrent workers.
    pub fn workers(mut self, count: usize) -> Self {
        self.workers = Some(count);
        self
    }

    /// Set the timeout for each probe request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set how many uses a proxy takes before it is saturated.
    pub fn saturation_limit(mut self, limit: u8) -> Self {
        self.saturation_limit = Some(limit);
        self
    }

    /// Set how long after its first use a proxy's usage resets.
    pub fn saturation_window(mut self, window: Duration) -> Self {
        self.saturation_window = Some(window);
        self
    }

    /// Set how many failures a proxy takes before it is unhealthy.
    pub fn unhealthy_limit(mut self, limit: u8) -> Self {
        self.unhealthy_limit = Some(limit);
        self
    }

    /// Set how long an unhealthy proxy stays excluded.
    pub fn unhealthy_window(mut self, window: Duration) -> Self {
        self.unhealthy_window = Some(window);
        self
    }

    /// Build the configuration.
    pub fn build(self) -> HarvesterConfig {
        HarvesterConfig {
            probe_url: self.probe_url.unwrap_or_else(|| DEFAULT_PROBE_URL.to_string()),
            tick_period: self.tick_period.unwrap_or(TICK_PERIOD),
            workers: self.workers.unwrap_or(1).max(1),
            request_timeout: self.request_timeout.unwrap_or(Duration::from_secs(30)),
            thresholds: Thresholds {
                saturation_limit: self.saturation_limit.unwrap_or(SATURATION_LIMIT).max(1),
                saturation_window: self.saturation_window.unwrap_or(SATURATION_WINDOW),
                unhealthy_limit: self.unhealthy_limit.unwrap_or(UNHEALTHY_LIMIT).max(1),
                unhealthy_window: self.unhealthy_window.unwrap_or(UNHEALTHY_WINDOW),
            },
        }
    }
}

impl Default for HarvesterConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
