//! Core proxy pool implementation.

use crate::config::{HarvesterConfig, Thresholds};
use crate::error::{Error, NoProxyAvailable, Result};
use crate::proxy::Proxy;
use crate::shutdown::Shutdown;
use crate::source::{AddressSource, AgentSource};

use log::{info, warn};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct PoolState {
    proxies: Vec<Arc<Proxy>>,
    saturated: HashSet<String>,
    unhealthy: HashSet<String>,
}

/// Pool membership shared with the proxies, which flip their own exclusion
/// flags as they cross limits and recover.
#[derive(Default)]
pub(crate) struct Membership {
    state: Mutex<PoolState>,
}

impl Membership {
    pub(crate) fn mark_saturated(&self, address: &str) {
        self.state.lock().saturated.insert(address.to_string());
    }

    pub(crate) fn clear_saturated(&self, address: &str) {
        self.state.lock().saturated.remove(address);
    }

    pub(crate) fn mark_unhealthy(&self, address: &str) {
        self.state.lock().unhealthy.insert(address.to_string());
    }

    pub(crate) fn clear_unhealthy(&self, address: &str) {
        self.state.lock().unhealthy.remove(address);
    }
}

/// Counts describing the pool at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total: usize,
    pub saturated: usize,
    pub unhealthy: usize,
    pub usable: usize,
}

/// A pool of proxies that throttles each member by use and by failure.
pub struct ProxyPool {
    membership: Arc<Membership>,
    agents: Arc<dyn AgentSource>,
    thresholds: Thresholds,
    request_timeout: Duration,
    shutdown: Shutdown,
}

impl ProxyPool {
    /// Create an empty pool. Recovery timers of its proxies stop on `shutdown`.
    pub fn new(config: &HarvesterConfig, agents: Arc<dyn AgentSource>, shutdown: Shutdown) -> Self {
        Self {
            membership: Arc::new(Membership::default()),
            agents,
            thresholds: config.thresholds,
            request_timeout: config.request_timeout,
            shutdown,
        }
    }

    /// Create a pool filled from `addresses`.
    ///
    /// Failing to load the address list is fatal; a single bad entry is not.
    pub fn from_sources(
        config: &HarvesterConfig,
        addresses: &dyn AddressSource,
        agents: Arc<dyn AgentSource>,
        shutdown: Shutdown,
    ) -> Result<Self> {
        let pool = Self::new(config, agents, shutdown);
        pool.initialize(addresses.load()?);
        Ok(pool)
    }

    /// Add every address, logging and skipping the ones that cannot be added.
    /// Returns how many proxies were added.
    pub fn initialize(&self, addresses: Vec<String>) -> usize {
        info!("Initializing proxy pool from {} addresses", addresses.len());

        let mut added = 0;
        for address in addresses {
            match self.add(&address) {
                Ok(()) => added += 1,
                Err(e) => warn!("Failed to add proxy {}: {}", address, e),
            }
        }

        info!("Proxy pool holds {} proxies", self.len());
        added
    }

    /// Add one proxy bound to a randomly chosen user agent.
    pub fn add(&self, address: &str) -> Result<()> {
        if self.get(address).is_some() {
            return Err(Error::DuplicateAddress(address.to_string()));
        }

        let user_agent = self.agents.random()?;
        let proxy = Proxy::new(
            address.to_string(),
            user_agent,
            self.thresholds,
            self.request_timeout,
            Arc::downgrade(&self.membership),
            self.shutdown.clone(),
        )?;

        let mut state = self.membership.state.lock();
        if state.proxies.iter().any(|p| p.address() == address) {
            return Err(Error::DuplicateAddress(address.to_string()));
        }
        state.proxies.push(Arc::new(proxy));
        Ok(())
    }

    /// Addresses of every proxy, in insertion order.
    pub fn addresses(&self) -> Vec<String> {
        let state = self.membership.state.lock();
        state.proxies.iter().map(|p| p.address().to_string()).collect()
    }

    /// Look up a proxy by address.
    pub fn get(&self, address: &str) -> Option<Arc<Proxy>> {
        let state = self.membership.state.lock();
        state.proxies.iter().find(|p| p.address() == address).cloned()
    }

    pub fn len(&self) -> usize {
        self.membership.state.lock().proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pick a random usable proxy and charge it one use. Must run inside a
    /// tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if the chosen proxy was already saturated when charged, which
    /// means an excluded proxy escaped the usable set.
    pub fn select(&self) -> std::result::Result<Arc<Proxy>, NoProxyAvailable> {
        let usable: Vec<Arc<Proxy>> = {
            let state = self.membership.state.lock();
            state
                .proxies
                .iter()
                .filter(|p| {
                    !state.saturated.contains(p.address()) && !state.unhealthy.contains(p.address())
                })
                .cloned()
                .collect()
        };

        if usable.is_empty() {
            return Err(NoProxyAvailable);
        }

        let idx = rand::rng().random_range(0..usable.len());
        let selected = Arc::clone(&usable[idx]);

        if let Err(breach) = selected.record_use() {
            panic!("{}", breach);
        }

        Ok(selected)
    }

    /// Lift both exclusions regardless of the proxy's counters.
    #[cfg(test)]
    pub(crate) fn clear_exclusions(&self, address: &str) {
        self.membership.clear_saturated(address);
        self.membership.clear_unhealthy(address);
    }

    /// Get statistics about the proxy pool.
    pub fn stats(&self) -> PoolStats {
        let state = self.membership.state.lock();
        let usable = state
            .proxies
            .iter()
            .filter(|p| {
                !state.saturated.contains(p.address()) && !state.unhealthy.contains(p.address())
            })
            .count();

        PoolStats {
            total: state.proxies.len(),
            saturated: state.saturated.len(),
            unhealthy: state.unhealthy.len(),
            usable,
        }
    }

    /// Whether the address is currently excluded for overuse.
    pub fn is_saturated(&self, address: &str) -> bool {
        self.membership.state.lock().saturated.contains(address)
    }

    /// Whether the address is currently excluded for failing.
    pub fn is_unhealthy(&self, address: &str) -> bool {
        self.membership.state.lock().unhealthy.contains(address)
    }
}
