//! # fingerprint-harvester
//!
//! Harvests request fingerprints through a pool of http forward proxies.
//!
//! Workers tick on a fixed period, take a random proxy from the pool, probe
//! the fingerprint endpoint through it and hand the result to a sink. Each
//! proxy throttles itself: a few uses saturate it and a couple of transport
//! failures mark it unhealthy, and either exclusion lifts on its own after a
//! fixed recovery window.

pub mod config;
pub mod error;
pub mod harvester;
pub mod pool;
pub mod probe;
pub mod proxy;
pub mod shutdown;
pub mod sink;
pub mod source;
pub mod worker;
mod utils;

pub use config::{HarvesterConfig, HarvesterConfigBuilder, Thresholds};
pub use error::{Error, NoProxyAvailable, Result, SaturationBreach};
pub use harvester::Harvester;
pub use pool::{PoolStats, ProxyPool};
pub use proxy::Proxy;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use sink::{FingerprintResult, JsonLinesSink, ResultReceiver, ResultSender, ResultSink};
pub use source::{AddressSource, AgentSource, FileAddressSource, FileAgentSource, StaticSource};
pub use worker::{TickOutcome, Worker};
