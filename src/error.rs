//! Error types for the fingerprint-harvester crate.

use std::path::PathBuf;
use thiserror::Error;

/// Error returned when every proxy in the pool is saturated or unhealthy.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("no proxies are usable at this current moment")]
pub struct NoProxyAvailable;

/// A proxy was charged a use while already at its saturation limit.
///
/// This is never a runtime condition: it means the pool handed out a proxy it
/// should have excluded. It is kept apart from [`Error`] so nothing can handle
/// it by accident.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invariant: proxy {address} used while saturated ({limit} uses)")]
pub struct SaturationBreach {
    pub address: String,
    pub limit: u8,
}

/// Recoverable errors raised by the pool, sources, probes and sinks.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid proxy address {address}: {source}")]
    InvalidAddress {
        address: String,
        source: url::ParseError,
    },

    #[error("proxy {0} is already in the pool")]
    DuplicateAddress(String),

    #[error("failed to build client for proxy {address}: {source}")]
    Client {
        address: String,
        source: reqwest::Error,
    },

    #[error("invalid probe url {url}: {source}")]
    InvalidProbeUrl {
        url: String,
        source: url::ParseError,
    },

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("failed to read {}: {source}", path.display())]
    Source {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no user agents present")]
    NoUserAgents,

    #[error("json decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("missing fingerprint: {raw}")]
    MissingFingerprint { raw: String },

    #[error("failed to write result: {0}")]
    Io(#[from] std::io::Error),

    #[error("result sink is closed")]
    SinkClosed,
}

/// Result alias for harvester operations.
pub type Result<T> = std::result::Result<T, Error>;
