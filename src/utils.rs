//! Utility functions for sources and proxies.

use crate::error::{Error, Result};
use rand::Rng;
use url::Url;

/// Parse line-oriented content, skipping blank lines and `#` comments.
pub(crate) fn parse_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

/// Turn a pool address into the url of its forward proxy.
///
/// Bare `host:port` addresses are dialled over plain http.
pub(crate) fn proxy_url(address: &str) -> Result<Url> {
    let raw = if address.contains("://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    };

    Url::parse(&raw).map_err(|source| Error::InvalidAddress {
        address: address.to_string(),
        source,
    })
}

/// Random identifier used to correlate the log lines of one probe.
pub(crate) fn trace_id() -> String {
    let suffix: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(22)
        .map(char::from)
        .collect();
    format!("trace_{}", suffix)
}
