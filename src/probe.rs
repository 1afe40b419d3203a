//! Decoding of probe responses.

use crate::error::{Error, Result};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct ProbeBody {
    #[serde(default)]
    fingerprint: Option<String>,
}

/// Extract the `fingerprint` field from a probe response body.
pub fn decode_fingerprint(body: &[u8]) -> Result<String> {
    let decoded: ProbeBody = serde_json::from_slice(body)?;

    decoded.fingerprint.ok_or_else(|| Error::MissingFingerprint {
        raw: String::from_utf8_lossy(body).into_owned(),
    })
}
