//! Connection identity derived from the transport target.
//!
//! The target identifier has the form `<base>?<marker><base64(project)>`.
//! A `$` marker right after the `?` switches the client into debug mode.
//! Everything here is a pure function of the target and peer metadata and
//! is recomputed on every call.

use std::collections::BTreeMap;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use serde::Serialize;

use crate::transport::PeerInfo;

/// Marker that switches on debug mode.
pub const DEBUG_MARKER: char = '$';

/// Standard alphabet, padding optional.
const PROJECT_ENCODING: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Introspection data exposed to scripts and the startup banner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Info {
    pub project: Option<String>,
    pub debug: bool,
    pub websocket: String,
    pub ip: Option<String>,
    pub headers: BTreeMap<String, String>,
    #[serde(rename = "user-agent")]
    pub user_agent: Option<String>,
}

/// The part of `target` between the first and second `?`.
fn query(target: &str) -> Option<&str> {
    target.split('?').nth(1)
}

#[must_use]
pub fn is_debug(target: &str) -> bool {
    query(target).is_some_and(|q| q.starts_with(DEBUG_MARKER))
}

/// Decode the project label, stripping the debug marker first.
///
/// Returns `None` when the target has no query or it is not base64 UTF-8.
#[must_use]
pub fn project(target: &str) -> Option<String> {
    let encoded = query(target)?;
    let encoded = encoded.strip_prefix(DEBUG_MARKER).unwrap_or(encoded);
    let bytes = PROJECT_ENCODING.decode(encoded).ok()?;
    String::from_utf8(bytes).ok()
}

#[must_use]
pub fn info(target: &str, peer: &PeerInfo) -> Info {
    Info {
        project: project(target),
        debug: is_debug(target),
        websocket: target.to_owned(),
        ip: peer.ip.clone(),
        headers: peer.headers.clone(),
        user_agent: peer.agent.clone(),
    }
}

#[cfg(test)]
#[path = "identity_test.rs"]
mod tests;
