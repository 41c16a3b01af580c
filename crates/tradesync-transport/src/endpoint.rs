//! Stream endpoint derivation from the page origin.

use crate::traits::TransportError;
use url::Url;

/// Default path of the event stream.
pub const DEFAULT_STREAM_PATH: &str = "/ws";

/// Derive the stream endpoint for a page origin.
///
/// `https` origins map to `wss`, `http` origins to `ws`. The host and any
/// explicit port are kept; any path on the origin is discarded in favor of
/// `path`.
///
/// # Errors
///
/// Returns [`TransportError::InvalidOrigin`] if the origin cannot be parsed,
/// has no host, or uses another scheme.
pub fn endpoint_from_origin(origin: &str, path: &str) -> Result<String, TransportError> {
    let url = Url::parse(origin)
        .map_err(|e| TransportError::InvalidOrigin(format!("{}: {}", origin, e)))?;

    let scheme = match url.scheme() {
        "https" => "wss",
        "http" => "ws",
        other => {
            return Err(TransportError::InvalidOrigin(format!(
                "unsupported scheme '{}' in {}",
                other, origin
            )))
        }
    };

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidOrigin(format!("no host in {}", origin)))?;

    let authority = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    };

    Ok(format!("{}://{}{}", scheme, authority, path))
}
