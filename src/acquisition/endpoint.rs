//! Device endpoint resolution
//!
//! The scheduler owns the single writable [`EndpointResolver`]; the fetcher
//! and API hold read-only [`EndpointReader`] handles. Readers load the base
//! URL fresh on every call, so an address change applies on the next poll.

use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::defaults::DEFAULT_DEVICE_IP;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EndpointError {
    #[error("device address is empty")]
    Empty,

    #[error("device address {0:?} contains whitespace")]
    Whitespace(String),
}

/// Turn a user-entered address into a base URL.
///
/// A bare host becomes `http://{host}`; an explicit `http://`/`https://`
/// prefix is kept. Trailing slashes are removed.
pub fn base_url_for(ip: &str) -> Result<String, EndpointError> {
    let ip = ip.trim();
    if ip.is_empty() {
        return Err(EndpointError::Empty);
    }
    if ip.chars().any(char::is_whitespace) {
        return Err(EndpointError::Whitespace(ip.to_string()));
    }
    let url = if ip.starts_with("http://") || ip.starts_with("https://") {
        ip.to_string()
    } else {
        format!("http://{ip}")
    };
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("//") || trimmed.ends_with(':') {
        return Err(EndpointError::Empty);
    }
    Ok(trimmed.to_string())
}

/// Writable owner of the device base URL.
#[derive(Debug)]
pub struct EndpointResolver {
    base: Arc<ArcSwap<String>>,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self {
            base: Arc::new(ArcSwap::from_pointee(format!("http://{DEFAULT_DEVICE_IP}"))),
        }
    }
}

impl EndpointResolver {
    /// Resolver pointing at `http://{ip}`.
    pub fn new(ip: &str) -> Result<Self, EndpointError> {
        Ok(Self {
            base: Arc::new(ArcSwap::from_pointee(base_url_for(ip)?)),
        })
    }

    /// Rewrite the base URL to `http://{ip}`. Returns the new URL.
    pub fn set_endpoint(&self, ip: &str) -> Result<String, EndpointError> {
        let url = base_url_for(ip)?;
        self.base.store(Arc::new(url.clone()));
        Ok(url)
    }

    pub fn get_endpoint(&self) -> String {
        String::clone(&self.base.load())
    }

    /// Read-only handle sharing the same underlying value.
    pub fn reader(&self) -> EndpointReader {
        EndpointReader {
            base: Arc::clone(&self.base),
        }
    }
}

/// Read-only view of the device base URL.
#[derive(Debug, Clone)]
pub struct EndpointReader {
    base: Arc<ArcSwap<String>>,
}

impl EndpointReader {
    pub fn get_endpoint(&self) -> String {
        String::clone(&self.base.load())
    }

    /// Full URL for `path` against the current base.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base.load().as_str(), path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_access_point_address() {
        let resolver = EndpointResolver::default();
        assert_eq!(resolver.get_endpoint(), "http://192.168.4.1");
    }

    #[test]
    fn test_set_endpoint_visible_to_existing_readers() {
        let resolver = EndpointResolver::default();
        let reader = resolver.reader();
        resolver.set_endpoint("10.0.0.42").unwrap();
        assert_eq!(reader.get_endpoint(), "http://10.0.0.42");
        assert_eq!(reader.url("/raw_a"), "http://10.0.0.42/raw_a");
    }

    #[test]
    fn test_invalid_address_keeps_previous_value() {
        let resolver = EndpointResolver::new("10.0.0.1").unwrap();
        assert_eq!(resolver.set_endpoint("   "), Err(EndpointError::Empty));
        assert!(resolver.set_endpoint("10.0.0 .2").is_err());
        assert_eq!(resolver.get_endpoint(), "http://10.0.0.1");
    }

    #[test]
    fn test_base_url_normalisation() {
        assert_eq!(base_url_for(" 192.168.1.7 ").unwrap(), "http://192.168.1.7");
        assert_eq!(base_url_for("192.168.1.7:8080/").unwrap(), "http://192.168.1.7:8080");
        assert_eq!(base_url_for("https://probe.local").unwrap(), "https://probe.local");
        assert!(base_url_for("http://").is_err());
    }
}
