//! The scanning boundary a caller plugs in to find controllers (§6.6).
//!
//! This crate owns the connection and protocol once a [`ControllerAddress`]
//! is known; how that address was found (a Bluetooth inquiry, a saved
//! pairing list, a command-line argument) is left to the embedder.

use crate::address::ControllerAddress;
use crate::error::WiiResult;
use std::time::Duration;

/// A source of candidate controller addresses.
pub trait DeviceDiscovery {
    /// Scans for up to `timeout`, returning whatever controllers were
    /// found. An empty vector is a valid, non-error result.
    fn scan(&self, timeout: Duration) -> WiiResult<Vec<ControllerAddress>>;
}

/// A discovery source that never finds anything, for embedders that
/// supply controller addresses some other way (a CLI flag, a config
/// file) and have no need for Bluetooth inquiry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDiscovery;

impl DeviceDiscovery for NullDiscovery {
    fn scan(&self, _timeout: Duration) -> WiiResult<Vec<ControllerAddress>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_discovery_finds_nothing() {
        let found = NullDiscovery.scan(Duration::from_secs(1)).unwrap();
        assert!(found.is_empty());
    }
}
