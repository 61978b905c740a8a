//! Service advertisement and local address lookup.
//!
//! Concrete mDNS/DNS-SD registration is platform specific and lives
//! outside this crate behind [`ServiceAdvertiser`].

use std::net::{IpAddr, SocketAddr, UdpSocket};

use parking_lot::Mutex;

use crate::error::Result;

/// Shown instead of an address when no usable interface is found.
pub const NO_NETWORK: &str = "no network";

/// Announces the video endpoint on the local network.
pub trait ServiceAdvertiser: Send + Sync {
    /// Register the service on `port`, replacing any earlier registration.
    fn start(&self, port: u16) -> Result<()>;

    /// Withdraw the registration. Must be safe when nothing is registered.
    fn stop(&self);
}

/// Advertiser that registers nothing and only logs.
#[derive(Debug, Default)]
pub struct NoopAdvertiser {
    port: Mutex<Option<u16>>,
}

impl NoopAdvertiser {
    pub fn registered_port(&self) -> Option<u16> {
        *self.port.lock()
    }
}

impl ServiceAdvertiser for NoopAdvertiser {
    fn start(&self, port: u16) -> Result<()> {
        if let Some(previous) = self.port.lock().replace(port) {
            tracing::debug!(previous, "replacing service registration");
        }
        tracing::debug!(port, "service advertisement skipped (no-op advertiser)");
        Ok(())
    }

    fn stop(&self) {
        if let Some(port) = self.port.lock().take() {
            tracing::debug!(port, "service advertisement withdrawn");
        }
    }
}

/// Supplies the host address shown to the user for network mode.
pub trait AddressResolver: Send + Sync {
    fn address(&self) -> String;
}

/// Finds the IPv4 address of the interface that routes outward.
///
/// Connects a UDP socket to a public address, which selects a route
/// without sending any packet, and reads back the local end.
#[derive(Debug, Clone)]
pub struct LocalAddressResolver {
    probe: SocketAddr,
}

impl LocalAddressResolver {
    pub fn new(probe: SocketAddr) -> Self {
        Self { probe }
    }

    fn lookup(&self) -> std::io::Result<IpAddr> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.connect(self.probe)?;
        Ok(socket.local_addr()?.ip())
    }
}

impl Default for LocalAddressResolver {
    fn default() -> Self {
        Self::new(SocketAddr::from(([8, 8, 8, 8], 80)))
    }
}

impl AddressResolver for LocalAddressResolver {
    fn address(&self) -> String {
        match self.lookup() {
            Ok(ip) if !ip.is_loopback() && !ip.is_unspecified() => ip.to_string(),
            Ok(ip) => {
                tracing::debug!(%ip, "no routable local address");
                NO_NETWORK.to_string()
            }
            Err(e) => {
                tracing::debug!(error = %e, "local address lookup failed");
                NO_NETWORK.to_string()
            }
        }
    }
}

/// A fixed address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticAddress(pub String);

impl AddressResolver for StaticAddress {
    fn address(&self) -> String {
        self.0.clone()
    }
}
