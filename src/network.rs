//! Advisory network reachability probe
//!
//! Only used to warn before an install command that will probably need the
//! network. The probe is a single TCP connect bounded by a timeout and its
//! result never gates anything.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, TcpStream};
use std::time::Duration;

use tracing::debug;

/// Default probe target (a public DNS resolver)
pub const DEFAULT_PROBE_ADDRESS: SocketAddr =
    SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::new(1, 1, 1, 1), 53));

/// Default probe timeout in seconds
pub const DEFAULT_PROBE_TIMEOUT_SECONDS: u64 = 5;

/// Answers whether the network looks reachable
pub trait Connectivity {
    fn is_reachable(&self) -> bool;
}

/// TCP connect probe
///
/// The target is a socket address literal, so the probe never waits on a
/// name lookup and the timeout bounds the whole check.
#[derive(Debug, Clone, Copy)]
pub struct TcpProbe {
    address: SocketAddr,
    timeout: Duration,
}

impl TcpProbe {
    pub fn new(address: SocketAddr, timeout: Duration) -> Self {
        Self { address, timeout }
    }

    pub fn address(&self) -> SocketAddr {
        self.address
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self::new(
            DEFAULT_PROBE_ADDRESS,
            Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECONDS),
        )
    }
}

impl Connectivity for TcpProbe {
    fn is_reachable(&self) -> bool {
        let reachable = TcpStream::connect_timeout(&self.address, self.timeout).is_ok();
        debug!(address = %self.address, reachable, "network probe");
        reachable
    }
}

/// Fixed answer, for tests and offline runs
#[derive(Debug, Clone, Copy)]
pub struct FixedConnectivity(pub bool);

impl Connectivity for FixedConnectivity {
    fn is_reachable(&self) -> bool {
        self.0
    }
}
