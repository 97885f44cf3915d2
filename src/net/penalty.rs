//! Temporary deprioritization of addresses that failed to connect.

use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::Instant;

/// Penalized addresses and the instant their penalty lapses.
///
/// A penalized address is moved to the back of the candidate list, never
/// removed from it.
#[derive(Debug)]
pub struct AddressPenaltyBox {
    entries: DashMap<IpAddr, Instant>,
    window: Duration,
}

impl AddressPenaltyBox {
    pub fn new(window: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            window,
        }
    }

    pub fn penalize(&self, addr: IpAddr) {
        let until = Instant::now() + self.window;
        self.entries.insert(addr, until);
        tracing::debug!(addr = %addr, window = ?self.window, "Address penalized");
    }

    pub fn clear(&self, addr: &IpAddr) {
        self.entries.remove(addr);
    }

    /// True if `addr` is currently penalized. Expired entries are purged.
    pub fn is_penalized(&self, addr: &IpAddr) -> bool {
        let now = Instant::now();
        self.entries.remove_if(addr, |_, until| *until <= now);
        self.entries.contains_key(addr)
    }

    /// Stable partition: unpenalized addresses first, penalized ones after,
    /// each keeping its relative order.
    pub fn prioritize(&self, addrs: Vec<IpAddr>) -> Vec<IpAddr> {
        let (penalized, fresh): (Vec<_>, Vec<_>) =
            addrs.into_iter().partition(|a| self.is_penalized(a));
        fresh.into_iter().chain(penalized).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
