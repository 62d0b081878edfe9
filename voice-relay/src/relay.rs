//! Voice relay core (C8): the endpoint/channel state machine, kept free of
//! socket I/O so it can be exercised without binding a port (spec §4.8).

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const MAX_CHANNEL_LENGTH: usize = 64;
pub const MAX_CLIENTS: usize = 50;
pub const CLIENT_TIMEOUT_SEC: u64 = 10;
pub const BUFFER_SIZE: usize = 4096;

struct EndpointInfo {
    channel: String,
    last_seen: Instant,
}

#[derive(Debug, PartialEq, Eq)]
pub enum RegisterOutcome {
    Registered,
    ReRegistered,
    ServerFull,
}

/// A shared map `endpoint → (last_seen, channel)` and its inverse
/// `channel → [endpoint]`, both guarded by one mutex (spec §4.8, §5).
#[derive(Default)]
pub struct RelayState {
    endpoints: Mutex<HashMap<SocketAddr, EndpointInfo>>,
    channels: Mutex<HashMap<String, HashSet<SocketAddr>>>,
}

/// Non-empty, at most `MAX_CHANNEL_LENGTH` bytes, `[A-Za-z0-9_-]` only.
pub fn validate_channel(label: &str) -> bool {
    !label.is_empty()
        && label.len() <= MAX_CHANNEL_LENGTH
        && label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

impl RelayState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or re-register `endpoint` on `channel`. Re-registration on
    /// the same channel refreshes `last_seen` only; on a different channel
    /// it migrates the endpoint between channel lists (spec §4.8).
    pub fn register(&self, endpoint: SocketAddr, channel: &str) -> RegisterOutcome {
        let mut endpoints = self.endpoints.lock();
        let mut channels = self.channels.lock();

        if let Some(info) = endpoints.get_mut(&endpoint) {
            if info.channel != channel {
                if let Some(set) = channels.get_mut(&info.channel) {
                    set.remove(&endpoint);
                    if set.is_empty() {
                        channels.remove(&info.channel);
                    }
                }
                channels.entry(channel.to_string()).or_default().insert(endpoint);
                info.channel = channel.to_string();
            }
            info.last_seen = Instant::now();
            return RegisterOutcome::ReRegistered;
        }

        if endpoints.len() >= MAX_CLIENTS {
            return RegisterOutcome::ServerFull;
        }
        channels.entry(channel.to_string()).or_default().insert(endpoint);
        endpoints.insert(endpoint, EndpointInfo { channel: channel.to_string(), last_seen: Instant::now() });
        RegisterOutcome::Registered
    }

    /// Endpoints that should receive a forwarded `AUDIO` datagram from
    /// `sender` on `channel`. `None` if `sender` is not currently
    /// registered — per spec §9 Open Question 3, an unregistered sender's
    /// `AUDIO` is dropped outright, with no implicit registration.
    pub fn audio_targets(&self, sender: SocketAddr, channel: &str) -> Option<Vec<SocketAddr>> {
        {
            let mut endpoints = self.endpoints.lock();
            let info = endpoints.get_mut(&sender)?;
            info.last_seen = Instant::now();
        }
        let channels = self.channels.lock();
        Some(
            channels
                .get(channel)
                .map(|set| set.iter().filter(|&&e| e != sender).copied().collect())
                .unwrap_or_default(),
        )
    }

    /// Evict endpoints whose `last_seen` is older than `timeout`. Returns
    /// the evicted addresses for logging. Emptied channels are removed.
    pub fn evict_inactive(&self, timeout: Duration) -> Vec<SocketAddr> {
        let now = Instant::now();
        let mut endpoints = self.endpoints.lock();
        let expired: Vec<SocketAddr> = endpoints
            .iter()
            .filter(|(_, info)| now.duration_since(info.last_seen) > timeout)
            .map(|(addr, _)| *addr)
            .collect();

        if expired.is_empty() {
            return expired;
        }

        let mut channels = self.channels.lock();
        for addr in &expired {
            if let Some(info) = endpoints.remove(addr) {
                if let Some(set) = channels.get_mut(&info.channel) {
                    set.remove(addr);
                    if set.is_empty() {
                        channels.remove(&info.channel);
                    }
                }
            }
        }
        expired
    }

    #[cfg(test)]
    fn endpoint_count(&self) -> usize {
        self.endpoints.lock().len()
    }

    #[cfg(test)]
    fn channel_of(&self, endpoint: SocketAddr) -> Option<String> {
        self.endpoints.lock().get(&endpoint).map(|i| i.channel.clone())
    }
}
