//! Subscriber registry for the broadcast fan-out
//!
//! Every live client connection registers here once its `Connect` packet is
//! accepted. The registry is what the broadcast path iterates over, so
//! membership here is exactly the set of connections that will observe a
//! committed mutation. It also tracks per-connection liveness so silent
//! clients are swept out and stop receiving fan-out traffic.

use log::info;
use shared::SUBSCRIBER_TIMEOUT_SECS;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// One live connection on the broadcast bus
///
/// Carries the resolved caller identity (`user_id`) supplied at connect
/// time; the core trusts it and never authenticates.
#[derive(Debug)]
pub struct Subscriber {
    /// Unique connection identifier assigned by the server
    pub id: u32,
    /// Network address for direct responses and fan-out
    pub addr: SocketAddr,
    /// Opaque owner identity bound to this connection
    pub user_id: u64,
    /// Last time any packet arrived from this connection
    pub last_seen: Instant,
}

impl Subscriber {
    pub fn new(id: u32, addr: SocketAddr, user_id: u64) -> Self {
        Self {
            id,
            addr,
            user_id,
            last_seen: Instant::now(),
        }
    }

    /// Marks the connection as recently active.
    pub fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    pub fn is_timed_out(&self, timeout: Duration) -> bool {
        self.last_seen.elapsed() > timeout
    }
}

/// Tracks every connection subscribed to broadcast events
///
/// Enforces the capacity limit, maps packet source addresses back to
/// registrations, and sweeps out connections that have gone silent. A
/// connection removed here simply misses subsequent events; it recovers by
/// reconnecting and re-fetching the full task list.
pub struct SubscriberManager {
    subscribers: HashMap<u32, Subscriber>,
    next_subscriber_id: u32,
    max_subscribers: usize,
}

impl SubscriberManager {
    pub fn new(max_subscribers: usize) -> Self {
        Self {
            subscribers: HashMap::new(),
            next_subscriber_id: 1,
            max_subscribers,
        }
    }

    /// Registers a new connection, returning its id, or `None` at capacity.
    pub fn add(&mut self, addr: SocketAddr, user_id: u64) -> Option<u32> {
        if self.subscribers.len() >= self.max_subscribers {
            return None;
        }

        let id = self.next_subscriber_id;
        self.next_subscriber_id += 1;

        info!("Subscriber {} connected from {} (user {})", id, addr, user_id);
        self.subscribers.insert(id, Subscriber::new(id, addr, user_id));

        Some(id)
    }

    /// Removes a connection. Returns false if it was already gone.
    pub fn remove(&mut self, id: u32) -> bool {
        if let Some(subscriber) = self.subscribers.remove(&id) {
            info!("Subscriber {} disconnected", subscriber.id);
            true
        } else {
            false
        }
    }

    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.subscribers
            .iter()
            .find(|(_, subscriber)| subscriber.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Resolves the owner identity bound to a packet's source address.
    pub fn user_id_for_addr(&self, addr: SocketAddr) -> Option<u64> {
        self.subscribers
            .values()
            .find(|subscriber| subscriber.addr == addr)
            .map(|subscriber| subscriber.user_id)
    }

    /// Refreshes liveness for the connection at `addr`, if registered.
    pub fn touch_addr(&mut self, addr: SocketAddr) {
        if let Some(subscriber) = self
            .subscribers
            .values_mut()
            .find(|subscriber| subscriber.addr == addr)
        {
            subscriber.touch();
        }
    }

    /// Sweeps out connections that have gone silent past the timeout,
    /// returning their ids.
    pub fn check_timeouts(&mut self) -> Vec<u32> {
        let timeout = Duration::from_secs(SUBSCRIBER_TIMEOUT_SECS);
        let timed_out: Vec<u32> = self
            .subscribers
            .iter()
            .filter(|(_, subscriber)| subscriber.is_timed_out(timeout))
            .map(|(id, _)| *id)
            .collect();

        for id in &timed_out {
            self.remove(*id);
        }

        timed_out
    }

    /// Current fan-out targets as (subscriber id, address) pairs.
    pub fn addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.subscribers
            .iter()
            .map(|(id, subscriber)| (*id, subscriber.addr))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}
