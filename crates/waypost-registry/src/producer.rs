//! Producers: the brokers announcing topics and channels.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// What a producer told us about itself over IDENTIFY.
///
/// Fixed for the lifetime of the session; shared by every [`Producer`]
/// entry the session creates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerIdentity {
    /// Address of the producer's connection to us.
    pub remote_address: SocketAddr,
    pub hostname: String,
    /// Address consumers should use to reach the producer.
    pub broadcast_address: String,
    pub tcp_port: u16,
    pub http_port: u16,
    pub version: String,
}

impl PeerIdentity {
    pub fn id(&self) -> ProducerId {
        ProducerId(self.remote_address)
    }

    /// `broadcast_address:http_port`, the form operators use to name a node.
    pub fn http_endpoint(&self) -> String {
        format!("{}:{}", self.broadcast_address, self.http_port)
    }
}

/// Identity key of a producer: the remote address of its session.
///
/// A reconnecting broker gets a new id, so tearing down its old session
/// never touches the registrations of the new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerId(pub SocketAddr);

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A producer as it appears under one registration.
#[derive(Debug, Clone)]
pub struct Producer {
    identity: Arc<PeerIdentity>,
    last_update: Instant,
    tombstoned_at: Option<Instant>,
}

impl Producer {
    pub fn new(identity: Arc<PeerIdentity>) -> Self {
        Self::seen_at(identity, Instant::now())
    }

    /// A producer last heard from at `last_update`.
    pub fn seen_at(identity: Arc<PeerIdentity>, last_update: Instant) -> Self {
        Self {
            identity,
            last_update,
            tombstoned_at: None,
        }
    }

    pub fn id(&self) -> ProducerId {
        self.identity.id()
    }

    pub fn identity(&self) -> &Arc<PeerIdentity> {
        &self.identity
    }

    pub fn last_update(&self) -> Instant {
        self.last_update
    }

    pub fn tombstoned_at(&self) -> Option<Instant> {
        self.tombstoned_at
    }

    pub fn is_tombstoned(&self) -> bool {
        self.tombstoned_at.is_some()
    }

    /// Silent for longer than `timeout` as of `now`.
    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_update) > timeout
    }

    /// Tombstoned for longer than `lifetime` as of `now`.
    pub fn tombstone_expired(&self, now: Instant, lifetime: Duration) -> bool {
        self.tombstoned_at
            .is_some_and(|at| now.saturating_duration_since(at) > lifetime)
    }

    pub(crate) fn refresh(&mut self, at: Instant) {
        self.last_update = at;
    }

    pub(crate) fn tombstone(&mut self, at: Instant) {
        self.tombstoned_at = Some(at);
    }
}

impl PartialEq for Producer {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Producer {}
