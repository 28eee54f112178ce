//! Per-connection protocol state.
//!
//! A [`Session`] interprets the commands of one producer connection against
//! the shared registry. It performs no I/O: the connection loop in
//! [`super::conn`] reads lines and bodies and writes whatever the session
//! answers.

use std::net::SocketAddr;
use std::sync::Arc;

use waypost_core::wire::{Command, ErrorCode, IdentifyBody, NodeInfo, ProtocolError, OK};
use waypost_registry::{
    Category, PeerIdentity, Producer, ProducerId, Registration, RegistrationDb, ANY,
};

/// What a command produces: a success payload, or an error that ends the
/// session once written.
pub type Response = Result<Vec<u8>, ProtocolError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected; only IDENTIFY is accepted.
    AwaitIdentity,
    /// Identified; the identity is shared by every registry entry we create.
    Ready(Arc<PeerIdentity>),
    /// Torn down; the producer's entries have been removed.
    Closed,
}

pub struct Session {
    remote_addr: SocketAddr,
    registry: Arc<RegistrationDb>,
    node_info: Arc<NodeInfo>,
    state: SessionState,
}

impl Session {
    pub fn new(
        remote_addr: SocketAddr,
        registry: Arc<RegistrationDb>,
        node_info: Arc<NodeInfo>,
    ) -> Self {
        Self {
            remote_addr,
            registry,
            node_info,
            state: SessionState::AwaitIdentity,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    pub fn producer_id(&self) -> ProducerId {
        ProducerId(self.remote_addr)
    }

    /// Parse a command line in the light of the current state. Before
    /// IDENTIFY, every other line is rejected without looking further.
    pub fn parse(&self, line: &str) -> Result<Command, ProtocolError> {
        let command = Command::parse(line);
        match (&self.state, command) {
            (SessionState::AwaitIdentity, Ok(Command::Identify)) => Ok(Command::Identify),
            (SessionState::AwaitIdentity, _) => Err(ProtocolError::invalid("client must IDENTIFY")),
            (_, command) => command,
        }
    }

    /// Whether an IDENTIFY may proceed. Checked before the body is read, so
    /// a second IDENTIFY fails without consuming anything.
    pub fn accept_identify(&self) -> Result<(), ProtocolError> {
        match self.state {
            SessionState::AwaitIdentity => Ok(()),
            SessionState::Ready(_) => Err(ProtocolError::invalid("cannot IDENTIFY again")),
            SessionState::Closed => Err(ProtocolError::invalid("session closed")),
        }
    }

    /// Complete IDENTIFY with its body. Answers with the node's own info.
    pub fn identify(&mut self, body: &[u8]) -> Response {
        self.accept_identify()?;
        let body = IdentifyBody::decode(body)?;
        let response = serde_json::to_vec(self.node_info.as_ref()).map_err(|e| {
            ProtocolError::new(ErrorCode::Invalid, format!("failed to encode node info: {e}"))
        })?;

        let identity = Arc::new(PeerIdentity {
            remote_address: self.remote_addr,
            hostname: body.hostname,
            broadcast_address: body.broadcast_address,
            tcp_port: body.tcp_port,
            http_port: body.http_port,
            version: body.version,
        });
        tracing::info!(
            peer = %self.remote_addr,
            broadcast_address = %identity.broadcast_address,
            tcp_port = identity.tcp_port,
            http_port = identity.http_port,
            version = %identity.version,
            "producer identified"
        );
        self.state = SessionState::Ready(identity);
        Ok(response)
    }

    /// Execute a command that carries no body.
    pub fn exec(&mut self, command: Command) -> Response {
        match command {
            Command::Identify => {
                self.accept_identify()?;
                Err(ProtocolError::bad_body("IDENTIFY failed to read body size"))
            }
            Command::Ping => self.ping(),
            Command::Register { topic, channel } => self.register(topic, channel),
            Command::Unregister { topic, channel } => self.unregister(topic, channel),
        }
    }

    fn identity(&self) -> Result<Arc<PeerIdentity>, ProtocolError> {
        match &self.state {
            SessionState::Ready(identity) => Ok(identity.clone()),
            SessionState::AwaitIdentity => Err(ProtocolError::invalid("client must IDENTIFY")),
            SessionState::Closed => Err(ProtocolError::invalid("session closed")),
        }
    }

    fn ping(&self) -> Response {
        let identity = self.identity()?;
        let touched = self.registry.touch(identity.id());
        tracing::trace!(peer = %self.remote_addr, touched, "PING");
        Ok(OK.to_vec())
    }

    fn register(&self, topic: String, channel: Option<String>) -> Response {
        let identity = self.identity()?;

        if let Some(channel) = channel {
            let key = Registration::channel(topic.clone(), channel);
            self.add(key, &identity);
        }
        self.add(Registration::topic(topic), &identity);
        Ok(OK.to_vec())
    }

    fn add(&self, key: Registration, identity: &Arc<PeerIdentity>) {
        let name = key.to_string();
        if self.registry.add_producer(key, Producer::new(identity.clone())) {
            tracing::info!(peer = %self.remote_addr, registration = %name, "REGISTER");
        }
    }

    fn unregister(&self, topic: String, channel: Option<String>) -> Response {
        let id = self.identity()?.id();

        match channel {
            Some(channel) => {
                let key = Registration::channel(topic, channel);
                self.remove(&key, id);
            }
            None => {
                // Dropping a topic drops its channels too.
                let channels =
                    self.registry
                        .find_registrations(Category::Channel.as_str(), &topic, ANY);
                for key in channels {
                    if self.registry.remove_producer(&key, id).removed {
                        tracing::warn!(
                            peer = %self.remote_addr,
                            registration = %key,
                            "unexpected UNREGISTER of channel via its topic"
                        );
                    }
                    self.prune(&key);
                }
                self.remove(&Registration::topic(topic), id);
            }
        }
        Ok(OK.to_vec())
    }

    fn remove(&self, key: &Registration, id: ProducerId) {
        if self.registry.remove_producer(key, id).removed {
            tracing::info!(peer = %self.remote_addr, registration = %key, "UNREGISTER");
        }
        self.prune(key);
    }

    fn prune(&self, key: &Registration) {
        if self.registry.prune_if_empty(key) {
            tracing::info!(registration = %key, "pruned empty registration");
        }
    }

    /// Remove the producer from every registration it holds and move to
    /// [`SessionState::Closed`]. Idempotent.
    pub fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, SessionState::Closed);
        let SessionState::Ready(identity) = previous else {
            return;
        };

        let id = identity.id();
        let keys = self.registry.lookup_registrations(id);
        for key in &keys {
            self.registry.remove_producer(key, id);
        }
        tracing::info!(
            peer = %self.remote_addr,
            registrations = keys.len(),
            "producer disconnected, registrations removed"
        );
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}
