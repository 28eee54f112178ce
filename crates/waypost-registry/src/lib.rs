//! waypost-registry: the in-memory registration registry.
//!
//! Tracks which producers announce which topics and channels, with
//! heartbeat liveness and tombstones. Pure data structure: no I/O, no tasks.
//! Sessions, the sweeper and the HTTP API all share one
//! [`RegistrationDb`] through an `Arc`.

pub mod db;
pub mod producer;
pub mod registration;

pub use db::{RegistrationDb, RegistryError, RemoveOutcome, SweepReport};
pub use producer::{PeerIdentity, Producer, ProducerId};
pub use registration::{Category, Matcher, Registration, RegistrationFilter, ANY};
