//! waypostd: the waypost discovery node.
//!
//! Producers connect over TCP, IDENTIFY themselves and REGISTER the topics
//! and channels they host; consumers query the HTTP API. [`node::Node`]
//! wires the pieces together and owns their shutdown.

pub mod node;
pub mod session;
pub mod sweeper;

pub use node::{Node, NodeError, NodeOptions};
