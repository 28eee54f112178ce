//! Producer sessions: protocol state, connection I/O and the acceptor that
//! hands connections to them.

pub mod acceptor;
pub mod conn;
pub mod state;

pub use acceptor::Acceptor;
pub use state::{Response, Session, SessionState};
