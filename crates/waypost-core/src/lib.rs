//! waypost-core: wire format, name rules and configuration shared by
//! every waypost crate.

pub mod config;
pub mod names;
pub mod wire;

pub use config::WaypostConfig;
pub use wire::{Command, ErrorCode, ProtocolError};

/// Version reported over IDENTIFY and `/info`.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
