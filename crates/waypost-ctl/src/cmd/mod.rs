//! CLI command modules.

pub mod admin;
pub mod http;
pub mod nodes;
pub mod topics;
