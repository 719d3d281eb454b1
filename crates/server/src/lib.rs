//! Transport layer for taskrank.
//!
//! Exposes the task store and the prioritization engine as a
//! line-delimited JSON request/response protocol.

#![warn(missing_docs)]

pub mod protocol;
pub mod server;

pub use protocol::{error_codes, Request, Response, RpcError};
pub use server::{ServerConfig, TaskServer};
