//! Almanac Server Library
//!
//! Serves the Almanac memory log over line-delimited JSON-RPC on stdio, with
//! a background scheduler writing reflections back into the log.

pub mod config;
pub mod error;
pub mod handlers;
pub mod memory;
pub mod rpc;

pub use config::AlmanacConfig;
pub use error::{ServiceError, ServiceResult};
pub use memory::MemoryService;
pub use rpc::RpcServer;
