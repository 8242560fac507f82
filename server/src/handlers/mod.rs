//! Request and response types for the Almanac JSON-RPC methods.

pub mod memory;
pub mod reflection;

pub use memory::*;
pub use reflection::*;
