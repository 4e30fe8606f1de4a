//! Providers Module - Chain Access
//!
//! JSON-RPC transport and the multi-endpoint chain client built on top of it.

pub mod rpc;
pub mod transport;

pub use rpc::*;
pub use transport::*;
