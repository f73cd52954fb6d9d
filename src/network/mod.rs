//! Network layer: the TCP gateway and per-connection lifecycle.

mod connection;
mod gateway;

pub use gateway::Gateway;
