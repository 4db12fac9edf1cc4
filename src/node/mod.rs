//! Node process: HTTP API and server wiring

pub mod http;
pub mod server;

pub use server::{NodeParts, NodeServer};
