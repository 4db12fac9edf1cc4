//! Common utilities and types shared across nodemesh

pub mod config;
pub mod error;
pub mod utils;

pub use config::{ClusterConfig, Config, NodeEntry};
pub use error::{Cause, Error, Result, TransportFailure};
pub use utils::{parse_duration, NodeStatus};
