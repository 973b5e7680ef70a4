//! innostat agent library.
//!
//! Configuration loading and the MySQL metric source used by the `innostat`
//! binary. The pipeline itself lives in `innostat-core`.

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod mysql;

pub use config::{ConfigOverrides, PollConfig};
pub use error::AgentError;
pub use mysql::MySqlSource;
