//! Cached access to theme park attraction data.
//!
//! Static facility details are read from a local SQLite store, filled by
//! syncing each destination's facilities channel. Live status
//! (wait times, FastPass) is pulled through channel synchronization before
//! every read, and operating hours come straight from the schedule endpoint.

pub mod cache;
pub mod config;
pub mod error;
pub mod park;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
