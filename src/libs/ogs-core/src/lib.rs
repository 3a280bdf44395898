//! NextGCore Core Library
//!
//! Bounded identifier pools shared by the network functions:
//!
//! - [`IdGenerator`]: thread-safe allocator over an inclusive integer range,
//!   used for path identifiers, local SEIDs and rule identifiers
//! - [`UeIpPool`]: IPv4 address pool over a subnet, built on [`IdGenerator`]

pub mod error;
pub mod idgen;
pub mod ippool;

#[cfg(test)]
mod property_tests;

pub use error::{PoolError, PoolResult};
pub use idgen::IdGenerator;
pub use ippool::UeIpPool;
