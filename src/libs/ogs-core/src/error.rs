//! Pool Error Types

use thiserror::Error;

/// Error returned by identifier and address pools
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PoolError {
    /// Every value of the range is held by a live allocation
    #[error("{name} pool exhausted: range [{min}, {max}] fully allocated")]
    Exhausted { name: String, min: i64, max: i64 },

    /// Lower bound is above upper bound
    #[error("Invalid pool range: [{min}, {max}]")]
    InvalidRange { min: i64, max: i64 },

    /// Subnet cannot be parsed or has no usable host addresses
    #[error("Invalid subnet: {0}")]
    InvalidSubnet(String),

    /// Address does not belong to the pool's subnet
    #[error("Address {0} is outside the pool subnet")]
    OutOfSubnet(std::net::Ipv4Addr),
}

/// Pool Result type
pub type PoolResult<T> = Result<T, PoolError>;
