//! PFCP Error Types

use thiserror::Error;

/// PFCP Error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PfcpError {
    /// Invalid cause value
    #[error("Invalid cause value: {0}")]
    InvalidCause(u8),

    /// Invalid interface type
    #[error("Invalid interface type: {0}")]
    InvalidInterfaceType(u8),

    /// A rule that already matches the forwarding node was handed to a request
    #[error("{kind} {id} is already synced")]
    RuleAlreadySynced { kind: &'static str, id: u32 },

    /// Request kind does not allow the given content
    #[error("Invalid session request: {0}")]
    InvalidRequest(String),
}

/// PFCP Result type
pub type PfcpResult<T> = Result<T, PfcpError>;
