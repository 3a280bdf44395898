//! SMAF Error Types
//!
//! Internal helper errors are converted into [`SmafError`] at the SM
//! context boundary. Outbound responses only ever carry the
//! [`ProblemDetails`] produced by [`SmafError::problem`].

use ogs_core::PoolError;
use ogs_pfcp::PfcpError;
use thiserror::Error;

use crate::models::ProblemDetails;
use crate::pfcp_path::TransportError;
use crate::sbi_path::ConsumerError;
use crate::user_plane::TopologyError;

/// N1/N2 codec error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("Message truncated while reading {0}")]
    Truncated(&'static str),

    #[error("Invalid extended protocol discriminator: 0x{0:02x}")]
    InvalidDiscriminator(u8),

    #[error("Unexpected message type: 0x{0:02x}")]
    UnexpectedMessageType(u8),

    #[error("Invalid {what}: {value}")]
    InvalidValue { what: &'static str, value: u8 },
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Error returned to the SM context boundary
#[derive(Debug, Error)]
pub enum SmafError {
    /// Undecodable signaling payload
    #[error("Malformed input: {0}")]
    MalformedInput(String),

    /// Identifier pool exhausted or no path for the requested DNN
    #[error("Insufficient resources: {0}")]
    ResourceExhausted(String),

    /// Policy, subscriber data or discovery call failed
    #[error("Peer failure: {0}")]
    PeerFailure(String),

    /// Aggregate forwarding-node synchronization failure
    #[error("Forwarding node synchronization failed: {0}")]
    SyncFailure(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("SM context not found: {0}")]
    NotFound(String),

    #[error("{trigger} not allowed in state {state}")]
    InvalidState { trigger: String, state: &'static str },
}

pub type SmafResult<T> = Result<T, SmafError>;

impl SmafError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput(_) => "MALFORMED_INPUT",
            Self::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            Self::PeerFailure(_) => "PEER_FAILURE",
            Self::SyncFailure(_) => "SYNC_FAILURE",
            Self::Configuration(_) => "CONFIGURATION",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState { .. } => "INVALID_STATE",
        }
    }

    /// Structured problem object for the caller-facing response
    pub fn problem(&self) -> ProblemDetails {
        let problem = match self {
            Self::MalformedInput(_) => ProblemDetails::new(403, "N1_SM_ERROR", "N1 SM Error"),
            Self::ResourceExhausted(_) => ProblemDetails::new(
                403,
                "INSUFFICIENT_RESOURCES_SLICE_DNN",
                "Insufficient resources for slice and DNN",
            ),
            Self::PeerFailure(_) | Self::SyncFailure(_) | Self::Configuration(_) => {
                ProblemDetails::new(500, "SYSTEM_FAILURE", "System failure")
            }
            Self::NotFound(_) => ProblemDetails::new(404, "CONTEXT_NOT_FOUND", "SM context not found"),
            Self::InvalidState { .. } => ProblemDetails::new(409, "INVALID_STATE", "Invalid SM context state"),
        };
        problem.with_detail(self.to_string())
    }
}

impl From<CodecError> for SmafError {
    fn from(err: CodecError) -> Self {
        Self::MalformedInput(err.to_string())
    }
}

impl From<PoolError> for SmafError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Exhausted { .. } => Self::ResourceExhausted(err.to_string()),
            _ => Self::Configuration(err.to_string()),
        }
    }
}

impl From<TopologyError> for SmafError {
    fn from(err: TopologyError) -> Self {
        match err {
            TopologyError::NoPathForDnn(_) | TopologyError::TeidExhausted(_) => {
                Self::ResourceExhausted(err.to_string())
            }
            _ => Self::Configuration(err.to_string()),
        }
    }
}

impl From<PfcpError> for SmafError {
    fn from(err: PfcpError) -> Self {
        Self::SyncFailure(err.to_string())
    }
}

impl From<TransportError> for SmafError {
    fn from(err: TransportError) -> Self {
        Self::SyncFailure(err.to_string())
    }
}

impl From<ConsumerError> for SmafError {
    fn from(err: ConsumerError) -> Self {
        Self::PeerFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_problem_mapping() {
        let err = SmafError::from(CodecError::Truncated("header"));
        let problem = err.problem();
        assert_eq!(problem.status, 403);
        assert_eq!(problem.cause.as_deref(), Some("N1_SM_ERROR"));

        let err = SmafError::from(TopologyError::NoPathForDnn("ims".to_string()));
        assert_eq!(err.problem().cause.as_deref(), Some("INSUFFICIENT_RESOURCES_SLICE_DNN"));

        let err = SmafError::NotFound("urn:uuid:x".to_string());
        assert_eq!(err.problem().status, 404);

        let err = SmafError::InvalidState {
            trigger: "upCnxState DEACTIVATED".to_string(),
            state: "InActivePending",
        };
        assert_eq!(err.problem().status, 409);
        assert_eq!(err.kind(), "INVALID_STATE");
    }

    #[test]
    fn test_pool_exhaustion_is_resource_error() {
        let err = SmafError::from(PoolError::Exhausted {
            name: "TEID".to_string(),
            min: 1,
            max: 1,
        });
        assert!(matches!(err, SmafError::ResourceExhausted(_)));

        let err = SmafError::from(PoolError::InvalidRange { min: 2, max: 1 });
        assert!(matches!(err, SmafError::Configuration(_)));
    }
}
