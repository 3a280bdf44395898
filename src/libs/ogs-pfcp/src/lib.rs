//! NextGCore PFCP Rule Library
//!
//! Rule abstractions used by the control plane to drive user-plane
//! forwarding nodes over N4 (3GPP TS 29.244):
//!
//! - Packet Detection Rules ([`Pdr`]) with their owned Forwarding Action
//!   Rule ([`Far`]) and optional Buffering Action Rule ([`Bar`])
//! - The rule lifecycle tag ([`RuleState`]) that decides whether a rule is
//!   created, updated or removed on the next synchronization
//! - Session establishment/modification/deletion request and response
//!   abstractions ([`SessionRequest`], [`SessionResponse`])
//!
//! Wire encoding is left to the transport.

pub mod error;
pub mod rule;
pub mod session;
pub mod types;

#[cfg(test)]
mod property_tests;

pub use error::{PfcpError, PfcpResult};
pub use rule::{Bar, Far, Pdr, RuleAction, RuleState};
pub use session::{BarIe, FarIe, PdrIe, SessionRequest, SessionRequestKind, SessionResponse};
pub use types::PFCP_UDP_PORT;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{PfcpError, PfcpResult};
    pub use crate::rule::{Bar, Far, Pdr, RuleAction, RuleState};
    pub use crate::session::{
        BarIe, FarIe, PdrIe, SessionRequest, SessionRequestKind, SessionResponse,
    };
    pub use crate::types::{
        ApplyAction, DestinationInterface, FTeid, ForwardingParameters, OuterHeaderCreation,
        OuterHeaderRemoval, PfcpCause, Pdi, SourceInterface, UeIpAddress,
    };
}
