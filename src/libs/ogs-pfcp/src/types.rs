//! PFCP Types
//!
//! Value types carried inside rules, as specified in 3GPP TS 29.244.

use std::fmt;
use std::net::Ipv4Addr;

use crate::error::PfcpError;

/// PFCP UDP port (8805)
pub const PFCP_UDP_PORT: u16 = 8805;

/// PFCP Cause Values (TS 29.244 Section 8.2.1)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PfcpCause {
    RequestAccepted = 1,
    RequestRejected = 64,
    SessionContextNotFound = 65,
    MandatoryIeMissing = 66,
    RuleCreationModificationFailure = 73,
    PfcpEntityInCongestion = 74,
    NoResourcesAvailable = 75,
    SystemFailure = 77,
}

impl TryFrom<u8> for PfcpCause {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::RequestAccepted),
            64 => Ok(Self::RequestRejected),
            65 => Ok(Self::SessionContextNotFound),
            66 => Ok(Self::MandatoryIeMissing),
            73 => Ok(Self::RuleCreationModificationFailure),
            74 => Ok(Self::PfcpEntityInCongestion),
            75 => Ok(Self::NoResourcesAvailable),
            77 => Ok(Self::SystemFailure),
            _ => Err(PfcpError::InvalidCause(value)),
        }
    }
}

impl PfcpCause {
    /// Get the name of the cause
    pub fn name(&self) -> &'static str {
        match self {
            Self::RequestAccepted => "Request Accepted",
            Self::RequestRejected => "Request Rejected",
            Self::SessionContextNotFound => "Session Context Not Found",
            Self::MandatoryIeMissing => "Mandatory IE Missing",
            Self::RuleCreationModificationFailure => "Rule Creation/Modification Failure",
            Self::PfcpEntityInCongestion => "PFCP Entity in Congestion",
            Self::NoResourcesAvailable => "No Resources Available",
            Self::SystemFailure => "System Failure",
        }
    }

    /// Check if cause indicates success
    pub fn is_success(&self) -> bool {
        matches!(self, Self::RequestAccepted)
    }
}

impl fmt::Display for PfcpCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), *self as u8)
    }
}

/// Source Interface values (TS 29.244 Section 8.2.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SourceInterface {
    #[default]
    Access = 0,
    Core = 1,
    SgiLanN6Lan = 2,
    CpFunction = 3,
}

impl TryFrom<u8> for SourceInterface {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Access),
            1 => Ok(Self::Core),
            2 => Ok(Self::SgiLanN6Lan),
            3 => Ok(Self::CpFunction),
            _ => Err(PfcpError::InvalidInterfaceType(value)),
        }
    }
}

/// Destination Interface values (TS 29.244 Section 8.2.24)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DestinationInterface {
    #[default]
    Access = 0,
    Core = 1,
    SgiLanN6Lan = 2,
    CpFunction = 3,
}

impl TryFrom<u8> for DestinationInterface {
    type Error = PfcpError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Access),
            1 => Ok(Self::Core),
            2 => Ok(Self::SgiLanN6Lan),
            3 => Ok(Self::CpFunction),
            _ => Err(PfcpError::InvalidInterfaceType(value)),
        }
    }
}

/// F-TEID (Fully Qualified TEID), IPv4 only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FTeid {
    pub teid: u32,
    pub ipv4: Ipv4Addr,
}

impl FTeid {
    pub fn new(teid: u32, ipv4: Ipv4Addr) -> Self {
        Self { teid, ipv4 }
    }
}

/// UE IP Address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UeIpAddress {
    pub ipv4: Ipv4Addr,
    /// S/D flag: the address is matched as destination (downlink)
    pub is_destination: bool,
}

/// Apply Action flags (TS 29.244 Section 8.2.26)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApplyAction {
    pub drop: bool,
    pub forw: bool,
    pub buff: bool,
    pub nocp: bool,
    pub dupl: bool,
}

impl ApplyAction {
    /// Create DROP action
    pub fn drop() -> Self {
        Self { drop: true, ..Default::default() }
    }

    /// Create FORWARD action
    pub fn forward() -> Self {
        Self { forw: true, ..Default::default() }
    }

    /// Create BUFFER action
    pub fn buffer() -> Self {
        Self { buff: true, ..Default::default() }
    }

    /// BUFFER and notify the CP function of the first buffered packet
    pub fn buffer_and_notify() -> Self {
        Self { buff: true, nocp: true, ..Default::default() }
    }

    /// Flag octets as carried on the wire
    pub fn encode(&self) -> u16 {
        ((self.dupl as u16) << 4)
            | ((self.nocp as u16) << 3)
            | ((self.buff as u16) << 2)
            | ((self.forw as u16) << 1)
            | (self.drop as u16)
    }

    /// Decode flag octets
    pub fn decode(value: u16) -> Self {
        Self {
            drop: value & 0x01 != 0,
            forw: (value >> 1) & 0x01 != 0,
            buff: (value >> 2) & 0x01 != 0,
            nocp: (value >> 3) & 0x01 != 0,
            dupl: (value >> 4) & 0x01 != 0,
        }
    }
}

impl fmt::Display for ApplyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags: Vec<&str> = [
            (self.drop, "DROP"),
            (self.forw, "FORW"),
            (self.buff, "BUFF"),
            (self.nocp, "NOCP"),
            (self.dupl, "DUPL"),
        ]
        .iter()
        .filter(|(set, _)| *set)
        .map(|(_, name)| *name)
        .collect();
        write!(f, "[{}]", flags.join("|"))
    }
}

/// Outer Header Removal description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum OuterHeaderRemoval {
    #[default]
    GtpUUdpIpv4 = 0,
    GtpUUdpIpv6 = 1,
}

/// Outer Header Creation, GTP-U/UDP/IPv4
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OuterHeaderCreation {
    pub teid: u32,
    pub ipv4: Ipv4Addr,
}

impl OuterHeaderCreation {
    pub fn gtpu_ipv4(teid: u32, ipv4: Ipv4Addr) -> Self {
        Self { teid, ipv4 }
    }
}

/// PDI (Packet Detection Information)
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Pdi {
    pub source_interface: SourceInterface,
    pub local_f_teid: Option<FTeid>,
    pub network_instance: Option<String>,
    pub ue_ip_address: Option<UeIpAddress>,
}

impl Pdi {
    pub fn new(source_interface: SourceInterface) -> Self {
        Self {
            source_interface,
            ..Default::default()
        }
    }
}

/// Forwarding Parameters carried by a FAR
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardingParameters {
    pub destination_interface: DestinationInterface,
    pub network_instance: Option<String>,
    pub outer_header_creation: Option<OuterHeaderCreation>,
}

impl ForwardingParameters {
    pub fn new(destination_interface: DestinationInterface) -> Self {
        Self {
            destination_interface,
            network_instance: None,
            outer_header_creation: None,
        }
    }

    pub fn with_network_instance(mut self, network_instance: &str) -> Self {
        self.network_instance = Some(network_instance.to_string());
        self
    }

    pub fn with_outer_header(mut self, ohc: OuterHeaderCreation) -> Self {
        self.outer_header_creation = Some(ohc);
        self
    }
}
