//! NGAP SM Transfer Building
//!
//! N2 SM information exchanged with the access network through the AMF.
//! [`CompactN2Codec`] carries the transfers as fixed-layout records:
//!
//! | Transfer | Layout |
//! |---|---|
//! | Resource setup request | QFI, UL tunnel, 5QI, ARP priority, AMBR DL (8), AMBR UL (8) |
//! | Resource setup response, path switch request, handover request ack | DL tunnel |
//! | Resource release command | cause group, cause value |
//! | Path switch request ack, handover command | UL tunnel |
//!
//! A tunnel is TEID (4), address type (1, `0x01` for IPv4), IPv4 (4).

use std::fmt;
use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};
use ogs_pfcp::prelude::FTeid;

use crate::error::{CodecError, CodecResult};

/// NGAP cause groups
pub mod cause_group {
    pub const RADIO_NETWORK: u8 = 0;
    pub const NAS: u8 = 2;
}

/// NGAP NAS cause values
pub mod nas_cause {
    pub const NORMAL_RELEASE: u8 = 0;
}

const ADDRESS_TYPE_IPV4: u8 = 0x01;

// ============================================================================
// Transfers
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSetupRequestTransfer {
    pub qfi: u8,
    /// UL tunnel terminated at the access-side UPF
    pub ul_tunnel: FTeid,
    pub five_qi: u8,
    pub arp_priority: u8,
    pub ambr_downlink: u64,
    pub ambr_uplink: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct N2Cause {
    pub group: u8,
    pub value: u8,
}

impl N2Cause {
    pub fn normal_release() -> Self {
        Self {
            group: cause_group::NAS,
            value: nas_cause::NORMAL_RELEASE,
        }
    }
}

/// Codec for N2 SM information
pub trait N2Codec: Send + Sync + fmt::Debug {
    fn encode_resource_setup_request(&self, transfer: &ResourceSetupRequestTransfer) -> Vec<u8>;
    fn decode_resource_setup_response(&self, data: &[u8]) -> CodecResult<FTeid>;
    fn encode_resource_release_command(&self, cause: N2Cause) -> Vec<u8>;
    fn decode_path_switch_request(&self, data: &[u8]) -> CodecResult<FTeid>;
    fn encode_path_switch_request_ack(&self, ul_tunnel: FTeid) -> Vec<u8>;
    fn decode_handover_request_ack(&self, data: &[u8]) -> CodecResult<FTeid>;
    fn encode_handover_command(&self, ul_tunnel: FTeid) -> Vec<u8>;
}

// ============================================================================
// Builder
// ============================================================================

#[derive(Debug, Default)]
pub struct N2MessageBuilder {
    buffer: BytesMut,
}

impl N2MessageBuilder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(32),
        }
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.put_u8(value);
        self
    }

    pub fn write_u64(&mut self, value: u64) -> &mut Self {
        self.buffer.put_u64(value);
        self
    }

    pub fn write_tunnel(&mut self, tunnel: FTeid) -> &mut Self {
        self.buffer.put_u32(tunnel.teid);
        self.buffer.put_u8(ADDRESS_TYPE_IPV4);
        self.buffer.put_slice(&tunnel.ipv4.octets());
        self
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer.to_vec()
    }
}

fn decode_tunnel(data: &[u8], what: &'static str) -> CodecResult<FTeid> {
    if data.len() < 9 {
        return Err(CodecError::Truncated(what));
    }
    if data[4] != ADDRESS_TYPE_IPV4 {
        return Err(CodecError::InvalidValue {
            what: "transport layer address type",
            value: data[4],
        });
    }
    let teid = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let ipv4 = Ipv4Addr::new(data[5], data[6], data[7], data[8]);
    Ok(FTeid::new(teid, ipv4))
}

// ============================================================================
// Compact codec
// ============================================================================

#[derive(Debug, Default, Clone, Copy)]
pub struct CompactN2Codec;

impl N2Codec for CompactN2Codec {
    fn encode_resource_setup_request(&self, transfer: &ResourceSetupRequestTransfer) -> Vec<u8> {
        let mut builder = N2MessageBuilder::new();
        builder
            .write_u8(transfer.qfi)
            .write_tunnel(transfer.ul_tunnel)
            .write_u8(transfer.five_qi)
            .write_u8(transfer.arp_priority)
            .write_u64(transfer.ambr_downlink)
            .write_u64(transfer.ambr_uplink);
        builder.build()
    }

    fn decode_resource_setup_response(&self, data: &[u8]) -> CodecResult<FTeid> {
        decode_tunnel(data, "PDU session resource setup response transfer")
    }

    fn encode_resource_release_command(&self, cause: N2Cause) -> Vec<u8> {
        let mut builder = N2MessageBuilder::new();
        builder.write_u8(cause.group).write_u8(cause.value);
        builder.build()
    }

    fn decode_path_switch_request(&self, data: &[u8]) -> CodecResult<FTeid> {
        decode_tunnel(data, "path switch request transfer")
    }

    fn encode_path_switch_request_ack(&self, ul_tunnel: FTeid) -> Vec<u8> {
        let mut builder = N2MessageBuilder::new();
        builder.write_tunnel(ul_tunnel);
        builder.build()
    }

    fn decode_handover_request_ack(&self, data: &[u8]) -> CodecResult<FTeid> {
        decode_tunnel(data, "handover request acknowledge transfer")
    }

    fn encode_handover_command(&self, ul_tunnel: FTeid) -> Vec<u8> {
        let mut builder = N2MessageBuilder::new();
        builder.write_tunnel(ul_tunnel);
        builder.build()
    }
}
