//! GSM (5G Session Management) Message Building
//!
//! Outbound N1 SM messages (TS 24.501 Section 8.3).

use std::net::Ipv4Addr;

use bytes::{BufMut, BytesMut};

use crate::models::{Ambr, Snssai};

// ============================================================================
// Constants
// ============================================================================

/// Extended protocol discriminator for 5GSM
pub const OGS_NAS_EXTENDED_PROTOCOL_DISCRIMINATOR_5GSM: u8 = 0x2e;

/// 5GSM message types
pub mod message_type {
    pub const PDU_SESSION_ESTABLISHMENT_REQUEST: u8 = 0xc1;
    pub const PDU_SESSION_ESTABLISHMENT_ACCEPT: u8 = 0xc2;
    pub const PDU_SESSION_ESTABLISHMENT_REJECT: u8 = 0xc3;
    pub const PDU_SESSION_RELEASE_REQUEST: u8 = 0xd1;
    pub const PDU_SESSION_RELEASE_REJECT: u8 = 0xd2;
    pub const PDU_SESSION_RELEASE_COMMAND: u8 = 0xd3;
    pub const PDU_SESSION_RELEASE_COMPLETE: u8 = 0xd4;
}

/// PDU session types
pub mod pdu_session_type {
    pub const IPV4: u8 = 1;
    pub const IPV6: u8 = 2;
    pub const IPV4V6: u8 = 3;
}

/// Optional IE identifiers used in outbound messages
pub mod iei {
    pub const PDU_ADDRESS: u8 = 0x29;
    pub const SNSSAI: u8 = 0x22;
    pub const DNN: u8 = 0x25;
    pub const AUTHORIZED_QOS_FLOW_DESCRIPTIONS: u8 = 0x79;
}

/// 5GSM cause codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GsmCause {
    InsufficientResources = 26,
    MissingOrUnknownDnn = 27,
    UnknownPduSessionType = 28,
    RequestRejectedUnspecified = 31,
    RegularDeactivation = 36,
    NetworkFailure = 38,
    InvalidPduSessionIdentity = 43,
    PduSessionDoesNotExist = 54,
    InsufficientResourcesForSpecificSliceAndDnn = 67,
    InsufficientResourcesForSpecificSlice = 69,
    SemanticallyIncorrectMessage = 95,
    InvalidMandatoryInformation = 96,
    MessageTypeNonExistentOrNotImplemented = 97,
    ProtocolErrorUnspecified = 111,
}

impl From<u8> for GsmCause {
    fn from(value: u8) -> Self {
        match value {
            26 => GsmCause::InsufficientResources,
            27 => GsmCause::MissingOrUnknownDnn,
            28 => GsmCause::UnknownPduSessionType,
            31 => GsmCause::RequestRejectedUnspecified,
            36 => GsmCause::RegularDeactivation,
            38 => GsmCause::NetworkFailure,
            43 => GsmCause::InvalidPduSessionIdentity,
            54 => GsmCause::PduSessionDoesNotExist,
            67 => GsmCause::InsufficientResourcesForSpecificSliceAndDnn,
            69 => GsmCause::InsufficientResourcesForSpecificSlice,
            95 => GsmCause::SemanticallyIncorrectMessage,
            96 => GsmCause::InvalidMandatoryInformation,
            97 => GsmCause::MessageTypeNonExistentOrNotImplemented,
            _ => GsmCause::ProtocolErrorUnspecified,
        }
    }
}

// ============================================================================
// NAS Message Builder
// ============================================================================

#[derive(Debug)]
pub struct GsmMessageBuilder {
    buffer: BytesMut,
}

impl GsmMessageBuilder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(256),
        }
    }

    /// Builder primed with the 5GSM header
    pub fn with_header(psi: u8, pti: u8, message_type: u8) -> Self {
        let mut builder = Self::new();
        builder.buffer.put_u8(OGS_NAS_EXTENDED_PROTOCOL_DISCRIMINATOR_5GSM);
        builder.buffer.put_u8(psi);
        builder.buffer.put_u8(pti);
        builder.buffer.put_u8(message_type);
        builder
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buffer.put_u8(value);
        self
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> &mut Self {
        self.buffer.put_slice(data);
        self
    }

    /// Length-value, 1-byte length. A longer value is cut to 255 bytes.
    pub fn write_lv(&mut self, data: &[u8]) -> &mut Self {
        let len = u8::try_from(data.len()).unwrap_or_else(|_| {
            log::error!("LV value of {} bytes truncated to {}", data.len(), u8::MAX);
            u8::MAX
        });
        self.buffer.put_u8(len);
        self.buffer.put_slice(&data[..usize::from(len)]);
        self
    }

    /// Length-value, 2-byte length. A longer value is cut to 65535 bytes.
    pub fn write_lv_e(&mut self, data: &[u8]) -> &mut Self {
        let len = u16::try_from(data.len()).unwrap_or_else(|_| {
            log::error!("LV-E value of {} bytes truncated to {}", data.len(), u16::MAX);
            u16::MAX
        });
        self.buffer.put_u16(len);
        self.buffer.put_slice(&data[..usize::from(len)]);
        self
    }

    pub fn write_tlv(&mut self, iei: u8, data: &[u8]) -> &mut Self {
        self.buffer.put_u8(iei);
        self.write_lv(data)
    }

    pub fn write_tlv_e(&mut self, iei: u8, data: &[u8]) -> &mut Self {
        self.buffer.put_u8(iei);
        self.write_lv_e(data)
    }

    pub fn build(self) -> Vec<u8> {
        self.buffer.to_vec()
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for GsmMessageBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Outbound messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EstablishmentAccept {
    pub psi: u8,
    pub pti: u8,
    pub pdu_session_type: u8,
    pub ssc_mode: u8,
    pub session_ambr: Option<Ambr>,
    pub five_qi: u8,
    pub ue_ip: Option<Ipv4Addr>,
    pub snssai: Snssai,
    pub dnn: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GsmMessage {
    EstablishmentAccept(EstablishmentAccept),
    EstablishmentReject { psi: u8, pti: u8, cause: GsmCause },
    ReleaseCommand { psi: u8, pti: u8, cause: GsmCause },
    ReleaseReject { psi: u8, pti: u8, cause: GsmCause },
}

impl GsmMessage {
    pub fn message_type(&self) -> u8 {
        match self {
            Self::EstablishmentAccept(_) => message_type::PDU_SESSION_ESTABLISHMENT_ACCEPT,
            Self::EstablishmentReject { .. } => message_type::PDU_SESSION_ESTABLISHMENT_REJECT,
            Self::ReleaseCommand { .. } => message_type::PDU_SESSION_RELEASE_COMMAND,
            Self::ReleaseReject { .. } => message_type::PDU_SESSION_RELEASE_REJECT,
        }
    }
}

pub fn build_gsm_message(message: &GsmMessage) -> Vec<u8> {
    match message {
        GsmMessage::EstablishmentAccept(accept) => build_pdu_session_establishment_accept(accept),
        GsmMessage::EstablishmentReject { psi, pti, cause }
        | GsmMessage::ReleaseCommand { psi, pti, cause }
        | GsmMessage::ReleaseReject { psi, pti, cause } => {
            let mut builder = GsmMessageBuilder::with_header(*psi, *pti, message.message_type());
            builder.write_u8(*cause as u8);
            builder.build()
        }
    }
}

fn build_pdu_session_establishment_accept(accept: &EstablishmentAccept) -> Vec<u8> {
    let mut builder = GsmMessageBuilder::with_header(
        accept.psi,
        accept.pti,
        message_type::PDU_SESSION_ESTABLISHMENT_ACCEPT,
    );

    // SSC mode (high nibble) + selected PDU session type
    builder.write_u8(((accept.ssc_mode & 0x07) << 4) | (accept.pdu_session_type & 0x07));
    builder.write_lv_e(&encode_default_qos_rule());
    let (downlink, uplink) = accept
        .session_ambr
        .as_ref()
        .map_or((0, 0), |ambr| (parse_bitrate(&ambr.downlink), parse_bitrate(&ambr.uplink)));
    builder.write_lv(&encode_session_ambr(downlink, uplink));

    if let Some(addr) = accept.ue_ip {
        let mut pdu_addr = vec![pdu_session_type::IPV4];
        pdu_addr.extend_from_slice(&addr.octets());
        builder.write_tlv(iei::PDU_ADDRESS, &pdu_addr);
    }
    builder.write_tlv(iei::SNSSAI, &encode_snssai(&accept.snssai));
    builder.write_tlv_e(
        iei::AUTHORIZED_QOS_FLOW_DESCRIPTIONS,
        &encode_default_qos_flow_description(accept.five_qi),
    );
    builder.write_tlv(iei::DNN, &encode_dnn(&accept.dnn));

    builder.build()
}

// ============================================================================
// Helper Functions
// ============================================================================

/// QFI of the default QoS flow
pub const DEFAULT_QFI: u8 = 1;

/// Default QoS rule: create, DQR, one match-all packet filter
fn encode_default_qos_rule() -> Vec<u8> {
    let filter = [0x31, 0x01, 0x01]; // bidirectional id 1, len 1, match-all
    let mut content = Vec::with_capacity(8);
    content.push((1 << 5) | (1 << 4) | 1);
    content.extend_from_slice(&filter);
    content.push(255); // precedence
    content.push(DEFAULT_QFI & 0x3f);

    let mut rule = vec![1]; // rule id
    rule.extend_from_slice(&(content.len() as u16).to_be_bytes());
    rule.extend_from_slice(&content);
    rule
}

fn encode_default_qos_flow_description(five_qi: u8) -> Vec<u8> {
    vec![
        DEFAULT_QFI & 0x3f,
        1 << 5, // create new
        0x40 | 1, // E bit, one parameter
        0x01, // 5QI
        1,
        five_qi,
    ]
}

/// "100 Mbps" style bit rate to bits per second
pub fn parse_bitrate(value: &str) -> u64 {
    let mut parts = value.split_whitespace();
    let Some(number) = parts.next().and_then(|n| n.parse::<f64>().ok()) else {
        return 0;
    };
    let multiplier: f64 = match parts.next().map(str::to_ascii_lowercase).as_deref() {
        Some("kbps") => 1e3,
        Some("mbps") => 1e6,
        Some("gbps") => 1e9,
        Some("tbps") => 1e12,
        _ => 1.0,
    };
    (number * multiplier) as u64
}

fn encode_session_ambr(downlink: u64, uplink: u64) -> Vec<u8> {
    let mut data = Vec::with_capacity(6);
    data.extend_from_slice(&encode_ambr_value(downlink));
    data.extend_from_slice(&encode_ambr_value(uplink));
    data
}

/// AMBR unit + 2-byte value
fn encode_ambr_value(bitrate: u64) -> [u8; 3] {
    // Units 1..=11 are 1, 4, 16, 64, 256 kbps, 1, 4, 16, 64, 256 Mbps, 1 Gbps
    const STEPS: [u64; 11] = [
        1_000,
        4_000,
        16_000,
        64_000,
        256_000,
        1_000_000,
        4_000_000,
        16_000_000,
        64_000_000,
        256_000_000,
        1_000_000_000,
    ];
    if bitrate == 0 {
        return [0, 0, 0];
    }
    let (unit, value) = STEPS
        .iter()
        .enumerate()
        .find(|&(_, &step)| bitrate <= 65535 * step)
        .map_or((11u8, u16::MAX), |(i, &step)| ((i + 1) as u8, (bitrate / step) as u16));
    let [hi, lo] = value.to_be_bytes();
    [unit, hi, lo]
}

fn encode_snssai(snssai: &Snssai) -> Vec<u8> {
    let mut data = vec![snssai.sst];
    if let Some(sd) = snssai.sd.as_deref().and_then(|sd| u32::from_str_radix(sd, 16).ok()) {
        data.extend_from_slice(&sd.to_be_bytes()[1..]);
    }
    data
}

/// Longest DNN label (TS 23.003 Section 9.1)
pub const MAX_DNN_LABEL_LEN: usize = 63;

/// The first label of `dnn` longer than [`MAX_DNN_LABEL_LEN`]
pub fn oversized_dnn_label(dnn: &str) -> Option<&str> {
    dnn.split('.').find(|label| label.len() > MAX_DNN_LABEL_LEN)
}

/// DNN as length-prefixed labels. Oversized labels are cut.
fn encode_dnn(dnn: &str) -> Vec<u8> {
    let mut data = Vec::with_capacity(dnn.len() + 1);
    for label in dnn.split('.') {
        let bytes = label.as_bytes();
        let len = bytes.len().min(MAX_DNN_LABEL_LEN);
        if len < bytes.len() {
            log::error!("DNN label of {} bytes truncated to {}", bytes.len(), len);
        }
        // Bounded by MAX_DNN_LABEL_LEN
        data.push(len as u8);
        data.extend_from_slice(&bytes[..len]);
    }
    data
}
