//! GSM (5G Session Management) Message Handling
//!
//! Decoding of the N1 SM messages a UE sends to the session management
//! function, and the [`GsmCodec`] seam the producer handlers use.

use std::fmt;

use crate::error::{CodecError, CodecResult};
use crate::gsm_build::{build_gsm_message, message_type, GsmCause, GsmMessage, OGS_NAS_EXTENDED_PROTOCOL_DISCRIMINATOR_5GSM};

/// Optional IE identifiers of inbound messages
pub mod iei {
    /// Half-octet IEs carry their identifier in the high nibble
    pub const PDU_SESSION_TYPE: u8 = 0x90;
    pub const SSC_MODE: u8 = 0xa0;
    pub const ALWAYS_ON_PDU_SESSION_REQUESTED: u8 = 0xb0;
    pub const GSM_CAPABILITY: u8 = 0x28;
    pub const SM_PDU_DN_REQUEST_CONTAINER: u8 = 0x39;
    pub const MAXIMUM_NUMBER_OF_SUPPORTED_PACKET_FILTERS: u8 = 0x55;
    pub const GSM_CAUSE: u8 = 0x59;
    pub const EXTENDED_PROTOCOL_CONFIGURATION_OPTIONS: u8 = 0x7b;
}

// ============================================================================
// Parsed messages
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EstablishmentRequest {
    pub psi: u8,
    pub pti: u8,
    pub integrity_protection_max_data_rate: [u8; 2],
    pub pdu_session_type: Option<u8>,
    pub ssc_mode: Option<u8>,
    pub always_on_requested: bool,
    pub max_packet_filters: Option<u16>,
    pub epco: Option<Vec<u8>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GsmRequest {
    EstablishmentRequest(EstablishmentRequest),
    ReleaseRequest { psi: u8, pti: u8, cause: Option<GsmCause> },
    ReleaseComplete { psi: u8, pti: u8, cause: Option<GsmCause> },
}

impl GsmRequest {
    pub fn name(&self) -> &'static str {
        match self {
            Self::EstablishmentRequest(_) => "PDU Session Establishment Request",
            Self::ReleaseRequest { .. } => "PDU Session Release Request",
            Self::ReleaseComplete { .. } => "PDU Session Release Complete",
        }
    }

    pub fn pti(&self) -> u8 {
        match self {
            Self::EstablishmentRequest(req) => req.pti,
            Self::ReleaseRequest { pti, .. } | Self::ReleaseComplete { pti, .. } => *pti,
        }
    }
}

// ============================================================================
// Reader
// ============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn u8(&mut self, what: &'static str) -> CodecResult<u8> {
        let value = *self.data.get(self.pos).ok_or(CodecError::Truncated(what))?;
        self.pos += 1;
        Ok(value)
    }

    fn u16(&mut self, what: &'static str) -> CodecResult<u16> {
        Ok(u16::from_be_bytes([self.u8(what)?, self.u8(what)?]))
    }

    fn take(&mut self, len: usize, what: &'static str) -> CodecResult<&'a [u8]> {
        let end = self.pos.checked_add(len).ok_or(CodecError::Truncated(what))?;
        let slice = self.data.get(self.pos..end).ok_or(CodecError::Truncated(what))?;
        self.pos = end;
        Ok(slice)
    }

    fn lv(&mut self, what: &'static str) -> CodecResult<&'a [u8]> {
        let len = self.u8(what)? as usize;
        self.take(len, what)
    }

    fn lv_e(&mut self, what: &'static str) -> CodecResult<&'a [u8]> {
        let len = self.u16(what)? as usize;
        self.take(len, what)
    }

    /// Skip an IE this function does not interpret
    fn skip_unknown(&mut self, iei: u8) -> CodecResult<()> {
        if iei >= 0x80 {
            return Ok(());
        }
        if iei & 0x70 == 0x70 {
            self.lv_e("unknown IE")?;
        } else {
            self.lv("unknown IE")?;
        }
        Ok(())
    }
}

// ============================================================================
// Decoding
// ============================================================================

pub fn decode_gsm_message(data: &[u8]) -> CodecResult<GsmRequest> {
    let mut reader = Reader::new(data);
    let epd = reader.u8("extended protocol discriminator")?;
    if epd != OGS_NAS_EXTENDED_PROTOCOL_DISCRIMINATOR_5GSM {
        return Err(CodecError::InvalidDiscriminator(epd));
    }
    let psi = reader.u8("PDU session identity")?;
    let pti = reader.u8("procedure transaction identity")?;
    let msg_type = reader.u8("message type")?;

    match msg_type {
        message_type::PDU_SESSION_ESTABLISHMENT_REQUEST => {
            decode_establishment_request(&mut reader, psi, pti).map(GsmRequest::EstablishmentRequest)
        }
        message_type::PDU_SESSION_RELEASE_REQUEST => {
            let cause = decode_release_ies(&mut reader)?;
            Ok(GsmRequest::ReleaseRequest { psi, pti, cause })
        }
        message_type::PDU_SESSION_RELEASE_COMPLETE => {
            let cause = decode_release_ies(&mut reader)?;
            Ok(GsmRequest::ReleaseComplete { psi, pti, cause })
        }
        other => Err(CodecError::UnexpectedMessageType(other)),
    }
}

fn decode_establishment_request(reader: &mut Reader<'_>, psi: u8, pti: u8) -> CodecResult<EstablishmentRequest> {
    let mut req = EstablishmentRequest {
        psi,
        pti,
        ..Default::default()
    };
    req.integrity_protection_max_data_rate = [
        reader.u8("integrity protection maximum data rate")?,
        reader.u8("integrity protection maximum data rate")?,
    ];

    while !reader.is_empty() {
        let octet = reader.u8("IEI")?;
        match octet & 0xf0 {
            iei::PDU_SESSION_TYPE => {
                let value = octet & 0x07;
                if value == 0 || value > 5 {
                    return Err(CodecError::InvalidValue {
                        what: "PDU session type",
                        value,
                    });
                }
                req.pdu_session_type = Some(value);
                continue;
            }
            iei::SSC_MODE => {
                req.ssc_mode = Some(octet & 0x07);
                continue;
            }
            iei::ALWAYS_ON_PDU_SESSION_REQUESTED => {
                req.always_on_requested = octet & 0x01 == 1;
                continue;
            }
            _ => {}
        }
        match octet {
            iei::MAXIMUM_NUMBER_OF_SUPPORTED_PACKET_FILTERS => {
                req.max_packet_filters = Some(reader.u16("maximum number of supported packet filters")? >> 5);
            }
            iei::EXTENDED_PROTOCOL_CONFIGURATION_OPTIONS => {
                req.epco = Some(reader.lv_e("extended protocol configuration options")?.to_vec());
            }
            iei::GSM_CAPABILITY | iei::SM_PDU_DN_REQUEST_CONTAINER => {
                reader.lv("optional IE")?;
            }
            other => reader.skip_unknown(other)?,
        }
    }
    Ok(req)
}

fn decode_release_ies(reader: &mut Reader<'_>) -> CodecResult<Option<GsmCause>> {
    let mut cause = None;
    while !reader.is_empty() {
        match reader.u8("IEI")? {
            iei::GSM_CAUSE => cause = Some(GsmCause::from(reader.u8("5GSM cause")?)),
            iei::EXTENDED_PROTOCOL_CONFIGURATION_OPTIONS => {
                reader.lv_e("extended protocol configuration options")?;
            }
            other => reader.skip_unknown(other)?,
        }
    }
    Ok(cause)
}

// ============================================================================
// Codec seam
// ============================================================================

/// N1 SM codec used by the producer handlers
pub trait GsmCodec: Send + Sync + fmt::Debug {
    fn decode(&self, data: &[u8]) -> CodecResult<GsmRequest>;
    fn encode(&self, message: &GsmMessage) -> Vec<u8>;
}

/// 5GSM codec over the TS 24.501 header and the IEs this function uses
#[derive(Debug, Default, Clone, Copy)]
pub struct NasGsmCodec;

impl GsmCodec for NasGsmCodec {
    fn decode(&self, data: &[u8]) -> CodecResult<GsmRequest> {
        decode_gsm_message(data)
    }

    fn encode(&self, message: &GsmMessage) -> Vec<u8> {
        build_gsm_message(message)
    }
}
