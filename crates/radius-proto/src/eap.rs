//! EAP (Extensible Authentication Protocol) packets and their RADIUS
//! encapsulation (RFC 3748, RFC 3579)
//!
//! # EAP Packet Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Code      |  Identifier   |            Length             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Type      |  Type-Data ...
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use crate::attributes::{Attribute, AttributeType};
use crate::packet::{Code, Packet};
use thiserror::Error;

/// EAP packet code
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapCode {
    Request = 1,
    Response = 2,
    Success = 3,
    Failure = 4,
}

impl EapCode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapCode::Request),
            2 => Some(EapCode::Response),
            3 => Some(EapCode::Success),
            4 => Some(EapCode::Failure),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// RADIUS code carrying an outbound EAP packet of this code
    ///
    /// Success maps to Access-Accept, Failure to Access-Reject and anything
    /// still in progress to Access-Challenge.
    pub fn radius_code(self) -> Code {
        match self {
            EapCode::Success => Code::AccessAccept,
            EapCode::Failure => Code::AccessReject,
            EapCode::Request | EapCode::Response => Code::AccessChallenge,
        }
    }
}

/// EAP method types (RFC 3748 and the IANA registry)
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum EapType {
    /// Identity (1) - RFC 3748
    Identity = 1,
    /// Notification (2) - RFC 3748
    Notification = 2,
    /// Nak (3) - RFC 3748, response only
    Nak = 3,
    /// MD5-Challenge (4) - RFC 3748
    Md5Challenge = 4,
    /// EAP-TLS (13) - RFC 5216
    Tls = 13,
    /// EAP-SIM (18) - RFC 4186
    Sim = 18,
    /// EAP-AKA (23) - RFC 4187
    Aka = 23,
    /// EAP-AKA' (50) - RFC 5448
    AkaPrime = 50,
}

impl EapType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(EapType::Identity),
            2 => Some(EapType::Notification),
            3 => Some(EapType::Nak),
            4 => Some(EapType::Md5Challenge),
            13 => Some(EapType::Tls),
            18 => Some(EapType::Sim),
            23 => Some(EapType::Aka),
            50 => Some(EapType::AkaPrime),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Lower-case method name used in configuration and logs
    pub fn name(self) -> &'static str {
        match self {
            EapType::Identity => "identity",
            EapType::Notification => "notification",
            EapType::Nak => "nak",
            EapType::Md5Challenge => "md5",
            EapType::Tls => "tls",
            EapType::Sim => "sim",
            EapType::Aka => "aka",
            EapType::AkaPrime => "aka_prime",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        [
            EapType::Identity,
            EapType::Notification,
            EapType::Nak,
            EapType::Md5Challenge,
            EapType::Tls,
            EapType::Sim,
            EapType::Aka,
            EapType::AkaPrime,
        ]
        .into_iter()
        .find(|t| t.name().eq_ignore_ascii_case(name))
    }
}

/// EAP packet
///
/// The raw type octet is kept so that packets of methods this crate has no
/// name for still round-trip unchanged.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EapPacket {
    pub code: EapCode,
    pub identifier: u8,
    /// Type octet, present for Request/Response only
    pub type_code: Option<u8>,
    /// Type-Data
    pub data: Vec<u8>,
}

impl EapPacket {
    pub fn new(code: EapCode, identifier: u8, eap_type: Option<EapType>, data: Vec<u8>) -> Self {
        EapPacket {
            code,
            identifier,
            type_code: eap_type.map(EapType::as_u8),
            data,
        }
    }

    pub fn identity_request(identifier: u8) -> Self {
        Self::new(EapCode::Request, identifier, Some(EapType::Identity), Vec::new())
    }

    pub fn identity_response(identifier: u8, identity: &str) -> Self {
        Self::new(
            EapCode::Response,
            identifier,
            Some(EapType::Identity),
            identity.as_bytes().to_vec(),
        )
    }

    pub fn success(identifier: u8) -> Self {
        Self::new(EapCode::Success, identifier, None, Vec::new())
    }

    pub fn failure(identifier: u8) -> Self {
        Self::new(EapCode::Failure, identifier, None, Vec::new())
    }

    /// Registered method type, if the type octet is one this crate knows
    pub fn eap_type(&self) -> Option<EapType> {
        self.type_code.and_then(EapType::from_u8)
    }

    pub fn is_identity(&self) -> bool {
        self.type_code == Some(EapType::Identity.as_u8())
    }

    /// Parse an EAP packet; bytes past the declared length are ignored
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EapError> {
        if bytes.len() < 4 {
            return Err(EapError::PacketTooShort {
                expected: 4,
                actual: bytes.len(),
            });
        }

        let code = EapCode::from_u8(bytes[0]).ok_or(EapError::InvalidCode(bytes[0]))?;
        let identifier = bytes[1];
        let length = u16::from_be_bytes([bytes[2], bytes[3]]) as usize;

        if length < 4 {
            return Err(EapError::InvalidLength(length));
        }
        if bytes.len() < length {
            return Err(EapError::PacketTooShort {
                expected: length,
                actual: bytes.len(),
            });
        }

        let (type_code, data) = match code {
            EapCode::Request | EapCode::Response => {
                if length < 5 {
                    return Err(EapError::InvalidLength(length));
                }
                (Some(bytes[4]), bytes[5..length].to_vec())
            }
            EapCode::Success | EapCode::Failure => (None, Vec::new()),
        };

        Ok(EapPacket {
            code,
            identifier,
            type_code,
            data,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let length = self.length();
        let mut bytes = Vec::with_capacity(length);
        bytes.push(self.code.as_u8());
        bytes.push(self.identifier);
        bytes.extend_from_slice(&(length as u16).to_be_bytes());

        if let (EapCode::Request | EapCode::Response, Some(type_code)) = (self.code, self.type_code) {
            bytes.push(type_code);
            bytes.extend_from_slice(&self.data);
        }

        bytes
    }

    pub fn length(&self) -> usize {
        match (self.code, self.type_code) {
            (EapCode::Request | EapCode::Response, Some(_)) => 5 + self.data.len(),
            _ => 4,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EapError {
    #[error("Packet too short: expected at least {expected} bytes, got {actual}")]
    PacketTooShort { expected: usize, actual: usize },

    #[error("Invalid EAP code: {0}")]
    InvalidCode(u8),

    #[error("Invalid packet length: {0}")]
    InvalidLength(usize),

    #[error("Encoding error: {0}")]
    EncodingError(String),
}

/// Split an EAP packet across as many EAP-Message attributes as needed
/// (RFC 3579 Section 3.1)
pub fn eap_to_radius_attributes(eap_packet: &EapPacket) -> Result<Vec<Attribute>, EapError> {
    eap_packet
        .to_bytes()
        .chunks(Attribute::MAX_VALUE_LENGTH)
        .map(|chunk| {
            Attribute::new(AttributeType::EapMessage.as_u8(), chunk.to_vec()).map_err(|e| {
                EapError::EncodingError(format!("Failed to create EAP-Message attribute: {}", e))
            })
        })
        .collect()
}

/// Reassemble the EAP packet carried by a RADIUS packet
///
/// Returns `Ok(None)` when the packet has no EAP-Message attribute.
pub fn eap_from_radius_packet(radius_packet: &Packet) -> Result<Option<EapPacket>, EapError> {
    let eap_bytes: Vec<u8> = radius_packet
        .find_all_attributes(AttributeType::EapMessage.as_u8())
        .into_iter()
        .flat_map(|attr| attr.value.iter().copied())
        .collect();

    if eap_bytes.is_empty() {
        return Ok(None);
    }

    EapPacket::from_bytes(&eap_bytes).map(Some)
}

pub fn add_eap_to_radius_packet(
    radius_packet: &mut Packet,
    eap_packet: &EapPacket,
) -> Result<(), EapError> {
    for attr in eap_to_radius_attributes(eap_packet)? {
        radius_packet.add_attribute(attr);
    }
    Ok(())
}
