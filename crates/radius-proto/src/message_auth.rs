//! Message-Authenticator (RFC 3579 Section 3.2)
//!
//! HMAC-MD5 keyed with the shared secret, computed over the whole packet with
//! the Message-Authenticator value zeroed. For requests the authenticator
//! field holds the packet's own Request Authenticator; for responses it holds
//! the Request Authenticator of the request being answered. Every packet
//! carrying EAP-Message must also carry a Message-Authenticator.

use crate::attributes::AttributeType;
use crate::packet::Packet;
use hmac::{Hmac, Mac};
use md5_digest::Md5;

type HmacMd5 = Hmac<Md5>;

/// HMAC-MD5 of `packet_bytes` under `secret`
pub fn calculate_message_authenticator(packet_bytes: &[u8], secret: &[u8]) -> [u8; 16] {
    let mut mac = match HmacMd5::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any length"),
    };
    mac.update(packet_bytes);

    let mut output = [0u8; 16];
    output.copy_from_slice(&mac.finalize().into_bytes());
    output
}

/// Check the Message-Authenticator of a decoded packet
///
/// `authenticator` is placed in the authenticator field before hashing.
/// Returns false when the attribute is absent or malformed.
pub fn verify_packet_message_authenticator(
    packet: &Packet,
    secret: &[u8],
    authenticator: &[u8; 16],
) -> bool {
    let message_auth_type = AttributeType::MessageAuthenticator.as_u8();
    let Some(received) = packet.find_attribute(message_auth_type) else {
        return false;
    };
    if received.value.len() != 16 {
        return false;
    }

    let mut copy = packet.clone();
    copy.authenticator = *authenticator;
    for attr in copy
        .attributes
        .iter_mut()
        .filter(|a| a.attr_type == message_auth_type)
    {
        attr.value = vec![0u8; 16];
    }

    match copy.encode() {
        Ok(bytes) => calculate_message_authenticator(&bytes, secret) == received.value.as_slice(),
        Err(_) => false,
    }
}
