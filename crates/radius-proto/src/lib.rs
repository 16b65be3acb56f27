//! RADIUS protocol support for the gateway
//!
//! Covers RFC 2865 (authentication), RFC 2866 (accounting), RFC 2869 and
//! RFC 3579 (EAP, Message-Authenticator), RFC 5176 (CoA and Disconnect) and
//! the RFC 2548 MS-MPPE key attributes.
//!
//! # Example
//!
//! ```rust
//! use radius_proto::{Attribute, AttributeType, Code, Packet};
//! use radius_proto::auth::{encrypt_user_password, generate_request_authenticator};
//!
//! let req_auth = generate_request_authenticator();
//! let mut packet = Packet::new(Code::AccessRequest, 1, req_auth);
//! packet.add_attribute(Attribute::string(AttributeType::UserName as u8, "alice").unwrap());
//!
//! let hidden = encrypt_user_password(b"password", b"secret", &req_auth);
//! packet.add_attribute(Attribute::new(AttributeType::UserPassword as u8, hidden).unwrap());
//!
//! let bytes = packet.encode().unwrap();
//! assert_eq!(Packet::decode(&bytes).unwrap(), packet);
//! ```

pub mod accounting;
pub mod attributes;
pub mod auth;
pub mod eap;
pub mod message_auth;
pub mod mppe;
pub mod packet;

pub use accounting::{AcctStatusType, AcctTerminateCause, UsageCounters};
pub use attributes::{Attribute, AttributeType, VendorSpecific};
pub use auth::{
    calculate_request_authenticator, calculate_response_authenticator, decrypt_user_password,
    encrypt_user_password, finalize_request, finalize_response, generate_request_authenticator,
    verify_response_authenticator,
};
pub use eap::{EapCode, EapError, EapPacket, EapType};
pub use message_auth::{calculate_message_authenticator, verify_packet_message_authenticator};
pub use mppe::{MppeError, encrypt_mppe_key_with_salt, generate_mppe_key, mppe_keys_from_msk};
pub use packet::{Code, Packet, PacketError};
