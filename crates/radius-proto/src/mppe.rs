//! MS-MPPE-Send-Key / MS-MPPE-Recv-Key (RFC 2548 Sections 2.4.2 and 2.4.3)
//!
//! The key is prefixed with its length, zero padded to a multiple of 16 and
//! hidden block by block:
//!
//! ```text
//! b(1) = MD5(S + R + A)    c(1) = p(1) xor b(1)
//! b(i) = MD5(S + c(i-1))   c(i) = p(i) xor b(i)
//! ```
//!
//! where `S` is the shared secret, `R` the Request Authenticator of the
//! Access-Request being answered and `A` the two-octet salt. The most
//! significant bit of the salt is always set.

use crate::attributes::{Attribute, VendorSpecific};
use crate::packet::PacketError;
use rand::Rng;
use thiserror::Error;

/// Microsoft vendor id (RFC 2548)
pub const MICROSOFT_VENDOR_ID: u32 = 311;
/// MS-MPPE-Send-Key vendor type
pub const MS_MPPE_SEND_KEY: u8 = 16;
/// MS-MPPE-Recv-Key vendor type
pub const MS_MPPE_RECV_KEY: u8 = 17;

/// Octets of MSK consumed by each of the two MPPE keys
const MPPE_KEY_LENGTH: usize = 32;

#[derive(Debug, Error)]
pub enum MppeError {
    #[error("MPPE key too long: {0} bytes")]
    KeyTooLong(usize),
    #[error("MPPE salt must have its most significant bit set: {0:02x}{1:02x}")]
    InvalidSalt(u8, u8),
    #[error("MSK too short: expected {expected} bytes, got {actual}")]
    MskTooShort { expected: usize, actual: usize },
    #[error("Invalid MPPE ciphertext length: {0}")]
    InvalidCiphertext(usize),
    #[error("Attribute error: {0}")]
    Attribute(#[from] PacketError),
}

fn xor_block(block: &[u8], pad: &[u8; 16]) -> Vec<u8> {
    block.iter().zip(pad.iter()).map(|(a, b)| a ^ b).collect()
}

fn first_pad(secret: &[u8], request_authenticator: &[u8; 16], salt: [u8; 2]) -> [u8; 16] {
    let mut data = Vec::with_capacity(secret.len() + 18);
    data.extend_from_slice(secret);
    data.extend_from_slice(request_authenticator);
    data.extend_from_slice(&salt);
    md5::compute(&data).0
}

fn next_pad(secret: &[u8], previous_cipher: &[u8]) -> [u8; 16] {
    let mut data = Vec::with_capacity(secret.len() + 16);
    data.extend_from_slice(secret);
    data.extend_from_slice(previous_cipher);
    md5::compute(&data).0
}

/// Hide `key` with an explicit salt and return the ciphertext
///
/// Deterministic for fixed inputs.
pub fn encrypt_mppe_key_with_salt(
    key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salt: [u8; 2],
) -> Result<Vec<u8>, MppeError> {
    if salt[0] & 0x80 == 0 {
        return Err(MppeError::InvalidSalt(salt[0], salt[1]));
    }
    // Salt plus ciphertext must fit a vendor sub-attribute
    if key.len() > u8::MAX as usize || (key.len() + 1).div_ceil(16) * 16 + 2 > 247 {
        return Err(MppeError::KeyTooLong(key.len()));
    }

    let mut plaintext = Vec::with_capacity(key.len() + 16);
    plaintext.push(key.len() as u8);
    plaintext.extend_from_slice(key);
    plaintext.resize(plaintext.len().div_ceil(16) * 16, 0);

    let mut ciphertext = Vec::with_capacity(plaintext.len());
    let mut pad = first_pad(secret, request_authenticator, salt);
    for block in plaintext.chunks(16) {
        let cipher_block = xor_block(block, &pad);
        pad = next_pad(secret, &cipher_block);
        ciphertext.extend_from_slice(&cipher_block);
    }

    Ok(ciphertext)
}

/// Recover a key hidden by [`encrypt_mppe_key_with_salt`]
pub fn decrypt_mppe_key(
    ciphertext: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
    salt: [u8; 2],
) -> Result<Vec<u8>, MppeError> {
    if ciphertext.is_empty() || ciphertext.len() % 16 != 0 {
        return Err(MppeError::InvalidCiphertext(ciphertext.len()));
    }

    let mut plaintext = Vec::with_capacity(ciphertext.len());
    let mut pad = first_pad(secret, request_authenticator, salt);
    for block in ciphertext.chunks(16) {
        plaintext.extend(xor_block(block, &pad));
        pad = next_pad(secret, block);
    }

    let length = plaintext[0] as usize;
    if length + 1 > plaintext.len() {
        return Err(MppeError::InvalidCiphertext(ciphertext.len()));
    }
    Ok(plaintext[1..=length].to_vec())
}

/// Random salt with the most significant bit forced on
pub fn random_salt() -> [u8; 2] {
    let mut salt = [0u8; 2];
    rand::rng().fill(&mut salt);
    salt[0] |= 0x80;
    salt
}

/// Wrap a salt and ciphertext as a Microsoft Vendor-Specific attribute
pub fn mppe_key_attribute(
    vendor_type: u8,
    salt: [u8; 2],
    ciphertext: &[u8],
) -> Result<Attribute, MppeError> {
    let mut value = Vec::with_capacity(2 + ciphertext.len());
    value.extend_from_slice(&salt);
    value.extend_from_slice(ciphertext);
    let vsa = VendorSpecific::new(MICROSOFT_VENDOR_ID, vendor_type, value);
    Ok(Attribute::vendor_specific(&vsa)?)
}

/// Build an MS-MPPE key attribute of `vendor_type` with a freshly drawn salt
pub fn generate_mppe_key(
    vendor_type: u8,
    key: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<Attribute, MppeError> {
    let salt = random_salt();
    let ciphertext = encrypt_mppe_key_with_salt(key, secret, request_authenticator, salt)?;
    mppe_key_attribute(vendor_type, salt, &ciphertext)
}

/// MS-MPPE-Recv-Key from the first 32 octets of the MSK and MS-MPPE-Send-Key
/// from the next 32, each under its own salt
pub fn mppe_keys_from_msk(
    msk: &[u8],
    secret: &[u8],
    request_authenticator: &[u8; 16],
) -> Result<[Attribute; 2], MppeError> {
    if msk.len() < 2 * MPPE_KEY_LENGTH {
        return Err(MppeError::MskTooShort {
            expected: 2 * MPPE_KEY_LENGTH,
            actual: msk.len(),
        });
    }

    let recv = generate_mppe_key(
        MS_MPPE_RECV_KEY,
        &msk[..MPPE_KEY_LENGTH],
        secret,
        request_authenticator,
    )?;
    let send = generate_mppe_key(
        MS_MPPE_SEND_KEY,
        &msk[MPPE_KEY_LENGTH..2 * MPPE_KEY_LENGTH],
        secret,
        request_authenticator,
    )?;
    Ok([recv, send])
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"1qaz2wsx";

    const MSK: [u8; 64] = [
        0x5b, 0x4c, 0x2a, 0x11, 0x08, 0x9e, 0x7f, 0x33, 0x60, 0xc1, 0xd2, 0x14, 0x95, 0x3a, 0x0b,
        0xee, 0x41, 0x77, 0x2f, 0x88, 0x19, 0xa4, 0x63, 0x5d, 0xcc, 0x02, 0x9b, 0x71, 0xe8, 0x36,
        0x4f, 0xd0, 0x12, 0x8a, 0x6e, 0xf1, 0x3c, 0x57, 0xb9, 0x20, 0x94, 0x0d, 0x7a, 0xc6, 0x58,
        0xe3, 0x2b, 0x81, 0xaf, 0x06, 0x4d, 0x99, 0x72, 0x1e, 0xbb, 0x35, 0xd7, 0x68, 0x0f, 0xc4,
        0x27, 0x9d, 0x50, 0xea,
    ];

    const RECV_KEY_CIPHERTEXT: [u8; 48] = [
        0xdb, 0xb0, 0x52, 0x3a, 0x5a, 0x6b, 0x8c, 0x55, 0x2b, 0xbf, 0xc1, 0x8e, 0xad, 0x0f, 0xb6,
        0xf5, 0x04, 0x8f, 0x3d, 0x7c, 0x89, 0xec, 0x92, 0x6f, 0xf3, 0x78, 0xc8, 0x03, 0x0d, 0x70,
        0xa5, 0xd1, 0xf7, 0x00, 0xb0, 0x86, 0x5e, 0x66, 0x6d, 0x5a, 0xb9, 0xca, 0xf6, 0x78, 0x04,
        0xbf, 0xad, 0x8a,
    ];

    const SEND_KEY_CIPHERTEXT: [u8; 48] = [
        0x79, 0x22, 0x1f, 0x3e, 0xda, 0xa1, 0x9c, 0x26, 0xa1, 0x1a, 0xdd, 0xf1, 0x62, 0x9f, 0x88,
        0xa3, 0xa2, 0x5d, 0xa8, 0x99, 0x67, 0xcf, 0xe1, 0x59, 0x9f, 0xb6, 0x0a, 0x08, 0x61, 0xa4,
        0x52, 0x7a, 0xb7, 0xb8, 0x26, 0x55, 0xfe, 0x16, 0xe2, 0x4c, 0x38, 0xb7, 0xdd, 0x3f, 0x63,
        0x5a, 0x6f, 0xde,
    ];

    fn request_authenticator() -> [u8; 16] {
        let mut authenticator = [0u8; 16];
        for (i, byte) in authenticator.iter_mut().enumerate() {
            *byte = 0x10 + i as u8;
        }
        authenticator
    }

    #[test]
    fn test_recv_key_vector() {
        let ciphertext =
            encrypt_mppe_key_with_salt(&MSK[..32], SECRET, &request_authenticator(), [0x9b, 0x87])
                .unwrap();
        assert_eq!(ciphertext, RECV_KEY_CIPHERTEXT);
    }

    #[test]
    fn test_send_key_vector() {
        let ciphertext =
            encrypt_mppe_key_with_salt(&MSK[32..], SECRET, &request_authenticator(), [0x95, 0x63])
                .unwrap();
        assert_eq!(ciphertext, SEND_KEY_CIPHERTEXT);
    }

    #[test]
    fn test_send_key_attribute_layout() {
        let attr = mppe_key_attribute(MS_MPPE_SEND_KEY, [0x95, 0x63], &SEND_KEY_CIPHERTEXT).unwrap();
        assert_eq!(attr.attr_type, 26);
        assert_eq!(&attr.value[..4], &[0, 0, 0x01, 0x37]);
        assert_eq!(attr.value[4], MS_MPPE_SEND_KEY);
        assert_eq!(attr.value[5] as usize, 2 + 2 + 48);
        assert_eq!(&attr.value[6..8], &[0x95, 0x63]);
        assert_eq!(&attr.value[8..], &SEND_KEY_CIPHERTEXT);
    }

    #[test]
    fn test_salt_high_bit_required() {
        let result = encrypt_mppe_key_with_salt(&MSK[..32], SECRET, &request_authenticator(), [0x1b, 0x87]);
        assert!(matches!(result, Err(MppeError::InvalidSalt(0x1b, 0x87))));
    }

    #[test]
    fn test_random_salt_high_bit() {
        for _ in 0..64 {
            assert_eq!(random_salt()[0] & 0x80, 0x80);
        }
    }

    #[test]
    fn test_keys_from_msk() {
        let authenticator = request_authenticator();
        let [recv, send] = mppe_keys_from_msk(&MSK, SECRET, &authenticator).unwrap();

        let recv = recv.as_vendor_specific().unwrap();
        let send = send.as_vendor_specific().unwrap();
        assert_eq!(recv.vendor_id, MICROSOFT_VENDOR_ID);
        assert_eq!(recv.vendor_type, MS_MPPE_RECV_KEY);
        assert_eq!(send.vendor_type, MS_MPPE_SEND_KEY);

        let recv_salt = [recv.value[0], recv.value[1]];
        let send_salt = [send.value[0], send.value[1]];
        assert_eq!(
            decrypt_mppe_key(&recv.value[2..], SECRET, &authenticator, recv_salt).unwrap(),
            &MSK[..32]
        );
        assert_eq!(
            decrypt_mppe_key(&send.value[2..], SECRET, &authenticator, send_salt).unwrap(),
            &MSK[32..]
        );
    }

    #[test]
    fn test_short_msk_rejected() {
        let result = mppe_keys_from_msk(&MSK[..40], SECRET, &request_authenticator());
        assert!(matches!(
            result,
            Err(MppeError::MskTooShort { expected: 64, actual: 40 })
        ));
    }
}
