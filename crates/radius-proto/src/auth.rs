use crate::attributes::AttributeType;
use crate::message_auth::calculate_message_authenticator;
use crate::packet::{Packet, PacketError};
use rand::Rng;

/// Generate a random Request Authenticator (16 bytes) per RFC 2865 Section 3
pub fn generate_request_authenticator() -> [u8; 16] {
    let mut authenticator = [0u8; 16];
    rand::rng().fill(&mut authenticator);
    authenticator
}

/// MD5 over the packet encoded with `authenticator` in the authenticator
/// field, followed by the shared secret
fn hash_with_authenticator(
    packet: &Packet,
    authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    let mut data = packet.encode()?;
    data[4..20].copy_from_slice(authenticator);
    data.extend_from_slice(secret);
    Ok(md5::compute(&data).0)
}

/// Calculate Response Authenticator per RFC 2865 Section 3
///
/// Response Authenticator = MD5(Code + ID + Length + Request Authenticator + Attributes + Secret)
///
/// The same construction covers Accounting-Response (RFC 2866) and
/// CoA/Disconnect ACK/NAK (RFC 5176).
pub fn calculate_response_authenticator(
    packet: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    hash_with_authenticator(packet, request_authenticator, secret)
}

/// Verify a Response Authenticator against the request it answers
pub fn verify_response_authenticator(
    response: &Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> bool {
    calculate_response_authenticator(response, request_authenticator, secret)
        .map(|calculated| calculated == response.authenticator)
        .unwrap_or(false)
}

/// Calculate the Request Authenticator of an Accounting-Request (RFC 2866
/// Section 3) or CoA/Disconnect-Request (RFC 5176 Section 2.3)
///
/// Request Authenticator = MD5(Code + ID + Length + 16 zero octets + Attributes + Secret)
pub fn calculate_request_authenticator(
    packet: &Packet,
    secret: &[u8],
) -> Result<[u8; 16], PacketError> {
    hash_with_authenticator(packet, &[0u8; 16], secret)
}

/// Sign a response and encode it for the wire
///
/// When the response carries a Message-Authenticator (always the case when
/// it carries EAP-Message) the HMAC is computed first, over the packet with
/// the request authenticator in place; the Response Authenticator is then
/// computed over the final attributes.
pub fn finalize_response(
    response: &mut Packet,
    request_authenticator: &[u8; 16],
    secret: &[u8],
) -> Result<Vec<u8>, PacketError> {
    if response
        .find_attribute(AttributeType::EapMessage.as_u8())
        .is_some()
        && response
            .find_attribute(AttributeType::MessageAuthenticator.as_u8())
            .is_none()
    {
        response.add_attribute(crate::Attribute::new(
            AttributeType::MessageAuthenticator.as_u8(),
            vec![0u8; 16],
        )?);
    }

    if response
        .find_attribute(AttributeType::MessageAuthenticator.as_u8())
        .is_some()
    {
        response.authenticator = *request_authenticator;
        sign_message_authenticator(response, secret)?;
    }

    response.authenticator =
        calculate_response_authenticator(response, request_authenticator, secret)?;
    response.encode()
}

/// Sign an outbound request and encode it for the wire
///
/// Access-Request keeps its random authenticator; Accounting, CoA and
/// Disconnect requests get the hashed authenticator. Any Message-Authenticator
/// is recomputed for the given secret.
pub fn finalize_request(request: &mut Packet, secret: &[u8]) -> Result<Vec<u8>, PacketError> {
    let hashed = request.code.has_hashed_request_authenticator();
    if hashed {
        request.authenticator = [0u8; 16];
    }
    if request
        .find_attribute(AttributeType::MessageAuthenticator.as_u8())
        .is_some()
    {
        sign_message_authenticator(request, secret)?;
    }
    if hashed {
        request.authenticator = calculate_request_authenticator(request, secret)?;
    }
    request.encode()
}

/// Zero the Message-Authenticator, HMAC the packet as it currently stands
/// and store the result in place
fn sign_message_authenticator(packet: &mut Packet, secret: &[u8]) -> Result<(), PacketError> {
    let message_auth_type = AttributeType::MessageAuthenticator.as_u8();
    for attr in packet
        .attributes
        .iter_mut()
        .filter(|a| a.attr_type == message_auth_type)
    {
        attr.value = vec![0u8; 16];
    }
    let mac = calculate_message_authenticator(&packet.encode()?, secret);
    if let Some(attr) = packet
        .attributes
        .iter_mut()
        .find(|a| a.attr_type == message_auth_type)
    {
        attr.value = mac.to_vec();
    }
    Ok(())
}

/// Encrypt User-Password attribute per RFC 2865 Section 5.2
///
/// The password is padded to a multiple of 16 bytes, then XORed with
/// MD5(secret + request_authenticator) for the first block and
/// MD5(secret + previous_ciphertext_block) for each following block.
pub fn encrypt_user_password(password: &[u8], secret: &[u8], authenticator: &[u8; 16]) -> Vec<u8> {
    let mut padded = password.to_vec();
    let padded_len = padded.len().div_ceil(16).max(1) * 16;
    padded.resize(padded_len, 0);

    let mut result = Vec::with_capacity(padded_len);
    let mut previous_block = authenticator.to_vec();

    for chunk in padded.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(&previous_block);
        let hash = md5::compute(&data);

        let encrypted_block: Vec<u8> = chunk.iter().zip(hash.0.iter()).map(|(p, b)| p ^ b).collect();
        result.extend_from_slice(&encrypted_block);
        previous_block = encrypted_block;
    }

    result
}

/// Decrypt User-Password attribute per RFC 2865 Section 5.2
///
/// Returns the password bytes with the trailing zero padding removed.
pub fn decrypt_user_password(
    encrypted: &[u8],
    secret: &[u8],
    authenticator: &[u8; 16],
) -> Result<Vec<u8>, PacketError> {
    if encrypted.len() % 16 != 0 || encrypted.is_empty() {
        return Err(PacketError::AttributeError(format!(
            "Invalid encrypted password length: {}",
            encrypted.len()
        )));
    }

    let mut result = Vec::with_capacity(encrypted.len());
    let mut previous_block: &[u8] = authenticator;

    for chunk in encrypted.chunks(16) {
        let mut data = secret.to_vec();
        data.extend_from_slice(previous_block);
        let hash = md5::compute(&data);

        result.extend(chunk.iter().zip(hash.0.iter()).map(|(c, b)| c ^ b));
        previous_block = chunk;
    }

    while result.last() == Some(&0) {
        result.pop();
    }

    Ok(result)
}
