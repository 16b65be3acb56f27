//! Outbound RADIUS exchanges
//!
//! Used by the proxy and CoA modules to relay a request to an upstream
//! server. Each exchange uses a fresh UDP socket and waits for one matching
//! reply under a deadline; there is no retransmission at this layer.

use radius_proto::{
    AttributeType, Packet, PacketError, decrypt_user_password, encrypt_user_password,
    finalize_request, verify_packet_message_authenticator, verify_response_authenticator,
};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("No reply from {target} within {timeout:?}")]
    Timeout { target: SocketAddr, timeout: Duration },
    #[error("Reply from {0} failed authenticator verification")]
    BadAuthenticator(SocketAddr),
    #[error("Reply from {0} failed Message-Authenticator verification")]
    BadMessageAuthenticator(SocketAddr),
}

pub struct RadiusClient {
    timeout: Duration,
}

impl RadiusClient {
    pub fn new(timeout: Duration) -> Self {
        RadiusClient { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Send `packet` to `target` signed with `secret` and wait for its reply
    ///
    /// The Request Authenticator of Accounting, CoA and Disconnect requests
    /// is recomputed for `secret`, as is any Message-Authenticator. The reply
    /// is accepted only if its identifier matches and its Response
    /// Authenticator verifies.
    pub async fn exchange(
        &self,
        mut packet: Packet,
        target: SocketAddr,
        secret: &[u8],
    ) -> Result<Packet, ClientError> {
        let bytes = finalize_request(&mut packet, secret)?;
        let request_authenticator = packet.authenticator;

        let bind_addr: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0u8; 4], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.send_to(&bytes, target).await?;

        debug!(
            target = %target,
            code = ?packet.code,
            identifier = packet.identifier,
            "Request relayed upstream"
        );

        let reply = tokio::time::timeout(self.timeout, async {
            let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];
            loop {
                let (len, from) = socket.recv_from(&mut buf).await?;
                if from != target {
                    debug!(from = %from, target = %target, "Ignoring datagram from unexpected peer");
                    continue;
                }
                let reply = Packet::decode(&buf[..len])?;
                if reply.identifier != packet.identifier {
                    debug!(
                        expected = packet.identifier,
                        actual = reply.identifier,
                        "Ignoring reply with mismatched identifier"
                    );
                    continue;
                }
                return Ok::<_, ClientError>(reply);
            }
        })
        .await
        .map_err(|_| ClientError::Timeout {
            target,
            timeout: self.timeout,
        })??;

        if !verify_response_authenticator(&reply, &request_authenticator, secret) {
            return Err(ClientError::BadAuthenticator(target));
        }
        if reply
            .find_attribute(AttributeType::MessageAuthenticator.as_u8())
            .is_some()
            && !verify_packet_message_authenticator(&reply, secret, &request_authenticator)
        {
            return Err(ClientError::BadMessageAuthenticator(target));
        }

        Ok(reply)
    }
}

/// Re-hide the User-Password of an Access-Request for a different secret
///
/// The Request Authenticator is left unchanged. Packets without a
/// User-Password, or when both secrets are equal, are left untouched.
pub fn rehide_user_password(
    packet: &mut Packet,
    from_secret: &[u8],
    to_secret: &[u8],
) -> Result<(), PacketError> {
    if from_secret == to_secret {
        return Ok(());
    }
    let authenticator = packet.authenticator;
    for attr in packet
        .attributes
        .iter_mut()
        .filter(|a| a.attr_type == AttributeType::UserPassword.as_u8())
    {
        let password = decrypt_user_password(&attr.value, from_secret, &authenticator)?;
        attr.value = encrypt_user_password(&password, to_secret, &authenticator);
    }
    Ok(())
}
