//! EAP-AKA, EAP-AKA' and EAP-SIM through a remote authenticator
//!
//! The gateway does not run the method cryptography itself. Every EAP
//! packet is forwarded to an [`Authenticator`] together with the opaque
//! context that service returned on the previous round-trip, and the
//! service's answer is relayed to the peer. On EAP-Success the MSK returned
//! by the service is wrapped into MS-MPPE keys for the NAS.

use super::{EapMethod, HandlerResponse};
use crate::backend::{AuthContext, AuthRequest, Authenticator, with_timeout};
use crate::context::RequestContext;
use crate::modules::{ModuleError, Request};
use async_trait::async_trait;
use radius_proto::{Attribute, AttributeType, Code, EapPacket, EapType, mppe_keys_from_msk};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Method state kept between round-trips
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
struct AkaState {
    backend_context: String,
}

impl AkaState {
    /// Empty state starts a fresh conversation
    fn decode(protocol_state: &str) -> Result<Self, ModuleError> {
        if protocol_state.is_empty() {
            return Ok(AkaState::default());
        }
        serde_json::from_str(protocol_state).map_err(|e| ModuleError::InvalidEapState(e.to_string()))
    }

    fn encode(&self) -> Result<String, ModuleError> {
        serde_json::to_string(self).map_err(|e| ModuleError::InvalidEapState(e.to_string()))
    }
}

pub struct AkaMethod {
    eap_type: EapType,
    authenticator: Arc<dyn Authenticator>,
    timeout: Duration,
}

impl AkaMethod {
    pub fn new(eap_type: EapType, authenticator: Arc<dyn Authenticator>, timeout: Duration) -> Self {
        AkaMethod {
            eap_type,
            authenticator,
            timeout,
        }
    }
}

#[async_trait]
impl EapMethod for AkaMethod {
    fn eap_type(&self) -> EapType {
        self.eap_type
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        packet: &EapPacket,
        protocol_state: &str,
        request: &Request,
    ) -> Result<HandlerResponse, ModuleError> {
        let state = AkaState::decode(protocol_state)?;
        let auth_request = AuthRequest {
            ctx: AuthContext {
                session_id: ctx.session_id.clone().unwrap_or_default(),
                mac_addr: request
                    .packet
                    .lookup_string(AttributeType::CallingStationId)
                    .unwrap_or_default(),
                apn: request
                    .packet
                    .lookup_string(AttributeType::CalledStationId)
                    .unwrap_or_default(),
            },
            eap_type: self.eap_type.as_u8(),
            payload: packet.to_bytes(),
            backend_context: state.backend_context,
        };

        let reply = if packet.is_identity() {
            with_timeout(self.timeout, self.authenticator.handle_identity(auth_request)).await?
        } else {
            with_timeout(self.timeout, self.authenticator.handle(auth_request)).await?
        };

        let eap_reply = EapPacket::from_bytes(&reply.payload)?;
        let code = eap_reply.code.radius_code();
        debug!(
            request_id = ctx.request_id,
            method = self.eap_type.name(),
            eap_code = ?eap_reply.code,
            "Authenticator answered"
        );

        let mut attributes = Vec::new();
        if code == Code::AccessAccept {
            attributes.extend(mppe_keys_from_msk(
                &reply.msk,
                &request.secret,
                &request.packet.authenticator,
            )?);
            if !reply.identity.is_empty() {
                attributes.push(Attribute::string(
                    AttributeType::UserName.as_u8(),
                    reply.identity.clone(),
                )?);
            }
        }

        Ok(HandlerResponse {
            packet: Some(eap_reply),
            code,
            protocol_state: AkaState {
                backend_context: reply.backend_context,
            }
            .encode()?,
            attributes,
            msisdn: Some(reply.msisdn).filter(|msisdn| !msisdn.is_empty()),
        })
    }
}
