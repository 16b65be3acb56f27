//! EAP over RADIUS (RFC 3579)
//!
//! The module extracts the EAP packet of an Access-Request, restores the
//! conversation state of its method from the session store, hands the packet
//! to the configured [`EapMethod`] and turns the method's answer into an
//! Access-Challenge, Access-Accept or Access-Reject.
//!
//! Conversation state lives in an [`AuthContainer`] stored under
//! `<session>:eap:<type>`. An EAP-Response/Identity always starts over with
//! an empty container, so a session has at most one conversation per type.
//! Requests that carry no usable EAP packet, or whose container is missing or
//! unreadable, are passed down the chain untouched. A readable container
//! whose protocol state the method cannot decode fails the request.

pub mod aka;

pub use aka::AkaMethod;

use super::{Module, ModuleError, Next, Request, Response, timeout_or};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use crate::session::{SessionHandle, SessionStore};
use async_trait::async_trait;
use radius_proto::eap::{eap_from_radius_packet, eap_to_radius_attributes};
use radius_proto::{Attribute, AttributeType, Code, EapCode, EapPacket, EapType};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Outcome of one EAP round-trip
#[derive(Debug, Clone)]
pub struct HandlerResponse {
    /// EAP packet for the peer
    pub packet: Option<EapPacket>,
    /// Access-Challenge, Access-Accept or Access-Reject
    pub code: Code,
    /// Method state to restore on the next round-trip
    pub protocol_state: String,
    /// Extra reply attributes such as keying material and User-Name
    pub attributes: Vec<Attribute>,
    /// Subscriber MSISDN, known once authentication succeeded
    pub msisdn: Option<String>,
}

/// An EAP method
#[async_trait]
pub trait EapMethod: Send + Sync {
    /// Type the method speaks after Identity
    fn eap_type(&self) -> EapType;

    /// Advance the conversation
    ///
    /// `protocol_state` is the state returned by the previous round-trip,
    /// empty when the conversation starts.
    async fn handle(
        &self,
        ctx: &RequestContext,
        packet: &EapPacket,
        protocol_state: &str,
        request: &Request,
    ) -> Result<HandlerResponse, ModuleError>;
}

/// Stored conversation state of one (session, EAP type)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContainer {
    pub eap_type: u8,
    pub protocol_state: String,
}

/// Store key of the container for `session_id` and `eap_type`
pub fn container_key(session_id: &str, eap_type: u8) -> String {
    format!("{}:eap:{}", session_id, eap_type)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct EapOptions {
    #[serde(default = "default_method")]
    method: String,
    /// Registered authenticator; defaults to the method name
    backend: Option<String>,
    timeout_ms: Option<u64>,
}

fn default_method() -> String {
    EapType::Aka.name().to_string()
}

pub struct EapModule {
    method: Box<dyn EapMethod>,
    sessions: SessionStore,
}

impl EapModule {
    pub fn new(method: Box<dyn EapMethod>, sessions: SessionStore) -> Self {
        EapModule { method, sessions }
    }

    pub fn init(config: &ModuleConfig, ctx: &GatewayContext) -> Result<Self, ConfigError> {
        let options: EapOptions = config.options()?;
        let eap_type = match EapType::from_name(&options.method) {
            Some(eap_type @ (EapType::Aka | EapType::AkaPrime | EapType::Sim)) => eap_type,
            _ => {
                return Err(ConfigError::module(
                    &config.name,
                    format!("Unsupported EAP method '{}'", options.method),
                ));
            }
        };

        let backend = options.backend.unwrap_or(options.method);
        let authenticator = ctx.authenticator(&backend).ok_or_else(|| {
            ConfigError::module(
                &config.name,
                format!("No authenticator registered as '{}'", backend),
            )
        })?;

        let method = AkaMethod::new(
            eap_type,
            authenticator,
            timeout_or(options.timeout_ms, ctx.default_timeout),
        );
        Ok(Self::new(Box::new(method), ctx.sessions.clone()))
    }

    /// Container contents for a non-Identity packet, `None` if absent or unreadable
    async fn load_container(&self, ctx: &RequestContext, key: &str, eap_type: u8) -> Option<AuthContainer> {
        let bytes = match self.sessions.get_value(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(request_id = ctx.request_id, key = key, "No EAP auth state");
                return None;
            }
            Err(e) => {
                warn!(request_id = ctx.request_id, key = key, error = %e, "Failed to load EAP auth state");
                return None;
            }
        };

        match serde_json::from_slice::<AuthContainer>(&bytes) {
            Ok(container) if container.eap_type == eap_type => Some(container),
            Ok(container) => {
                warn!(
                    request_id = ctx.request_id,
                    key = key,
                    stored_type = container.eap_type,
                    "EAP auth state holds a different type"
                );
                None
            }
            Err(e) => {
                warn!(request_id = ctx.request_id, key = key, error = %e, "Invalid EAP auth state");
                None
            }
        }
    }

    async fn save_container(&self, key: &str, container: &AuthContainer) -> Result<(), ModuleError> {
        let bytes = serde_json::to_vec(container).map_err(crate::session::StateError::from)?;
        self.sessions.set_value(key, &bytes).await?;
        Ok(())
    }

    /// Record subscriber details of an authenticated session; failures are logged
    async fn record_subscriber(
        &self,
        ctx: &RequestContext,
        session: &SessionHandle,
        request: &Request,
        msisdn: Option<&str>,
    ) {
        let packet = &request.packet;
        let result = async {
            let mut state = session.get().await?;
            if let Some(mac_addr) = packet.lookup_string(AttributeType::CallingStationId) {
                state.mac_addr = mac_addr;
            }
            if let Some(apn) = packet.lookup_string(AttributeType::CalledStationId) {
                state.called_station_id = apn;
            }
            if let Some(msisdn) = msisdn {
                state.msisdn = msisdn.to_string();
            }
            session.set(&state).await
        }
        .await;

        if let Err(e) = result {
            warn!(
                request_id = ctx.request_id,
                session_id = session.session_id(),
                error = %e,
                "Failed to record subscriber in session state"
            );
        }
    }
}

fn is_supported(type_code: u8) -> bool {
    matches!(
        EapType::from_u8(type_code),
        Some(EapType::Identity | EapType::Sim | EapType::Aka | EapType::AkaPrime)
    )
}

#[async_trait]
impl Module for EapModule {
    fn name(&self) -> &'static str {
        "eap"
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        if request.code() != Code::AccessRequest {
            return next.run(ctx, request).await;
        }

        let packet = match eap_from_radius_packet(&request.packet) {
            Ok(Some(packet)) => packet,
            Ok(None) => return next.run(ctx, request).await,
            Err(e) => {
                debug!(request_id = ctx.request_id, error = %e, "Malformed EAP-Message");
                return next.run(ctx, request).await;
            }
        };
        let (Some(type_code), EapCode::Response) = (packet.type_code, packet.code) else {
            debug!(request_id = ctx.request_id, code = ?packet.code, "Not an EAP-Response");
            return next.run(ctx, request).await;
        };
        let Some(session) = ctx.session() else {
            warn!(request_id = ctx.request_id, "EAP request without a session id");
            return next.run(ctx, request).await;
        };

        let protocol_state = if packet.is_identity() {
            let key = container_key(session.session_id(), self.method.eap_type().as_u8());
            if let Err(e) = self.sessions.delete_value(&key).await {
                warn!(request_id = ctx.request_id, key = %key, error = %e, "Failed to clear EAP auth state");
            }
            let container = AuthContainer {
                eap_type: self.method.eap_type().as_u8(),
                protocol_state: String::new(),
            };
            self.save_container(&key, &container).await?;
            container.protocol_state
        } else {
            let key = container_key(session.session_id(), type_code);
            match self.load_container(ctx, &key, type_code).await {
                Some(container) => container.protocol_state,
                None => return next.run(ctx, request).await,
            }
        };

        if !is_supported(type_code) {
            warn!(request_id = ctx.request_id, eap_type = type_code, "Unsupported EAP type");
        }

        let outcome = self
            .method
            .handle(ctx, &packet, &protocol_state, request)
            .await?;

        let stored_type = if packet.is_identity() {
            self.method.eap_type().as_u8()
        } else {
            type_code
        };
        self.save_container(
            &container_key(session.session_id(), stored_type),
            &AuthContainer {
                eap_type: stored_type,
                protocol_state: outcome.protocol_state,
            },
        )
        .await?;

        if outcome.code == Code::AccessAccept {
            self.record_subscriber(ctx, &session, request, outcome.msisdn.as_deref())
                .await;
        }

        debug!(
            request_id = ctx.request_id,
            session_id = session.session_id(),
            code = ?outcome.code,
            "EAP round-trip complete"
        );

        let mut attributes = match &outcome.packet {
            Some(packet) => eap_to_radius_attributes(packet)?,
            None => Vec::new(),
        };
        attributes.extend(outcome.attributes);
        Ok(Response::with_attributes(outcome.code, attributes))
    }
}
