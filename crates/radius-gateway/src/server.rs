use crate::config::{ConfigError, GatewayConfig};
use crate::context::{GatewayContext, RequestContext};
use crate::dedup::{DedupCache, RequestFingerprint};
use crate::filters::{Filter, FilterKind};
use crate::modules::{Loader, Module, ModuleError, Next, Request, Response};
use crate::session::{SessionStore, session_id_of};
use radius_proto::{
    Attribute, AttributeType, Code, Packet, PacketError, calculate_request_authenticator,
    finalize_response, verify_packet_message_authenticator,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// How often expired session records are reclaimed
const SESSION_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Module error: {0}")]
    Module(#[from] ModuleError),
    #[error("Unexpected packet code: {0:?}")]
    UnexpectedCode(Code),
    #[error("Request authenticator does not verify")]
    InvalidRequestAuthenticator,
    #[error("Message-Authenticator does not verify")]
    InvalidMessageAuthenticator,
    #[error("EAP-Message without Message-Authenticator")]
    MissingMessageAuthenticator,
    #[error("Duplicate request")]
    DuplicateRequest,
    #[error("Listener task failed: {0}")]
    Task(String),
}

/// One bound listener and its module chain
struct Listener {
    name: String,
    secret: Vec<u8>,
    socket: Arc<UdpSocket>,
    modules: Vec<Box<dyn Module>>,
}

/// State shared by every listener of a server
struct Shared {
    filters: Vec<Box<dyn Filter>>,
    dedup: DedupCache,
    sessions: SessionStore,
    next_request_id: AtomicU64,
}

/// RADIUS gateway server
///
/// Serves every configured listener from one process. Each datagram is
/// handled on its own task: decode, verify, duplicate check, filters,
/// module chain, then the signed response is sent back to the client. A
/// request whose pipeline fails gets no response.
pub struct RadiusServer {
    listeners: Vec<Arc<Listener>>,
    shared: Arc<Shared>,
}

impl RadiusServer {
    /// Build filters and module chains and bind every listener
    ///
    /// Any configuration or init failure aborts construction. Must be called
    /// within a tokio runtime.
    pub async fn new(
        config: GatewayConfig,
        loader: &dyn Loader,
        context: GatewayContext,
    ) -> Result<Self, ServerError> {
        config.validate()?;

        let filters = config
            .filters
            .iter()
            .map(|name| {
                FilterKind::from_name(name)
                    .ok_or_else(|| ConfigError::UnknownFilter(name.clone()))?
                    .build(&config)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut listeners = Vec::with_capacity(config.listeners.len());
        for listener in &config.listeners {
            let modules = listener
                .modules
                .iter()
                .map(|module| loader.load_module(module, &context))
                .collect::<Result<Vec<_>, _>>()?;

            let socket = UdpSocket::bind(listener.socket_addr()?).await?;
            let address = socket.local_addr()?;
            let names: Vec<&str> = listener.modules.iter().map(|m| m.name.as_str()).collect();
            info!(
                listener = %listener.name,
                address = %address,
                modules = ?names,
                "Listener bound"
            );

            listeners.push(Arc::new(Listener {
                name: listener.name.clone(),
                secret: config.secret_for(listener),
                socket: Arc::new(socket),
                modules,
            }));
        }

        let shared = Shared {
            filters,
            dedup: DedupCache::new(
                Duration::from_secs(config.dedup.ttl_secs),
                config.dedup.max_entries,
            ),
            sessions: context.sessions.clone(),
            next_request_id: AtomicU64::new(1),
        };

        Ok(RadiusServer {
            listeners,
            shared: Arc::new(shared),
        })
    }

    /// Address a listener is bound to
    ///
    /// Useful when binding to port 0.
    pub fn local_addr(&self, listener: &str) -> Option<SocketAddr> {
        self.listeners
            .iter()
            .find(|l| l.name == listener)
            .and_then(|l| l.socket.local_addr().ok())
    }

    /// Requests dropped as retransmissions of a request still in the window
    pub fn dropped_count(&self) -> u64 {
        self.shared.dedup.dropped_count()
    }

    /// Serve all listeners until one of them fails
    pub async fn run(&self) -> Result<(), ServerError> {
        let mut tasks = JoinSet::new();
        for listener in &self.listeners {
            tasks.spawn(Self::serve(Arc::clone(listener), Arc::clone(&self.shared)));
        }
        tasks.spawn(Self::cleanup_sessions(Arc::clone(&self.shared)));

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(ServerError::Task(e.to_string())),
            }
        }
        Ok(())
    }

    async fn serve(listener: Arc<Listener>, shared: Arc<Shared>) -> Result<(), ServerError> {
        let mut buf = vec![0u8; Packet::MAX_PACKET_SIZE];

        loop {
            let (len, addr) = listener.socket.recv_from(&mut buf).await?;
            let data = buf[..len].to_vec();

            let listener = Arc::clone(&listener);
            let shared = Arc::clone(&shared);
            let request_id = shared.next_request_id.fetch_add(1, Ordering::Relaxed);

            tokio::spawn(async move {
                match Self::handle_datagram(&listener, &shared, request_id, data, addr).await {
                    Ok(()) => {}
                    Err(ServerError::DuplicateRequest) => {
                        debug!(
                            request_id = request_id,
                            listener = %listener.name,
                            client_addr = %addr,
                            "Dropped duplicate request"
                        );
                    }
                    Err(e) => {
                        warn!(
                            request_id = request_id,
                            listener = %listener.name,
                            client_addr = %addr,
                            error = %e,
                            "Request dropped"
                        );
                    }
                }
            });
        }
    }

    async fn cleanup_sessions(shared: Arc<Shared>) -> Result<(), ServerError> {
        let mut interval = tokio::time::interval(SESSION_CLEANUP_INTERVAL);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match shared.sessions.purge_expired().await {
                Ok(0) => {}
                Ok(removed) => debug!(removed = removed, "Expired session records reclaimed"),
                Err(e) => warn!(error = %e, "Session cleanup failed"),
            }
        }
    }

    async fn handle_datagram(
        listener: &Listener,
        shared: &Shared,
        request_id: u64,
        data: Vec<u8>,
        addr: SocketAddr,
    ) -> Result<(), ServerError> {
        let packet = Packet::decode(&data)?;
        if !packet.code.is_request() {
            return Err(ServerError::UnexpectedCode(packet.code));
        }
        verify_request(&packet, &listener.secret)?;

        let fingerprint =
            RequestFingerprint::new(&listener.name, addr, packet.identifier, packet.authenticator);
        if shared.dedup.check_and_insert(fingerprint) {
            return Err(ServerError::DuplicateRequest);
        }

        debug!(
            request_id = request_id,
            listener = %listener.name,
            client_addr = %addr,
            code = ?packet.code,
            identifier = packet.identifier,
            "Received RADIUS packet"
        );

        let identifier = packet.identifier;
        let authenticator = packet.authenticator;
        let proxy_states: Vec<Attribute> = packet
            .find_all_attributes(AttributeType::ProxyState.as_u8())
            .into_iter()
            .cloned()
            .collect();

        let ctx = RequestContext::new(request_id, session_id_of(&packet), shared.sessions.clone());
        let mut request = Request::new(packet, listener.secret.clone(), addr, &listener.name);

        for filter in &shared.filters {
            if let Err(e) = filter.process(&ctx, &listener.name, &request).await {
                warn!(
                    request_id = request_id,
                    filter = filter.name(),
                    error = %e,
                    "Filter failed"
                );
            }
        }

        let response = Next::new(&listener.modules).run(&ctx, &mut request).await?;
        let bytes = encode_response(response, identifier, &authenticator, proxy_states, &listener.secret)?;
        listener.socket.send_to(&bytes, addr).await?;

        debug!(
            request_id = request_id,
            listener = %listener.name,
            client_addr = %addr,
            "Sent RADIUS response"
        );
        Ok(())
    }
}

/// Check the authenticators of an inbound request
///
/// Accounting, CoA and Disconnect requests must carry the hashed Request
/// Authenticator. A Message-Authenticator, when present, must verify, and an
/// Access-Request carrying EAP-Message must have one (RFC 3579 Section 3.2).
fn verify_request(packet: &Packet, secret: &[u8]) -> Result<(), ServerError> {
    let hashed = packet.code.has_hashed_request_authenticator();
    if hashed && calculate_request_authenticator(packet, secret)? != packet.authenticator {
        return Err(ServerError::InvalidRequestAuthenticator);
    }

    let has_message_auth = packet
        .find_attribute(AttributeType::MessageAuthenticator.as_u8())
        .is_some();
    if has_message_auth {
        let authenticator = if hashed { [0u8; 16] } else { packet.authenticator };
        if !verify_packet_message_authenticator(packet, secret, &authenticator) {
            return Err(ServerError::InvalidMessageAuthenticator);
        }
    } else if packet
        .find_attribute(AttributeType::EapMessage.as_u8())
        .is_some()
    {
        return Err(ServerError::MissingMessageAuthenticator);
    }
    Ok(())
}

/// Sign the pipeline's response for the client
///
/// Proxy-State attributes of the request are echoed in order; any the
/// pipeline produced are discarded.
fn encode_response(
    response: Response,
    identifier: u8,
    request_authenticator: &[u8; 16],
    proxy_states: Vec<Attribute>,
    secret: &[u8],
) -> Result<Vec<u8>, ServerError> {
    let mut reply = Packet::new(response.code, identifier, [0u8; 16]);
    reply.attributes = response
        .attributes
        .into_iter()
        .filter(|a| a.attr_type != AttributeType::ProxyState.as_u8())
        .chain(proxy_states)
        .collect();
    Ok(finalize_response(&mut reply, request_authenticator, secret)?)
}
