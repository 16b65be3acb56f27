//! Module pipeline
//!
//! Each listener owns an ordered chain of modules. A module receives the
//! request together with a [`Next`] continuation over the rest of the chain
//! and may answer on its own, forward to `next` (possibly after changing the
//! request), or forward and then post-process the response. A module error
//! aborts the request and no RADIUS response is sent.

pub mod accounting;
pub mod analytics;
pub mod coa;
pub mod eap;
pub mod loopback;
pub mod proxy;

use crate::backend::BackendError;
use crate::client::ClientError;
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use crate::session::StateError;
use async_trait::async_trait;
use radius_proto::{Attribute, Code, EapError, MppeError, Packet, PacketError};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("No module handled the request")]
    Unhandled,
    #[error("Missing attribute: {0}")]
    MissingAttribute(&'static str),
    #[error("Unknown Acct-Status-Type: {0}")]
    UnknownStatusType(u32),
    #[error("Session {0} was never tracked")]
    NotTracked(String),
    #[error("Unsupported packet code: {0:?}")]
    UnsupportedCode(Code),
    #[error("Invalid EAP state: {0}")]
    InvalidEapState(String),
    #[error("Client error: {0}")]
    Client(#[from] ClientError),
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
    #[error("Session state error: {0}")]
    State(#[from] StateError),
    #[error("EAP error: {0}")]
    Eap(#[from] EapError),
    #[error("MPPE error: {0}")]
    Mppe(#[from] MppeError),
    #[error("Packet error: {0}")]
    Packet(#[from] PacketError),
}

/// A decoded request as seen by the pipeline
#[derive(Debug, Clone)]
pub struct Request {
    pub packet: Packet,
    /// Shared secret of the client that sent the request
    pub secret: Vec<u8>,
    pub remote_addr: SocketAddr,
    pub listener: String,
}

impl Request {
    pub fn new(
        packet: Packet,
        secret: Vec<u8>,
        remote_addr: SocketAddr,
        listener: impl Into<String>,
    ) -> Self {
        Request {
            packet,
            secret,
            remote_addr,
            listener: listener.into(),
        }
    }

    pub fn code(&self) -> Code {
        self.packet.code
    }
}

/// Response produced by the pipeline; identifier and authenticators are
/// filled in by the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub code: Code,
    pub attributes: Vec<Attribute>,
}

impl Response {
    pub fn new(code: Code) -> Self {
        Response {
            code,
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes(code: Code, attributes: Vec<Attribute>) -> Self {
        Response { code, attributes }
    }

    /// Take code and attributes of a reply received from an upstream server
    pub fn from_packet(packet: Packet) -> Self {
        Response {
            code: packet.code,
            attributes: packet.attributes,
        }
    }

    pub fn find_attribute(&self, attr_type: u8) -> Option<&Attribute> {
        self.attributes.iter().find(|a| a.attr_type == attr_type)
    }
}

#[async_trait]
pub trait Module: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: Next<'_>,
    ) -> Result<Response, ModuleError>;
}

/// The part of the chain after the current module
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Box<dyn Module>],
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Box<dyn Module>]) -> Self {
        Next { chain }
    }

    /// Number of modules left in the chain
    pub fn remaining(&self) -> usize {
        self.chain.len()
    }

    /// Hand the request to the next module; past the end of the chain the
    /// request is unhandled
    pub async fn run(
        self,
        ctx: &RequestContext,
        request: &mut Request,
    ) -> Result<Response, ModuleError> {
        match self.chain.split_first() {
            Some((module, rest)) => module.handle(ctx, request, Next::new(rest)).await,
            None => Err(ModuleError::Unhandled),
        }
    }
}

/// Registry of module implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleKind {
    Eap,
    Analytics,
    Accounting,
    CoaFixed,
    CoaDynamic,
    Proxy,
    Loopback,
}

impl ModuleKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "eap" => Some(ModuleKind::Eap),
            "analytics" => Some(ModuleKind::Analytics),
            "accounting" => Some(ModuleKind::Accounting),
            "coa_fixed" => Some(ModuleKind::CoaFixed),
            "coa_dynamic" => Some(ModuleKind::CoaDynamic),
            "proxy" => Some(ModuleKind::Proxy),
            "loopback" => Some(ModuleKind::Loopback),
            _ => None,
        }
    }

    /// Validate options and build the module
    pub fn build(
        self,
        config: &ModuleConfig,
        ctx: &GatewayContext,
    ) -> Result<Box<dyn Module>, ConfigError> {
        Ok(match self {
            ModuleKind::Eap => Box::new(eap::EapModule::init(config, ctx)?),
            ModuleKind::Analytics => Box::new(analytics::AnalyticsModule::init(config, ctx)?),
            ModuleKind::Accounting => Box::new(accounting::AccountingModule::init(config, ctx)?),
            ModuleKind::CoaFixed => Box::new(coa::FixedCoaModule::init(config, ctx)?),
            ModuleKind::CoaDynamic => Box::new(coa::DynamicCoaModule::init(config, ctx)?),
            ModuleKind::Proxy => Box::new(proxy::ProxyModule::init(config, ctx)?),
            ModuleKind::Loopback => Box::new(loopback::LoopbackModule),
        })
    }
}

/// Resolves module names to instances at startup
pub trait Loader: Send + Sync {
    fn load_module(
        &self,
        config: &ModuleConfig,
        ctx: &GatewayContext,
    ) -> Result<Box<dyn Module>, ConfigError>;
}

/// Loader backed by [`ModuleKind`]
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticLoader;

impl Loader for StaticLoader {
    fn load_module(
        &self,
        config: &ModuleConfig,
        ctx: &GatewayContext,
    ) -> Result<Box<dyn Module>, ConfigError> {
        ModuleKind::from_name(&config.name)
            .ok_or_else(|| ConfigError::UnknownModule(config.name.clone()))?
            .build(config, ctx)
    }
}

/// Parse a `Target` option: an `ip:port` pair
pub(crate) fn parse_target(module: &str, target: &str) -> Result<SocketAddr, ConfigError> {
    if target.is_empty() {
        return Err(ConfigError::module(module, "Target is required"));
    }
    target
        .parse()
        .map_err(|_| ConfigError::module(module, format!("Target is not ip:port: {}", target)))
}

pub(crate) fn timeout_or(timeout_ms: Option<u64>, default: Duration) -> Duration {
    timeout_ms.map(Duration::from_millis).unwrap_or(default)
}
