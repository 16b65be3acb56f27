//! Backend services the gateway delegates to
//!
//! The authenticator and accounting services live outside the gateway. Each
//! is an async trait so deployments can plug in their transport of choice;
//! instances are registered by name on the [`GatewayContext`](crate::GatewayContext)
//! and looked up by the modules that use them.

use async_trait::async_trait;
use radius_proto::{AcctTerminateCause, UsageCounters};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::IpAddr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
    #[error("Backend call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Backend rejected request: {0}")]
    Rejected(String),
    #[error("Backend error: {0}")]
    Internal(String),
}

/// Run a backend call under a deadline
pub async fn with_timeout<T, F>(timeout: Duration, call: F) -> Result<T, BackendError>
where
    F: Future<Output = Result<T, BackendError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| BackendError::Timeout(timeout))?
}

/// Subscriber attributes correlated from the RADIUS request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    pub session_id: String,
    /// Calling-Station-Id
    pub mac_addr: String,
    /// Called-Station-Id
    pub apn: String,
}

/// One EAP round-trip towards the authenticator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthRequest {
    pub ctx: AuthContext,
    pub eap_type: u8,
    /// Encoded EAP packet received from the peer
    pub payload: Vec<u8>,
    /// Opaque backend context returned by the previous round-trip
    pub backend_context: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthResponse {
    /// Encoded EAP packet to send to the peer
    pub payload: Vec<u8>,
    pub backend_context: String,
    /// Master session key, present with EAP-Success
    pub msk: Vec<u8>,
    /// Permanent identity of the subscriber, sent back as User-Name
    pub identity: String,
    pub msisdn: String,
}

/// EAP authenticator service
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Start a conversation from an EAP-Response/Identity
    async fn handle_identity(&self, request: AuthRequest) -> Result<AuthResponse, BackendError>;

    /// Advance a conversation
    async fn handle(&self, request: AuthRequest) -> Result<AuthResponse, BackendError>;
}

/// Subscriber context attached to accounting calls
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountingContext {
    pub session_id: String,
    pub acct_session_id: String,
    pub mac_addr: String,
    pub msisdn: String,
    pub apn: String,
    /// Address the accounting packet came from
    pub nas_ip: IpAddr,
}

/// Accounting service
#[async_trait]
pub trait AccountingService: Send + Sync {
    async fn start(&self, ctx: &AccountingContext) -> Result<(), BackendError>;

    async fn interim_update(
        &self,
        ctx: &AccountingContext,
        usage: &UsageCounters,
    ) -> Result<(), BackendError>;

    async fn stop(
        &self,
        ctx: &AccountingContext,
        cause: AcctTerminateCause,
        usage: &UsageCounters,
    ) -> Result<(), BackendError>;
}
