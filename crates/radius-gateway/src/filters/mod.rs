//! Request filters
//!
//! Filters run before a listener's module chain. They have side effects on
//! session state only and never produce a RADIUS response; a failing filter
//! is logged and the request carries on.

pub mod canary;

pub use canary::CanaryFilter;

use crate::config::{ConfigError, GatewayConfig};
use crate::context::RequestContext;
use crate::modules::Request;
use crate::session::StateError;
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Request has no session id")]
    NoSession,
    #[error("Session state error: {0}")]
    State(#[from] StateError),
}

#[async_trait]
pub trait Filter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn process(
        &self,
        ctx: &RequestContext,
        listener: &str,
        request: &Request,
    ) -> Result<(), FilterError>;
}

/// Registry of filter implementations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Canary,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "canary" | "lb_canary" => Some(FilterKind::Canary),
            _ => None,
        }
    }

    /// Validate the filter's static configuration and build it
    pub fn build(self, config: &GatewayConfig) -> Result<Box<dyn Filter>, ConfigError> {
        match self {
            FilterKind::Canary => Ok(Box::new(CanaryFilter::new(
                config.load_balance.canaries.clone(),
            )?)),
        }
    }
}
