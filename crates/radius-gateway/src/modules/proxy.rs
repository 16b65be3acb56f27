//! Proxy module
//!
//! Relays every request to one upstream server and answers with the
//! upstream reply. The rest of the chain is never consulted.

use super::{Module, ModuleError, Next, Request, Response, parse_target, timeout_or};
use crate::client::{RadiusClient, rehide_user_password};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProxyOptions {
    #[serde(default)]
    target: String,
    /// Upstream secret; the client's own secret when absent
    secret: Option<String>,
    timeout_ms: Option<u64>,
}

pub struct ProxyModule {
    target: SocketAddr,
    secret: Option<Vec<u8>>,
    client: RadiusClient,
}

impl ProxyModule {
    pub fn init(config: &ModuleConfig, ctx: &GatewayContext) -> Result<Self, ConfigError> {
        let options: ProxyOptions = config.options()?;
        Ok(ProxyModule {
            target: parse_target(&config.name, &options.target)?,
            secret: options.secret.map(String::into_bytes),
            client: RadiusClient::new(timeout_or(options.timeout_ms, ctx.default_timeout)),
        })
    }
}

#[async_trait]
impl Module for ProxyModule {
    fn name(&self) -> &'static str {
        "proxy"
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        _next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        debug!(request_id = ctx.request_id, target = %self.target, "Proxying request");
        relay(&self.client, request, self.target, self.secret.as_deref()).await
    }
}

/// Relay `request` to `target` and turn the reply into a pipeline response
///
/// `secret` defaults to the secret of the client that sent the request.
pub(crate) async fn relay(
    client: &RadiusClient,
    request: &Request,
    target: SocketAddr,
    secret: Option<&[u8]>,
) -> Result<Response, ModuleError> {
    let secret = secret.unwrap_or(&request.secret);
    let mut packet = request.packet.clone();
    rehide_user_password(&mut packet, &request.secret, secret)?;
    let reply = client.exchange(packet, target, secret).await?;
    Ok(Response::from_packet(reply))
}
