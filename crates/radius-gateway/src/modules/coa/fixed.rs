use crate::client::RadiusClient;
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use crate::modules::proxy::relay;
use crate::modules::{Module, ModuleError, Next, Request, Response, parse_target, timeout_or};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use tracing::debug;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct FixedCoaOptions {
    #[serde(default)]
    target: String,
    secret: Option<String>,
    timeout_ms: Option<u64>,
}

/// Relays CoA/Disconnect-Requests to a single NAS
pub struct FixedCoaModule {
    target: SocketAddr,
    secret: Option<Vec<u8>>,
    client: RadiusClient,
}

impl FixedCoaModule {
    pub fn init(config: &ModuleConfig, ctx: &GatewayContext) -> Result<Self, ConfigError> {
        let options: FixedCoaOptions = config.options()?;
        Ok(FixedCoaModule {
            target: parse_target(&config.name, &options.target)?,
            secret: options.secret.map(String::into_bytes),
            client: RadiusClient::new(timeout_or(options.timeout_ms, ctx.default_timeout)),
        })
    }
}

#[async_trait]
impl Module for FixedCoaModule {
    fn name(&self) -> &'static str {
        "coa_fixed"
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        if !request.code().is_dynamic_authorization() {
            return next.run(ctx, request).await;
        }

        debug!(
            request_id = ctx.request_id,
            code = ?request.code(),
            target = %self.target,
            "Relaying dynamic authorization request"
        );
        relay(&self.client, request, self.target, self.secret.as_deref()).await
    }
}
