use super::{CoaTracker, DEFAULT_COA_PORT, session_key};
use crate::client::RadiusClient;
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use crate::modules::proxy::relay;
use crate::modules::{Module, ModuleError, Next, Request, Response, timeout_or};
use async_trait::async_trait;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DynamicCoaOptions {
    #[serde(default = "default_port")]
    port: u16,
    secret: Option<String>,
    timeout_ms: Option<u64>,
}

fn default_port() -> u16 {
    DEFAULT_COA_PORT
}

/// Routes CoA/Disconnect-Requests to the NAS last seen for the session
///
/// Every other packet passing through records its source address against
/// its Acct-Session-Id before continuing down the chain.
pub struct DynamicCoaModule {
    port: u16,
    secret: Option<Vec<u8>>,
    client: RadiusClient,
    tracker: Arc<CoaTracker>,
}

impl DynamicCoaModule {
    pub fn init(config: &ModuleConfig, ctx: &GatewayContext) -> Result<Self, ConfigError> {
        let options: DynamicCoaOptions = config.options()?;
        if options.port == 0 {
            return Err(ConfigError::module(&config.name, "Port must be non-zero"));
        }
        Ok(DynamicCoaModule {
            port: options.port,
            secret: options.secret.map(String::into_bytes),
            client: RadiusClient::new(timeout_or(options.timeout_ms, ctx.default_timeout)),
            tracker: ctx.coa_tracker.clone(),
        })
    }
}

#[async_trait]
impl Module for DynamicCoaModule {
    fn name(&self) -> &'static str {
        "coa_dynamic"
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        let key = session_key(&request.packet)?;

        if !request.code().is_dynamic_authorization() {
            let nas = request.remote_addr.ip();
            self.tracker.record(&key, nas);
            debug!(request_id = ctx.request_id, session_key = %key, nas = %nas, "Tracked session");
            return next.run(ctx, request).await;
        }

        let nas = self
            .tracker
            .lookup(&key)
            .ok_or_else(|| ModuleError::NotTracked(key.clone()))?;
        let target = SocketAddr::new(nas, self.port);
        debug!(
            request_id = ctx.request_id,
            session_key = %key,
            code = ?request.code(),
            target = %target,
            "Routing dynamic authorization request"
        );
        relay(&self.client, request, target, self.secret.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::testing::*;
    use crate::session::SessionStore;
    use radius_proto::{AttributeType, Code};

    fn module(gateway: &GatewayContext, port: u16) -> DynamicCoaModule {
        let config = ModuleConfig::new(
            "coa_dynamic",
            serde_json::json!({ "Port": port, "TimeoutMs": 2000 }),
        );
        DynamicCoaModule::init(&config, gateway).unwrap()
    }

    #[tokio::test]
    async fn test_untracked_session_fails() {
        let gateway = GatewayContext::new(SessionStore::in_memory());
        let module = module(&gateway, 3799);

        let mut request = request(Code::CoaRequest, &[(AttributeType::AcctSessionId, "s1")]);
        let ctx = context(&request, &gateway);
        let result = module.handle(&ctx, &mut request, Next::new(&[])).await;
        assert!(matches!(result, Err(ModuleError::NotTracked(key)) if key == "s1"));
    }

    #[tokio::test]
    async fn test_missing_session_id_fails_every_packet() {
        let gateway = GatewayContext::new(SessionStore::in_memory());
        let module = module(&gateway, 3799);

        for code in [Code::AccountingRequest, Code::DisconnectRequest] {
            let mut request = request(code, &[]);
            let ctx = context(&request, &gateway);
            let result = module.handle(&ctx, &mut request, Next::new(&[])).await;
            assert!(matches!(result, Err(ModuleError::MissingAttribute(_))));
        }
        assert!(gateway.coa_tracker.is_empty());
    }

    #[tokio::test]
    async fn test_routes_to_recorded_nas() {
        let (upstream, mut received) = spawn_upstream(b"secret").await;
        let gateway = GatewayContext::new(SessionStore::in_memory());
        let module = module(&gateway, upstream.port());
        let chain: Vec<Box<dyn Module>> = vec![Box::new(module), Box::new(Ack)];

        // Accounting from the NAS at 127.0.0.1 is tracked and continues down the chain
        let mut accounting = request(Code::AccountingRequest, &[(AttributeType::AcctSessionId, "s1")]);
        accounting.remote_addr = "127.0.0.1:50000".parse().unwrap();
        let ctx = context(&accounting, &gateway);
        let response = Next::new(&chain).run(&ctx, &mut accounting).await.unwrap();
        assert_eq!(response.code, Code::AccountingResponse);
        assert_eq!(
            gateway.coa_tracker.lookup("s1"),
            Some("127.0.0.1".parse().unwrap())
        );

        let mut coa = request(Code::DisconnectRequest, &[(AttributeType::AcctSessionId, "s1")]);
        coa.remote_addr = "10.9.9.9:40000".parse().unwrap();
        let ctx = context(&coa, &gateway);
        let response = Next::new(&chain).run(&ctx, &mut coa).await.unwrap();
        assert_eq!(response.code, Code::DisconnectAck);

        let relayed = received.recv().await.unwrap();
        assert_eq!(relayed.code, Code::DisconnectRequest);
        assert_eq!(relayed.lookup_string(AttributeType::AcctSessionId).unwrap(), "s1");
        // The CoA source is not recorded
        assert_eq!(
            gateway.coa_tracker.lookup("s1"),
            Some("127.0.0.1".parse().unwrap())
        );
    }

    #[test]
    fn test_default_port() {
        let gateway = GatewayContext::new(SessionStore::in_memory());
        let config = ModuleConfig::new("coa_dynamic", serde_json::Value::Null);
        assert_eq!(DynamicCoaModule::init(&config, &gateway).unwrap().port, 3799);

        let zero = ModuleConfig::new("coa_dynamic", serde_json::json!({ "Port": 0 }));
        assert!(DynamicCoaModule::init(&zero, &gateway).is_err());
    }
}
