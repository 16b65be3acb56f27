use super::{Module, ModuleError, Next, Request, Response};
use crate::context::RequestContext;
use async_trait::async_trait;
use radius_proto::AttributeType;

/// Answers every request itself with its positive acknowledgement, echoing
/// the request attributes
///
/// Proxy-State is left to the server, which echoes it on every response.
pub struct LoopbackModule;

#[async_trait]
impl Module for LoopbackModule {
    fn name(&self) -> &'static str {
        "loopback"
    }

    async fn handle(
        &self,
        _ctx: &RequestContext,
        request: &mut Request,
        _next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        let code = request
            .code()
            .ack()
            .ok_or(ModuleError::UnsupportedCode(request.code()))?;
        let attributes = request
            .packet
            .attributes
            .iter()
            .filter(|a| a.attr_type != AttributeType::ProxyState.as_u8())
            .cloned()
            .collect();
        Ok(Response::with_attributes(code, attributes))
    }
}
