//! Accounting relay
//!
//! Translates Accounting-Request lifecycle events into calls on an
//! [`AccountingService`]. The module is terminal for Accounting-Request; all
//! other codes continue down the chain.

use super::{Module, ModuleError, Next, Request, Response, timeout_or};
use crate::backend::{AccountingContext, AccountingService, with_timeout};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use async_trait::async_trait;
use radius_proto::{AcctStatusType, AcctTerminateCause, AttributeType, Code, UsageCounters};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountingOptions {
    /// Name of the registered accounting service
    #[serde(default = "default_backend")]
    backend: String,
    timeout_ms: Option<u64>,
}

fn default_backend() -> String {
    "accounting".to_string()
}

pub struct AccountingModule {
    service: Arc<dyn AccountingService>,
    timeout: Duration,
}

impl AccountingModule {
    pub fn init(config: &ModuleConfig, ctx: &GatewayContext) -> Result<Self, ConfigError> {
        let options: AccountingOptions = config.options()?;
        let service = ctx.accounting_service(&options.backend).ok_or_else(|| {
            ConfigError::module(
                &config.name,
                format!("No accounting service registered as '{}'", options.backend),
            )
        })?;
        Ok(AccountingModule {
            service,
            timeout: timeout_or(options.timeout_ms, ctx.default_timeout),
        })
    }

    /// Backend context from session state, falling back to the packet's
    /// station ids for sessions not seen before
    async fn accounting_context(
        &self,
        ctx: &RequestContext,
        request: &Request,
    ) -> Result<AccountingContext, ModuleError> {
        let session = ctx
            .session()
            .ok_or(ModuleError::MissingAttribute("Acct-Session-Id"))?;
        let state = session.get().await?;
        let packet = &request.packet;

        let or_packet = |stored: String, attr_type: AttributeType| {
            if stored.is_empty() {
                packet.lookup_string(attr_type).unwrap_or_default()
            } else {
                stored
            }
        };

        Ok(AccountingContext {
            session_id: session.session_id().to_string(),
            acct_session_id: packet
                .lookup_string(AttributeType::AcctSessionId)
                .unwrap_or_default(),
            mac_addr: or_packet(state.mac_addr, AttributeType::CallingStationId),
            msisdn: state.msisdn,
            apn: or_packet(state.called_station_id, AttributeType::CalledStationId),
            nas_ip: request.remote_addr.ip(),
        })
    }

    /// Remember the Acct-Session-Id of a started session; failures are logged
    async fn cache_acct_session_id(&self, ctx: &RequestContext, acct_session_id: &str) {
        let Some(session) = ctx.session() else {
            return;
        };
        let result = async {
            let mut state = session.get().await?;
            state.acct_session_id = acct_session_id.to_string();
            session.set(&state).await
        }
        .await;
        if let Err(e) = result {
            warn!(
                request_id = ctx.request_id,
                session_id = session.session_id(),
                error = %e,
                "Failed to cache Acct-Session-Id"
            );
        }
    }
}

#[async_trait]
impl Module for AccountingModule {
    fn name(&self) -> &'static str {
        "accounting"
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        if request.code() != Code::AccountingRequest {
            return next.run(ctx, request).await;
        }

        let raw = request
            .packet
            .lookup_integer(AttributeType::AcctStatusType)
            .ok_or(ModuleError::MissingAttribute("Acct-Status-Type"))?;
        let status = AcctStatusType::from_u32(raw).ok_or(ModuleError::UnknownStatusType(raw))?;

        if !status.is_session_status() {
            debug!(
                request_id = ctx.request_id,
                status = ?status,
                nas = %request.remote_addr,
                "Acknowledging NAS accounting state change"
            );
            return Ok(Response::new(Code::AccountingResponse));
        }

        let acct_ctx = self.accounting_context(ctx, request).await?;
        let usage = UsageCounters::from_packet(&request.packet);
        debug!(
            request_id = ctx.request_id,
            session_id = %acct_ctx.session_id,
            status = ?status,
            "Relaying accounting event"
        );

        match status {
            AcctStatusType::Start => {
                with_timeout(self.timeout, self.service.start(&acct_ctx)).await?;
                self.cache_acct_session_id(ctx, &acct_ctx.acct_session_id).await;
            }
            AcctStatusType::InterimUpdate => {
                with_timeout(self.timeout, self.service.interim_update(&acct_ctx, &usage)).await?;
            }
            AcctStatusType::Stop => {
                with_timeout(
                    self.timeout,
                    self.service
                        .stop(&acct_ctx, AcctTerminateCause::NasRequest, &usage),
                )
                .await?;
            }
            AcctStatusType::AccountingOn | AcctStatusType::AccountingOff => {}
        }

        Ok(Response::new(Code::AccountingResponse))
    }
}
