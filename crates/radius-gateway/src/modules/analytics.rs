//! Per-session usage analytics
//!
//! An Access-Request opens an [`AnalyticsRecord`] for its session. Accounting
//! Start, Interim-Update and Stop refresh the record's usage totals and emit
//! one event on the `analytics` tracing target. The module never answers a
//! request itself and never fails one: state errors are logged and the
//! request continues down the chain.

use super::{Module, ModuleError, Next, Request, Response};
use crate::config::{ConfigError, ModuleConfig};
use crate::context::{GatewayContext, RequestContext};
use crate::session::{AnalyticsRecord, SessionHandle, StateError};
use async_trait::async_trait;
use chrono::Utc;
use radius_proto::{AcctStatusType, AttributeType, Code, Packet, UsageCounters};
use rand::Rng;
use std::net::Ipv4Addr;
use tracing::{info, warn};

pub struct AnalyticsModule;

impl AnalyticsModule {
    pub fn init(_config: &ModuleConfig, _ctx: &GatewayContext) -> Result<Self, ConfigError> {
        Ok(AnalyticsModule)
    }

    async fn open_record(&self, session: &SessionHandle, packet: &Packet) -> Result<(), StateError> {
        let mut state = session.get().await?;
        if state.analytics.is_some() {
            return Ok(());
        }

        let analytics_session_id = rand::rng().random_range(1..=u64::MAX);
        state.analytics = Some(AnalyticsRecord {
            analytics_session_id,
            framed_ip: packet
                .lookup(AttributeType::FramedIpAddress)
                .and_then(|value| <[u8; 4]>::try_from(value).ok())
                .map(Ipv4Addr::from),
            nas_identifier: packet.lookup_string(AttributeType::NasIdentifier),
            created_at: Utc::now(),
            updated_at: None,
            input_octets: 0,
            output_octets: 0,
        });
        session.set(&state).await
    }

    async fn record_usage(
        &self,
        ctx: &RequestContext,
        session: &SessionHandle,
        status: AcctStatusType,
        usage: &UsageCounters,
    ) -> Result<(), StateError> {
        let mut state = session.get().await?;
        let Some(record) = state.analytics.as_mut() else {
            warn!(
                request_id = ctx.request_id,
                session_id = session.session_id(),
                "No analytics record for accounting session"
            );
            return Ok(());
        };

        record.input_octets = usage.total_input_octets();
        record.output_octets = usage.total_output_octets();
        record.updated_at = Some(Utc::now());

        info!(
            target: "analytics",
            analytics_session_id = record.analytics_session_id,
            session_id = session.session_id(),
            status = ?status,
            input_octets = record.input_octets,
            output_octets = record.output_octets,
            tier = state.tier.as_deref().unwrap_or_default(),
            "Session usage"
        );
        session.set(&state).await
    }
}

#[async_trait]
impl Module for AnalyticsModule {
    fn name(&self) -> &'static str {
        "analytics"
    }

    async fn handle(
        &self,
        ctx: &RequestContext,
        request: &mut Request,
        next: Next<'_>,
    ) -> Result<Response, ModuleError> {
        if let Some(session) = ctx.session() {
            let result = match request.code() {
                Code::AccessRequest => self.open_record(&session, &request.packet).await,
                Code::AccountingRequest => {
                    match request
                        .packet
                        .lookup_integer(AttributeType::AcctStatusType)
                        .and_then(AcctStatusType::from_u32)
                    {
                        Some(status) if status.is_session_status() => {
                            let usage = UsageCounters::from_packet(&request.packet);
                            self.record_usage(ctx, &session, status, &usage).await
                        }
                        _ => Ok(()),
                    }
                }
                _ => Ok(()),
            };

            if let Err(e) = result {
                warn!(
                    request_id = ctx.request_id,
                    session_id = session.session_id(),
                    error = %e,
                    "Analytics update failed"
                );
            }
        }

        next.run(ctx, request).await
    }
}
