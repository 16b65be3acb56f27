//! Traffic tier allocation
//!
//! Each new session is assigned a tier once: one of the configured canaries
//! with probability equal to its weight (in percent), otherwise the live
//! tier. The tier is pinned in session state and never changes afterwards.

use super::{Filter, FilterError};
use crate::config::{CanaryConfig, ConfigError};
use crate::context::RequestContext;
use crate::modules::Request;
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Tier of every session no canary claimed
pub const LIVE_TIER: &str = "live";

/// Upper bound on the summed canary weights
pub const MAX_CANARY_WEIGHT: u32 = 50;

pub struct CanaryFilter {
    canaries: Vec<CanaryConfig>,
    rng: Mutex<StdRng>,
}

impl CanaryFilter {
    pub fn new(canaries: Vec<CanaryConfig>) -> Result<Self, ConfigError> {
        Self::with_rng(canaries, StdRng::from_rng(&mut rand::rng()))
    }

    /// Build with a caller-supplied generator
    pub fn with_rng(canaries: Vec<CanaryConfig>, rng: StdRng) -> Result<Self, ConfigError> {
        if let Some(reserved) = canaries.iter().find(|c| c.name == LIVE_TIER) {
            return Err(ConfigError::Invalid(format!(
                "Canary name '{}' is reserved for the default tier",
                reserved.name
            )));
        }

        let total: u32 = canaries.iter().map(|c| c.weight).sum();
        if total > MAX_CANARY_WEIGHT {
            return Err(ConfigError::Invalid(format!(
                "Canary weights sum to {}%, more than the {}% ceiling",
                total, MAX_CANARY_WEIGHT
            )));
        }

        Ok(CanaryFilter {
            canaries,
            rng: Mutex::new(rng),
        })
    }

    /// Tier selected by a draw in `1..=100`
    ///
    /// Weights are subtracted from the draw in configured order; the first
    /// canary that takes it to zero or below wins.
    pub fn tier_for_draw(&self, draw: u32) -> &str {
        let mut remaining = i64::from(draw);
        for canary in &self.canaries {
            remaining -= i64::from(canary.weight);
            if remaining <= 0 {
                return &canary.name;
            }
        }
        LIVE_TIER
    }

    fn draw(&self) -> u32 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .random_range(1..=100)
    }

    /// Draw and return a tier
    pub fn allocate(&self) -> &str {
        self.tier_for_draw(self.draw())
    }
}

#[async_trait]
impl Filter for CanaryFilter {
    fn name(&self) -> &'static str {
        "lb_canary"
    }

    async fn process(
        &self,
        ctx: &RequestContext,
        listener: &str,
        _request: &Request,
    ) -> Result<(), FilterError> {
        let session = ctx.session().ok_or(FilterError::NoSession)?;
        let mut state = session.get().await?;
        if state.tier.is_some() {
            return Ok(());
        }

        let tier = self.allocate().to_string();
        debug!(
            request_id = ctx.request_id,
            session_id = session.session_id(),
            listener = listener,
            tier = %tier,
            "Assigned traffic tier"
        );
        state.tier = Some(tier);
        session.set(&state).await?;
        Ok(())
    }
}
