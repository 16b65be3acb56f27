//! CoA and Disconnect relaying (RFC 5176)
//!
//! [`FixedCoaModule`] sends every CoA/Disconnect-Request to one configured
//! NAS. [`DynamicCoaModule`] learns which NAS serves a session from the
//! other traffic of that session and relays CoA/Disconnect-Requests there.

pub mod dynamic;
pub mod fixed;

pub use dynamic::DynamicCoaModule;
pub use fixed::FixedCoaModule;

use super::ModuleError;
use dashmap::DashMap;
use radius_proto::{AttributeType, Packet};
use std::net::IpAddr;

/// Default CoA port (RFC 5176 Section 3)
pub const DEFAULT_COA_PORT: u16 = 3799;

/// Last observed NAS address per session
///
/// Entries are overwritten by every non-CoA packet of the session; there is
/// no history and no expiry.
#[derive(Debug, Default)]
pub struct CoaTracker {
    entries: DashMap<String, IpAddr>,
}

impl CoaTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, session_key: &str, addr: IpAddr) -> Option<IpAddr> {
        self.entries.insert(session_key.to_string(), addr)
    }

    pub fn lookup(&self, session_key: &str) -> Option<IpAddr> {
        self.entries.get(session_key).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Tracker key of a packet: its Acct-Session-Id
pub fn session_key(packet: &Packet) -> Result<String, ModuleError> {
    packet
        .lookup_string(AttributeType::AcctSessionId)
        .filter(|id| !id.is_empty())
        .ok_or(ModuleError::MissingAttribute("Acct-Session-Id"))
}
