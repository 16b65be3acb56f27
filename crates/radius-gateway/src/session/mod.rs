//! Per-session state shared by filters and modules
//!
//! Every RADIUS session is identified by a session id derived from the
//! packet (see [`session_id_of`]). Its [`State`] is a small JSON record in a
//! pluggable [`StateBackend`]; records are created lazily on first write and
//! are never removed explicitly, the backend's TTL bounds their lifetime.
//!
//! Writes are last-writer-wins. Two packets of the same session processed
//! concurrently may overwrite each other's changes.

pub mod error;
pub mod memory;

pub use error::StateError;
pub use memory::MemoryStateBackend;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use radius_proto::{AttributeType, Packet};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::Duration;

/// Key/value storage for session records
#[async_trait]
pub trait StateBackend: Send + Sync {
    /// `Ok(None)` when the key is absent or expired
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StateError>;

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), StateError>;

    /// Deleting an absent key succeeds
    async fn delete(&self, key: &str) -> Result<(), StateError>;

    /// Reclaim expired entries; backends that expire on their own do nothing
    async fn purge_expired(&self) -> Result<usize, StateError> {
        Ok(0)
    }
}

/// Usage record kept by the analytics module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyticsRecord {
    /// Non-zero once the record exists
    pub analytics_session_id: u64,
    #[serde(default)]
    pub framed_ip: Option<Ipv4Addr>,
    #[serde(default)]
    pub nas_identifier: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub input_octets: u64,
    #[serde(default)]
    pub output_octets: u64,
}

/// Session record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub mac_addr: String,
    #[serde(default)]
    pub msisdn: String,
    /// Called-Station-Id, carrying the APN/SSID
    #[serde(default)]
    pub called_station_id: String,
    /// Traffic tier, assigned once per session
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub acct_session_id: String,
    #[serde(default)]
    pub analytics: Option<AnalyticsRecord>,
    #[serde(default)]
    pub deregistered: bool,
}

/// Session id of a packet: its Acct-Session-Id, otherwise
/// `"<Calling-Station-Id>/<Called-Station-Id>"`
pub fn session_id_of(packet: &Packet) -> Option<String> {
    if let Some(acct_session_id) = packet.lookup_string(AttributeType::AcctSessionId)
        && !acct_session_id.is_empty()
    {
        return Some(acct_session_id);
    }

    let calling = packet.lookup_string(AttributeType::CallingStationId)?;
    let called = packet
        .lookup_string(AttributeType::CalledStationId)
        .unwrap_or_default();
    Some(format!("{}/{}", calling, called))
}

/// Cloneable access point to the session records of one backend
#[derive(Clone)]
pub struct SessionStore {
    backend: Arc<dyn StateBackend>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new(backend: Arc<dyn StateBackend>, ttl: Option<Duration>) -> Self {
        SessionStore { backend, ttl }
    }

    /// Store over a fresh [`MemoryStateBackend`] without expiry
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStateBackend::new()), None)
    }

    pub fn session(&self, session_id: &str) -> SessionHandle {
        SessionHandle {
            store: self.clone(),
            session_id: session_id.to_string(),
        }
    }

    /// The stored record, `None` if the session was never written
    pub async fn try_get(&self, session_id: &str) -> Result<Option<State>, StateError> {
        match self.backend.get(session_id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Raw value stored under `key`, used for records that live beside the
    /// session state such as EAP containers
    pub async fn get_value(&self, key: &str) -> Result<Option<Vec<u8>>, StateError> {
        self.backend.get(key).await
    }

    pub async fn set_value(&self, key: &str, value: &[u8]) -> Result<(), StateError> {
        self.backend.set(key, value, self.ttl).await
    }

    pub async fn delete_value(&self, key: &str) -> Result<(), StateError> {
        self.backend.delete(key).await
    }

    pub async fn purge_expired(&self) -> Result<usize, StateError> {
        self.backend.purge_expired().await
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }
}

/// Handle on one session's [`State`]
#[derive(Clone)]
pub struct SessionHandle {
    store: SessionStore,
    session_id: String,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Current record, or the default record if none was stored yet
    pub async fn get(&self) -> Result<State, StateError> {
        Ok(self
            .store
            .try_get(&self.session_id)
            .await?
            .unwrap_or_default())
    }

    pub async fn set(&self, state: &State) -> Result<(), StateError> {
        let bytes = serde_json::to_vec(state)?;
        self.store.set_value(&self.session_id, &bytes).await
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use radius_proto::{Attribute, Code};

    fn packet_with(attributes: &[(AttributeType, &str)]) -> Packet {
        let mut packet = Packet::new(Code::AccountingRequest, 1, [0u8; 16]);
        for (attr_type, value) in attributes {
            packet.add_attribute(Attribute::string(*attr_type as u8, *value).unwrap());
        }
        packet
    }

    #[test]
    fn test_session_id_prefers_acct_session_id() {
        let packet = packet_with(&[
            (AttributeType::CallingStationId, "AA-BB-CC-DD-EE-FF"),
            (AttributeType::AcctSessionId, "acct-1"),
        ]);
        assert_eq!(session_id_of(&packet).as_deref(), Some("acct-1"));
    }

    #[test]
    fn test_session_id_falls_back_to_station_ids() {
        let packet = packet_with(&[
            (AttributeType::CallingStationId, "AA-BB-CC-DD-EE-FF"),
            (AttributeType::CalledStationId, "11-22-33-44-55-66:wifi"),
        ]);
        assert_eq!(
            session_id_of(&packet).as_deref(),
            Some("AA-BB-CC-DD-EE-FF/11-22-33-44-55-66:wifi")
        );
        assert_eq!(session_id_of(&packet_with(&[])), None);
    }

    #[tokio::test]
    async fn test_lazy_default_state() {
        let store = SessionStore::in_memory();
        let handle = store.session("s1");

        assert_eq!(handle.get().await.unwrap(), State::default());
        assert_eq!(store.try_get("s1").await.unwrap(), None);

        let state = State {
            mac_addr: "AA-BB-CC-DD-EE-FF".to_string(),
            tier: Some("live".to_string()),
            ..State::default()
        };
        handle.set(&state).await.unwrap();

        assert_eq!(handle.get().await.unwrap(), state);
        assert_eq!(store.try_get("s1").await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let store = SessionStore::in_memory();
        store.set_value("s1", b"not json").await.unwrap();
        assert!(matches!(
            store.session("s1").get().await,
            Err(StateError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_write_failure_surfaces() {
        let store = testing::failing_store();
        assert_eq!(store.session("s1").get().await.unwrap(), State::default());
        assert!(matches!(
            store.session("s1").set(&State::default()).await,
            Err(StateError::Backend(_))
        ));
    }

    #[test]
    fn test_state_tolerates_missing_fields() {
        let state: State = serde_json::from_str(r#"{ "msisdn": "15551234" }"#).unwrap();
        assert_eq!(state.msisdn, "15551234");
        assert_eq!(state.tier, None);
        assert!(!state.deregistered);
    }
}
