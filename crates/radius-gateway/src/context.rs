use crate::backend::{AccountingService, Authenticator};
use crate::modules::coa::CoaTracker;
use crate::session::{SessionHandle, SessionStore};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Default deadline for outbound RADIUS exchanges and backend calls
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Dependencies shared by every filter and module of a server
///
/// Built once by the caller and handed to [`RadiusServer::new`](crate::RadiusServer::new);
/// modules clone what they need at init.
#[derive(Clone)]
pub struct GatewayContext {
    pub sessions: SessionStore,
    pub coa_tracker: Arc<CoaTracker>,
    pub default_timeout: Duration,
    authenticators: HashMap<String, Arc<dyn Authenticator>>,
    accounting_services: HashMap<String, Arc<dyn AccountingService>>,
}

impl GatewayContext {
    pub fn new(sessions: SessionStore) -> Self {
        GatewayContext {
            sessions,
            coa_tracker: Arc::new(CoaTracker::new()),
            default_timeout: DEFAULT_TIMEOUT,
            authenticators: HashMap::new(),
            accounting_services: HashMap::new(),
        }
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn with_coa_tracker(mut self, tracker: Arc<CoaTracker>) -> Self {
        self.coa_tracker = tracker;
        self
    }

    /// Register an EAP authenticator under `name`
    pub fn with_authenticator(
        mut self,
        name: impl Into<String>,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        self.authenticators.insert(name.into(), authenticator);
        self
    }

    /// Register an accounting service under `name`
    pub fn with_accounting_service(
        mut self,
        name: impl Into<String>,
        service: Arc<dyn AccountingService>,
    ) -> Self {
        self.accounting_services.insert(name.into(), service);
        self
    }

    pub fn authenticator(&self, name: &str) -> Option<Arc<dyn Authenticator>> {
        self.authenticators.get(name).cloned()
    }

    pub fn accounting_service(&self, name: &str) -> Option<Arc<dyn AccountingService>> {
        self.accounting_services.get(name).cloned()
    }
}

/// Per-request data passed to filters and modules
#[derive(Clone)]
pub struct RequestContext {
    /// Monotonic id used to correlate log lines of one request
    pub request_id: u64,
    pub session_id: Option<String>,
    pub sessions: SessionStore,
}

impl RequestContext {
    pub fn new(request_id: u64, session_id: Option<String>, sessions: SessionStore) -> Self {
        RequestContext {
            request_id,
            session_id,
            sessions,
        }
    }

    /// Handle on this request's session state, if the packet identified one
    pub fn session(&self) -> Option<SessionHandle> {
        self.session_id
            .as_deref()
            .map(|session_id| self.sessions.session(session_id))
    }
}
