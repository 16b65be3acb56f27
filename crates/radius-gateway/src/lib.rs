//! RADIUS Gateway
//!
//! A RADIUS front end for carrier Wi-Fi built on top of the `radius-proto`
//! protocol implementation. Each listener owns a chain of modules; every
//! request first passes the configured filters and is then handed to the
//! chain, whose answer is signed and returned to the NAS.
//!
//! # Features
//!
//! - Async I/O with Tokio, one task per request
//! - Module chains: proxy, loopback, accounting, analytics, EAP, CoA routing
//! - Canary load-balancing filter over per-session state
//! - Duplicate request suppression
//! - JSON configuration
//!
//! # Example
//!
//! ```rust,no_run
//! use radius_gateway::{GatewayConfig, GatewayContext, RadiusServer, SessionStore, StaticLoader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = GatewayConfig::from_file("config.json")?;
//!     let context = GatewayContext::new(SessionStore::in_memory());
//!
//!     let server = RadiusServer::new(config, &StaticLoader, context).await?;
//!     server.run().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod client;
pub mod config;
pub mod context;
pub mod dedup;
pub mod filters;
pub mod modules;
pub mod server;
pub mod session;

pub use backend::{AccountingService, Authenticator, BackendError};
pub use client::{ClientError, RadiusClient};
pub use config::{ConfigError, GatewayConfig, ListenerConfig, ModuleConfig};
pub use context::{GatewayContext, RequestContext};
pub use dedup::{DedupCache, RequestFingerprint};
pub use filters::{Filter, FilterError};
pub use modules::coa::CoaTracker;
pub use modules::{Loader, Module, ModuleError, Next, Request, Response, StaticLoader};
pub use server::{RadiusServer, ServerError};
pub use session::{MemoryStateBackend, SessionStore, State, StateBackend, StateError};
