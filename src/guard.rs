//! Wiring for applications: start the whole system from a [`Config`] and
//! check requests through a framework-neutral facade.
//!
//! ```no_run
//! use pathwarden::config::Config;
//! use pathwarden::guard::{client_address, Action, Guard};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = Config::load("/etc/pathwarden/config.yaml")?;
//! let guard = Guard::start(&config).await?;
//! let requests = guard.request_guard();
//!
//! // Inside a request handler:
//! let address = client_address(None, None, Some("203.0.113.5:51234")).unwrap_or_default();
//! if requests.check(&address, "/.env").await == Action::Forbid {
//!     // respond with requests.forbidden_status() and Guard::FORBIDDEN_BODY
//! }
//!
//! guard.shutdown().await;
//! # Ok(())
//! # }
//! ```

use anyhow::{Context, Result};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::engine::{Decision, PolicyEngine};
use crate::enforcer::{create_enforcer, Enforcer};
use crate::matcher::PatternMatcher;
use crate::restore::{restore, RestoreReport};
use crate::scheduler::PeriodicTask;
use crate::store::{BlockStore, JsonBlockStore};

/// A running pathwarden: engine, restored enforcer and background sweep.
pub struct Guard {
    engine: Arc<PolicyEngine>,
    sweeper: Option<PeriodicTask>,
    restored: RestoreReport,
}

impl Guard {
    pub const FORBIDDEN_BODY: &'static str = "Forbidden: This request has been blocked for security reasons";

    /// Open the store, create the enforcer for the configured system type,
    /// re-arm existing blocks and start the sweep.
    pub async fn start(config: &Config) -> Result<Self> {
        Self::start_with_clock(config, Arc::new(SystemClock)).await
    }

    pub async fn start_with_clock(config: &Config, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let store = JsonBlockStore::open(&config.storage_file, clock.clone())
            .with_context(|| format!("Failed to open block store {}", config.storage_file.display()))?;
        let enforcer = create_enforcer(&config.system(), clock.clone());

        Self::with_parts(config, Arc::new(store), Arc::new(enforcer), clock).await
    }

    /// Start from already-built parts. Restore runs against `enforcer`
    /// before the guard is returned.
    pub async fn with_parts(
        config: &Config,
        store: Arc<dyn BlockStore>,
        enforcer: Arc<dyn Enforcer>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let settings = config.engine_settings()?;
        let restored = restore(store.as_ref(), enforcer.as_ref(), clock.as_ref()).await;

        let matcher = PatternMatcher::new(&config.patterns, &config.whitelist);
        let engine = Arc::new(PolicyEngine::new(store, enforcer, matcher, settings, clock));

        let sweeper = if config.cleanup_enabled {
            let period = config.cleanup_period()?;
            let sweep_engine = Arc::clone(&engine);
            info!("Sweeping expired blocks every {}", config.cleanup_interval);
            Some(PeriodicTask::spawn("block sweep", period, move || {
                let engine = Arc::clone(&sweep_engine);
                async move {
                    engine.sweep().await;
                }
            }))
        } else {
            info!("Periodic sweep disabled");
            None
        };

        Ok(Self {
            engine,
            sweeper,
            restored,
        })
    }

    pub async fn decide(&self, address: &str, path: &str) -> Decision {
        self.engine.decide(address, path).await
    }

    pub fn engine(&self) -> &Arc<PolicyEngine> {
        &self.engine
    }

    pub fn restore_report(&self) -> RestoreReport {
        self.restored
    }

    pub fn request_guard(&self) -> RequestGuard {
        RequestGuard {
            engine: Arc::clone(&self.engine),
        }
    }

    /// Stop the sweep and wait for a run in progress to finish.
    pub async fn shutdown(self) {
        if let Some(sweeper) = self.sweeper {
            sweeper.stop().await;
        }
        info!("pathwarden stopped");
    }
}

/// What a request handler should do with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Continue,
    Forbid,
}

/// Cheap, cloneable handle for request handlers.
#[derive(Clone)]
pub struct RequestGuard {
    engine: Arc<PolicyEngine>,
}

impl RequestGuard {
    pub fn new(engine: Arc<PolicyEngine>) -> Self {
        Self { engine }
    }

    /// Decide and log. Faults are logged and otherwise ignored.
    pub async fn check(&self, address: &str, path: &str) -> Action {
        let decision = self.engine.decide(address, path).await;
        for fault in &decision.faults {
            warn!("pathwarden: {} (request from {:?} to {})", fault, address, path);
        }
        if decision.is_blocked() {
            info!("Blocked request from {} to {}", address, path);
            Action::Forbid
        } else {
            Action::Continue
        }
    }

    /// HTTP status to answer blocked requests with.
    pub fn forbidden_status(&self) -> u16 {
        403
    }
}

/// Client address of a request: first `X-Forwarded-For` entry, then
/// `X-Real-IP`, then the peer address without its port.
pub fn client_address(forwarded_for: Option<&str>, real_ip: Option<&str>, peer: Option<&str>) -> Option<String> {
    if let Some(first) = forwarded_for
        .and_then(|xff| xff.split(',').map(str::trim).find(|entry| !entry.is_empty()))
    {
        return Some(first.to_string());
    }

    if let Some(real_ip) = real_ip.map(str::trim).filter(|ip| !ip.is_empty()) {
        return Some(real_ip.to_string());
    }

    let peer = peer.map(str::trim).filter(|p| !p.is_empty())?;
    if let Ok(ip) = peer.parse::<IpAddr>() {
        return Some(ip.to_string());
    }
    match peer.parse::<SocketAddr>() {
        Ok(addr) => Some(addr.ip().to_string()),
        Err(_) => Some(peer.to_string()),
    }
}
