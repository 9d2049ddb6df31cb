//! # pathwarden - Block clients that probe for sensitive paths
//!
//! pathwarden watches request paths for probes of well-known sensitive
//! locations (`/.env`, `/.git`, `/wp-admin`, ...). An address that keeps
//! probing past a grace period is blocked, first in the application and then
//! in the host packet filter. Blocks are timed with escalation or permanent,
//! survive restarts, and are swept once they expire.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        pathwarden                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Guard / RequestGuard                                       │
//! │    └── start, restore, periodic sweep, forbid-or-continue   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  PolicyEngine                                               │
//! │    ├── PatternMatcher (probe prefixes, whitelist + CIDRs)   │
//! │    └── grace period, timeout escalation, bans, fail-open    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  BlockStore (serde_json)                                    │
//! │    └── JsonBlockStore: write-through, one process per file  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Enforcer (RuleBackend trait)                               │
//! │    ├── IptablesBackend (iptables / ip6tables)               │
//! │    ├── PfctlBackend (pf anchor table)                       │
//! │    ├── NetshBackend (Windows advfirewall)                   │
//! │    └── NoopBackend                                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── run, restore, status, check, decide, unblock, sweep  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use pathwarden::config::Config;
//! use pathwarden::guard::Guard;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/pathwarden/config.yaml")?;
//!
//!     // Opens the store, re-installs active blocks, starts the sweep
//!     let guard = Guard::start(&config).await?;
//!
//!     let decision = guard.decide("203.0.113.5", "/.env").await;
//!     if decision.is_blocked() {
//!         println!("403");
//!     }
//!
//!     guard.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Failure policy
//!
//! Decisions never fail. Store and packet-filter errors are attached to the
//! [`engine::Decision`] as faults and logged; a request is never blocked
//! because a dependency broke.
//!
//! ## Modules
//!
//! - [`cli`] - Command-line interface definitions
//! - [`clock`] - Time source (system clock, manual clock for tests)
//! - [`commands`] - CLI command implementations
//! - [`config`] - Configuration parsing and validation
//! - [`engine`] - Policy engine and timeout escalation
//! - [`enforcer`] - Packet-filter backends and the in-memory rule index
//! - [`guard`] - Startup wiring and the request facade
//! - [`lock`] - File locking so one process owns a store
//! - [`matcher`] - Suspicious path and whitelist matching
//! - [`restore`] - Re-installing rules after a restart
//! - [`scheduler`] - Periodic background tasks
//! - [`signal`] - Graceful shutdown signal handling
//! - [`store`] - Durable block records
//! - [`utils`] - Output formatting helpers

pub mod cli;
pub mod clock;
pub mod cmd_abstraction;
pub mod commands;
pub mod config;
pub mod enforcer;
pub mod engine;
pub mod error;
pub mod fs_abstraction;
pub mod guard;
mod keyed_lock;
pub mod lock;
pub mod matcher;
pub mod restore;
pub mod scheduler;
pub mod signal;
pub mod store;
pub mod utils;
pub mod validation;

pub use cli::{Cli, Commands};
pub use config::Config;
pub use engine::{Decision, PolicyEngine, Verdict};
pub use error::{GuardError, GuardResult};
pub use guard::{client_address, Action, Guard, RequestGuard};
