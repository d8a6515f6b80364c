//! # Switchyard
//!
//! Switchyard is the configuration-consistency and versioned-export engine of
//! a BFE load-balancer control plane. It keeps products, pools, BFE clusters,
//! sub-clusters, clusters, domains, route rules and certificates consistent
//! with each other, and turns them into content-addressed, versioned
//! data-plane files.
//!
//! ## Architecture
//!
//! ```text
//! CLI / embedding code → ControlPlane → managers (services) → Store (memory | PostgreSQL)
//!                                   ↘ ExportService → exporters → version ledger
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use switchyard::{AppConfig, ControlPlane, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let plane = ControlPlane::from_config(&config).await?;
//!
//!     let gslb = plane.exports().export_gslb("bfe1", None).await?;
//!     println!("{:?}", gslb);
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod control_plane;
pub mod domain;
pub mod errors;
pub mod export;
pub mod observability;
pub mod services;
pub mod storage;

pub use config::AppConfig;
pub use control_plane::ControlPlane;
pub use errors::{ErrorKind, Result, SwitchyardError};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
