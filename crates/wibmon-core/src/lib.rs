//! # wibmon-core
//!
//! Status poller for a fleet of Warm Interface Boards (WIBs).
//!
//! Every cycle each board is queried through the external control tool. A
//! fresh status report replaces the board's page; a busy or missing board
//! keeps its last page with a timestamped marker on top. Once every board
//! has been handled, the fleet dashboard is rebuilt from scratch: a grid of
//! links per detector zone plus metric summary tables.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use wibmon_core::{ButoolQuery, DirStore, Monitor, MonitorConfig};
//!
//! let config = MonitorConfig::default();
//! let query = ButoolQuery::new(&config.tool, &config.work_dir, config.query_timeout());
//! let store = DirStore::new(&config.output_dir);
//! let mut monitor = Monitor::new(&config, query, store).unwrap();
//! monitor.run_forever(&AtomicBool::new(false));
//! ```
//!
//! ## Architecture
//!
//! Query → overlay merge or full replace → scrape → reduce → dashboard
//!
//! The per-board [`DeviceRecord`] is the source of truth. Pages, the
//! dashboard and `status.json` are rendered views of it, written through a
//! [`DocumentStore`].

pub mod config;
pub mod dashboard;
pub mod document;
pub mod error;
pub mod metrics;
pub mod monitor;
pub mod names;
pub mod overlay;
pub mod query;
pub mod scrape;
pub mod store;

pub use config::{MonitorConfig, Templates, default_fleet};
pub use dashboard::{DashboardView, DeviceSummary, FleetSnapshot, SummaryTable, build};
pub use document::{DeviceRecord, render_empty, render_status};
pub use error::{MonitorError, Result};
pub use metrics::{MetricSpec, Selector, default_metric_specs, reduce, reduce_all};
pub use monitor::{CycleSummary, DeviceUpdate, Monitor};
pub use names::{Device, Zone, resolve, zone_of};
pub use overlay::{Marker, Overlay, OverlayKind, Status, classify_document};
pub use query::{ButoolQuery, DeviceQuery, PollOutcome, Scripts, ToolOutput, classify_dnd, classify_status, poll};
pub use scrape::{ScrapedReport, scrape};
pub use store::{DirStore, DocumentStore, MemoryStore};

/// Library version (from Cargo.toml).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
