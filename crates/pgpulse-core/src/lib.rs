//! pgpulse-core — PostgreSQL dashboard core.
//!
//! Provides:
//! - `config` — connection settings (`DATABASE_URL`, mandatory SSL)
//! - `monitor` — single-session monitor: ping, snapshots, row sets, probes
//! - `model` — categories, metric values, snapshots, typed records
//! - `fmt` — pure formatting helpers (bytes, durations, status colours)
//! - `mock` — scripted in-memory connector for tests and demos

pub mod config;
pub mod fmt;
pub mod mock;
pub mod model;
pub mod monitor;

pub use config::MonitorConfig;
pub use model::{Category, Metric, MetricValue, RowSet, Snapshot};
pub use monitor::{Monitor, MonitorError};
