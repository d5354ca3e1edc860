//! One polling tick worth of monitor output.
//!
//! Every category is collected independently: a failing category becomes an
//! error section and the rest of the tick still renders.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use pgpulse_core::fmt::{
    StatusColor, cache_hit_status, connection_usage_status, latency_status, status_color,
};
use pgpulse_core::monitor::{Connector, ProbeResult};
use pgpulse_core::{Category, Monitor, MonitorError, RowSet, Snapshot};

#[derive(Debug, Serialize)]
pub struct Report {
    pub tick: u64,
    pub taken_at: DateTime<Utc>,
    pub target: String,
    pub status: LinkStatus,
    pub snapshots: Vec<Section<Snapshot>>,
    pub tables: Vec<Section<RowSet>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probes: Option<Vec<ProbeView>>,
}

impl Report {
    pub fn is_available(&self) -> bool {
        self.status.error.is_none()
    }
}

/// Ping outcome.
#[derive(Debug, Serialize)]
pub struct LinkStatus {
    /// "connected" or "unavailable".
    pub state: &'static str,
    pub color: StatusColor,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One category's data, or why it is missing.
#[derive(Debug, Serialize)]
pub struct Section<T> {
    pub category: Category,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<StatusColor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Section<T> {
    fn from_result(category: Category, result: Result<T, MonitorError>) -> Self {
        match result {
            Ok(data) => Self {
                category,
                color: None,
                data: Some(data),
                error: None,
            },
            Err(e) => {
                debug!(category = %category, error = %e, "category unavailable");
                Self {
                    category,
                    color: Some(StatusColor::Critical),
                    data: None,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProbeView {
    pub name: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elapsed_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<ProbeResult> for ProbeView {
    fn from(r: ProbeResult) -> Self {
        Self {
            name: r.name,
            elapsed_ms: r.elapsed.map(|d| d.as_secs_f64() * 1000.0),
            error: r.error,
        }
    }
}

/// Polls every requested category once.
///
/// A monitor left without a session by an earlier tick gets one reconnect
/// attempt here; the library itself never retries.
pub fn collect<C: Connector>(
    monitor: &mut Monitor<C>,
    tick: u64,
    categories: &[Category],
    with_probes: bool,
) -> Report {
    // Monitor::connect already warns about the failure itself.
    if !monitor.is_connected()
        && let Err(e) = monitor.connect()
    {
        debug!(error = %e, "reconnect failed");
    }

    let status = match monitor.ping() {
        Ok(latency) => LinkStatus {
            state: "connected",
            color: status_color(latency_status(latency)),
            latency_ms: Some(latency.as_secs_f64() * 1000.0),
            error: None,
        },
        Err(e) => LinkStatus {
            state: "unavailable",
            color: status_color("unavailable"),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let mut snapshots = Vec::new();
    let mut tables = Vec::new();
    for &category in categories {
        if category.is_tabular() {
            tables.push(Section::from_result(category, monitor.get_rows(category)));
        } else {
            let mut section = Section::from_result(category, monitor.get_snapshot(category));
            if let Some(snapshot) = &section.data {
                section.color = headline_color(snapshot);
            }
            snapshots.push(section);
        }
    }

    let probes = with_probes.then(|| match monitor.probe_queries() {
        Ok(results) => results.into_iter().map(ProbeView::from).collect(),
        Err(e) => {
            warn!(error = %e, "probe run aborted");
            Vec::new()
        }
    });

    Report {
        tick,
        taken_at: Utc::now(),
        target: monitor.target(),
        status,
        snapshots,
        tables,
        probes,
    }
}

/// Colour of the one metric per snapshot that has thresholds.
fn headline_color(snapshot: &Snapshot) -> Option<StatusColor> {
    let word = match snapshot.category() {
        Category::Connections => {
            let used = snapshot.get("total")?.as_f64()?;
            let max = snapshot.get("max_connections")?.as_f64()?;
            connection_usage_status(used as i64, max as i64)
        }
        Category::CacheHitRatio => {
            cache_hit_status(snapshot.get("cache_hit_ratio").and_then(|v| v.as_f64()))
        }
        _ => return None,
    };
    Some(status_color(word))
}
