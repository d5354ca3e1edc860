//! Values handed out by the monitor.
//!
//! Every query result is mapped into one of the typed records below before
//! it leaves [`crate::monitor`]. Snapshot records project into a
//! [`Snapshot`] (ordered name -> value), tabular records into a [`RowSet`].

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fmt::{FmtStyle, format_bytes, format_duration, format_percent, format_timestamp};
use crate::monitor::MonitorError;

// ---------------------------------------------------------------------------
// Categories
// ---------------------------------------------------------------------------

/// A question the monitor knows how to answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Connections,
    DatabaseSize,
    CacheHitRatio,
    ActiveQueries,
    ServerInfo,
    Transactions,
    IndexUsage,
    UnusedIndexes,
    TableSizes,
    Sessions,
}

impl Category {
    pub const ALL: [Category; 10] = [
        Category::Connections,
        Category::DatabaseSize,
        Category::CacheHitRatio,
        Category::ActiveQueries,
        Category::ServerInfo,
        Category::Transactions,
        Category::IndexUsage,
        Category::UnusedIndexes,
        Category::TableSizes,
        Category::Sessions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Category::Connections => "connections",
            Category::DatabaseSize => "database_size",
            Category::CacheHitRatio => "cache_hit_ratio",
            Category::ActiveQueries => "active_queries",
            Category::ServerInfo => "server_info",
            Category::Transactions => "transactions",
            Category::IndexUsage => "index_usage",
            Category::UnusedIndexes => "unused_indexes",
            Category::TableSizes => "table_sizes",
            Category::Sessions => "sessions",
        }
    }

    /// True for categories answered with a [`RowSet`] rather than a [`Snapshot`].
    pub fn is_tabular(self) -> bool {
        matches!(
            self,
            Category::IndexUsage
                | Category::UnusedIndexes
                | Category::TableSizes
                | Category::Sessions
        )
    }

    pub fn snapshot_categories() -> impl Iterator<Item = Category> {
        Self::ALL.into_iter().filter(|c| !c.is_tabular())
    }

    pub fn tabular_categories() -> impl Iterator<Item = Category> {
        Self::ALL.into_iter().filter(|c| c.is_tabular())
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Category {
    type Err = MonitorError;

    /// Accepts the snake_case name, case-insensitive, `-` for `_`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|c| c.name() == normalized)
            .ok_or_else(|| MonitorError::UnsupportedCategory(s.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A displayable metric value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum MetricValue {
    Int(i64),
    Float(f64),
    /// Percentage in `0..=100`.
    Percent(f64),
    /// Byte count.
    Bytes(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    /// Duration in seconds.
    Duration(f64),
    /// SQL NULL, or not computable (e.g. a ratio with an empty denominator).
    Missing,
}

impl MetricValue {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Int(v) | MetricValue::Bytes(v) => Some(*v as f64),
            MetricValue::Float(v) | MetricValue::Percent(v) | MetricValue::Duration(v) => Some(*v),
            MetricValue::Timestamp(ts) => Some(ts.timestamp() as f64),
            MetricValue::Text(_) | MetricValue::Missing => None,
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, MetricValue::Missing)
    }

    /// Renders the value for a table column (compact byte sizes).
    pub fn compact(&self) -> String {
        match self {
            MetricValue::Bytes(b) => format_bytes(*b, FmtStyle::Compact),
            other => other.to_string(),
        }
    }

    pub(crate) fn percent(v: Option<f64>) -> Self {
        v.map(MetricValue::Percent).unwrap_or(MetricValue::Missing)
    }

    pub(crate) fn timestamp(v: Option<DateTime<Utc>>) -> Self {
        v.map(MetricValue::Timestamp).unwrap_or(MetricValue::Missing)
    }
}

impl std::fmt::Display for MetricValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricValue::Int(v) => write!(f, "{}", v),
            MetricValue::Float(v) => write!(f, "{:.2}", v),
            MetricValue::Percent(v) => f.write_str(&format_percent(*v)),
            MetricValue::Bytes(v) => f.write_str(&format_bytes(*v, FmtStyle::Detail)),
            MetricValue::Text(s) => f.write_str(s),
            MetricValue::Timestamp(ts) => f.write_str(&format_timestamp(ts)),
            MetricValue::Duration(secs) => f.write_str(&format_duration(*secs)),
            MetricValue::Missing => f.write_str("-"),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Int(v)
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl<T: Into<MetricValue>> From<Option<T>> for MetricValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(MetricValue::Missing)
    }
}

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// One named value inside a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    pub name: String,
    pub value: MetricValue,
}

impl Metric {
    pub fn new(name: &str, value: impl Into<MetricValue>) -> Self {
        Self {
            name: name.to_string(),
            value: value.into(),
        }
    }
}

/// Point-in-time set of named metric values.
///
/// Metric order is fixed per category. The snapshot cannot be modified once
/// built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    category: Category,
    taken_at: DateTime<Utc>,
    metrics: Vec<Metric>,
}

impl Snapshot {
    pub fn new(category: Category, metrics: Vec<Metric>) -> Self {
        Self {
            category,
            taken_at: Utc::now(),
            metrics,
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    pub fn taken_at(&self) -> DateTime<Utc> {
        self.taken_at
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.metrics.iter().find(|m| m.name == name).map(|m| &m.value)
    }

    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|m| m.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// A typed record answering a snapshot category.
pub trait SnapshotRecord {
    const CATEGORY: Category;

    fn metrics(&self) -> Vec<Metric>;

    fn to_snapshot(&self) -> Snapshot {
        Snapshot::new(Self::CATEGORY, self.metrics())
    }
}

/// Connection counts from `pg_stat_activity` (client backends only).
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ConnectionCounts {
    pub total: i64,
    pub active: i64,
    pub idle: i64,
    /// `idle in transaction` and `idle in transaction (aborted)`.
    pub idle_in_transaction: i64,
    /// Sessions waiting on a heavyweight lock.
    pub waiting_on_locks: i64,
    /// Source: `pg_settings.max_connections`
    pub max_connections: i64,
}

impl ConnectionCounts {
    /// Share of `max_connections` in use, percent.
    pub fn usage_pct(&self) -> Option<f64> {
        if self.max_connections <= 0 {
            return None;
        }
        Some(self.total as f64 * 100.0 / self.max_connections as f64)
    }
}

impl SnapshotRecord for ConnectionCounts {
    const CATEGORY: Category = Category::Connections;

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("total", self.total),
            Metric::new("active", self.active),
            Metric::new("idle", self.idle),
            Metric::new("idle_in_transaction", self.idle_in_transaction),
            Metric::new("waiting_on_locks", self.waiting_on_locks),
            Metric::new("max_connections", self.max_connections),
            Metric::new("usage", MetricValue::percent(self.usage_pct())),
        ]
    }
}

/// Size of the connected database.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DatabaseSize {
    pub database: String,
    /// Source: `pg_database_size(current_database())`
    pub size_bytes: i64,
}

impl SnapshotRecord for DatabaseSize {
    const CATEGORY: Category = Category::DatabaseSize;

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("database", self.database.as_str()),
            Metric::new("size", MetricValue::Bytes(self.size_bytes)),
        ]
    }
}

/// Buffer cache hits vs reads for the connected database.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CacheHitRatio {
    /// Source: `pg_stat_database.blks_hit`
    pub blks_hit: i64,
    /// Source: `pg_stat_database.blks_read`
    pub blks_read: i64,
}

impl CacheHitRatio {
    /// `blks_hit / (blks_hit + blks_read)` in percent; `None` before any block
    /// access.
    pub fn ratio_pct(&self) -> Option<f64> {
        let total = self.blks_hit.saturating_add(self.blks_read);
        if total <= 0 {
            return None;
        }
        Some(self.blks_hit as f64 * 100.0 / total as f64)
    }
}

impl SnapshotRecord for CacheHitRatio {
    const CATEGORY: Category = Category::CacheHitRatio;

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("cache_hit_ratio", MetricValue::percent(self.ratio_pct())),
            Metric::new("blks_hit", self.blks_hit),
            Metric::new("blks_read", self.blks_read),
        ]
    }
}

/// What client backends are executing right now.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ActiveQueries {
    pub active: i64,
    pub waiting_on_locks: i64,
    /// Age of the longest running active query, seconds.
    pub longest_query_secs: f64,
    /// Age of the oldest open transaction, seconds.
    pub oldest_transaction_secs: f64,
}

impl SnapshotRecord for ActiveQueries {
    const CATEGORY: Category = Category::ActiveQueries;

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("active", self.active),
            Metric::new("waiting_on_locks", self.waiting_on_locks),
            Metric::new(
                "longest_query",
                MetricValue::Duration(self.longest_query_secs),
            ),
            Metric::new(
                "oldest_transaction",
                MetricValue::Duration(self.oldest_transaction_secs),
            ),
        ]
    }
}

/// Server identity and uptime.
#[derive(Clone, Debug, PartialEq, Default, Serialize, Deserialize)]
pub struct ServerInfo {
    /// Source: `version()`
    pub version: String,
    /// Source: `server_version_num`, e.g. `160002`
    pub version_num: i64,
    /// Source: `pg_postmaster_start_time()`
    pub started_at: Option<DateTime<Utc>>,
    /// Server clock at query time.
    pub server_time: Option<DateTime<Utc>>,
    pub timezone: String,
    pub uptime_secs: f64,
    pub max_connections: i64,
}

impl SnapshotRecord for ServerInfo {
    const CATEGORY: Category = Category::ServerInfo;

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("version", self.version.as_str()),
            Metric::new("version_num", self.version_num),
            Metric::new("started_at", MetricValue::timestamp(self.started_at)),
            Metric::new("server_time", MetricValue::timestamp(self.server_time)),
            Metric::new("timezone", self.timezone.as_str()),
            Metric::new("uptime", MetricValue::Duration(self.uptime_secs)),
            Metric::new("max_connections", self.max_connections),
        ]
    }
}

/// Cumulative transaction and tuple counters for the connected database.
///
/// Source: `pg_stat_database` row of `current_database()`, plus the current
/// `pg_locks` row count.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransactionStats {
    pub xact_commit: i64,
    pub xact_rollback: i64,
    pub blks_read: i64,
    pub blks_hit: i64,
    pub tup_returned: i64,
    pub tup_fetched: i64,
    pub tup_inserted: i64,
    pub tup_updated: i64,
    pub tup_deleted: i64,
    pub temp_files: i64,
    pub temp_bytes: i64,
    pub deadlocks: i64,
    pub locks: i64,
}

impl TransactionStats {
    /// Committed share of all finished transactions, percent.
    pub fn commit_ratio(&self) -> Option<f64> {
        ratio(self.xact_commit, self.xact_rollback)
    }

    /// Rolled back share of all finished transactions, percent.
    pub fn rollback_ratio(&self) -> Option<f64> {
        ratio(self.xact_rollback, self.xact_commit)
    }
}

fn ratio(part: i64, rest: i64) -> Option<f64> {
    let total = part.saturating_add(rest);
    if total <= 0 {
        return None;
    }
    Some(part as f64 * 100.0 / total as f64)
}

impl SnapshotRecord for TransactionStats {
    const CATEGORY: Category = Category::Transactions;

    fn metrics(&self) -> Vec<Metric> {
        vec![
            Metric::new("xact_commit", self.xact_commit),
            Metric::new("xact_rollback", self.xact_rollback),
            Metric::new("commit_ratio", MetricValue::percent(self.commit_ratio())),
            Metric::new("rollback_ratio", MetricValue::percent(self.rollback_ratio())),
            Metric::new("blks_read", self.blks_read),
            Metric::new("blks_hit", self.blks_hit),
            Metric::new("tup_returned", self.tup_returned),
            Metric::new("tup_fetched", self.tup_fetched),
            Metric::new("tup_inserted", self.tup_inserted),
            Metric::new("tup_updated", self.tup_updated),
            Metric::new("tup_deleted", self.tup_deleted),
            Metric::new("temp_files", self.temp_files),
            Metric::new("temp_bytes", MetricValue::Bytes(self.temp_bytes)),
            Metric::new("deadlocks", self.deadlocks),
            Metric::new("locks", self.locks),
        ]
    }
}

// ---------------------------------------------------------------------------
// Row sets
// ---------------------------------------------------------------------------

/// A typed record of a tabular category.
///
/// `values()` is always in `COLUMNS` order and of the same length.
pub trait Record {
    const COLUMNS: &'static [&'static str];

    fn values(&self) -> Vec<MetricValue>;

    /// Column name -> value pairs.
    fn to_map(&self) -> Vec<(&'static str, MetricValue)> {
        Self::COLUMNS.iter().copied().zip(self.values()).collect()
    }
}

/// Per-index usage from `pg_stat_user_indexes`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IndexUsage {
    pub schema_name: String,
    pub table_name: String,
    pub index_name: String,
    /// Source: `idx_scan`
    pub index_scans: i64,
    /// Source: `idx_tup_read`
    pub tuples_read: i64,
    /// Source: `idx_tup_fetch`
    pub tuples_fetched: i64,
    /// Source: `pg_relation_size(indexrelid)`
    pub size_bytes: i64,
}

impl Record for IndexUsage {
    const COLUMNS: &'static [&'static str] = &[
        "schema_name",
        "table_name",
        "index_name",
        "index_scans",
        "tuples_read",
        "tuples_fetched",
        "size",
    ];

    fn values(&self) -> Vec<MetricValue> {
        vec![
            self.schema_name.as_str().into(),
            self.table_name.as_str().into(),
            self.index_name.as_str().into(),
            self.index_scans.into(),
            self.tuples_read.into(),
            self.tuples_fetched.into(),
            MetricValue::Bytes(self.size_bytes),
        ]
    }
}

/// Per-table on-disk size from `pg_stat_user_tables`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableSize {
    pub schema_name: String,
    pub table_name: String,
    /// Heap + indexes + TOAST.
    pub total_bytes: i64,
    pub table_bytes: i64,
    pub index_bytes: i64,
    /// Source: `n_live_tup`
    pub live_tuples: i64,
}

impl Record for TableSize {
    const COLUMNS: &'static [&'static str] = &[
        "schema_name",
        "table_name",
        "total_size",
        "table_size",
        "index_size",
        "live_tuples",
    ];

    fn values(&self) -> Vec<MetricValue> {
        vec![
            self.schema_name.as_str().into(),
            self.table_name.as_str().into(),
            MetricValue::Bytes(self.total_bytes),
            MetricValue::Bytes(self.table_bytes),
            MetricValue::Bytes(self.index_bytes),
            self.live_tuples.into(),
        ]
    }
}

/// One client session from `pg_stat_activity`.
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionInfo {
    pub pid: i64,
    pub user: String,
    pub application_name: String,
    /// `None` for local socket connections.
    pub client_addr: Option<String>,
    pub client_port: Option<i64>,
    pub backend_start: Option<DateTime<Utc>>,
    pub query_start: Option<DateTime<Utc>>,
    pub state_change: Option<DateTime<Utc>>,
    pub state: String,
    pub query: String,
}

impl Record for SessionInfo {
    const COLUMNS: &'static [&'static str] = &[
        "pid",
        "user",
        "application_name",
        "client_addr",
        "client_port",
        "backend_start",
        "query_start",
        "state_change",
        "state",
        "query",
    ];

    fn values(&self) -> Vec<MetricValue> {
        vec![
            self.pid.into(),
            self.user.as_str().into(),
            self.application_name.as_str().into(),
            self.client_addr.clone().into(),
            self.client_port.into(),
            MetricValue::timestamp(self.backend_start),
            MetricValue::timestamp(self.query_start),
            MetricValue::timestamp(self.state_change),
            self.state.as_str().into(),
            self.query.as_str().into(),
        ]
    }
}

/// Result of a tabular category. Row order follows the query's ORDER BY.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", content = "rows", rename_all = "snake_case")]
pub enum RowSet {
    IndexUsage(Vec<IndexUsage>),
    UnusedIndexes(Vec<IndexUsage>),
    TableSizes(Vec<TableSize>),
    Sessions(Vec<SessionInfo>),
}

impl RowSet {
    pub fn category(&self) -> Category {
        match self {
            RowSet::IndexUsage(_) => Category::IndexUsage,
            RowSet::UnusedIndexes(_) => Category::UnusedIndexes,
            RowSet::TableSizes(_) => Category::TableSizes,
            RowSet::Sessions(_) => Category::Sessions,
        }
    }

    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            RowSet::IndexUsage(_) | RowSet::UnusedIndexes(_) => IndexUsage::COLUMNS,
            RowSet::TableSizes(_) => TableSize::COLUMNS,
            RowSet::Sessions(_) => SessionInfo::COLUMNS,
        }
    }

    /// Row values in column order.
    pub fn rows(&self) -> Vec<Vec<MetricValue>> {
        match self {
            RowSet::IndexUsage(rows) | RowSet::UnusedIndexes(rows) => {
                rows.iter().map(Record::values).collect()
            }
            RowSet::TableSizes(rows) => rows.iter().map(Record::values).collect(),
            RowSet::Sessions(rows) => rows.iter().map(Record::values).collect(),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            RowSet::IndexUsage(rows) | RowSet::UnusedIndexes(rows) => rows.len(),
            RowSet::TableSizes(rows) => rows.len(),
            RowSet::Sessions(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
