//! PostgreSQL monitor.
//!
//! Answers one question per call against a single owned session:
//! - `ping` — round-trip latency of a trivial statement
//! - `get_snapshot` — point-in-time metrics (connections, size, cache hits, ...)
//! - `get_rows` — tabular results (index usage, table sizes, sessions)
//! - `probe_queries` — timings of a fixed set of cheap statements
//!
//! ## Session lifecycle
//!
//! Construction never touches the network. The session is opened by
//! [`Monitor::connect`] or lazily by the first query. A transport failure
//! marks it broken: every later call fails fast with
//! [`MonitorError::Connection`] until `connect` succeeds again. Retry policy
//! belongs to the caller. Server-side query errors leave the session usable.
//!
//! The monitor is not meant to be shared; every operation takes `&mut self`.

mod probe;
pub(crate) mod queries;
mod rows;
pub mod session;
mod snapshots;

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::model::{Category, RowSet, Snapshot, SnapshotRecord};

pub use probe::ProbeResult;
pub use session::{
    Connector, PgConnector, PgSession, RawRow, RawValue, Session, SessionError, SessionErrorKind,
};

/// Error type for monitor operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    /// Environment variable not set.
    EnvNotSet(String),
    /// Connection string or TLS setup rejected before connecting.
    Config(String),
    /// Transport or authentication failure; reconnect required.
    Connection(String),
    /// The statement failed on a live session, or its result could not be mapped.
    Query(String),
    /// Unknown category, or a category used with the wrong operation.
    UnsupportedCategory(String),
}

impl MonitorError {
    pub fn is_connection(&self) -> bool {
        matches!(self, MonitorError::Connection(_))
    }

    pub fn is_query(&self) -> bool {
        matches!(self, MonitorError::Query(_))
    }
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::EnvNotSet(var) => write!(f, "PostgreSQL: {} not set", var),
            MonitorError::Config(msg) => write!(f, "PostgreSQL: invalid configuration: {}", msg),
            MonitorError::Connection(msg) => write!(f, "PostgreSQL: {}", msg),
            MonitorError::Query(msg) => write!(f, "PostgreSQL query error: {}", msg),
            MonitorError::UnsupportedCategory(name) => write!(f, "unsupported category: {}", name),
        }
    }
}

impl std::error::Error for MonitorError {}

/// State of the single session.
enum Link<S> {
    /// Not opened yet, or closed on purpose. Opened on next use.
    Idle,
    Ready(S),
    /// Lost to a transport failure. Only `connect` leaves this state.
    Broken(String),
}

/// PostgreSQL dashboard monitor over one session.
pub struct Monitor<C: Connector = PgConnector> {
    connector: C,
    link: Link<C::Session>,
    last_error: Option<String>,
}

impl Monitor<PgConnector> {
    /// Creates a monitor for the configured target. Does not connect.
    pub fn from_config(config: &MonitorConfig) -> Result<Self, MonitorError> {
        Ok(Self::new(config.connector()?))
    }

    /// Creates a monitor from `DATABASE_URL`. Does not connect.
    pub fn from_env() -> Result<Self, MonitorError> {
        Self::from_config(&MonitorConfig::from_env()?)
    }
}

impl<C: Connector> Monitor<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            link: Link::Idle,
            last_error: None,
        }
    }

    /// Opens a fresh session, dropping any existing one.
    ///
    /// This is the only way out of the broken state after a transport failure.
    pub fn connect(&mut self) -> Result<(), MonitorError> {
        self.link = Link::Idle;
        match self.connector.connect() {
            Ok(session) => {
                info!(target_db = %self.connector.describe(), "connected to PostgreSQL");
                self.link = Link::Ready(session);
                self.last_error = None;
                Ok(())
            }
            Err(e) => {
                warn!(target_db = %self.connector.describe(), error = %e, "connection failed");
                self.last_error = Some(e.message.clone());
                self.link = Link::Broken(e.message.clone());
                Err(MonitorError::Connection(e.message))
            }
        }
    }

    /// Drops the session. The next call opens a new one.
    pub fn close(&mut self) {
        if matches!(self.link, Link::Ready(_)) {
            debug!(target_db = %self.connector.describe(), "closing session");
        }
        self.link = Link::Idle;
    }

    /// True while a session is open and not known to be closed.
    pub fn is_connected(&self) -> bool {
        match &self.link {
            Link::Ready(session) => !session.is_closed(),
            Link::Idle | Link::Broken(_) => false,
        }
    }

    /// Returns the last error message, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Printable target (`host:port/dbname`), without credentials.
    pub fn target(&self) -> String {
        self.connector.describe()
    }

    /// Round-trip time of `SELECT 1`.
    ///
    /// Opening the session (when needed) happens before the clock starts.
    pub fn ping(&mut self) -> Result<Duration, MonitorError> {
        self.ensure_connected()?;
        let started = Instant::now();
        self.run(queries::PING)?;
        Ok(started.elapsed())
    }

    /// Snapshot for a snapshot category.
    pub fn get_snapshot(&mut self, category: Category) -> Result<Snapshot, MonitorError> {
        match category {
            Category::Connections => Ok(self.connection_counts()?.to_snapshot()),
            Category::DatabaseSize => Ok(self.database_size()?.to_snapshot()),
            Category::CacheHitRatio => Ok(self.cache_hit_ratio()?.to_snapshot()),
            Category::ActiveQueries => Ok(self.active_queries()?.to_snapshot()),
            Category::ServerInfo => Ok(self.server_info()?.to_snapshot()),
            Category::Transactions => Ok(self.transaction_stats()?.to_snapshot()),
            Category::IndexUsage
            | Category::UnusedIndexes
            | Category::TableSizes
            | Category::Sessions => Err(MonitorError::UnsupportedCategory(format!(
                "{} is tabular, use get_rows",
                category
            ))),
        }
    }

    /// Snapshot for a category given by name.
    pub fn get_snapshot_by_name(&mut self, name: &str) -> Result<Snapshot, MonitorError> {
        self.get_snapshot(name.parse()?)
    }

    /// Row set for a tabular category.
    pub fn get_rows(&mut self, category: Category) -> Result<RowSet, MonitorError> {
        match category {
            Category::IndexUsage => Ok(RowSet::IndexUsage(self.index_usage()?)),
            Category::UnusedIndexes => Ok(RowSet::UnusedIndexes(self.unused_indexes()?)),
            Category::TableSizes => Ok(RowSet::TableSizes(self.table_sizes()?)),
            Category::Sessions => Ok(RowSet::Sessions(self.sessions()?)),
            Category::Connections
            | Category::DatabaseSize
            | Category::CacheHitRatio
            | Category::ActiveQueries
            | Category::ServerInfo
            | Category::Transactions => Err(MonitorError::UnsupportedCategory(format!(
                "{} is a snapshot, use get_snapshot",
                category
            ))),
        }
    }

    /// Row set for a category given by name.
    pub fn get_rows_by_name(&mut self, name: &str) -> Result<RowSet, MonitorError> {
        self.get_rows(name.parse()?)
    }

    /// Makes sure a usable session exists, opening one from the idle state.
    fn ensure_connected(&mut self) -> Result<(), MonitorError> {
        match &self.link {
            Link::Ready(_) => Ok(()),
            Link::Idle => self.connect(),
            Link::Broken(msg) => Err(MonitorError::Connection(format!(
                "connection lost ({}), reconnect required",
                msg
            ))),
        }
    }

    /// Runs one statement on the session.
    fn run(&mut self, sql: &str) -> Result<Vec<RawRow>, MonitorError> {
        self.ensure_connected()?;
        let result = match &mut self.link {
            Link::Ready(session) => session.query(sql),
            Link::Idle | Link::Broken(_) => {
                return Err(MonitorError::Connection("not connected".to_string()));
            }
        };
        match result {
            Ok(rows) => {
                self.last_error = None;
                Ok(rows)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Runs a statement expected to return exactly one row.
    fn run_one(&mut self, category: Category, sql: &str) -> Result<RawRow, MonitorError> {
        let rows = self.run(sql)?;
        match rows.into_iter().next() {
            Some(row) => Ok(row),
            None => Err(self.fail(SessionError::decode(format!(
                "{}: query returned no rows",
                category
            )))),
        }
    }

    /// Records a session failure and maps it onto the public taxonomy.
    fn fail(&mut self, e: SessionError) -> MonitorError {
        self.last_error = Some(e.message.clone());
        match e.kind {
            SessionErrorKind::Transport => {
                warn!(error = %e.message, "PostgreSQL connection lost");
                self.link = Link::Broken(e.message.clone());
                MonitorError::Connection(e.message)
            }
            SessionErrorKind::Server | SessionErrorKind::Decode => {
                warn!(error = %e.message, "PostgreSQL query failed");
                MonitorError::Query(e.message)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;

    #[test]
    fn construction_does_not_connect() {
        let mock = MockConnector::unreachable();
        let monitor = Monitor::new(mock.clone());
        assert!(!monitor.is_connected());
        assert_eq!(mock.connect_count(), 0);
    }

    #[test]
    fn ping_connects_lazily_and_measures() {
        let mock = MockConnector::typical_server();
        let mut monitor = Monitor::new(mock.clone());

        let latency = monitor.ping().expect("ping succeeds");
        assert!(latency < Duration::from_secs(5));
        assert!(monitor.is_connected());
        assert_eq!(mock.connect_count(), 1);
        assert_eq!(mock.queries(), vec![queries::PING.to_string()]);

        monitor.ping().expect("second ping reuses session");
        assert_eq!(mock.connect_count(), 1);
    }

    #[test]
    fn ping_unreachable_returns_connection_error() {
        let mock = MockConnector::unreachable();
        let mut monitor = Monitor::new(mock.clone());

        let err = monitor.ping().expect_err("target is down");
        assert!(err.is_connection(), "{:?}", err);
        assert!(monitor.last_error().is_some());

        // Broken until an explicit connect.
        assert!(monitor.ping().expect_err("still broken").is_connection());
        assert_eq!(mock.connect_count(), 1);

        mock.set_reachable(true);
        mock.respond(queries::PING, vec![RawRow::new().with("?column?", 1)]);
        monitor.connect().expect("retry succeeds");
        assert_eq!(mock.connect_count(), 2);
        monitor.ping().expect("ping after reconnect");
        assert_eq!(monitor.last_error(), None);
    }

    #[test]
    fn transport_failure_mid_session_fails_fast() {
        let mock = MockConnector::typical_server();
        let mut monitor = Monitor::new(mock.clone());
        monitor.connect().expect("connects");

        mock.drop_connections();
        let err = monitor
            .get_snapshot(Category::Connections)
            .expect_err("server went away");
        assert!(err.is_connection());
        assert!(!monitor.is_connected());

        let before = mock.queries().len();
        let err = monitor
            .get_snapshot(Category::DatabaseSize)
            .expect_err("fails fast");
        assert!(err.is_connection());
        assert_eq!(mock.queries().len(), before, "no query sent while broken");

        monitor.connect().expect("reconnects");
        monitor
            .get_snapshot(Category::DatabaseSize)
            .expect("works after reconnect");
    }

    #[test]
    fn query_error_keeps_session_usable() {
        let mock = MockConnector::typical_server();
        mock.fail(
            queries::TRANSACTION_STATS,
            SessionError::server("ERROR: permission denied for view pg_stat_database"),
        );
        let mut monitor = Monitor::new(mock.clone());

        let err = monitor
            .get_snapshot(Category::Transactions)
            .expect_err("privilege error");
        assert_eq!(
            err,
            MonitorError::Query(
                "ERROR: permission denied for view pg_stat_database".to_string()
            )
        );
        assert!(monitor.is_connected());

        monitor
            .get_snapshot(Category::Connections)
            .expect("same session still works");
        assert_eq!(mock.connect_count(), 1);
    }

    #[test]
    fn empty_result_is_query_error() {
        let mock = MockConnector::typical_server();
        mock.respond(queries::CACHE_HIT_RATIO, Vec::new());
        let mut monitor = Monitor::new(mock);

        let err = monitor
            .get_snapshot(Category::CacheHitRatio)
            .expect_err("no row for current database");
        assert!(err.is_query());
        assert!(monitor.is_connected());
    }

    #[test]
    fn unsupported_categories_are_distinguishable() {
        let mut monitor = Monitor::new(MockConnector::typical_server());

        let err = monitor
            .get_snapshot_by_name("replication_lag")
            .expect_err("unknown name");
        assert_eq!(
            err,
            MonitorError::UnsupportedCategory("replication_lag".to_string())
        );

        let err = monitor
            .get_snapshot(Category::IndexUsage)
            .expect_err("tabular category");
        assert!(matches!(err, MonitorError::UnsupportedCategory(_)));

        let err = monitor
            .get_rows(Category::Connections)
            .expect_err("snapshot category");
        assert!(matches!(err, MonitorError::UnsupportedCategory(_)));
    }

    #[test]
    fn every_category_answers_against_typical_server() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        for category in Category::snapshot_categories() {
            let snap = monitor.get_snapshot(category).expect("snapshot");
            assert_eq!(snap.category(), category);
            assert!(!snap.is_empty());
        }
        for category in Category::tabular_categories() {
            let rows = monitor.get_rows(category).expect("rows");
            assert_eq!(rows.category(), category);
        }
    }

    #[test]
    fn one_round_trip_per_call() {
        let mock = MockConnector::typical_server();
        let mut monitor = Monitor::new(mock.clone());
        monitor.get_snapshot(Category::ServerInfo).expect("snapshot");
        monitor.get_rows(Category::TableSizes).expect("rows");
        assert_eq!(
            mock.queries(),
            vec![
                queries::SERVER_INFO.to_string(),
                queries::TABLE_SIZES.to_string()
            ]
        );
    }

    #[test]
    fn row_keys_stable_across_calls() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let first = monitor.get_rows_by_name("index_usage").expect("rows");
        let second = monitor.get_rows_by_name("index_usage").expect("rows");
        assert_eq!(first.columns(), second.columns());
        assert_eq!(first, second);
        for row in first.rows() {
            assert_eq!(row.len(), first.columns().len());
        }
    }

    #[test]
    fn close_reopens_lazily() {
        let mock = MockConnector::typical_server();
        let mut monitor = Monitor::new(mock.clone());
        monitor.ping().expect("ping");
        monitor.close();
        assert!(!monitor.is_connected());
        monitor.ping().expect("ping after close");
        assert_eq!(mock.connect_count(), 2);
    }

    #[test]
    fn error_display() {
        assert_eq!(
            MonitorError::EnvNotSet("DATABASE_URL".to_string()).to_string(),
            "PostgreSQL: DATABASE_URL not set"
        );
        assert_eq!(
            MonitorError::Query("ERROR: boom".to_string()).to_string(),
            "PostgreSQL query error: ERROR: boom"
        );
    }
}
