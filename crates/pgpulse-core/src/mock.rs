//! Scripted in-memory connector.
//!
//! Drives a [`Monitor`](crate::monitor::Monitor) without a server: responses
//! are keyed by exact SQL text, connection attempts and executed statements
//! are recorded for inspection. Clones share state, so a test can keep a
//! handle while the monitor owns another.
//!
//! ```
//! use pgpulse_core::mock::MockConnector;
//! use pgpulse_core::{Category, Monitor};
//!
//! let mut monitor = Monitor::new(MockConnector::typical_server());
//! let snapshot = monitor.get_snapshot(Category::Connections).unwrap();
//! assert!(!snapshot.is_empty());
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::monitor::queries;
use crate::monitor::session::{Connector, RawRow, Session, SessionError};

#[derive(Default)]
struct MockState {
    reachable: bool,
    responses: HashMap<String, Result<Vec<RawRow>, SessionError>>,
    /// Bumped by `drop_connections`; sessions from older generations are dead.
    generation: u64,
    connects: usize,
    executed: Vec<String>,
}

/// In-memory [`Connector`] with scripted responses.
#[derive(Clone, Default)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Reachable server with no scripted responses.
    pub fn new() -> Self {
        let mock = Self::default();
        mock.set_reachable(true);
        mock
    }

    /// Every connection attempt is refused.
    pub fn unreachable() -> Self {
        Self::default()
    }

    /// Reachable server answering every monitor query with plausible data.
    pub fn typical_server() -> Self {
        let mock = Self::new();
        script_typical_server(&mock);
        mock
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.lock().reachable = reachable;
    }

    /// Answers `sql` with `rows` from now on.
    pub fn respond(&self, sql: &str, rows: Vec<RawRow>) -> &Self {
        self.lock().responses.insert(sql.to_string(), Ok(rows));
        self
    }

    /// Fails `sql` with `error` from now on.
    pub fn fail(&self, sql: &str, error: SessionError) -> &Self {
        self.lock().responses.insert(sql.to_string(), Err(error));
        self
    }

    /// Kills every open session, as a server restart would.
    pub fn drop_connections(&self) {
        self.lock().generation += 1;
    }

    /// Number of connection attempts, successful or not.
    pub fn connect_count(&self) -> usize {
        self.lock().connects
    }

    /// Statements executed on live sessions, in order.
    pub fn queries(&self) -> Vec<String> {
        self.lock().executed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Connector for MockConnector {
    type Session = MockSession;

    fn connect(&self) -> Result<MockSession, SessionError> {
        let mut state = self.lock();
        state.connects += 1;
        if !state.reachable {
            return Err(SessionError::transport("connection refused"));
        }
        Ok(MockSession {
            state: Arc::clone(&self.state),
            generation: state.generation,
        })
    }

    fn describe(&self) -> String {
        "mock:5432/app".to_string()
    }
}

/// Session handed out by [`MockConnector`].
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
    generation: u64,
}

impl Session for MockSession {
    fn query(&mut self, sql: &str) -> Result<Vec<RawRow>, SessionError> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if state.generation != self.generation {
            return Err(SessionError::transport(
                "server closed the connection unexpectedly",
            ));
        }
        state.executed.push(sql.to_string());
        match state.responses.get(sql) {
            Some(response) => response.clone(),
            None => Err(SessionError::server(
                "ERROR: mock has no response scripted for this statement",
            )),
        }
    }

    fn is_closed(&self) -> bool {
        let state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        state.generation != self.generation
    }
}

fn script_typical_server(mock: &MockConnector) {
    mock.respond(queries::PING, vec![RawRow::new().with("?column?", 1)]);

    mock.respond(
        queries::CONNECTION_COUNTS,
        vec![
            RawRow::new()
                .with("total", 12i64)
                .with("active", 3i64)
                .with("idle", 7i64)
                .with("idle_in_transaction", 1i64)
                .with("waiting_on_locks", 1i64)
                .with("max_connections", 100i64),
        ],
    );

    mock.respond(
        queries::DATABASE_SIZE,
        vec![
            RawRow::new()
                .with("database", "app")
                .with("size_bytes", 512i64 * 1024 * 1024),
        ],
    );

    mock.respond(
        queries::CACHE_HIT_RATIO,
        vec![
            RawRow::new()
                .with("blks_hit", 9_900i64)
                .with("blks_read", 100i64),
        ],
    );

    mock.respond(
        queries::ACTIVE_QUERIES,
        vec![
            RawRow::new()
                .with("active", 3i64)
                .with("waiting_on_locks", 1i64)
                .with("longest_query_secs", 4.5)
                .with("oldest_transaction_secs", 120.0),
        ],
    );

    mock.respond(
        queries::SERVER_INFO,
        vec![
            RawRow::new()
                .with(
                    "version",
                    "PostgreSQL 16.2 on x86_64-pc-linux-gnu, compiled by gcc 12.2.0, 64-bit",
                )
                .with("version_num", 160_002i64)
                .with("started_at", 1_700_000_000.0)
                .with("server_time", 1_700_172_800.0)
                .with("timezone", "UTC")
                .with("uptime_secs", 172_800.0)
                .with("max_connections", 100i64),
        ],
    );

    mock.respond(
        queries::TRANSACTION_STATS,
        vec![
            RawRow::new()
                .with("xact_commit", 98_000i64)
                .with("xact_rollback", 2_000i64)
                .with("blks_read", 100i64)
                .with("blks_hit", 9_900i64)
                .with("tup_returned", 1_500_000i64)
                .with("tup_fetched", 420_000i64)
                .with("tup_inserted", 12_000i64)
                .with("tup_updated", 3_400i64)
                .with("tup_deleted", 150i64)
                .with("temp_files", 4i64)
                .with("temp_bytes", 64i64 * 1024 * 1024)
                .with("deadlocks", 0i64)
                .with("locks", 17i64),
        ],
    );

    let orders_pkey = index_row("orders_pkey", 5_000, 8 * 1024 * 1024);
    let orders_customer = index_row("orders_customer_idx", 1_200, 4 * 1024 * 1024);
    let orders_legacy = index_row("orders_legacy_idx", 0, 16 * 1024 * 1024);
    mock.respond(
        queries::INDEX_USAGE,
        vec![orders_pkey, orders_customer, orders_legacy.clone()],
    );
    mock.respond(queries::UNUSED_INDEXES, vec![orders_legacy]);

    mock.respond(
        queries::TABLE_SIZES,
        vec![
            RawRow::new()
                .with("schema_name", "public")
                .with("table_name", "orders")
                .with("total_bytes", 96i64 * 1024 * 1024)
                .with("table_bytes", 64i64 * 1024 * 1024)
                .with("index_bytes", 28i64 * 1024 * 1024)
                .with("live_tuples", 250_000i64),
            RawRow::new()
                .with("schema_name", "public")
                .with("table_name", "customers")
                .with("total_bytes", 8i64 * 1024 * 1024)
                .with("table_bytes", 6i64 * 1024 * 1024)
                .with("index_bytes", 2i64 * 1024 * 1024)
                .with("live_tuples", 12_000i64),
        ],
    );

    mock.respond(
        queries::SESSIONS,
        vec![
            RawRow::new()
                .with("pid", 4242i64)
                .with("usename", "app")
                .with("application_name", "api")
                .with("client_addr", "10.0.0.5")
                .with("client_port", 52_344i64)
                .with("backend_start", 1_700_170_000.0)
                .with("query_start", 1_700_172_795.5)
                .with("state_change", 1_700_172_795.5)
                .with("state", "active")
                .with("query", "SELECT * FROM orders WHERE customer_id = $1"),
            RawRow::new()
                .with("pid", 4100i64)
                .with("usename", "postgres")
                .with("application_name", "psql")
                .with("client_addr", None::<String>)
                .with("client_port", None::<i64>)
                .with("backend_start", 1_700_100_000.0)
                .with("query_start", None::<f64>)
                .with("state_change", 1_700_100_010.0)
                .with("state", "idle")
                .with("query", ""),
        ],
    );

    mock.respond(
        queries::PROBES[1].1,
        vec![RawRow::new().with("now", "2023-11-16 22:13:20.000+00")],
    );
    mock.respond(
        queries::PROBES[2].1,
        vec![RawRow::new().with("pg_database_size", 512i64 * 1024 * 1024)],
    );
    mock.respond(
        queries::PROBES[3].1,
        vec![RawRow::new().with("count", 14i64)],
    );
    mock.respond(
        queries::PROBES[4].1,
        vec![RawRow::new().with("count", 9i64)],
    );
}

fn index_row(name: &str, scans: i64, size_bytes: i64) -> RawRow {
    RawRow::new()
        .with("schema_name", "public")
        .with("table_name", "orders")
        .with("index_name", name)
        .with("index_scans", scans)
        .with("tuples_read", scans * 3)
        .with("tuples_fetched", scans * 2)
        .with("size_bytes", size_bytes)
}
