//! Tabular categories and the row -> record mapping they share.

use crate::model::{IndexUsage, SessionInfo, TableSize};

use super::queries;
use super::session::{Connector, RawRow, SessionError};
use super::{Monitor, MonitorError};

/// Maps one untyped row into a typed record.
pub(crate) trait FromRow: Sized {
    fn from_row(row: &RawRow) -> Result<Self, SessionError>;
}

impl<C: Connector> Monitor<C> {
    /// Top 20 user indexes by scan count.
    pub fn index_usage(&mut self) -> Result<Vec<IndexUsage>, MonitorError> {
        self.fetch_all(queries::INDEX_USAGE)
    }

    /// Never-scanned, non-unique user indexes, largest first.
    pub fn unused_indexes(&mut self) -> Result<Vec<IndexUsage>, MonitorError> {
        self.fetch_all(queries::UNUSED_INDEXES)
    }

    /// Top 20 user tables by total size.
    pub fn table_sizes(&mut self) -> Result<Vec<TableSize>, MonitorError> {
        self.fetch_all(queries::TABLE_SIZES)
    }

    /// Sessions with a known state, newest first.
    pub fn sessions(&mut self) -> Result<Vec<SessionInfo>, MonitorError> {
        self.fetch_all(queries::SESSIONS)
    }

    fn fetch_all<T: FromRow>(&mut self, sql: &str) -> Result<Vec<T>, MonitorError> {
        let rows = self.run(sql)?;
        rows.iter()
            .map(T::from_row)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| self.fail(e))
    }
}

impl FromRow for IndexUsage {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            schema_name: row.text("schema_name")?,
            table_name: row.text("table_name")?,
            index_name: row.text("index_name")?,
            index_scans: row.int("index_scans")?,
            tuples_read: row.int("tuples_read")?,
            tuples_fetched: row.int("tuples_fetched")?,
            size_bytes: row.int("size_bytes")?,
        })
    }
}

impl FromRow for TableSize {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            schema_name: row.text("schema_name")?,
            table_name: row.text("table_name")?,
            total_bytes: row.int("total_bytes")?,
            table_bytes: row.int("table_bytes")?,
            index_bytes: row.int("index_bytes")?,
            live_tuples: row.int("live_tuples")?,
        })
    }
}

impl FromRow for SessionInfo {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            pid: row.int("pid")?,
            user: row.text("usename")?,
            application_name: row.text("application_name")?,
            client_addr: row.opt_text("client_addr")?,
            client_port: row.opt_int("client_port")?,
            backend_start: row.opt_timestamp("backend_start")?,
            query_start: row.opt_timestamp("query_start")?,
            state_change: row.opt_timestamp("state_change")?,
            state: row.text("state")?,
            query: row.text("query")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use crate::model::{Category, Record, RowSet};

    #[test]
    fn index_usage_in_query_order() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let rows = monitor.index_usage().expect("rows");
        let names: Vec<&str> = rows.iter().map(|r| r.index_name.as_str()).collect();
        assert_eq!(names, ["orders_pkey", "orders_customer_idx", "orders_legacy_idx"]);
    }

    #[test]
    fn unused_indexes_only_unscanned() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let rows = monitor.unused_indexes().expect("rows");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].index_scans, 0);
    }

    #[test]
    fn local_socket_session_has_no_address() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let sessions = monitor.sessions().expect("sessions");
        let local = sessions
            .iter()
            .find(|s| s.application_name == "psql")
            .expect("psql session");
        assert_eq!(local.client_addr, None);
        assert_eq!(local.client_port, None);
        assert!(local.backend_start.is_some());
    }

    #[test]
    fn server_error_keeps_session_for_next_call() {
        let mock = MockConnector::typical_server();
        mock.fail(
            queries::SESSIONS,
            SessionError::server("ERROR: permission denied for view pg_stat_activity"),
        );
        let mut monitor = Monitor::new(mock.clone());

        let err = monitor.get_rows(Category::Sessions).expect_err("privilege error");
        assert!(err.is_query());
        assert!(monitor.is_connected());

        let rows = monitor.get_rows(Category::TableSizes).expect("same session");
        assert_eq!(rows.len(), 2);
        assert_eq!(mock.connect_count(), 1);
    }

    #[test]
    fn sessions_report_bare_client_address() {
        assert!(queries::SESSIONS.contains("host(client_addr) AS client_addr"));
        assert!(!queries::SESSIONS.contains("client_addr::text"));
    }

    #[test]
    fn bad_row_fails_whole_set() {
        let mock = MockConnector::typical_server();
        mock.respond(
            queries::TABLE_SIZES,
            vec![RawRow::new().with("schema_name", "public")],
        );
        let mut monitor = Monitor::new(mock);
        let err = monitor.get_rows(Category::TableSizes).expect_err("partial row");
        assert!(err.is_query());
    }

    #[test]
    fn row_set_values_follow_columns() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let set = monitor.get_rows(Category::Sessions).expect("rows");
        let RowSet::Sessions(records) = &set else {
            panic!("expected sessions, got {:?}", set.category());
        };
        for record in records {
            let keys: Vec<&str> = record.to_map().into_iter().map(|(k, _)| k).collect();
            assert_eq!(keys, SessionInfo::COLUMNS);
        }
    }
}
