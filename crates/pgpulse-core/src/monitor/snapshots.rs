//! Snapshot categories: one row per query, mapped into a typed record.

use crate::model::{
    ActiveQueries, CacheHitRatio, Category, ConnectionCounts, DatabaseSize, ServerInfo,
    TransactionStats,
};

use super::queries;
use super::rows::FromRow;
use super::session::{Connector, RawRow, SessionError};
use super::{Monitor, MonitorError};

impl<C: Connector> Monitor<C> {
    /// Client backend counts by state, plus `max_connections`.
    pub fn connection_counts(&mut self) -> Result<ConnectionCounts, MonitorError> {
        self.fetch_one(Category::Connections, queries::CONNECTION_COUNTS)
    }

    pub fn database_size(&mut self) -> Result<DatabaseSize, MonitorError> {
        self.fetch_one(Category::DatabaseSize, queries::DATABASE_SIZE)
    }

    pub fn cache_hit_ratio(&mut self) -> Result<CacheHitRatio, MonitorError> {
        self.fetch_one(Category::CacheHitRatio, queries::CACHE_HIT_RATIO)
    }

    /// Active and lock-waiting queries, excluding this monitor's own backend.
    pub fn active_queries(&mut self) -> Result<ActiveQueries, MonitorError> {
        self.fetch_one(Category::ActiveQueries, queries::ACTIVE_QUERIES)
    }

    pub fn server_info(&mut self) -> Result<ServerInfo, MonitorError> {
        self.fetch_one(Category::ServerInfo, queries::SERVER_INFO)
    }

    pub fn transaction_stats(&mut self) -> Result<TransactionStats, MonitorError> {
        self.fetch_one(Category::Transactions, queries::TRANSACTION_STATS)
    }

    fn fetch_one<T: FromRow>(&mut self, category: Category, sql: &str) -> Result<T, MonitorError> {
        let row = self.run_one(category, sql)?;
        T::from_row(&row).map_err(|e| self.fail(e))
    }
}

impl FromRow for ConnectionCounts {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            total: row.int("total")?,
            active: row.int("active")?,
            idle: row.int("idle")?,
            idle_in_transaction: row.int("idle_in_transaction")?,
            waiting_on_locks: row.int("waiting_on_locks")?,
            max_connections: row.int("max_connections")?,
        })
    }
}

impl FromRow for DatabaseSize {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            database: row.text("database")?,
            size_bytes: row.int("size_bytes")?,
        })
    }
}

impl FromRow for CacheHitRatio {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            blks_hit: row.int("blks_hit")?,
            blks_read: row.int("blks_read")?,
        })
    }
}

impl FromRow for ActiveQueries {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            active: row.int("active")?,
            waiting_on_locks: row.int("waiting_on_locks")?,
            longest_query_secs: row.float("longest_query_secs")?,
            oldest_transaction_secs: row.float("oldest_transaction_secs")?,
        })
    }
}

impl FromRow for ServerInfo {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            version: row.text("version")?,
            version_num: row.int("version_num")?,
            started_at: row.opt_timestamp("started_at")?,
            server_time: row.opt_timestamp("server_time")?,
            timezone: row.text("timezone")?,
            uptime_secs: row.opt_float("uptime_secs")?.unwrap_or(0.0),
            max_connections: row.int("max_connections")?,
        })
    }
}

impl FromRow for TransactionStats {
    fn from_row(row: &RawRow) -> Result<Self, SessionError> {
        Ok(Self {
            xact_commit: row.int("xact_commit")?,
            xact_rollback: row.int("xact_rollback")?,
            blks_read: row.int("blks_read")?,
            blks_hit: row.int("blks_hit")?,
            tup_returned: row.int("tup_returned")?,
            tup_fetched: row.int("tup_fetched")?,
            tup_inserted: row.int("tup_inserted")?,
            tup_updated: row.int("tup_updated")?,
            tup_deleted: row.int("tup_deleted")?,
            temp_files: row.int("temp_files")?,
            temp_bytes: row.int("temp_bytes")?,
            deadlocks: row.int("deadlocks")?,
            locks: row.int("locks")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use crate::model::MetricValue;

    #[test]
    fn connection_counts_mapped() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let counts = monitor.connection_counts().expect("counts");
        assert_eq!(counts.total, 12);
        assert_eq!(counts.active, 3);
        assert_eq!(counts.max_connections, 100);
        assert_eq!(counts.usage_pct(), Some(12.0));
    }

    #[test]
    fn server_info_timestamps() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let info = monitor.server_info().expect("server info");
        assert!(info.version.starts_with("PostgreSQL 16"));
        assert_eq!(info.started_at.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(info.uptime_secs, 86_400.0 * 2.0);

        let snap = monitor.get_snapshot(Category::ServerInfo).expect("snapshot");
        assert_eq!(
            snap.get("uptime"),
            Some(&MetricValue::Duration(172_800.0))
        );
    }

    #[test]
    fn wrong_column_type_is_query_error() {
        let mock = MockConnector::typical_server();
        mock.respond(
            queries::DATABASE_SIZE,
            vec![
                RawRow::new()
                    .with("database", "app")
                    .with("size_bytes", "huge"),
            ],
        );
        let mut monitor = Monitor::new(mock);
        let err = monitor.database_size().expect_err("text where bigint expected");
        assert_eq!(
            err,
            MonitorError::Query("column 'size_bytes': expected integer, found text".to_string())
        );
        assert!(monitor.is_connected());
    }

    #[test]
    fn cache_hit_ratio_from_counters() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let ratio = monitor.cache_hit_ratio().expect("ratio");
        assert_eq!(ratio.ratio_pct(), Some(99.0));
    }
}
