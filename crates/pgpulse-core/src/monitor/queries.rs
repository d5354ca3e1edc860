//! SQL text for each category.
//!
//! Every statement is a single round trip. Columns are cast to `bigint`,
//! `double precision` or `text` and timestamps are sent as epoch seconds, so
//! the session layer only ever decodes plain scalars.

pub(crate) const PING: &str = "SELECT 1";

pub(crate) const CONNECTION_COUNTS: &str = r#"
    SELECT
        count(*)::bigint AS total,
        count(*) FILTER (WHERE state = 'active')::bigint AS active,
        count(*) FILTER (WHERE state = 'idle')::bigint AS idle,
        count(*) FILTER (WHERE state LIKE 'idle in transaction%')::bigint AS idle_in_transaction,
        count(*) FILTER (WHERE wait_event_type = 'Lock')::bigint AS waiting_on_locks,
        current_setting('max_connections')::bigint AS max_connections
    FROM pg_stat_activity
    WHERE backend_type = 'client backend'
"#;

pub(crate) const DATABASE_SIZE: &str = r#"
    SELECT
        current_database()::text AS database,
        pg_database_size(current_database())::bigint AS size_bytes
"#;

pub(crate) const CACHE_HIT_RATIO: &str = r#"
    SELECT
        COALESCE(blks_hit, 0)::bigint AS blks_hit,
        COALESCE(blks_read, 0)::bigint AS blks_read
    FROM pg_stat_database
    WHERE datname = current_database()
"#;

pub(crate) const ACTIVE_QUERIES: &str = r#"
    SELECT
        count(*) FILTER (WHERE state = 'active')::bigint AS active,
        count(*) FILTER (WHERE state = 'active' AND wait_event_type = 'Lock')::bigint AS waiting_on_locks,
        COALESCE(max(EXTRACT(EPOCH FROM (now() - query_start))) FILTER (WHERE state = 'active'), 0)::double precision AS longest_query_secs,
        COALESCE(max(EXTRACT(EPOCH FROM (now() - xact_start))), 0)::double precision AS oldest_transaction_secs
    FROM pg_stat_activity
    WHERE backend_type = 'client backend'
      AND pid <> pg_backend_pid()
"#;

pub(crate) const SERVER_INFO: &str = r#"
    SELECT
        version()::text AS version,
        current_setting('server_version_num')::bigint AS version_num,
        EXTRACT(EPOCH FROM pg_postmaster_start_time())::double precision AS started_at,
        EXTRACT(EPOCH FROM now())::double precision AS server_time,
        current_setting('TimeZone')::text AS timezone,
        EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time()))::double precision AS uptime_secs,
        current_setting('max_connections')::bigint AS max_connections
"#;

pub(crate) const TRANSACTION_STATS: &str = r#"
    SELECT
        COALESCE(xact_commit, 0)::bigint AS xact_commit,
        COALESCE(xact_rollback, 0)::bigint AS xact_rollback,
        COALESCE(blks_read, 0)::bigint AS blks_read,
        COALESCE(blks_hit, 0)::bigint AS blks_hit,
        COALESCE(tup_returned, 0)::bigint AS tup_returned,
        COALESCE(tup_fetched, 0)::bigint AS tup_fetched,
        COALESCE(tup_inserted, 0)::bigint AS tup_inserted,
        COALESCE(tup_updated, 0)::bigint AS tup_updated,
        COALESCE(tup_deleted, 0)::bigint AS tup_deleted,
        COALESCE(temp_files, 0)::bigint AS temp_files,
        COALESCE(temp_bytes, 0)::bigint AS temp_bytes,
        COALESCE(deadlocks, 0)::bigint AS deadlocks,
        (SELECT count(*) FROM pg_locks)::bigint AS locks
    FROM pg_stat_database
    WHERE datname = current_database()
"#;

pub(crate) const INDEX_USAGE: &str = r#"
    SELECT
        schemaname::text AS schema_name,
        relname::text AS table_name,
        indexrelname::text AS index_name,
        COALESCE(idx_scan, 0)::bigint AS index_scans,
        COALESCE(idx_tup_read, 0)::bigint AS tuples_read,
        COALESCE(idx_tup_fetch, 0)::bigint AS tuples_fetched,
        pg_relation_size(indexrelid)::bigint AS size_bytes
    FROM pg_stat_user_indexes
    ORDER BY idx_scan DESC NULLS LAST, indexrelname
    LIMIT 20
"#;

/// Never-scanned indexes that do not back a unique or primary key constraint.
pub(crate) const UNUSED_INDEXES: &str = r#"
    SELECT
        s.schemaname::text AS schema_name,
        s.relname::text AS table_name,
        s.indexrelname::text AS index_name,
        COALESCE(s.idx_scan, 0)::bigint AS index_scans,
        COALESCE(s.idx_tup_read, 0)::bigint AS tuples_read,
        COALESCE(s.idx_tup_fetch, 0)::bigint AS tuples_fetched,
        pg_relation_size(s.indexrelid)::bigint AS size_bytes
    FROM pg_stat_user_indexes s
    JOIN pg_index i ON i.indexrelid = s.indexrelid
    WHERE COALESCE(s.idx_scan, 0) = 0
      AND NOT i.indisunique
    ORDER BY pg_relation_size(s.indexrelid) DESC, s.indexrelname
    LIMIT 20
"#;

pub(crate) const TABLE_SIZES: &str = r#"
    SELECT
        schemaname::text AS schema_name,
        relname::text AS table_name,
        pg_total_relation_size(relid)::bigint AS total_bytes,
        pg_relation_size(relid)::bigint AS table_bytes,
        pg_indexes_size(relid)::bigint AS index_bytes,
        COALESCE(n_live_tup, 0)::bigint AS live_tuples
    FROM pg_stat_user_tables
    ORDER BY pg_total_relation_size(relid) DESC, relname
    LIMIT 20
"#;

pub(crate) const SESSIONS: &str = r#"
    SELECT
        pid::bigint AS pid,
        COALESCE(usename, '')::text AS usename,
        COALESCE(application_name, '')::text AS application_name,
        host(client_addr) AS client_addr,
        client_port::bigint AS client_port,
        EXTRACT(EPOCH FROM backend_start)::double precision AS backend_start,
        EXTRACT(EPOCH FROM query_start)::double precision AS query_start,
        EXTRACT(EPOCH FROM state_change)::double precision AS state_change,
        COALESCE(state, '')::text AS state,
        COALESCE(query, '')::text AS query
    FROM pg_stat_activity
    WHERE state IS NOT NULL
    ORDER BY backend_start DESC
"#;

/// Timed probes: name and statement.
pub(crate) const PROBES: [(&str, &str); 5] = [
    ("simple_select", "SELECT 1"),
    ("current_time", "SELECT now()::text"),
    (
        "database_size",
        "SELECT pg_database_size(current_database())::bigint",
    ),
    (
        "active_connections",
        "SELECT count(*)::bigint FROM pg_stat_activity",
    ),
    (
        "table_count",
        "SELECT count(*)::bigint FROM information_schema.tables WHERE table_schema = 'public'",
    ),
];
