//! Driver boundary.
//!
//! A [`Connector`] opens a [`Session`]; a session runs one SQL statement per
//! call and returns untyped [`RawRow`]s. `postgres` types never leave this
//! module: rows are decoded into [`RawValue`]s here and into typed records
//! by the monitor.

use chrono::{DateTime, Utc};
use postgres::config::Host;
use postgres::error::Severity;
use postgres::types::Type;
use postgres::{Client, Config};
use postgres_native_tls::MakeTlsConnector;

/// How a session call failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionErrorKind {
    /// Network, TLS, authentication or server shutdown. The session is gone.
    Transport,
    /// The server rejected the statement. The session is still usable.
    Server,
    /// The result could not be mapped (missing column, unexpected type).
    Decode,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionError {
    pub kind: SessionErrorKind,
    pub message: String,
}

impl SessionError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: SessionErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn server(message: impl Into<String>) -> Self {
        Self {
            kind: SessionErrorKind::Server,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: SessionErrorKind::Decode,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for SessionError {}

/// A single column value as decoded from the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum RawValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    fn kind(&self) -> &'static str {
        match self {
            RawValue::Null => "null",
            RawValue::Bool(_) => "bool",
            RawValue::Int(_) => "integer",
            RawValue::Float(_) => "float",
            RawValue::Text(_) => "text",
        }
    }
}

impl From<bool> for RawValue {
    fn from(v: bool) -> Self {
        RawValue::Bool(v)
    }
}

impl From<i32> for RawValue {
    fn from(v: i32) -> Self {
        RawValue::Int(v.into())
    }
}

impl From<i64> for RawValue {
    fn from(v: i64) -> Self {
        RawValue::Int(v)
    }
}

impl From<f64> for RawValue {
    fn from(v: f64) -> Self {
        RawValue::Float(v)
    }
}

impl From<&str> for RawValue {
    fn from(v: &str) -> Self {
        RawValue::Text(v.to_string())
    }
}

impl From<String> for RawValue {
    fn from(v: String) -> Self {
        RawValue::Text(v)
    }
}

impl<T: Into<RawValue>> From<Option<T>> for RawValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(RawValue::Null)
    }
}

/// One result row: column name -> value, in select-list order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawRow {
    columns: Vec<(String, RawValue)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`RawRow::push`].
    pub fn with(mut self, name: &str, value: impl Into<RawValue>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: &str, value: impl Into<RawValue>) {
        self.columns.push((name.to_string(), value.into()));
    }

    pub fn get(&self, name: &str) -> Option<&RawValue> {
        self.columns.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    fn value(&self, name: &str) -> Result<&RawValue, SessionError> {
        self.get(name)
            .ok_or_else(|| SessionError::decode(format!("missing column '{}'", name)))
    }

    pub fn opt_int(&self, name: &str) -> Result<Option<i64>, SessionError> {
        match self.value(name)? {
            RawValue::Null => Ok(None),
            RawValue::Int(v) => Ok(Some(*v)),
            other => Err(mismatch(name, "integer", other)),
        }
    }

    pub fn int(&self, name: &str) -> Result<i64, SessionError> {
        self.opt_int(name)?
            .ok_or_else(|| SessionError::decode(format!("column '{}' is null", name)))
    }

    /// Integers are widened to floats.
    pub fn opt_float(&self, name: &str) -> Result<Option<f64>, SessionError> {
        match self.value(name)? {
            RawValue::Null => Ok(None),
            RawValue::Float(v) => Ok(Some(*v)),
            RawValue::Int(v) => Ok(Some(*v as f64)),
            other => Err(mismatch(name, "float", other)),
        }
    }

    pub fn float(&self, name: &str) -> Result<f64, SessionError> {
        self.opt_float(name)?
            .ok_or_else(|| SessionError::decode(format!("column '{}' is null", name)))
    }

    pub fn opt_text(&self, name: &str) -> Result<Option<String>, SessionError> {
        match self.value(name)? {
            RawValue::Null => Ok(None),
            RawValue::Text(s) => Ok(Some(s.clone())),
            other => Err(mismatch(name, "text", other)),
        }
    }

    pub fn text(&self, name: &str) -> Result<String, SessionError> {
        self.opt_text(name)?
            .ok_or_else(|| SessionError::decode(format!("column '{}' is null", name)))
    }

    /// Epoch seconds (integer or float) as a UTC timestamp.
    pub fn opt_timestamp(&self, name: &str) -> Result<Option<DateTime<Utc>>, SessionError> {
        let Some(secs) = self.opt_float(name)? else {
            return Ok(None);
        };
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9) as u32;
        DateTime::from_timestamp(whole as i64, nanos)
            .map(Some)
            .ok_or_else(|| SessionError::decode(format!("column '{}': epoch {} out of range", name, secs)))
    }
}

fn mismatch(name: &str, expected: &str, found: &RawValue) -> SessionError {
    SessionError::decode(format!(
        "column '{}': expected {}, found {}",
        name,
        expected,
        found.kind()
    ))
}

/// An open connection able to run one statement at a time.
pub trait Session {
    fn query(&mut self, sql: &str) -> Result<Vec<RawRow>, SessionError>;

    fn is_closed(&self) -> bool;
}

/// Opens sessions to one fixed target.
pub trait Connector {
    type Session: Session;

    fn connect(&self) -> Result<Self::Session, SessionError>;

    /// Target description for logs. Never contains credentials.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// postgres
// ---------------------------------------------------------------------------

/// Connector over the synchronous `postgres` client with native TLS.
pub struct PgConnector {
    config: Config,
    tls: MakeTlsConnector,
}

impl PgConnector {
    pub fn new(config: Config, tls: MakeTlsConnector) -> Self {
        Self { config, tls }
    }
}

impl Connector for PgConnector {
    type Session = PgSession;

    fn connect(&self) -> Result<PgSession, SessionError> {
        self.config
            .connect(self.tls.clone())
            .map(|client| PgSession { client })
            .map_err(|e| SessionError::transport(format_postgres_error(&e)))
    }

    fn describe(&self) -> String {
        let host = match self.config.get_hosts().first() {
            Some(Host::Tcp(h)) => h.clone(),
            #[cfg(unix)]
            Some(Host::Unix(path)) => path.display().to_string(),
            None => "localhost".to_string(),
        };
        let port = self.config.get_ports().first().copied().unwrap_or(5432);
        let dbname = self.config.get_dbname().unwrap_or("");
        format!("{}:{}/{}", host, port, dbname)
    }
}

/// Open `postgres` client.
pub struct PgSession {
    client: Client,
}

impl Session for PgSession {
    fn query(&mut self, sql: &str) -> Result<Vec<RawRow>, SessionError> {
        let rows = match self.client.query(sql, &[]) {
            Ok(rows) => rows,
            Err(e) => return Err(classify(&e, self.client.is_closed())),
        };
        rows.iter().map(decode_row).collect()
    }

    fn is_closed(&self) -> bool {
        self.client.is_closed()
    }
}

/// Server errors on a live client are recoverable; everything else
/// (I/O, TLS, FATAL/PANIC such as admin shutdown) ends the session.
fn classify(e: &postgres::Error, client_closed: bool) -> SessionError {
    let message = format_postgres_error(e);
    if client_closed || e.is_closed() {
        return SessionError::transport(message);
    }
    match e.as_db_error() {
        Some(db) if !ends_session(db.parsed_severity(), db.severity()) => {
            SessionError::server(message)
        }
        _ => SessionError::transport(message),
    }
}

/// The localized severity is only consulted when the server did not send
/// the untranslated one (before 9.6).
fn ends_session(parsed: Option<Severity>, localized: &str) -> bool {
    match parsed {
        Some(severity) => matches!(severity, Severity::Fatal | Severity::Panic),
        None => matches!(localized, "FATAL" | "PANIC"),
    }
}

fn decode_row(row: &postgres::Row) -> Result<RawRow, SessionError> {
    let mut raw = RawRow::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let value = decode_value(row, idx, column.type_())
            .map_err(|e| SessionError::decode(format!("column '{}': {}", column.name(), e)))?;
        raw.push(column.name(), value);
    }
    Ok(raw)
}

fn decode_value(row: &postgres::Row, idx: usize, ty: &Type) -> Result<RawValue, postgres::Error> {
    let value = if *ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(idx)?.map(RawValue::Bool)
    } else if *ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(idx)?
            .map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(idx)?
            .map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(idx)?.map(RawValue::Int)
    } else if *ty == Type::OID {
        row.try_get::<_, Option<u32>>(idx)?
            .map(|v| RawValue::Int(v.into()))
    } else if *ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(idx)?
            .map(|v| RawValue::Float(v.into()))
    } else if *ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(idx)?.map(RawValue::Float)
    } else {
        // text, varchar, name, bpchar; anything else must be cast in SQL
        row.try_get::<_, Option<String>>(idx)?.map(RawValue::Text)
    };
    Ok(value.unwrap_or(RawValue::Null))
}

/// Formats PostgreSQL error message for display.
pub(crate) fn format_postgres_error(e: &postgres::Error) -> String {
    if let Some(db_error) = e.as_db_error() {
        format!("{}: {}", db_error.severity(), db_error.message())
    } else {
        let msg = e.to_string();
        if msg.contains("Connection refused") {
            "connection refused".to_string()
        } else if msg.contains("password authentication failed") {
            "password authentication failed".to_string()
        } else {
            let detail = std::error::Error::source(e)
                .map(|s| s.to_string())
                .unwrap_or_default();
            if detail.is_empty() || msg.contains(&detail) {
                msg
            } else {
                format!("{}: {}", msg, detail)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RawRow {
        RawRow::new()
            .with("count", 42i64)
            .with("ratio", 0.5)
            .with("name", "app")
            .with("missing", None::<i64>)
            .with("started", 1_700_000_000i64)
            .with("flag", true)
    }

    #[test]
    fn typed_accessors() {
        let row = sample();
        assert_eq!(row.int("count"), Ok(42));
        assert_eq!(row.float("ratio"), Ok(0.5));
        assert_eq!(row.float("count"), Ok(42.0));
        assert_eq!(row.text("name"), Ok("app".to_string()));
        assert_eq!(row.opt_int("missing"), Ok(None));
        assert_eq!(row.opt_text("missing"), Ok(None));
        assert_eq!(
            row.opt_timestamp("started"),
            Ok(DateTime::from_timestamp(1_700_000_000, 0))
        );
        assert_eq!(row.opt_timestamp("missing"), Ok(None));
        assert_eq!(row.len(), 6);
    }

    #[test]
    fn accessor_errors_are_decode_errors() {
        let row = sample();
        let err = row.int("nope").expect_err("missing column");
        assert_eq!(err.kind, SessionErrorKind::Decode);
        assert!(err.message.contains("nope"));

        let err = row.int("name").expect_err("type mismatch");
        assert_eq!(err.message, "column 'name': expected integer, found text");

        let err = row.int("missing").expect_err("null");
        assert_eq!(err.message, "column 'missing' is null");

        assert!(row.text("flag").is_err());
    }

    #[test]
    fn session_ending_severity_ignores_translation() {
        assert!(ends_session(Some(Severity::Fatal), "FATAL"));
        assert!(ends_session(Some(Severity::Panic), "PANIK"));
        // Translated words (lc_messages) do not matter when parsed is present.
        assert!(!ends_session(Some(Severity::Error), "FEHLER"));
        assert!(ends_session(Some(Severity::Fatal), "SCHWERWIEGEND"));
        assert!(!ends_session(Some(Severity::Error), "FATAL"));

        assert!(ends_session(None, "FATAL"));
        assert!(!ends_session(None, "ERROR"));
    }

    #[test]
    fn column_order_preserved() {
        let row = sample();
        let names: Vec<&str> = row.column_names().collect();
        assert_eq!(names, ["count", "ratio", "name", "missing", "started", "flag"]);
    }

    #[test]
    fn fractional_epoch() {
        let row = RawRow::new().with("ts", 10.25);
        let ts = row.opt_timestamp("ts").expect("decodes").expect("not null");
        assert_eq!(ts.timestamp(), 10);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
    }
}
