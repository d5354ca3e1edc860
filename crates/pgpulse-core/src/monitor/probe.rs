//! Timed execution of a fixed set of cheap statements.

use std::time::{Duration, Instant};

use tracing::debug;

use super::queries::PROBES;
use super::session::Connector;
use super::{Monitor, MonitorError};

/// Outcome of one probe statement.
#[derive(Clone, Debug, PartialEq)]
pub struct ProbeResult {
    pub name: &'static str,
    /// Round-trip time, `None` when the statement failed.
    pub elapsed: Option<Duration>,
    pub error: Option<String>,
}

impl ProbeResult {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

impl<C: Connector> Monitor<C> {
    /// Runs every probe once, one round trip each.
    ///
    /// A failing statement is recorded in its result and the run continues;
    /// a connection failure aborts the run.
    pub fn probe_queries(&mut self) -> Result<Vec<ProbeResult>, MonitorError> {
        self.ensure_connected()?;

        let mut results = Vec::with_capacity(PROBES.len());
        for (name, sql) in PROBES {
            let started = Instant::now();
            match self.run(sql) {
                Ok(_) => {
                    let elapsed = started.elapsed();
                    debug!(probe = name, elapsed_ms = elapsed.as_secs_f64() * 1000.0, "probe done");
                    results.push(ProbeResult {
                        name,
                        elapsed: Some(elapsed),
                        error: None,
                    });
                }
                Err(MonitorError::Query(msg)) => results.push(ProbeResult {
                    name,
                    elapsed: None,
                    error: Some(msg),
                }),
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;
    use crate::monitor::SessionError;

    #[test]
    fn all_probes_run() {
        let mut monitor = Monitor::new(MockConnector::typical_server());
        let results = monitor.probe_queries().expect("probes");
        let names: Vec<&str> = results.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            [
                "simple_select",
                "current_time",
                "database_size",
                "active_connections",
                "table_count"
            ]
        );
        assert!(results.iter().all(ProbeResult::succeeded));
    }

    #[test]
    fn failing_probe_is_recorded() {
        let mock = MockConnector::typical_server();
        mock.fail(
            PROBES[4].1,
            SessionError::server("ERROR: permission denied for schema information_schema"),
        );
        let mut monitor = Monitor::new(mock);
        let results = monitor.probe_queries().expect("probes");
        assert_eq!(results.len(), 5);
        assert!(results[..4].iter().all(ProbeResult::succeeded));
        assert_eq!(results[4].elapsed, None);
        assert!(results[4].error.as_deref().is_some_and(|e| e.contains("permission denied")));
    }

    #[test]
    fn connection_loss_aborts_run() {
        let mock = MockConnector::typical_server();
        mock.fail(PROBES[1].1, SessionError::transport("server closed the connection unexpectedly"));
        let mut monitor = Monitor::new(mock);
        let err = monitor.probe_queries().expect_err("aborted");
        assert!(err.is_connection());
    }
}
