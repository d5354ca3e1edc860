//! pgpulse - terminal PostgreSQL dashboard.
//!
//! Polls one server on a fixed cadence and prints connection, size, cache,
//! activity and table statistics as text or JSON lines.

mod render;
mod report;

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use clap::Parser;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use pgpulse_core::{Category, Monitor, MonitorConfig};

use render::OutputFormat;

/// Real-time PostgreSQL dashboard.
#[derive(Parser)]
#[command(name = "pgpulse", about = "Real-time PostgreSQL dashboard", version)]
struct Args {
    /// Connection string, URL or key=value form. SSL is always required.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: String,

    /// Refresh interval in milliseconds.
    #[arg(
        short,
        long,
        env = "PGPULSE_INTERVAL",
        default_value = "1000",
        value_parser = clap::value_parser!(u64).range(10..=60_000)
    )]
    interval: u64,

    /// Print a single report and exit. Exit status is non-zero when the
    /// server was unavailable.
    #[arg(long)]
    once: bool,

    /// Output format.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Comma-separated categories to show (default: all).
    #[arg(short, long, value_delimiter = ',')]
    categories: Vec<Category>,

    /// Also time the probe statements on every tick.
    #[arg(long)]
    probes: bool,

    /// Skip server certificate verification (self-signed servers).
    #[arg(long)]
    tls_accept_invalid_certs: bool,

    /// Increase logging verbosity (-v for debug, -vv for trace). Default is info level.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode - only show errors.
    #[arg(short, long)]
    quiet: bool,
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        Level::ERROR
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let mut filter = EnvFilter::from_default_env();
    for crate_name in ["pgpulse", "pgpulse_core"] {
        if let Ok(directive) = format!("{}={}", crate_name, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let config = MonitorConfig::with_connection_string(args.database_url.as_str())
        .accept_invalid_certs(args.tls_accept_invalid_certs);
    let mut monitor = match Monitor::from_config(&config) {
        Ok(m) => m,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let categories = if args.categories.is_empty() {
        Category::ALL.to_vec()
    } else {
        args.categories.clone()
    };

    info!(
        target_db = %monitor.target(),
        interval_ms = args.interval,
        categories = categories.len(),
        "pgpulse {} starting",
        env!("CARGO_PKG_VERSION")
    );

    if let Err(e) = monitor.connect() {
        warn!("Initial connection failed, will retry every tick: {}", e);
    }

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    }) {
        warn!("Failed to install Ctrl-C handler: {}", e);
    }

    let interval = Duration::from_millis(args.interval);
    let mut tick: u64 = 0;
    let mut last_available = true;

    while running.load(Ordering::SeqCst) {
        tick += 1;
        let report = report::collect(&mut monitor, tick, &categories, args.probes);
        last_available = report.is_available();
        debug!(tick, available = last_available, "tick collected");

        match render::render(&report, args.format) {
            Ok(out) => println!("{}", out),
            Err(e) => error!("Failed to render report: {}", e),
        }

        if args.once {
            break;
        }

        // Sleep in short slices so Ctrl-C is handled promptly.
        let slice = Duration::from_millis(100);
        let mut remaining = interval;
        while remaining > Duration::ZERO && running.load(Ordering::SeqCst) {
            let step = remaining.min(slice);
            std::thread::sleep(step);
            remaining = remaining.saturating_sub(step);
        }
    }

    monitor.close();
    info!(ticks = tick, "pgpulse stopped");

    if args.once && !last_available {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn args_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn categories_and_interval_parse() {
        let args = Args::try_parse_from([
            "pgpulse",
            "--database-url",
            "postgresql://app@db/app",
            "--interval",
            "250",
            "-c",
            "connections,table_sizes",
            "--format",
            "json",
            "--once",
        ])
        .expect("valid args");
        assert_eq!(args.interval, 250);
        assert_eq!(args.categories, [Category::Connections, Category::TableSizes]);
        assert_eq!(args.format, OutputFormat::Json);
        assert!(args.once);
    }

    #[test]
    fn interval_out_of_range_rejected() {
        for bad in ["5", "60001"] {
            let result = Args::try_parse_from([
                "pgpulse",
                "--database-url",
                "postgresql://app@db/app",
                "--interval",
                bad,
            ]);
            assert!(result.is_err(), "interval {} accepted", bad);
        }
    }

    #[test]
    fn unknown_category_rejected() {
        let result = Args::try_parse_from([
            "pgpulse",
            "--database-url",
            "postgresql://app@db/app",
            "-c",
            "replication",
        ]);
        assert!(result.is_err());
    }
}
