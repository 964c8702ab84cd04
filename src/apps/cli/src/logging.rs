//! Logging Configuration

use tracing_subscriber::EnvFilter;

const LOG_LEVEL_ENV: &str = "PARLEY_LOG_LEVEL";

pub fn parse_log_level(value: &str) -> Option<&'static str> {
    match value.trim().to_lowercase().as_str() {
        "trace" => Some("trace"),
        "debug" => Some("debug"),
        "info" => Some("info"),
        "warn" => Some("warn"),
        "error" => Some("error"),
        "off" => Some("off"),
        _ => None,
    }
}

/// Flag first, then `PARLEY_LOG_LEVEL`, then `info`.
fn resolve_level(flag: Option<&str>) -> &'static str {
    if let Some(value) = flag {
        match parse_log_level(value) {
            Some(level) => return level,
            None => eprintln!("Warning: Invalid --log-level '{}', falling back to default", value),
        }
    }
    match std::env::var(LOG_LEVEL_ENV) {
        Ok(val) => parse_log_level(&val).unwrap_or_else(|| {
            eprintln!(
                "Warning: Invalid {} '{}', falling back to default",
                LOG_LEVEL_ENV, val
            );
            "info"
        }),
        Err(_) => "info",
    }
}

/// Install the subscriber. `log` records from the library crates are routed
/// into it as well. Output goes to stderr so stdout carries only the answer.
pub fn init_logging(flag: Option<&str>) {
    let level = resolve_level(flag);
    let filter = EnvFilter::new(format!("warn,parley_stream={level},parley_cli={level}"));
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
    if let Err(e) = result {
        eprintln!("Warning: Failed to initialize logging: {}", e);
    }
}
