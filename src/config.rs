//! Runtime configuration from environment and arguments.
//!
//! Input-file precedence: `DBN_FILE` env var, then the first positional
//! argument, then autodiscovery of any `*.dbn` file in the working
//! directory. Malformed numeric env values fall back to their defaults.

use std::env;
use std::path::PathBuf;

use crate::metrics::DEFAULT_P99_THRESHOLD_NS;

/// Engine configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Input DBN file, when one could be resolved
    pub dbn_file: Option<PathBuf>,
    /// Bind port for the HTTP collaborator
    pub port: u16,
    /// p99 spike threshold reported by the metrics endpoint (ns)
    pub p99_threshold_ns: u64,
    /// p99 threshold for the end-of-run warning (ns)
    pub p99_warn_ns: u64,
    /// Suppress the end-of-run metrics print
    pub quiet_metrics: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dbn_file: None,
            port: 8080,
            p99_threshold_ns: DEFAULT_P99_THRESHOLD_NS,
            p99_warn_ns: DEFAULT_P99_THRESHOLD_NS,
            quiet_metrics: false,
        }
    }
}

impl EngineConfig {
    /// Resolve configuration from the process environment and the given
    /// positional arguments (program name excluded).
    pub fn from_env<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut cfg = Self::default();

        cfg.dbn_file = env::var("DBN_FILE")
            .ok()
            .filter(|v| !v.is_empty())
            .map(PathBuf::from)
            .or_else(|| args.into_iter().next().map(|a| PathBuf::from(a.into())))
            .or_else(discover_dbn_file);

        cfg.port = env_parsed("PORT", cfg.port);
        cfg.p99_threshold_ns = env_parsed("LATENCY_P99_THRESHOLD_NS", cfg.p99_threshold_ns);
        cfg.p99_warn_ns = env_parsed("LATENCY_P99_WARN_NS", cfg.p99_warn_ns);
        cfg.quiet_metrics = env::var("QUIET_METRICS").as_deref() == Ok("1");

        cfg
    }
}

/// Parse an env var, keeping the default on absence or parse failure.
fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// First `*.dbn` file in the working directory, if any.
fn discover_dbn_file() -> Option<PathBuf> {
    let entries = std::fs::read_dir(".").ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "dbn") {
            return Some(path);
        }
    }
    None
}
