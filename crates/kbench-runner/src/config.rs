//! Benchmark configuration.
//!
//! Settings are layered: built-in defaults, then an optional TOML file,
//! then environment variables and command-line flags (merged in by the
//! binary). [`BenchmarkConfig`] is the partial, layerable form;
//! [`BenchmarkConfig::resolve`] validates it into [`BenchmarkSettings`].
//!
//! ```toml
//! target = "jupyter"
//! sessions = 16
//! delay_ms = 100
//! pid = 4242
//! run_secs = 60
//! ```

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use kbench_core::{DomainError, Endpoints, Target};
use kbench_protocol::DEFAULT_CODE;

use crate::sampler::DEFAULT_SAMPLE_INTERVAL;
use crate::snapshot::DEFAULT_SNAPSHOT_INTERVAL;

/// Send budget of every connection, measured from its first tick.
pub const DEFAULT_RUN_BUDGET: Duration = Duration::from_secs(60);

/// Pause between consecutive session-creation calls.
pub const DEFAULT_OPEN_SPACING: Duration = Duration::from_millis(50);

/// Upper bound on waiting for every connection to report ready.
pub const DEFAULT_WARMUP: Duration = Duration::from_secs(10);

/// Upper bound on one kernel channel handshake.
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// How long a closing worker keeps reading for in-flight replies.
pub const DEFAULT_CLOSE_GRACE: Duration = Duration::from_secs(2);

/// Username stamped on outbound message headers.
pub const DEFAULT_USERNAME: &str = "kbench";

/// Header carrying the XSRF token on HTTP and WebSocket requests.
pub const XSRF_HEADER: &str = "_xsrf";

// ============================================================================
// Errors
// ============================================================================

/// Configuration errors. All of them are fatal before any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required setting: {field}")]
    Missing { field: &'static str },

    #[error("Invalid {field}: {value} ({reason})")]
    Invalid {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Failed to read config file {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

// ============================================================================
// Credentials
// ============================================================================

/// Bearer token and XSRF token sent with every HTTP and WebSocket request.
///
/// Both may be empty; the headers are still sent.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub token: String,
    pub xsrf_token: String,
}

impl Credentials {
    pub fn new(token: impl Into<String>, xsrf_token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            xsrf_token: xsrf_token.into(),
        }
    }

    /// Value of the `Authorization` header.
    pub fn authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |s: &str| if s.is_empty() { "<empty>" } else { "<redacted>" };
        f.debug_struct("Credentials")
            .field("token", &redact(&self.token))
            .field("xsrf_token", &redact(&self.xsrf_token))
            .finish()
    }
}

// ============================================================================
// Resolved Settings
// ============================================================================

/// Delays and intervals that shape a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timing {
    /// Per-connection send budget, measured from the first tick
    pub run_budget: Duration,
    pub sample_interval: Duration,
    pub snapshot_interval: Duration,
    /// Pause between session-creation calls
    pub open_spacing: Duration,
    /// Upper bound on waiting for connections to become ready
    pub warmup: Duration,
    /// Upper bound on one channel handshake
    pub dial_timeout: Duration,
    /// Pause after the start signal before waiting on workers
    pub settle: Duration,
    pub close_grace: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            run_budget: DEFAULT_RUN_BUDGET,
            sample_interval: DEFAULT_SAMPLE_INTERVAL,
            snapshot_interval: DEFAULT_SNAPSHOT_INTERVAL,
            open_spacing: DEFAULT_OPEN_SPACING,
            warmup: DEFAULT_WARMUP,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
            settle: Duration::ZERO,
            close_grace: DEFAULT_CLOSE_GRACE,
        }
    }
}

/// Fully validated settings for one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchmarkSettings {
    pub target: Target,
    pub endpoints: Endpoints,
    /// Number of sessions to open
    pub sessions: usize,
    /// Delay between ticks of each connection
    pub tick: Duration,
    /// PID of the backend process to sample
    pub pid: u32,
    pub credentials: Credentials,
    pub timing: Timing,
    pub code: String,
    pub username: String,
    pub output: PathBuf,
}

impl BenchmarkSettings {
    /// Settings for `sessions` connections against explicit endpoints, with
    /// every other value at its default.
    pub fn for_endpoints(endpoints: Endpoints, sessions: usize, tick: Duration) -> Self {
        let target = Target::Jupyter;
        Self {
            output: default_output_path(tick, target, sessions),
            target,
            endpoints,
            sessions,
            tick,
            pid: std::process::id(),
            credentials: Credentials::default(),
            timing: Timing::default(),
            code: DEFAULT_CODE.to_string(),
            username: DEFAULT_USERNAME.to_string(),
        }
    }
}

/// `data/<delay>ms/benchmark_results_<target>_<n>kernels.json`
pub fn default_output_path(tick: Duration, target: Target, sessions: usize) -> PathBuf {
    PathBuf::from("data")
        .join(format!("{}ms", tick.as_millis()))
        .join(format!("benchmark_results_{target}_{sessions}kernels.json"))
}

// ============================================================================
// Layered Config
// ============================================================================

/// Partial configuration from one source (file, environment, flags).
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BenchmarkConfig {
    pub target: Option<String>,
    pub base_url: Option<String>,
    pub sessions: Option<usize>,
    pub delay_ms: Option<u64>,
    pub pid: Option<u32>,
    pub token: Option<String>,
    pub xsrf_token: Option<String>,
    pub run_secs: Option<u64>,
    pub sample_interval_ms: Option<u64>,
    pub snapshot_interval_ms: Option<u64>,
    pub spacing_ms: Option<u64>,
    pub warmup_ms: Option<u64>,
    pub dial_timeout_ms: Option<u64>,
    pub settle_ms: Option<u64>,
    pub close_grace_ms: Option<u64>,
    pub code: Option<String>,
    pub username: Option<String>,
    pub output: Option<PathBuf>,
}

impl BenchmarkConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Field-wise merge; values set in `overrides` win.
    #[must_use]
    pub fn merge(self, overrides: BenchmarkConfig) -> Self {
        Self {
            target: overrides.target.or(self.target),
            base_url: overrides.base_url.or(self.base_url),
            sessions: overrides.sessions.or(self.sessions),
            delay_ms: overrides.delay_ms.or(self.delay_ms),
            pid: overrides.pid.or(self.pid),
            token: overrides.token.or(self.token),
            xsrf_token: overrides.xsrf_token.or(self.xsrf_token),
            run_secs: overrides.run_secs.or(self.run_secs),
            sample_interval_ms: overrides.sample_interval_ms.or(self.sample_interval_ms),
            snapshot_interval_ms: overrides.snapshot_interval_ms.or(self.snapshot_interval_ms),
            spacing_ms: overrides.spacing_ms.or(self.spacing_ms),
            warmup_ms: overrides.warmup_ms.or(self.warmup_ms),
            dial_timeout_ms: overrides.dial_timeout_ms.or(self.dial_timeout_ms),
            settle_ms: overrides.settle_ms.or(self.settle_ms),
            close_grace_ms: overrides.close_grace_ms.or(self.close_grace_ms),
            code: overrides.code.or(self.code),
            username: overrides.username.or(self.username),
            output: overrides.output.or(self.output),
        }
    }

    /// Validates the merged configuration and fills in defaults.
    pub fn resolve(self) -> Result<BenchmarkSettings, ConfigError> {
        let target: Target = self
            .target
            .as_deref()
            .ok_or(ConfigError::Missing { field: "target" })?
            .parse()?;

        let endpoints = match self.base_url.as_deref() {
            Some(base) => Endpoints::from_base_url(base)?,
            None => target.default_endpoints()?,
        };

        let sessions = self.sessions.ok_or(ConfigError::Missing { field: "sessions" })?;
        if sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "sessions",
                value: sessions.to_string(),
                reason: "must be at least 1",
            });
        }

        let tick = positive_millis("delay_ms", self.delay_ms)?
            .ok_or(ConfigError::Missing { field: "delay_ms" })?;
        let pid = self.pid.ok_or(ConfigError::Missing { field: "pid" })?;

        let defaults = Timing::default();
        let timing = Timing {
            run_budget: match self.run_secs {
                Some(0) => {
                    return Err(ConfigError::Invalid {
                        field: "run_secs",
                        value: "0".to_string(),
                        reason: "must be positive",
                    })
                }
                Some(secs) => Duration::from_secs(secs),
                None => defaults.run_budget,
            },
            sample_interval: positive_millis("sample_interval_ms", self.sample_interval_ms)?
                .unwrap_or(defaults.sample_interval),
            snapshot_interval: positive_millis("snapshot_interval_ms", self.snapshot_interval_ms)?
                .unwrap_or(defaults.snapshot_interval),
            open_spacing: self
                .spacing_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.open_spacing),
            warmup: self
                .warmup_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.warmup),
            dial_timeout: positive_millis("dial_timeout_ms", self.dial_timeout_ms)?
                .unwrap_or(defaults.dial_timeout),
            settle: self
                .settle_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.settle),
            close_grace: self
                .close_grace_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.close_grace),
        };

        let output = self
            .output
            .unwrap_or_else(|| default_output_path(tick, target, sessions));

        Ok(BenchmarkSettings {
            target,
            endpoints,
            sessions,
            tick,
            pid,
            credentials: Credentials::new(
                self.token.unwrap_or_default(),
                self.xsrf_token.unwrap_or_default(),
            ),
            timing,
            code: self.code.unwrap_or_else(|| DEFAULT_CODE.to_string()),
            username: self.username.unwrap_or_else(|| DEFAULT_USERNAME.to_string()),
            output,
        })
    }
}

fn positive_millis(field: &'static str, value: Option<u64>) -> Result<Option<Duration>, ConfigError> {
    match value {
        Some(0) => Err(ConfigError::Invalid {
            field,
            value: "0".to_string(),
            reason: "must be positive",
        }),
        Some(ms) => Ok(Some(Duration::from_millis(ms))),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> BenchmarkConfig {
        BenchmarkConfig {
            target: Some("zasper".to_string()),
            sessions: Some(8),
            delay_ms: Some(100),
            pid: Some(1234),
            ..Default::default()
        }
    }

    #[test]
    fn test_resolve_minimal_uses_defaults() {
        let settings = minimal().resolve().unwrap();

        assert_eq!(settings.target, Target::Zasper);
        assert_eq!(settings.endpoints.sessions_url, "http://localhost:8048/api/sessions");
        assert_eq!(settings.sessions, 8);
        assert_eq!(settings.tick, Duration::from_millis(100));
        assert_eq!(settings.pid, 1234);
        assert_eq!(settings.timing, Timing::default());
        assert_eq!(settings.code, "2+2");
        assert_eq!(settings.username, DEFAULT_USERNAME);
        assert_eq!(
            settings.output,
            PathBuf::from("data/100ms/benchmark_results_zasper_8kernels.json")
        );
        assert_eq!(settings.credentials.authorization(), "Bearer ");
    }

    #[test]
    fn test_resolve_reports_missing_fields() {
        let cases = [
            (BenchmarkConfig { target: None, ..minimal() }, "target"),
            (BenchmarkConfig { sessions: None, ..minimal() }, "sessions"),
            (BenchmarkConfig { delay_ms: None, ..minimal() }, "delay_ms"),
            (BenchmarkConfig { pid: None, ..minimal() }, "pid"),
        ];

        for (config, expected) in cases {
            match config.resolve() {
                Err(ConfigError::Missing { field }) => assert_eq!(field, expected),
                other => panic!("expected missing {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        let unknown = BenchmarkConfig {
            target: Some("voila".to_string()),
            ..minimal()
        };
        assert!(matches!(unknown.resolve(), Err(ConfigError::Domain(_))));

        let zero_sessions = BenchmarkConfig {
            sessions: Some(0),
            ..minimal()
        };
        assert!(matches!(zero_sessions.resolve(), Err(ConfigError::Invalid { field: "sessions", .. })));

        let zero_delay = BenchmarkConfig {
            delay_ms: Some(0),
            ..minimal()
        };
        assert!(matches!(zero_delay.resolve(), Err(ConfigError::Invalid { field: "delay_ms", .. })));

        let bad_base = BenchmarkConfig {
            base_url: Some("localhost:8888".to_string()),
            ..minimal()
        };
        assert!(bad_base.resolve().is_err());

        let zero_dial = BenchmarkConfig {
            dial_timeout_ms: Some(0),
            ..minimal()
        };
        assert!(matches!(zero_dial.resolve(), Err(ConfigError::Invalid { field: "dial_timeout_ms", .. })));
    }

    #[test]
    fn test_https_base_is_rejected_before_any_request() {
        let config = BenchmarkConfig {
            base_url: Some("https://127.0.0.1:9".to_string()),
            ..minimal()
        };
        match config.resolve() {
            Err(ConfigError::Domain(e)) => assert!(e.to_string().contains("base_url")),
            other => panic!("expected a base_url error, got {other:?}"),
        }
    }

    #[test]
    fn test_base_url_overrides_target_default() {
        let config = BenchmarkConfig {
            base_url: Some("http://10.0.0.5:9999".to_string()),
            ..minimal()
        };
        let settings = config.resolve().unwrap();
        assert_eq!(settings.endpoints.sessions_url, "http://10.0.0.5:9999/api/sessions");
        assert_eq!(settings.target, Target::Zasper);
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = BenchmarkConfig {
            sessions: Some(2),
            token: Some("file-token".to_string()),
            ..minimal()
        };
        let flags = BenchmarkConfig {
            sessions: Some(32),
            ..Default::default()
        };

        let merged = file.merge(flags);
        assert_eq!(merged.sessions, Some(32));
        assert_eq!(merged.token.as_deref(), Some("file-token"));
        assert_eq!(merged.target.as_deref(), Some("zasper"));
    }

    #[test]
    fn test_from_toml() {
        let text = r#"
            target = "jupyter"
            sessions = 4
            delay_ms = 250
            pid = 99
            run_secs = 5
            token = "abc"
            output = "results/run.json"
        "#;
        let config = BenchmarkConfig::from_toml_str(text, Path::new("bench.toml")).unwrap();
        let settings = config.resolve().unwrap();

        assert_eq!(settings.timing.run_budget, Duration::from_secs(5));
        assert_eq!(settings.credentials.token, "abc");
        assert_eq!(settings.output, PathBuf::from("results/run.json"));
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let err = BenchmarkConfig::from_toml_str("sesions = 4", Path::new("bench.toml")).unwrap_err();
        assert!(err.to_string().contains("bench.toml"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = BenchmarkConfig::load(Path::new("/nonexistent/kbench.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials::new("secret", "");
        let debug = format!("{creds:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<empty>"));
    }
}
