use std::str::FromStr;
use std::time::Duration;

use simfarm_dispatch::cache::MB;
use simfarm_dispatch::DispatcherConfig;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a single-host deployment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `4242`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    /// A single `*` allows any origin.
    pub cors_origins: Vec<String>,
    /// Timeout for the `/job/*` endpoints in seconds (default: `30`).
    /// The RPC endpoint is exempt because `Submit` blocks for a whole run.
    pub request_timeout_secs: u64,
    /// How long to wait for the dispatcher to stop on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// Largest accepted request body (default: 512 MiB).
    pub max_body_bytes: usize,
    pub dispatcher: DispatcherConfig,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default          |
    /// |----------------------------|------------------|
    /// | `HOST`                     | `0.0.0.0`        |
    /// | `PORT`                     | `4242`           |
    /// | `CORS_ORIGINS`             | `*`              |
    /// | `REQUEST_TIMEOUT_SECS`     | `30`             |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `30`             |
    /// | `MAX_BODY_MB`              | `512`            |
    /// | `CACHE_CAPACITY_MB`        | `500`            |
    /// | `DISPATCH_CHANNEL_CAPACITY`| `1024`           |
    /// | `SUBMIT_WAIT_TIMEOUT_SECS` | unset (forever)  |
    /// | `WORKER_STALE_SECS`        | `60`             |
    ///
    /// Panics on unparseable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cors_origins: Vec<String> = get("CORS_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let wait_timeout = lookup("SUBMIT_WAIT_TIMEOUT_SECS")
            .filter(|s| !s.trim().is_empty())
            .map(|s| Duration::from_secs(parse("SUBMIT_WAIT_TIMEOUT_SECS", &s)));

        let dispatcher = DispatcherConfig {
            cache_capacity_bytes: parse::<usize>("CACHE_CAPACITY_MB", &get("CACHE_CAPACITY_MB", "500"))
                * MB,
            channel_capacity: parse_nonzero(
                "DISPATCH_CHANNEL_CAPACITY",
                &get("DISPATCH_CHANNEL_CAPACITY", "1024"),
            ),
            wait_timeout,
            worker_stale_after: Duration::from_secs(parse(
                "WORKER_STALE_SECS",
                &get("WORKER_STALE_SECS", "60"),
            )),
        };

        Self {
            host: get("HOST", "0.0.0.0"),
            port: parse("PORT", &get("PORT", "4242")),
            cors_origins,
            request_timeout_secs: parse("REQUEST_TIMEOUT_SECS", &get("REQUEST_TIMEOUT_SECS", "30")),
            shutdown_timeout_secs: parse(
                "SHUTDOWN_TIMEOUT_SECS",
                &get("SHUTDOWN_TIMEOUT_SECS", "30"),
            ),
            max_body_bytes: parse::<usize>("MAX_BODY_MB", &get("MAX_BODY_MB", "512")) * MB,
            dispatcher,
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> T {
    value
        .trim()
        .parse()
        .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>()))
}

fn parse_nonzero(key: &str, value: &str) -> usize {
    let n: usize = parse(key, value);
    if n == 0 {
        panic!("{key} must be at least 1");
    }
    n
}
