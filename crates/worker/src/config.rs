use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use simfarm_core::WorkerId;

/// Worker configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Base URL of the dispatch server, without a trailing slash.
    pub server_url: String,
    pub worker_id: WorkerId,
    /// Sleep between fetches while the queue is empty.
    pub poll_interval: Duration,
    pub heartbeat_interval: Duration,
    /// Parent of the per-job scratch directories. `None` uses the system
    /// temp directory.
    pub work_dir: Option<PathBuf>,
}

impl WorkerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                   | Default                  |
    /// |---------------------------|--------------------------|
    /// | `SERVER_URL`              | `http://127.0.0.1:4242`  |
    /// | `WORKER_ID`               | random                   |
    /// | `POLL_INTERVAL_SECS`      | `10`                     |
    /// | `HEARTBEAT_INTERVAL_SECS` | `30`                     |
    /// | `WORK_DIR`                | system temp directory    |
    ///
    /// Panics on unparseable values so misconfiguration fails at startup.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let set = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_url = get("SERVER_URL", "http://127.0.0.1:4242")
            .trim()
            .trim_end_matches('/')
            .to_string();

        Self {
            server_url,
            worker_id: set("WORKER_ID")
                .map(|v| parse("WORKER_ID", &v))
                .unwrap_or_default(),
            poll_interval: Duration::from_secs(parse(
                "POLL_INTERVAL_SECS",
                &get("POLL_INTERVAL_SECS", "10"),
            )),
            heartbeat_interval: Duration::from_secs(parse(
                "HEARTBEAT_INTERVAL_SECS",
                &get("HEARTBEAT_INTERVAL_SECS", "30"),
            )),
            work_dir: set("WORK_DIR").map(PathBuf::from),
        }
    }
}

fn parse<T: FromStr>(key: &str, value: &str) -> T {
    value
        .trim()
        .parse()
        .unwrap_or_else(|_| panic!("{key} must be a valid {}", std::any::type_name::<T>()))
}
