use chrono_tz::Tz;
use std::path::PathBuf;
use std::time::Duration;
use ticket_printer::TransportKind;

/// Print hub configuration
///
/// # Environment variables
///
/// | Variable | Default | Meaning |
/// |----------|---------|---------|
/// | PRINT_HUB_DATA_DIR | ./data | Database and log directory |
/// | LOG_LEVEL | info | Log level |
/// | LOG_DIR | (stdout) | Daily rolling log files |
/// | PRINT_TRANSPORT | auto | auto / socket / native |
/// | TIMEZONE | Europe/Paris | Timezone printed on tickets |
/// | CONNECT_TIMEOUT_MS | 5000 | TCP connect timeout |
/// | HEALTH_CHECK_INTERVAL_SECS | 30 | Health-check period |
/// | IDLE_TIMEOUT_SECS | 300 | Idle connection eviction |
/// | RECONNECT_BASE_MS | 1000 | Backoff base delay |
/// | RECONNECT_MAX_MS | 30000 | Backoff cap |
/// | RECONNECT_MAX_ATTEMPTS | 5 | Automatic reconnect attempts |
/// | QUEUE_MAX_SIZE | 100 | Pending jobs before backpressure |
/// | QUEUE_MAX_RETRIES | 3 | Retries per job |
/// | QUEUE_JOB_PAUSE_MS | 2000 | Pause between two jobs |
/// | FAILED_JOBS_CAP | 50 | Failed jobs kept for manual retry |
/// | JOB_RETENTION_HOURS | 24 | Persisted jobs older than this are dropped |
///
/// ```ignore
/// PRINT_TRANSPORT=native QUEUE_MAX_RETRIES=5 cargo run -p print-hub
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub log_level: String,
    pub log_dir: Option<String>,
    pub transport: TransportKind,
    pub timezone: Tz,

    // === Connections ===
    pub connect_timeout_ms: u64,
    pub health_check_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub reconnect_base_ms: u64,
    pub reconnect_max_ms: u64,
    pub reconnect_max_attempts: u32,

    // === Queue ===
    pub queue_max_size: usize,
    pub queue_max_retries: u32,
    pub queue_job_pause_ms: u64,
    pub failed_jobs_cap: usize,
    pub job_retention_hours: i64,
}

impl Config {
    /// Load configuration from the environment, falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("PRINT_HUB_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir: std::env::var("LOG_DIR").ok().filter(|d| !d.is_empty()),
            transport: std::env::var("PRINT_TRANSPORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.transport),
            timezone: std::env::var("TIMEZONE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.timezone),
            connect_timeout_ms: env_or("CONNECT_TIMEOUT_MS", defaults.connect_timeout_ms),
            health_check_interval_secs: env_or(
                "HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval_secs,
            ),
            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", defaults.idle_timeout_secs),
            reconnect_base_ms: env_or("RECONNECT_BASE_MS", defaults.reconnect_base_ms),
            reconnect_max_ms: env_or("RECONNECT_MAX_MS", defaults.reconnect_max_ms),
            reconnect_max_attempts: env_or(
                "RECONNECT_MAX_ATTEMPTS",
                defaults.reconnect_max_attempts,
            ),
            queue_max_size: env_or("QUEUE_MAX_SIZE", defaults.queue_max_size),
            queue_max_retries: env_or("QUEUE_MAX_RETRIES", defaults.queue_max_retries),
            queue_job_pause_ms: env_or("QUEUE_JOB_PAUSE_MS", defaults.queue_job_pause_ms),
            failed_jobs_cap: env_or("FAILED_JOBS_CAP", defaults.failed_jobs_cap),
            job_retention_hours: env_or("JOB_RETENTION_HOURS", defaults.job_retention_hours),
        }
    }

    /// Override the data directory, keeping everything else
    ///
    /// Mostly used by tests
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.data_dir = data_dir.into();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("print-hub.redb")
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn job_pause(&self) -> Duration {
        Duration::from_millis(self.queue_job_pause_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".into(),
            log_dir: None,
            transport: TransportKind::Auto,
            timezone: chrono_tz::Europe::Paris,
            connect_timeout_ms: 5_000,
            health_check_interval_secs: 30,
            idle_timeout_secs: 300,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            reconnect_max_attempts: 5,
            queue_max_size: 100,
            queue_max_retries: 3,
            queue_job_pause_ms: 2_000,
            failed_jobs_cap: 50,
            job_retention_hours: 24,
        }
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.health_check_interval(), Duration::from_secs(30));
        assert_eq!(config.idle_timeout(), Duration::from_secs(300));
        assert_eq!(config.queue_max_size, 100);
        assert_eq!(config.queue_max_retries, 3);
        assert_eq!(config.timezone, chrono_tz::Europe::Paris);
    }

    #[test]
    fn test_db_path() {
        let config = Config::default().with_data_dir("/tmp/hub");
        assert_eq!(config.db_path(), PathBuf::from("/tmp/hub/print-hub.redb"));
    }
}
