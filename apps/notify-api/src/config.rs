use std::str::FromStr;
use std::time::Duration;

/// Which [`NotificationStore`](crate::store::NotificationStore) backs the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(format!("unknown STORE_BACKEND {other:?}")),
        }
    }
}

/// Notification API configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// PostgreSQL connection string. Required for the postgres backend.
    pub database_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Interval between liveness sweeps.
    pub heartbeat_interval: Duration,
    /// Grace period for the first auth message on a new socket.
    pub auth_timeout: Duration,
    /// Upper bound on a single socket write.
    pub send_timeout: Duration,
    /// Capacity of each connection's outbound queue.
    pub outbound_buffer: usize,
    /// Maximum pooled database connections.
    pub db_pool_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: None,
            port: 4003,
            store_backend: StoreBackend::Memory,
            heartbeat_interval: Duration::from_secs(30),
            auth_timeout: Duration::from_secs(10),
            send_timeout: Duration::from_secs(10),
            outbound_buffer: 64,
            db_pool_size: 10,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing or
    /// `STORE_BACKEND` is not recognised.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let store_backend = match std::env::var("STORE_BACKEND") {
            Ok(v) if !v.is_empty() => v.parse().unwrap_or_else(|e: String| panic!("{e}")),
            _ => StoreBackend::Postgres,
        };

        let database_url = match store_backend {
            StoreBackend::Postgres => Some(required_var("DATABASE_URL")),
            StoreBackend::Memory => std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()),
        };

        Self {
            database_url,
            port: parsed_var("PORT").unwrap_or(defaults.port),
            store_backend,
            heartbeat_interval: secs_var("HEARTBEAT_INTERVAL_SECS")
                .unwrap_or(defaults.heartbeat_interval),
            auth_timeout: secs_var("AUTH_TIMEOUT_SECS").unwrap_or(defaults.auth_timeout),
            send_timeout: secs_var("SEND_TIMEOUT_SECS").unwrap_or(defaults.send_timeout),
            outbound_buffer: parsed_var::<usize>("OUTBOUND_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.outbound_buffer),
            db_pool_size: parsed_var::<usize>("DB_POOL_SIZE")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.db_pool_size),
        }
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}

fn secs_var(name: &str) -> Option<Duration> {
    parsed_var::<u64>(name)
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
}
