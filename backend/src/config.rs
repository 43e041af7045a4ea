use std::str::FromStr;
use std::time::Duration;

use crate::booking::engine::DEFAULT_HOLD;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// Upper bound on pooled connections.
    pub db_max_connections: u32,

    // =========================
    // Reservation configuration
    // =========================
    /// How long a seat lock keeps a seat away from other customers.
    ///
    /// A customer has this long to pay for a PENDING booking. After it
    /// elapses the lock is swept and the booking becomes EXPIRED.
    pub seat_hold: Duration,

    /// Cadence of the background expiry sweep.
    ///
    /// Every booking request already sweeps lazily before its conflict
    /// checks; the periodic loop only keeps EXPIRED statuses timely for
    /// readers. `None` disables the loop.
    pub sweep_interval: Option<Duration>,

    /// Emit JSON logs instead of pretty output.
    pub json_logs: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://cinema_dev.db?mode=rwc".to_string());

        let sweep_secs: u64 = env_or("SWEEP_INTERVAL_SECS", 30);

        Self {
            database_url,
            db_max_connections: env_or("DB_MAX_CONNECTIONS", 16),

            seat_hold: Duration::from_secs(env_or("SEAT_HOLD_SECS", DEFAULT_HOLD.as_secs())),
            sweep_interval: (sweep_secs > 0).then(|| Duration::from_secs(sweep_secs)),

            json_logs: json_logs_from_env(),
        }
    }
}

/// `APP_ENV=production` selects JSON logs. Read on its own so the logger can
/// be installed before the rest of the config, whose parse warnings need it.
pub fn json_logs_from_env() -> bool {
    std::env::var("APP_ENV").unwrap_or_default() == "production"
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            db_max_connections: 16,
            seat_hold: DEFAULT_HOLD,
            sweep_interval: Some(Duration::from_secs(30)),
            json_logs: false,
        }
    }
}

fn env_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %raw, %default, "unparseable config value; using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn default_hold_is_ten_minutes() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.seat_hold, Duration::from_secs(600));
        assert!(cfg.sweep_interval.is_some());
    }

    #[test]
    fn env_or_falls_back_when_missing() {
        let v: u64 = env_or("CINEMA_TEST_SURELY_UNSET_KEY", 17);
        assert_eq!(v, 17);
    }

    #[test]
    #[traced_test]
    fn unparseable_value_warns_and_falls_back() {
        // SAFETY: the key is unique to this test; nothing else reads it.
        unsafe { std::env::set_var("CINEMA_TEST_BAD_HOLD_SECS", "abc") };

        let v: u64 = env_or("CINEMA_TEST_BAD_HOLD_SECS", 600);

        assert_eq!(v, 600);
        assert!(logs_contain("unparseable config value; using default"));
        assert!(logs_contain("CINEMA_TEST_BAD_HOLD_SECS"));
    }
}
