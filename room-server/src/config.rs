use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cleanup_secret: String,
    pub room_max_age_days: i64,
    pub room_retention_days: i64,
    pub room_inactivity_minutes: i64,
    pub sweep_interval_seconds: u64,
}

impl Config {
    pub fn new() -> Self {
        Self {
            host: env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("Invalid PORT"),
            cleanup_secret: env::var("CLEANUP_SECRET")
                .unwrap_or_else(|_| "dev-cleanup-secret".to_string()),
            room_max_age_days: env::var("ROOM_MAX_AGE_DAYS")
                .unwrap_or_else(|_| "7".to_string())
                .parse()
                .expect("Invalid ROOM_MAX_AGE_DAYS"),
            room_retention_days: env::var("ROOM_RETENTION_DAYS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("Invalid ROOM_RETENTION_DAYS"),
            room_inactivity_minutes: env::var("ROOM_INACTIVITY_MINUTES")
                .unwrap_or_else(|_| "1440".to_string())
                .parse()
                .expect("Invalid ROOM_INACTIVITY_MINUTES"),
            sweep_interval_seconds: env::var("SWEEP_INTERVAL_SECONDS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .expect("Invalid SWEEP_INTERVAL_SECONDS"),
        }
    }

    pub fn cleanup_policy(&self) -> room_core::lifecycle::CleanupPolicy {
        room_core::lifecycle::CleanupPolicy::new(
            chrono::Duration::days(self.room_max_age_days),
            chrono::Duration::minutes(self.room_inactivity_minutes),
            chrono::Duration::days(self.room_retention_days),
        )
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
