use chrono::{FixedOffset, NaiveTime, Weekday};
use serde::Deserialize;

/// Global application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// PostgreSQL connection string
    pub database_url: String,

    /// Maximum number of PostgreSQL connections in the pool (default: 20)
    pub db_max_connections: u32,

    /// Telegram bot token
    pub telegram_bot_token: String,

    /// Telegram Bot API base URL (default: https://api.telegram.org)
    pub telegram_api_url: String,

    /// Long-poll timeout for `getUpdates` in seconds (default: 30)
    pub telegram_poll_timeout_secs: u64,

    /// NBKR gold price page
    pub nbkr_url: String,

    /// Language used when neither the chat nor the platform provides a supported one
    pub default_language: String,

    /// Offset of the local time zone used for schedules and "today" (default: +6, Asia/Bishkek)
    pub utc_offset_hours: i32,

    /// Local time of the weekday price refresh (default: 09:15)
    pub price_update_at: NaiveTime,

    /// Local time of the daily notification cycle (default: 10:00)
    pub alert_at: NaiveTime,

    /// Weekdays rendered inert in the calendar day picker (default: sat,sun)
    pub calendar_disabled_weekdays: Vec<Weekday>,

    /// Bind address of the health endpoint (default: 0.0.0.0:3000)
    pub health_addr: String,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable is required"))?,
            db_max_connections: std::env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "20".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("DB_MAX_CONNECTIONS must be a valid u32"))?,
            telegram_bot_token: std::env::var("TELEGRAM_BOT_TOKEN").map_err(|_| {
                anyhow::anyhow!("TELEGRAM_BOT_TOKEN environment variable is required")
            })?,
            telegram_api_url: std::env::var("TELEGRAM_API_URL")
                .unwrap_or_else(|_| "https://api.telegram.org".to_string()),
            telegram_poll_timeout_secs: std::env::var("TELEGRAM_POLL_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("TELEGRAM_POLL_TIMEOUT_SECS must be a valid u64"))?,
            nbkr_url: std::env::var("NBKR_URL").unwrap_or_else(|_| {
                "https://www.nbkr.kg/index1.jsp?item=2747&lang=RUS".to_string()
            }),
            default_language: std::env::var("DEFAULT_LANGUAGE")
                .unwrap_or_else(|_| "en".to_string()),
            utc_offset_hours: std::env::var("UTC_OFFSET_HOURS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .map_err(|_| anyhow::anyhow!("UTC_OFFSET_HOURS must be a valid i32"))?,
            price_update_at: parse_time(
                "PRICE_UPDATE_AT",
                &std::env::var("PRICE_UPDATE_AT").unwrap_or_else(|_| "09:15".to_string()),
            )?,
            alert_at: parse_time(
                "ALERT_AT",
                &std::env::var("ALERT_AT").unwrap_or_else(|_| "10:00".to_string()),
            )?,
            calendar_disabled_weekdays: parse_weekdays(
                &std::env::var("CALENDAR_DISABLED_WEEKDAYS")
                    .unwrap_or_else(|_| "sat,sun".to_string()),
            )?,
            health_addr: std::env::var("HEALTH_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
        })
    }

    /// Fixed offset of the configured local time zone.
    pub fn local_offset(&self) -> anyhow::Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_hours * 3600)
            .ok_or_else(|| anyhow::anyhow!("UTC_OFFSET_HOURS is out of range"))
    }
}

fn parse_time(name: &str, value: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M")
        .map_err(|_| anyhow::anyhow!("{name} must be a HH:MM time"))
}

/// Parse a comma-separated weekday list such as `sat,sun`. An empty string disables nothing.
pub fn parse_weekdays(value: &str) -> anyhow::Result<Vec<Weekday>> {
    value
        .split(',')
        .map(str::trim)
        .filter(|day| !day.is_empty())
        .map(|day| {
            day.parse::<Weekday>()
                .map_err(|_| anyhow::anyhow!("Unknown weekday '{day}'"))
        })
        .collect()
}
