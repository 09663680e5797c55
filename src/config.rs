use crate::application::services::order_sweeper::SweepConfig;
use crate::domain::services::fee_calculator::TradeUnitTable;
use crate::infrastructure::http_venue_client::HttpVenueConfig;
use crate::persistence::DatabaseConfig;
use rust_decimal::Decimal;
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use zeroize::Zeroizing;

/// Runtime configuration for the ledger service
#[derive(Clone)]
pub struct LedgerConfig {
    pub database: DatabaseConfig,
    pub http_addr: SocketAddr,

    // Order status sweep
    pub sweep_interval_seconds: u64, // Fixed interval between sweeps (seconds)
    pub venue_timeout_milliseconds: u64, // Per-call venue timeout (milliseconds)
    pub venue_failure_alert_threshold: u32, // Consecutive failures before escalating
    pub venue_requests_per_second: u32, // 0 disables pacing
    pub simulate_fills: bool,        // Fill every order at its own price and quantity

    // Venue credentials; all three are needed for the HTTP venue
    pub venue_api_base: Option<String>,
    pub venue_api_key: Option<String>,
    pub venue_api_secret: Option<Zeroizing<String>>,

    // Trade-unit table
    pub default_trade_fee: Decimal,
    pub trade_fee_overrides: String, // SYM=fee,SYM=fee
    pub altcoin_symbols: Vec<String>,

    pub alert_webhook_url: Option<String>,
    pub api_requests_per_minute: u32, // 0 disables HTTP rate limiting
}

impl fmt::Debug for LedgerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LedgerConfig")
            .field("database", &self.database)
            .field("http_addr", &self.http_addr)
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .field("venue_timeout_milliseconds", &self.venue_timeout_milliseconds)
            .field("venue_failure_alert_threshold", &self.venue_failure_alert_threshold)
            .field("venue_requests_per_second", &self.venue_requests_per_second)
            .field("simulate_fills", &self.simulate_fills)
            .field("venue_api_base", &self.venue_api_base)
            .field("venue_api_key", &self.venue_api_key.as_ref().map(|_| "[REDACTED]"))
            .field("venue_api_secret", &self.venue_api_secret.as_ref().map(|_| "[REDACTED]"))
            .field("default_trade_fee", &self.default_trade_fee)
            .field("trade_fee_overrides", &self.trade_fee_overrides)
            .field("altcoin_symbols", &self.altcoin_symbols)
            .field("alert_webhook_url", &self.alert_webhook_url)
            .field("api_requests_per_minute", &self.api_requests_per_minute)
            .finish()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            database: DatabaseConfig::default(),
            http_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),

            sweep_interval_seconds: 60,        // Sweep every minute
            venue_timeout_milliseconds: 5000,  // 5 second timeout
            venue_failure_alert_threshold: 5,  // Escalate after 5 failed polls
            venue_requests_per_second: 10,
            simulate_fills: false,

            venue_api_base: None,
            venue_api_key: None,
            venue_api_secret: None,

            default_trade_fee: Decimal::ZERO,
            trade_fee_overrides: String::new(),
            altcoin_symbols: Vec::new(),

            alert_webhook_url: None,
            api_requests_per_minute: 600,
        }
    }
}

fn parse_flag(value: &str) -> bool {
    value.to_lowercase() == "true" || value == "1"
}

/// Parse a numeric setting, keeping `current` when the value is unparsable or
/// outside `valid`
fn parse_ranged<T>(name: &str, raw: &str, current: T, valid: impl Fn(&T) -> bool) -> T
where
    T: FromStr + fmt::Display,
    T::Err: fmt::Display,
{
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        Ok(value) => {
            tracing::warn!(
                "Invalid {} value: {}, using default: {}",
                name,
                value,
                current
            );
            current
        }
        Err(e) => {
            tracing::warn!(
                "Failed to parse {} '{}': {}, using default: {}",
                name,
                raw,
                e,
                current
            );
            current
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

impl LedgerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> LedgerConfig {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration from any name -> value source
    pub fn from_lookup<F>(lookup: F) -> LedgerConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = LedgerConfig::default();

        if let Some(url) = lookup("DATABASE_URL").and_then(non_empty) {
            config.database.url = url;
        }

        if let Some(max) = lookup("DATABASE_MAX_CONNECTIONS") {
            config.database.max_connections = parse_ranged(
                "DATABASE_MAX_CONNECTIONS",
                &max,
                config.database.max_connections,
                |v| (1..=100).contains(v),
            );
        }

        if let Some(log_queries) = lookup("DATABASE_LOG_QUERIES") {
            config.database.log_queries = parse_flag(&log_queries);
        }

        if let Some(addr) = lookup("LEDGER_HTTP_ADDR") {
            match addr.trim().parse::<SocketAddr>() {
                Ok(value) => config.http_addr = value,
                Err(e) => {
                    tracing::warn!(
                        "Failed to parse LEDGER_HTTP_ADDR '{}': {}, using default: {}",
                        addr,
                        e,
                        config.http_addr
                    );
                }
            }
        }

        if let Some(interval) = lookup("SWEEP_INTERVAL_SECONDS") {
            config.sweep_interval_seconds = parse_ranged(
                "SWEEP_INTERVAL_SECONDS",
                &interval,
                config.sweep_interval_seconds,
                |v| (1..=3600).contains(v),
            );
        }

        if let Some(timeout) = lookup("VENUE_TIMEOUT_MILLISECONDS") {
            config.venue_timeout_milliseconds = parse_ranged(
                "VENUE_TIMEOUT_MILLISECONDS",
                &timeout,
                config.venue_timeout_milliseconds,
                |v| (100..=60000).contains(v),
            );
        }

        if let Some(threshold) = lookup("VENUE_FAILURE_ALERT_THRESHOLD") {
            config.venue_failure_alert_threshold = parse_ranged(
                "VENUE_FAILURE_ALERT_THRESHOLD",
                &threshold,
                config.venue_failure_alert_threshold,
                |v| *v >= 1,
            );
        }

        if let Some(rps) = lookup("VENUE_REQUESTS_PER_SECOND") {
            config.venue_requests_per_second = parse_ranged(
                "VENUE_REQUESTS_PER_SECOND",
                &rps,
                config.venue_requests_per_second,
                |v| *v <= 1000,
            );
        }

        if let Some(simulate) = lookup("SIMULATE_FILLS") {
            config.simulate_fills = parse_flag(&simulate);
        }

        config.venue_api_base = lookup("VENUE_API_BASE").and_then(non_empty);
        config.venue_api_key = lookup("VENUE_API_KEY").and_then(non_empty);
        config.venue_api_secret = lookup("VENUE_API_SECRET")
            .and_then(non_empty)
            .map(Zeroizing::new);

        if let Some(fee) = lookup("DEFAULT_TRADE_FEE") {
            config.default_trade_fee = parse_ranged(
                "DEFAULT_TRADE_FEE",
                &fee,
                config.default_trade_fee,
                |v: &Decimal| !v.is_sign_negative(),
            );
        }

        if let Some(overrides) = lookup("TRADE_FEE_OVERRIDES") {
            config.trade_fee_overrides = overrides;
        }

        if let Some(symbols) = lookup("ALTCOIN_SYMBOLS") {
            config.altcoin_symbols = symbols
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }

        config.alert_webhook_url = lookup("ALERT_WEBHOOK_URL").and_then(non_empty);

        if let Some(rpm) = lookup("API_REQUESTS_PER_MINUTE") {
            config.api_requests_per_minute = parse_ranged(
                "API_REQUESTS_PER_MINUTE",
                &rpm,
                config.api_requests_per_minute,
                |v| *v <= 100_000,
            );
        }

        config
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds)
    }

    pub fn sweep_config(&self) -> SweepConfig {
        SweepConfig {
            venue_timeout: Duration::from_millis(self.venue_timeout_milliseconds),
            simulate_fills: self.simulate_fills,
            failure_alert_threshold: self.venue_failure_alert_threshold,
        }
    }

    pub fn fee_table(&self) -> TradeUnitTable {
        TradeUnitTable::new(self.default_trade_fee)
            .with_overrides(TradeUnitTable::parse_overrides(&self.trade_fee_overrides))
            .with_altcoins(self.altcoin_symbols.iter().cloned())
    }

    /// Venue credentials, when base URL, key, and secret are all set
    pub fn venue_config(&self) -> Option<HttpVenueConfig> {
        match (&self.venue_api_base, &self.venue_api_key, &self.venue_api_secret) {
            (Some(base), Some(key), Some(secret)) => {
                Some(HttpVenueConfig::new(base, key, secret.as_str()))
            }
            (None, None, None) => None,
            _ => {
                tracing::warn!(
                    "Incomplete venue credentials (need VENUE_API_BASE, VENUE_API_KEY and VENUE_API_SECRET)"
                );
                None
            }
        }
    }
}
