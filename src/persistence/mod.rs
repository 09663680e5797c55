//! Persistence Layer
//!
//! SQLite storage for the ledger via sqlx. Decimals are stored as TEXT so no
//! precision is lost; booleans as INTEGER 0/1.
//!
//! # Database Schema
//!
//! ## accounts
//! - id, balance, bitcoin, updated_at
//!
//! ## assets
//! - (account_id, currency) primary key, balance
//!
//! ## positions
//! - (account_id, symbol, side, backtest) primary key
//! - price: weighted average entry, quantity: always > 0
//!
//! ## orders
//! - id, account_id, symbol, side, price, quantity, status, backtest
//! - external_order_id, executed_quantity, average_price
//! - created_at, updated_at, removed_at (soft delete)
//! - reconciled_at, rejection: set once the fill is journaled or refused
//!
//! ## transactions
//! - seq: insertion order, id: unique
//! - fill columns, order_id, bundle (JSON), applied, executed_at
//!
//! ## earnings
//! - id, account_id, symbol, side, open, close, quantity, fee, profit, backtest
//!
//! ## signals
//! - id, (symbol, side) unique, price, timeframe, notes

pub mod models;
pub mod repository;
pub mod signal_repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),
}

/// Initialize the database connection pool with default settings
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(&DatabaseConfig {
        url: database_url.to_string(),
        ..DatabaseConfig::default()
    })
    .await
}

/// Initialize the database connection pool and run migrations
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database_with(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", config.url);

    // Ensure data directory exists
    if let Some(db_path) = config.url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let options = SqliteConnectOptions::from_str(&config.url)?.create_if_missing(true);
    let options = if config.log_queries {
        options.log_statements(tracing::log::LevelFilter::Debug)
    } else {
        options.disable_statement_logging()
    };

    // Every connection to an in-memory database is a separate database
    let max_connections = if config.url.contains(":memory:") {
        if config.max_connections > 1 {
            warn!("In-memory database limited to a single connection");
        }
        1
    } else {
        config.max_connections.max(1)
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("✓ Database initialized successfully");

    Ok(pool)
}

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "accounts",
        r#"
        CREATE TABLE IF NOT EXISTS accounts (
            id TEXT PRIMARY KEY,
            balance TEXT NOT NULL,
            bitcoin TEXT NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    ),
    (
        "assets",
        r#"
        CREATE TABLE IF NOT EXISTS assets (
            account_id TEXT NOT NULL,
            currency TEXT NOT NULL,
            balance TEXT NOT NULL,
            PRIMARY KEY (account_id, currency)
        )
        "#,
    ),
    (
        "positions",
        r#"
        CREATE TABLE IF NOT EXISTS positions (
            account_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell')),
            backtest BOOLEAN NOT NULL,
            price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            updated_at DATETIME NOT NULL DEFAULT CURRENT_TIMESTAMP,
            PRIMARY KEY (account_id, symbol, side, backtest)
        )
        "#,
    ),
    (
        "orders",
        r#"
        CREATE TABLE IF NOT EXISTS orders (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell', 'buy_close', 'sell_close')),
            price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            status TEXT NOT NULL CHECK(status IN ('unfilled', 'fully_filled', 'canceled_unfilled')),
            backtest BOOLEAN NOT NULL,
            external_order_id TEXT,
            executed_quantity TEXT,
            average_price TEXT,
            created_at DATETIME NOT NULL,
            updated_at DATETIME NOT NULL,
            removed_at DATETIME,
            reconciled_at DATETIME,
            rejection TEXT
        )
        "#,
    ),
    (
        "transactions",
        r#"
        CREATE TABLE IF NOT EXISTS transactions (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            account_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            price TEXT NOT NULL,
            quantity TEXT NOT NULL,
            backtest BOOLEAN NOT NULL,
            order_id TEXT,
            bundle TEXT NOT NULL,
            applied BOOLEAN NOT NULL DEFAULT 0,
            executed_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "earnings",
        r#"
        CREATE TABLE IF NOT EXISTS earnings (
            id TEXT PRIMARY KEY,
            account_id TEXT NOT NULL,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell')),
            open TEXT NOT NULL,
            close TEXT NOT NULL,
            quantity TEXT NOT NULL,
            fee TEXT NOT NULL,
            profit TEXT NOT NULL,
            backtest BOOLEAN NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    ),
    (
        "signals",
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id TEXT PRIMARY KEY,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            price TEXT,
            timeframe TEXT,
            notes TEXT,
            created_at DATETIME NOT NULL,
            UNIQUE (symbol, side)
        )
        "#,
    ),
];

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_orders_status ON orders(status, removed_at)",
    "CREATE INDEX IF NOT EXISTS idx_orders_account ON orders(account_id)",
    "CREATE INDEX IF NOT EXISTS idx_orders_pending ON orders(status, reconciled_at)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_applied ON transactions(applied)",
    "CREATE INDEX IF NOT EXISTS idx_transactions_order_id ON transactions(order_id)",
    "CREATE INDEX IF NOT EXISTS idx_earnings_account ON earnings(account_id, created_at)",
];

/// Run database migrations
async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("Running database migrations...");

    for (table, ddl) in MIGRATIONS {
        sqlx::query(ddl).execute(pool).await.map_err(|e| {
            DatabaseError::MigrationError(format!("Failed to create {} table: {}", table, e))
        })?;
    }

    for ddl in INDEXES {
        sqlx::query(ddl)
            .execute(pool)
            .await
            .map_err(|e| DatabaseError::MigrationError(format!("Failed to create index: {}", e)))?;
    }

    info!("✓ Database migrations completed successfully");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database URL (e.g., "sqlite://data/tradeledger.db")
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Log statements at debug level
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/tradeledger.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("DATABASE_URL").unwrap_or(defaults.url);

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_connections);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.log_queries);

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}
