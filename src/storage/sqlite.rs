//! SQLite implementation of OpportunityStorage and QuoteStorage.

use crate::domain::{Opportunity, Quote};
use crate::storage::{OpportunityStorage, QuoteStorage, StorageError};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Row, Sqlite};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// SqliteStorage persists opportunities, latest quotes and price history
/// in SQLite.
pub struct SqliteStorage {
    pool: Pool<Sqlite>,
}

/// SqliteStorageConfig holds SQLite storage configuration.
#[derive(Debug, Clone)]
pub struct SqliteStorageConfig {
    /// Path to the SQLite database file.
    pub path: String,
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
}

impl Default for SqliteStorageConfig {
    fn default() -> Self {
        Self {
            path: "spreadwatch.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Timestamps are stored as fixed-width UTC RFC 3339 so text order is time
/// order.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn parse_ts(column: &str, raw: &str) -> Result<DateTime<Utc>, StorageError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("Invalid {}: {}", column, e)))
}

impl SqliteStorage {
    /// Creates a new SQLite storage instance.
    pub async fn new(config: SqliteStorageConfig) -> Result<Self, StorageError> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let storage = Self { pool };

        storage.migrate().await?;

        info!(path = %config.path, "SQLite storage initialized");
        Ok(storage)
    }

    /// Runs database migrations to create the schema.
    async fn migrate(&self) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS opportunities (
                id TEXT PRIMARY KEY,
                instrument TEXT NOT NULL,
                buy_venue TEXT NOT NULL,
                sell_venue TEXT NOT NULL,
                buy_price REAL NOT NULL,
                sell_price REAL NOT NULL,
                spread_percent REAL NOT NULL,
                potential_profit REAL NOT NULL,
                detected_at TEXT NOT NULL,
                created_at TEXT DEFAULT CURRENT_TIMESTAMP
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_opportunities_instrument ON opportunities(instrument)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_opportunities_detected_at ON opportunities(detected_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS quotes (
                venue TEXT NOT NULL,
                instrument TEXT NOT NULL,
                price REAL NOT NULL,
                change_24h REAL,
                observed_at TEXT NOT NULL,
                PRIMARY KEY (venue, instrument)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS price_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                venue TEXT NOT NULL,
                instrument TEXT NOT NULL,
                price REAL NOT NULL,
                change_24h REAL,
                observed_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_price_history_instrument \
             ON price_history(instrument, observed_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

const OPPORTUNITY_COLUMNS: &str = "id, instrument, buy_venue, sell_venue, buy_price, sell_price, \
     spread_percent, potential_profit, detected_at";

#[async_trait]
impl OpportunityStorage for SqliteStorage {
    async fn save(&self, opp: &Opportunity) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO opportunities (
                id, instrument, buy_venue, sell_venue, buy_price, sell_price,
                spread_percent, potential_profit, detected_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&opp.id)
        .bind(&opp.instrument)
        .bind(&opp.buy_venue)
        .bind(&opp.sell_venue)
        .bind(opp.buy_price)
        .bind(opp.sell_price)
        .bind(opp.spread_percent)
        .bind(opp.potential_profit)
        .bind(format_ts(&opp.detected_at))
        .execute(&self.pool)
        .await?;

        let rows_affected = result.rows_affected();

        if rows_affected > 0 {
            debug!(
                id = %opp.id,
                instrument = %opp.instrument,
                "Opportunity saved"
            );
        }

        Ok(rows_affected > 0)
    }

    async fn recent(&self, limit: u32) -> Result<Vec<Opportunity>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM opportunities ORDER BY detected_at DESC, rowid DESC LIMIT ?",
            OPPORTUNITY_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_opportunity_row).collect()
    }

    async fn get_by_instrument(
        &self,
        instrument: &str,
        limit: u32,
    ) -> Result<Vec<Opportunity>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM opportunities WHERE instrument = ? \
             ORDER BY detected_at DESC, rowid DESC LIMIT ?",
            OPPORTUNITY_COLUMNS
        ))
        .bind(instrument)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_opportunity_row).collect()
    }

    async fn count(&self) -> Result<i64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM opportunities")
            .fetch_one(&self.pool)
            .await?;

        let count: i64 = row.try_get("count")?;
        Ok(count)
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl QuoteStorage for SqliteStorage {
    async fn upsert_quote(&self, quote: &Quote) -> Result<bool, StorageError> {
        let result = sqlx::query(
            r#"
            INSERT INTO quotes (venue, instrument, price, change_24h, observed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(venue, instrument) DO UPDATE SET
                price = excluded.price,
                change_24h = excluded.change_24h,
                observed_at = excluded.observed_at
            WHERE excluded.observed_at > quotes.observed_at
            "#,
        )
        .bind(&quote.venue)
        .bind(&quote.instrument)
        .bind(quote.price)
        .bind(quote.change_24h)
        .bind(format_ts(&quote.observed_at))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn latest_quotes(&self) -> Result<Vec<Quote>, StorageError> {
        let rows = sqlx::query(
            "SELECT venue, instrument, price, change_24h, observed_at FROM quotes \
             ORDER BY instrument, venue",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(parse_quote_row).collect()
    }

    async fn append_price(&self, quote: &Quote) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO price_history (venue, instrument, price, change_24h, observed_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(&quote.venue)
        .bind(&quote.instrument)
        .bind(quote.price)
        .bind(quote.change_24h)
        .bind(format_ts(&quote.observed_at))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn price_history(
        &self,
        instrument: Option<&str>,
        limit: u32,
    ) -> Result<Vec<Quote>, StorageError> {
        let rows = match instrument {
            Some(instrument) => {
                sqlx::query(
                    "SELECT venue, instrument, price, change_24h, observed_at FROM price_history \
                     WHERE instrument = ? ORDER BY observed_at DESC, id DESC LIMIT ?",
                )
                .bind(instrument)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT venue, instrument, price, change_24h, observed_at FROM price_history \
                     ORDER BY observed_at DESC, id DESC LIMIT ?",
                )
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(parse_quote_row).collect()
    }
}

/// Parses an opportunity from a database row.
fn parse_opportunity_row(row: &sqlx::sqlite::SqliteRow) -> Result<Opportunity, StorageError> {
    let detected_at: String = row.try_get("detected_at")?;

    Ok(Opportunity {
        id: row.try_get("id")?,
        instrument: row.try_get("instrument")?,
        buy_venue: row.try_get("buy_venue")?,
        sell_venue: row.try_get("sell_venue")?,
        buy_price: row.try_get("buy_price")?,
        sell_price: row.try_get("sell_price")?,
        spread_percent: row.try_get("spread_percent")?,
        potential_profit: row.try_get("potential_profit")?,
        detected_at: parse_ts("detected_at", &detected_at)?,
    })
}

/// Parses a quote from a database row.
fn parse_quote_row(row: &sqlx::sqlite::SqliteRow) -> Result<Quote, StorageError> {
    let observed_at: String = row.try_get("observed_at")?;

    Ok(Quote {
        venue: row.try_get("venue")?,
        instrument: row.try_get("instrument")?,
        price: row.try_get("price")?,
        observed_at: parse_ts("observed_at", &observed_at)?,
        change_24h: row.try_get("change_24h")?,
    })
}
