use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlArguments, MySqlConnectOptions, MySqlPoolOptions, MySqlRow};
use sqlx::query::{Query, QueryScalar};
use sqlx::{MySql, MySqlPool, Row};

use crate::config::DatabaseConfig;
use crate::error::QueryError;
use crate::source::{CurrencyRow, Purse, Source};

/// [`Source`] backed by a MySQL connection pool.
///
/// The pool synchronizes internally, so one instance serves all poll loops.
#[derive(Clone, Debug)]
pub struct MySqlSource {
    pool: MySqlPool,
}

impl MySqlSource {
    /// Wrap an existing pool.
    pub fn new(pool: MySqlPool) -> Self {
        MySqlSource { pool }
    }

    /// Connect to the configured database.
    ///
    /// Establishes one connection eagerly so an unreachable database is
    /// reported at startup rather than on the first poll.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, sqlx::Error> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.name);

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout))
            .connect_with(options)
            .await?;

        Ok(MySqlSource { pool })
    }
}

#[async_trait]
impl Source for MySqlSource {
    async fn online_count(&self, window: Duration) -> Result<Option<i64>, QueryError> {
        let count = build_online_count(window)
            .fetch_optional(&self.pool)
            .await?;
        Ok(count.flatten())
    }

    async fn experience_total(&self) -> Result<Option<i64>, QueryError> {
        let total = build_experience_total()
            .fetch_optional(&self.pool)
            .await?;
        Ok(total.flatten())
    }

    async fn currency_rows(&self, status_below: i64) -> Result<Vec<CurrencyRow>, QueryError> {
        let rows = build_currency_rows(status_below)
            .fetch_all(&self.pool)
            .await?;

        rows.iter()
            .map(currency_row)
            .collect::<Result<_, _>>()
            .map_err(QueryError::from)
    }

    async fn category_count(&self, item_id: u32) -> Result<Option<i64>, QueryError> {
        let count = build_category_count(item_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(count.flatten())
    }
}

/// Counts characters whose `last_login` lies within `window` of the database clock.
fn build_online_count<'a>(
    window: Duration,
) -> QueryScalar<'a, MySql, Option<i64>, MySqlArguments> {
    sqlx::query_scalar(
        "SELECT COUNT(last_login) FROM character_data WHERE last_login >= UNIX_TIMESTAMP() - ?",
    )
    .bind(window.as_secs() as i64)
}

/// Sums character experience and the custom experience pool.
fn build_experience_total<'a>() -> QueryScalar<'a, MySql, Option<i64>, MySqlArguments> {
    sqlx::query_scalar(
        "SELECT CAST(SUM(cd.exp) + SUM(cc.exp_pool) AS SIGNED)
         FROM character_data cd
         INNER JOIN character_custom cc ON cc.character_id = cd.id",
    )
}

/// Selects the currency of every character on an account below the status threshold.
fn build_currency_rows<'a>(status_below: i64) -> Query<'a, MySql, MySqlArguments> {
    sqlx::query(
        "SELECT
            CAST(a.id AS SIGNED) AS account_id,
            CAST(a.status AS SIGNED) AS account_status,
            CAST(a.sharedplat AS SIGNED) AS shared_platinum,
            CAST(cc.platinum AS SIGNED) AS platinum,
            CAST(cc.gold AS SIGNED) AS gold,
            CAST(cc.silver AS SIGNED) AS silver,
            CAST(cc.copper AS SIGNED) AS copper,
            CAST(cc.platinum_bank AS SIGNED) AS platinum_bank,
            CAST(cc.gold_bank AS SIGNED) AS gold_bank,
            CAST(cc.silver_bank AS SIGNED) AS silver_bank,
            CAST(cc.copper_bank AS SIGNED) AS copper_bank,
            CAST(cc.platinum_cursor AS SIGNED) AS platinum_cursor,
            CAST(cc.gold_cursor AS SIGNED) AS gold_cursor,
            CAST(cc.silver_cursor AS SIGNED) AS silver_cursor,
            CAST(cc.copper_cursor AS SIGNED) AS copper_cursor,
            CAST(cc.radiant_crystals AS SIGNED) AS radiant_crystals,
            CAST(cc.ebon_crystals AS SIGNED) AS ebon_crystals
         FROM character_data cd
         INNER JOIN account a ON a.id = cd.account_id
         INNER JOIN character_currency cc ON cc.id = cd.id
         WHERE a.status < ?",
    )
    .bind(status_below)
}

/// Sums the charges of an item, directly or as first augment, in inventories
/// and shared banks.
///
/// Each table is coalesced on its own, as `NULL + x` is `NULL` in MySQL.
const CATEGORY_COUNT: &str = "SELECT CAST(
        COALESCE((SELECT SUM(charges) FROM inventory WHERE itemid = ? OR augslot1 = ?), 0)
        + COALESCE((SELECT SUM(charges) FROM sharedbank WHERE itemid = ? OR augslot1 = ?), 0)
     AS SIGNED)";

fn build_category_count<'a>(item_id: u32) -> QueryScalar<'a, MySql, Option<i64>, MySqlArguments> {
    sqlx::query_scalar(CATEGORY_COUNT)
        .bind(item_id)
        .bind(item_id)
        .bind(item_id)
        .bind(item_id)
}

fn column(row: &MySqlRow, name: &str) -> Result<i64, sqlx::Error> {
    Ok(row.try_get::<Option<i64>, _>(name)?.unwrap_or(0))
}

fn purse(row: &MySqlRow, suffix: &str) -> Result<Purse, sqlx::Error> {
    Ok(Purse {
        platinum: column(row, &format!("platinum{suffix}"))?,
        gold: column(row, &format!("gold{suffix}"))?,
        silver: column(row, &format!("silver{suffix}"))?,
        copper: column(row, &format!("copper{suffix}"))?,
    })
}

fn currency_row(row: &MySqlRow) -> Result<CurrencyRow, sqlx::Error> {
    Ok(CurrencyRow {
        account_id: column(row, "account_id")?,
        account_status: column(row, "account_status")?,
        shared_platinum: column(row, "shared_platinum")?,
        main: purse(row, "")?,
        bank: purse(row, "_bank")?,
        cursor: purse(row, "_cursor")?,
        radiant_crystals: column(row, "radiant_crystals")?,
        ebon_crystals: column(row, "ebon_crystals")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collapse(sql: &str) -> String {
        sql.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    #[test]
    fn category_count_coalesces_each_table() {
        let sql = collapse(CATEGORY_COUNT);
        assert!(
            sql.contains("COALESCE((SELECT SUM(charges) FROM inventory WHERE itemid = ? OR augslot1 = ?), 0)"),
            "{sql}"
        );
        assert!(
            sql.contains("COALESCE((SELECT SUM(charges) FROM sharedbank WHERE itemid = ? OR augslot1 = ?), 0)"),
            "{sql}"
        );
        assert_eq!(4, sql.matches('?').count());
    }
}
