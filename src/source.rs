//! Aggregation queries against the game database.
//!
//! A [`Source`] answers the named, parameterized reads the collectors need.
//! It never retries; a failed read is reported to the poll loop, which skips
//! the rest of that iteration and tries again after its interval.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::QueryError;

#[cfg(any(test, feature = "test-util"))]
mod mock;
mod mysql;

#[cfg(any(test, feature = "test-util"))]
pub use mock::MockSource;
pub use mysql::MySqlSource;

/// The named aggregation queries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Characters logged in within the online window.
    Online,
    /// Experience summed over all characters.
    Experience,
    /// Currency rows of eligible accounts.
    Currency,
    /// Charges of one item category.
    Category,
}

impl QueryKind {
    /// Name used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Online => "online",
            QueryKind::Experience => "experience",
            QueryKind::Currency => "currency",
            QueryKind::Category => "category",
        }
    }
}

/// Platinum, gold, silver and copper held in one place.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Purse {
    /// Primary denomination.
    pub platinum: i64,
    /// Worth a tenth of a platinum piece.
    pub gold: i64,
    /// Worth a hundredth of a platinum piece.
    pub silver: i64,
    /// Worth a thousandth of a platinum piece.
    pub copper: i64,
}

/// Currency held by one character, joined with its account.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CurrencyRow {
    /// Account the character belongs to.
    pub account_id: i64,
    /// Account status; privileged accounts have high values.
    pub account_status: i64,
    /// Platinum in the account's shared bank, repeated on every character.
    pub shared_platinum: i64,
    /// Coin carried in the inventory.
    pub main: Purse,
    /// Coin in the character's bank.
    pub bank: Purse,
    /// Coin held on the cursor.
    pub cursor: Purse,
    /// Radiant crystals carried.
    pub radiant_crystals: i64,
    /// Ebon crystals carried.
    pub ebon_crystals: i64,
}

/// Read access to the aggregates of the game database.
///
/// Absent rows and NULL aggregates come back as `None`, which collectors
/// treat as zero. Implementations must be safe to share between all poll
/// loops without external locking.
#[async_trait]
pub trait Source: Send + Sync + std::fmt::Debug {
    /// Number of characters whose last login lies within `window` of now.
    async fn online_count(&self, window: Duration) -> Result<Option<i64>, QueryError>;

    /// Total experience, including the experience pool.
    async fn experience_total(&self) -> Result<Option<i64>, QueryError>;

    /// One row per character whose account status is below `status_below`.
    async fn currency_rows(&self, status_below: i64) -> Result<Vec<CurrencyRow>, QueryError>;

    /// Charges of `item_id` across inventories and shared banks.
    async fn category_count(&self, item_id: u32) -> Result<Option<i64>, QueryError>;
}
