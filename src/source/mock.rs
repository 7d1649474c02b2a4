use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::QueryError;
use crate::source::{CurrencyRow, QueryKind, Source};

/// In-memory [`Source`] for tests.
///
/// Every query can be made to fail or to stall, and every call is counted.
#[derive(Debug, Default)]
pub struct MockSource {
    online: Option<i64>,
    experience: Option<i64>,
    currency: Vec<CurrencyRow>,
    categories: HashMap<u32, Option<i64>>,
    failing: HashSet<QueryKind>,
    failing_categories: HashSet<u32>,
    delays: HashMap<QueryKind, Duration>,
    calls: Mutex<HashMap<QueryKind, usize>>,
}

impl MockSource {
    /// A source without any rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the online query with `count`.
    pub fn with_online(mut self, count: Option<i64>) -> Self {
        self.online = count;
        self
    }

    /// Answer the experience query with `total`.
    pub fn with_experience(mut self, total: Option<i64>) -> Self {
        self.experience = total;
        self
    }

    /// Answer the currency query with these rows, filtered by status like
    /// the database would.
    pub fn with_currency_rows(mut self, rows: Vec<CurrencyRow>) -> Self {
        self.currency = rows;
        self
    }

    /// Answer the lookup of `item_id` with `count`.
    pub fn with_category(mut self, item_id: u32, count: Option<i64>) -> Self {
        self.categories.insert(item_id, count);
        self
    }

    /// Make every query of `kind` fail.
    pub fn failing(mut self, kind: QueryKind) -> Self {
        self.failing.insert(kind);
        self
    }

    /// Make the lookup of `item_id` fail.
    pub fn failing_category(mut self, item_id: u32) -> Self {
        self.failing_categories.insert(item_id);
        self
    }

    /// Make every query of `kind` take `delay` before answering.
    pub fn with_delay(mut self, kind: QueryKind, delay: Duration) -> Self {
        self.delays.insert(kind, delay);
        self
    }

    /// How often a query of `kind` was issued.
    pub fn calls(&self, kind: QueryKind) -> usize {
        self.calls.lock().get(&kind).copied().unwrap_or(0)
    }

    async fn enter(&self, kind: QueryKind) -> Result<(), QueryError> {
        *self.calls.lock().entry(kind).or_default() += 1;

        if let Some(delay) = self.delays.get(&kind) {
            tokio::time::sleep(*delay).await;
        }

        if self.failing.contains(&kind) {
            return Err(QueryError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(())
    }
}

#[async_trait]
impl Source for MockSource {
    async fn online_count(&self, _window: Duration) -> Result<Option<i64>, QueryError> {
        self.enter(QueryKind::Online).await?;
        Ok(self.online)
    }

    async fn experience_total(&self) -> Result<Option<i64>, QueryError> {
        self.enter(QueryKind::Experience).await?;
        Ok(self.experience)
    }

    async fn currency_rows(&self, status_below: i64) -> Result<Vec<CurrencyRow>, QueryError> {
        self.enter(QueryKind::Currency).await?;
        Ok(self
            .currency
            .iter()
            .filter(|row| row.account_status < status_below)
            .cloned()
            .collect())
    }

    async fn category_count(&self, item_id: u32) -> Result<Option<i64>, QueryError> {
        self.enter(QueryKind::Category).await?;
        if self.failing_categories.contains(&item_id) {
            return Err(QueryError::Malformed(format!("no answer for item {item_id}")));
        }
        Ok(self.categories.get(&item_id).copied().flatten())
    }
}
