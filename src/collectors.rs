//! The collectors driven by the poll loops.
//!
//! See [`Collector`] for details.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::catalog::{self, Catalog};
use crate::error::QueryError;
use crate::observation::{Observation, Value};
use crate::reduce::{self, CurrencyTotals};
use crate::source::{CurrencyRow, Source};

/// The [`Collector`] abstraction pairs an aggregation query with the reducer
/// turning its rows into observations.
///
/// Each collector is driven by its own [`PollLoop`](crate::poller::PollLoop),
/// which calls [`Collector::query`] and, if that succeeds,
/// [`Collector::reduce`] once per interval.
#[async_trait]
pub trait Collector: Send + Sync + std::fmt::Debug + 'static {
    /// Rows returned by the query, consumed by the reducer.
    type Rows: Send;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Issue the aggregation query.
    async fn query(&self, source: &dyn Source) -> Result<Self::Rows, QueryError>;

    /// Reduce the rows to the observations of this iteration.
    fn reduce(&self, rows: Self::Rows, timestamp: SystemTime) -> Vec<Observation>;
}

/// Characters seen within the online window.
#[derive(Debug, Clone)]
pub struct OnlineCollector {
    window: Duration,
}

impl OnlineCollector {
    /// Count characters whose last login is at most `window` ago.
    pub fn new(window: Duration) -> Self {
        OnlineCollector { window }
    }
}

#[async_trait]
impl Collector for OnlineCollector {
    type Rows = Option<i64>;

    fn name(&self) -> &'static str {
        catalog::ONLINE
    }

    async fn query(&self, source: &dyn Source) -> Result<Self::Rows, QueryError> {
        source.online_count(self.window).await
    }

    fn reduce(&self, rows: Self::Rows, timestamp: SystemTime) -> Vec<Observation> {
        vec![Observation::new(
            catalog::ONLINE,
            vec![],
            reduce::scalar(rows),
            timestamp,
        )]
    }
}

/// Experience accumulated by all characters.
#[derive(Debug, Clone, Default)]
pub struct ExperienceCollector;

#[async_trait]
impl Collector for ExperienceCollector {
    type Rows = Option<i64>;

    fn name(&self) -> &'static str {
        catalog::EXPERIENCE
    }

    async fn query(&self, source: &dyn Source) -> Result<Self::Rows, QueryError> {
        source.experience_total().await
    }

    fn reduce(&self, rows: Self::Rows, timestamp: SystemTime) -> Vec<Observation> {
        vec![Observation::new(
            catalog::EXPERIENCE,
            vec![],
            reduce::scalar(rows),
            timestamp,
        )]
    }
}

/// Currency held by characters of regular accounts, plus their crystals.
#[derive(Debug, Clone)]
pub struct CurrencyCollector {
    status_below: i64,
}

impl CurrencyCollector {
    /// Only accounts with a status below `status_below` are counted.
    pub fn new(status_below: i64) -> Self {
        CurrencyCollector { status_below }
    }
}

#[async_trait]
impl Collector for CurrencyCollector {
    type Rows = Vec<CurrencyRow>;

    fn name(&self) -> &'static str {
        catalog::CURRENCY
    }

    async fn query(&self, source: &dyn Source) -> Result<Self::Rows, QueryError> {
        source.currency_rows(self.status_below).await
    }

    fn reduce(&self, rows: Self::Rows, timestamp: SystemTime) -> Vec<Observation> {
        let mut totals = CurrencyTotals::new(self.status_below);
        let skipped = rows.iter().filter(|row| !totals.add(row)).count();
        if skipped > 0 {
            tracing::debug!(skipped, "ignored currency rows of privileged accounts");
        }

        vec![
            Observation::new(
                catalog::CURRENCY,
                vec![],
                Value::Float(totals.platinum() as f64),
                timestamp,
            ),
            Observation::new(catalog::RADIANT, vec![], totals.radiant_crystals(), timestamp),
            Observation::new(catalog::EBON, vec![], totals.ebon_crystals(), timestamp),
        ]
    }
}

/// Item charges for every category of the catalog.
#[derive(Debug, Clone)]
pub struct CategoryCollector {
    catalog: Arc<Catalog>,
}

impl CategoryCollector {
    /// Look up every category of `catalog`.
    pub fn new(catalog: Arc<Catalog>) -> Self {
        CategoryCollector { catalog }
    }
}

#[async_trait]
impl Collector for CategoryCollector {
    /// One lookup result per catalog category, in catalog order.
    type Rows = Vec<Result<Option<i64>, QueryError>>;

    fn name(&self) -> &'static str {
        catalog::CATEGORY
    }

    async fn query(&self, source: &dyn Source) -> Result<Self::Rows, QueryError> {
        let mut lookups = Vec::with_capacity(self.catalog.categories().len());
        for category in self.catalog.categories() {
            lookups.push(source.category_count(category.item_id).await);
        }
        Ok(lookups)
    }

    fn reduce(&self, rows: Self::Rows, timestamp: SystemTime) -> Vec<Observation> {
        reduce::categories(self.catalog.categories().iter().zip(rows))
            .into_iter()
            .map(|(category, count)| {
                Observation::new(
                    catalog::CATEGORY,
                    vec![category.name.clone()],
                    count,
                    timestamp,
                )
            })
            .collect()
    }
}
