//! Reducers turning query rows into scalar values.
//!
//! All reducers are pure and deterministic: the same rows always yield the
//! same values.

use std::collections::HashSet;

use crate::catalog::Category;
use crate::error::QueryError;
use crate::source::{CurrencyRow, Purse};

/// Gold pieces per platinum piece.
pub const GOLD_PER_PLATINUM: i64 = 10;
/// Silver pieces per platinum piece.
pub const SILVER_PER_PLATINUM: i64 = 100;
/// Copper pieces per platinum piece.
pub const COPPER_PER_PLATINUM: i64 = 1000;

/// A single aggregate column. Absent rows and NULL count as zero.
pub fn scalar(value: Option<i64>) -> i64 {
    value.unwrap_or(0)
}

/// Fold a purse into platinum. Remainders below one platinum piece are
/// dropped per denomination.
pub fn fold(purse: &Purse) -> i64 {
    purse
        .platinum
        .saturating_add(purse.gold / GOLD_PER_PLATINUM)
        .saturating_add(purse.silver / SILVER_PER_PLATINUM)
        .saturating_add(purse.copper / COPPER_PER_PLATINUM)
}

fn add_purse(total: &mut Purse, purse: &Purse) {
    total.platinum = total.platinum.saturating_add(purse.platinum);
    total.gold = total.gold.saturating_add(purse.gold);
    total.silver = total.silver.saturating_add(purse.silver);
    total.copper = total.copper.saturating_add(purse.copper);
}

/// Running sums of one currency iteration.
///
/// Denominations are summed per place (inventory, bank, cursor) and only
/// folded into platinum at the end, so a remainder is dropped once per
/// place rather than once per character.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CurrencyTotals {
    status_below: i64,
    main: Purse,
    bank: Purse,
    cursor: Purse,
    shared_platinum: i64,
    accounts: HashSet<i64>,
    radiant_crystals: i64,
    ebon_crystals: i64,
}

impl CurrencyTotals {
    /// Start accumulating rows of accounts with a status below `status_below`.
    pub fn new(status_below: i64) -> Self {
        CurrencyTotals {
            status_below,
            ..Default::default()
        }
    }

    /// Accumulate a row. Returns whether the row was eligible.
    pub fn add(&mut self, row: &CurrencyRow) -> bool {
        if row.account_status >= self.status_below {
            return false;
        }

        add_purse(&mut self.main, &row.main);
        add_purse(&mut self.bank, &row.bank);
        add_purse(&mut self.cursor, &row.cursor);

        // The shared bank belongs to the account, not the character.
        if self.accounts.insert(row.account_id) {
            self.shared_platinum = self.shared_platinum.saturating_add(row.shared_platinum);
        }

        self.radiant_crystals = self.radiant_crystals.saturating_add(row.radiant_crystals);
        self.ebon_crystals = self.ebon_crystals.saturating_add(row.ebon_crystals);
        true
    }

    /// Total platinum across all places and shared banks.
    ///
    /// Shared bank platinum is counted once per account. Earlier exporters
    /// added it once per character, so accounts with several characters
    /// report lower totals than before.
    pub fn platinum(&self) -> i64 {
        fold(&self.main)
            .saturating_add(fold(&self.bank))
            .saturating_add(fold(&self.cursor))
            .saturating_add(self.shared_platinum)
    }

    /// Radiant crystals carried.
    pub fn radiant_crystals(&self) -> i64 {
        self.radiant_crystals
    }

    /// Ebon crystals carried.
    pub fn ebon_crystals(&self) -> i64 {
        self.ebon_crystals
    }
}

/// Reduce per-category lookups to `(category, count)` pairs in catalog
/// order.
///
/// A failed lookup drops only its own category; it is logged and the
/// remaining categories are still reduced.
pub fn categories<'a, I>(lookups: I) -> Vec<(&'a Category, i64)>
where
    I: IntoIterator<Item = (&'a Category, Result<Option<i64>, QueryError>)>,
{
    lookups
        .into_iter()
        .filter_map(|(category, lookup)| match lookup {
            Ok(count) => Some((category, scalar(count))),
            Err(error) => {
                tracing::warn!(
                    category = %category.name,
                    item_id = category.item_id,
                    error = %error,
                    "category lookup failed, skipping"
                );
                None
            }
        })
        .collect()
}
