//! The fixed set of metric families this exporter publishes.
//!
//! The [`Catalog`] is built once at startup from the configured item
//! categories and never changes afterwards. It is shared between the poll
//! loops behind an [`Arc`](std::sync::Arc).
//!
//! Families carry no constant labels. Earlier exporters labelled every
//! series with `service="normal"`; dashboards filtering on `service` need
//! that filter removed. The per-item gauges `card_<name>_count` became the
//! single [`CATEGORY`] family with a [`CATEGORY_LABEL`] dimension.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::encoding::{is_valid_legacy_label_name, is_valid_legacy_metric_name};
use crate::error::ConfigError;
use crate::registry::Unit;

/// Characters seen within the online window.
pub const ONLINE: &str = "online_count_minutes";
/// Total platinum after folding all denominations.
pub const CURRENCY: &str = "currency_count_minutes";
/// Radiant crystals carried by characters.
pub const RADIANT: &str = "radiant_count_minutes";
/// Ebon crystals carried by characters.
pub const EBON: &str = "ebon_count_minutes";
/// Accumulated experience, including the experience pool.
pub const EXPERIENCE: &str = "exp_count_minutes";
/// Item charges per category.
pub const CATEGORY: &str = "card_count";
/// Label dimension of [`CATEGORY`].
pub const CATEGORY_LABEL: &str = "category";

/// How a family's observations are aggregated by the pull sink.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Kind {
    /// Point in time value, last write wins.
    Gauge,
    /// Streaming quantile estimate over a sliding window.
    Summary,
}

/// Identity and shape of one metric family.
#[derive(Clone, Debug, PartialEq)]
pub struct MetricFamily {
    name: String,
    help: String,
    unit: Option<Unit>,
    labels: Vec<String>,
    kind: Kind,
}

impl MetricFamily {
    /// Create a family without a unit.
    pub fn new(name: &str, help: &str, labels: &[&str], kind: Kind) -> Self {
        MetricFamily {
            name: name.to_owned(),
            help: help.to_owned(),
            unit: None,
            labels: labels.iter().map(|l| (*l).to_owned()).collect(),
            kind,
        }
    }

    /// Attach a unit. The pull sink appends it to the metric name.
    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Family name, without prefix.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text.
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Unit, if any.
    pub fn unit(&self) -> Option<&Unit> {
        self.unit.as_ref()
    }

    /// Names of the label dimensions.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Statistical kind.
    pub fn kind(&self) -> Kind {
        self.kind
    }
}

/// An item category tracked by the per-category family.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Category {
    /// Label value, e.g. `dragon`.
    pub name: String,
    /// Item id counted for this category.
    pub item_id: u32,
}

impl Category {
    /// Create a new category.
    pub fn new(name: impl Into<String>, item_id: u32) -> Self {
        Category {
            name: name.into(),
            item_id,
        }
    }
}

/// The card categories of the stock server, item ids 100100 to 100143.
pub fn default_categories() -> Vec<Category> {
    const NAMES: [&str; 44] = [
        "dragon",
        "insect",
        "animal",
        "construct",
        "extra_planar",
        "giant",
        "humanoid",
        "lycanthrope",
        "magical",
        "monster",
        "plant",
        "summoned",
        "undead",
        "gnoll",
        "aviak",
        "werewolf",
        "kobold",
        "orc",
        "fungus",
        "goblin",
        "evil_eye",
        "human",
        "barbarian",
        "erudite",
        "wood_elf",
        "high_elf",
        "dark_elf",
        "half_elf",
        "dwarf",
        "troll",
        "ogre",
        "halfling",
        "gnome",
        "froglok",
        "shadowed_man",
        "spider",
        "beetle",
        "snake",
        "wolf",
        "bear",
        "ghoul",
        "zombie",
        "skeleton",
        "chromadrac",
    ];

    NAMES
        .iter()
        .zip(100_100u32..)
        .map(|(name, id)| Category::new(*name, id))
        .collect()
}

/// Every family this exporter publishes, plus the item categories.
#[derive(Debug)]
pub struct Catalog {
    families: Vec<MetricFamily>,
    categories: Vec<Category>,
}

impl Catalog {
    /// Build the catalog for the given item categories.
    ///
    /// Fails if a category name is empty or appears twice.
    pub fn new(categories: Vec<Category>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for category in &categories {
            if category.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "category with item id {} has an empty name",
                    category.item_id
                )));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "category {:?} is listed twice",
                    category.name
                )));
            }
        }

        let families = vec![
            MetricFamily::new(ONLINE, "Online Count, every poll interval", &[], Kind::Summary),
            MetricFamily::new(CURRENCY, "Currency Count, every poll interval", &[], Kind::Summary),
            MetricFamily::new(
                RADIANT,
                "Radiant Crystal Count, every poll interval",
                &[],
                Kind::Summary,
            ),
            MetricFamily::new(EBON, "Ebon Crystal Count, every poll interval", &[], Kind::Summary),
            MetricFamily::new(
                EXPERIENCE,
                "Experience Count, every poll interval",
                &[],
                Kind::Summary,
            ),
            MetricFamily::new(
                CATEGORY,
                "Total number of items per category on server",
                &[CATEGORY_LABEL],
                Kind::Gauge,
            ),
        ];

        debug_assert!(families.iter().all(|f| is_valid_legacy_metric_name(&f.name)
            && f.labels.iter().all(|l| is_valid_legacy_label_name(l))));

        Ok(Catalog {
            families,
            categories,
        })
    }

    /// All families, in registration order.
    pub fn families(&self) -> &[MetricFamily] {
        &self.families
    }

    /// Look up a family by name.
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// The item categories, in configuration order.
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_catalog() {
        let categories = default_categories();
        assert_eq!(44, categories.len());
        assert_eq!(Category::new("dragon", 100_100), categories[0]);
        assert_eq!(Category::new("chromadrac", 100_143), categories[43]);

        let catalog = Catalog::new(categories).unwrap();
        assert_eq!(6, catalog.families().len());
        assert_eq!(Kind::Gauge, catalog.family(CATEGORY).unwrap().kind());
        assert_eq!(["category"], catalog.family(CATEGORY).unwrap().labels());
        assert!(catalog.family(ONLINE).unwrap().labels().is_empty());
        assert!(catalog.family("missing").is_none());
    }

    #[test]
    fn duplicate_category() {
        let err = Catalog::new(vec![Category::new("orc", 1), Category::new("orc", 2)]).unwrap_err();
        assert!(err.to_string().contains("orc"));
    }

    #[test]
    fn empty_category_name() {
        assert!(Catalog::new(vec![Category::new("", 1)]).is_err());
    }

    #[test]
    fn family_with_unit() {
        let family = MetricFamily::new("uptime", "Uptime", &[], Kind::Gauge);
        assert_eq!(None, family.unit());

        let family = family.with_unit(Unit::Seconds);
        assert_eq!(Some(&Unit::Seconds), family.unit());
    }
}
