//! Metric registry implementation.
//!
//! See [`Registry`] for details.

/// A metric registry.
///
/// First off one registers metrics with the registry via
/// [`Registry::register`]. Later on the [`Registry`] is passed to an encoder
/// collecting samples of each metric by iterating all metrics in the
/// [`Registry`].
///
/// Registration requires `&mut self` and happens once at startup. Afterwards
/// the registry is only read: metrics mutate through their own interior
/// synchronization, so scrapes and poll loops never contend on the registry
/// itself.
///
/// ```
/// # use eqemu_exporter::encoding::text::encode;
/// # use eqemu_exporter::metrics::gauge::Gauge;
/// # use eqemu_exporter::registry::Registry;
/// #
/// let mut registry = Registry::default();
/// let gauge = Gauge::default();
/// registry.register("my_gauge", "This is my gauge", gauge.clone());
///
/// # let mut buffer = String::new();
/// # encode(&mut buffer, &registry).unwrap();
/// #
/// # let expected = "# HELP my_gauge This is my gauge.\n".to_owned() +
/// #                "# TYPE my_gauge gauge\n" +
/// #                "my_gauge 0.0\n" +
/// #                "# EOF\n";
/// # assert_eq!(expected, buffer);
/// ```
#[derive(Debug, Default)]
pub struct Registry {
    prefix: Option<Prefix>,
    metrics: Vec<(Descriptor, Box<dyn Metric>)>,
}

impl Registry {
    /// Creates a new default [`Registry`] with the given prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(Prefix(prefix.into())),
            ..Default::default()
        }
    }

    /// Register a metric with the [`Registry`].
    ///
    /// Note: A full stop punctuation mark (`.`) is automatically added to the
    /// passed help text.
    ///
    /// Use [`Registry::register_with_unit`] whenever a unit for the given
    /// metric is known.
    pub fn register<N: Into<String>, H: Into<String>>(
        &mut self,
        name: N,
        help: H,
        metric: impl Metric,
    ) {
        self.priv_register(name, help, metric, None)
    }

    /// Register a metric with the [`Registry`] specifying the metric's unit.
    ///
    /// Note: In the Open Metrics text exposition format units are appended to
    /// the metric name. This is done automatically. Users must not append the
    /// unit to the name manually.
    pub fn register_with_unit<N: Into<String>, H: Into<String>>(
        &mut self,
        name: N,
        help: H,
        unit: Unit,
        metric: impl Metric,
    ) {
        self.priv_register(name, help, metric, Some(unit))
    }

    fn priv_register<N: Into<String>, H: Into<String>>(
        &mut self,
        name: N,
        help: H,
        metric: impl Metric,
        unit: Option<Unit>,
    ) {
        let descriptor = Descriptor::new(name, help, unit, self.prefix.as_ref());

        self.metrics.push((descriptor, Box::new(metric)));
    }

    /// Iterate all registered metrics in registration order.
    pub fn iter_metrics(&self) -> impl Iterator<Item = &(Descriptor, Box<dyn Metric>)> {
        self.metrics.iter()
    }
}

/// Metric prefix
#[derive(Clone, Debug)]
pub struct Prefix(String);

impl Prefix {
    fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<String> for Prefix {
    fn from(s: String) -> Self {
        Prefix(s)
    }
}

/// OpenMetrics metric descriptor.
#[derive(Debug, Clone)]
pub struct Descriptor {
    name: String,
    help: String,
    unit: Option<Unit>,
}

impl Descriptor {
    /// Create new [`Descriptor`].
    pub fn new<N: Into<String>, H: Into<String>>(
        name: N,
        help: H,
        unit: Option<Unit>,
        prefix: Option<&Prefix>,
    ) -> Self {
        let mut name = name.into();
        if let Some(prefix) = prefix {
            name.insert(0, '_');
            name.insert_str(0, prefix.as_str());
        }

        let help = help.into() + ".";

        Descriptor { name, help, unit }
    }

    /// Returns the name of the OpenMetrics metric [`Descriptor`].
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the help text of the OpenMetrics metric [`Descriptor`].
    pub fn help(&self) -> &str {
        &self.help
    }

    /// Returns the unit of the OpenMetrics metric [`Descriptor`].
    pub fn unit(&self) -> &Option<Unit> {
        &self.unit
    }
}

/// Metric units recommended by Open Metrics.
///
/// See [`Unit::Other`] to specify alternative units.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Unit {
    Bytes,
    Ratios,
    Seconds,
    Other(String),
}

impl Unit {
    /// Returns the given Unit's str representation.
    pub fn as_str(&self) -> &str {
        match self {
            Unit::Bytes => "bytes",
            Unit::Ratios => "ratios",
            Unit::Seconds => "seconds",
            Unit::Other(other) => other.as_str(),
        }
    }
}

/// Super trait representing an abstract Prometheus metric.
pub trait Metric: crate::encoding::EncodeMetric + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Metric for T where T: crate::encoding::EncodeMetric + Send + Sync + std::fmt::Debug + 'static
{}
