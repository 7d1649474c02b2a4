//! Open Metrics text format implementation.
//!
//! ```
//! # use eqemu_exporter::encoding::text::encode;
//! # use eqemu_exporter::metrics::gauge::Gauge;
//! # use eqemu_exporter::registry::Registry;
//! #
//! let mut registry = Registry::default();
//! let gauge = Gauge::default();
//! registry.register("online_count", "Characters online", gauge.clone());
//! gauge.set(12.0);
//!
//! let mut buffer = String::new();
//! encode(&mut buffer, &registry).unwrap();
//!
//! let expected = "# HELP online_count Characters online.\n".to_owned() +
//!                "# TYPE online_count gauge\n" +
//!                "online_count 12.0\n" +
//!                "# EOF\n";
//! assert_eq!(expected, buffer);
//! ```

use crate::encoding::EncodeLabelSet;
use crate::metrics::MetricType;
use crate::registry::{Registry, Unit};
use std::fmt::Write;

/// Encode the metrics registered with the provided [`Registry`] into the
/// provided [`Write`]r using the OpenMetrics text format.
pub fn encode<W>(writer: &mut W, registry: &Registry) -> Result<(), std::fmt::Error>
where
    W: Write,
{
    for (descriptor, metric) in registry.iter_metrics() {
        let mut encoder = DescriptorEncoder { writer };
        let metric_encoder = encoder.encode_descriptor(
            descriptor.name(),
            descriptor.help(),
            descriptor.unit().as_ref(),
            metric.metric_type(),
        )?;
        metric.encode(metric_encoder)?;
    }

    writer.write_str("# EOF\n")?;

    Ok(())
}

/// Encoder writing the `# HELP`, `# TYPE` and `# UNIT` lines of a metric.
pub struct DescriptorEncoder<'a> {
    writer: &'a mut dyn Write,
}

impl std::fmt::Debug for DescriptorEncoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorEncoder").finish()
    }
}

impl DescriptorEncoder<'_> {
    /// Encode a descriptor, returning the encoder for the metric's samples.
    pub fn encode_descriptor<'s>(
        &'s mut self,
        name: &'s str,
        help: &str,
        unit: Option<&'s Unit>,
        metric_type: MetricType,
    ) -> Result<MetricEncoder<'s>, std::fmt::Error> {
        self.writer.write_str("# HELP ")?;
        write_name(self.writer, name, unit)?;
        self.writer.write_str(" ")?;
        self.writer.write_str(help)?;
        self.writer.write_str("\n")?;

        self.writer.write_str("# TYPE ")?;
        write_name(self.writer, name, unit)?;
        self.writer.write_str(" ")?;
        self.writer.write_str(metric_type.as_str())?;
        self.writer.write_str("\n")?;

        if let Some(unit) = unit {
            self.writer.write_str("# UNIT ")?;
            write_name(self.writer, name, Some(unit))?;
            self.writer.write_str(" ")?;
            self.writer.write_str(unit.as_str())?;
            self.writer.write_str("\n")?;
        }

        Ok(MetricEncoder {
            writer: self.writer,
            name,
            unit,
            family_labels: None,
        })
    }
}

/// Encoder for the samples of a single metric.
pub struct MetricEncoder<'a> {
    writer: &'a mut dyn Write,
    name: &'a str,
    unit: Option<&'a Unit>,
    family_labels: Option<&'a dyn EncodeLabelSet>,
}

impl std::fmt::Debug for MetricEncoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricEncoder")
            .field("name", &self.name)
            .field("unit", &self.unit)
            .finish()
    }
}

impl MetricEncoder<'_> {
    /// Encode a gauge sample.
    pub fn encode_gauge(&mut self, v: f64) -> Result<(), std::fmt::Error> {
        self.write_prefix_name_unit()?;
        self.write_suffix("")?;
        self.encode_labels(None)?;
        self.writer.write_str(" ")?;
        self.writer.write_str(dtoa::Buffer::new().format(v))?;
        self.newline()
    }

    /// Encode the quantile, sum and count samples of a summary.
    pub fn encode_summary(
        &mut self,
        sum: f64,
        count: u64,
        quantiles: &[(f64, f64)],
    ) -> Result<(), std::fmt::Error> {
        for (quantile, value) in quantiles {
            self.write_prefix_name_unit()?;
            self.encode_labels(Some(*quantile))?;
            self.writer.write_str(" ")?;
            self.writer.write_str(dtoa::Buffer::new().format(*value))?;
            self.newline()?;
        }

        self.write_prefix_name_unit()?;
        self.write_suffix("sum")?;
        self.encode_labels(None)?;
        self.writer.write_str(" ")?;
        self.writer.write_str(dtoa::Buffer::new().format(sum))?;
        self.newline()?;

        self.write_prefix_name_unit()?;
        self.write_suffix("count")?;
        self.encode_labels(None)?;
        self.writer.write_str(" ")?;
        self.writer.write_str(itoa::Buffer::new().format(count))?;
        self.newline()
    }

    /// Encode the samples of one member of a metric family.
    pub fn encode_family<'s, S: EncodeLabelSet>(
        &'s mut self,
        label_set: &'s S,
    ) -> Result<MetricEncoder<'s>, std::fmt::Error> {
        debug_assert!(self.family_labels.is_none());

        Ok(MetricEncoder {
            writer: self.writer,
            name: self.name,
            unit: self.unit,
            family_labels: Some(label_set),
        })
    }

    fn write_prefix_name_unit(&mut self) -> Result<(), std::fmt::Error> {
        write_name(self.writer, self.name, self.unit)
    }

    fn write_suffix(&mut self, suffix: &str) -> Result<(), std::fmt::Error> {
        if !suffix.is_empty() {
            self.writer.write_str("_")?;
            self.writer.write_str(suffix)?;
        }
        Ok(())
    }

    fn encode_labels(&mut self, quantile: Option<f64>) -> Result<(), std::fmt::Error> {
        let mut buffer = String::new();
        {
            let mut encoder = LabelSetEncoder {
                writer: &mut buffer,
                first: true,
            };
            if let Some(labels) = self.family_labels {
                labels.encode(&mut encoder)?;
            }
            if let Some(quantile) = quantile {
                encoder.encode_label("quantile", dtoa::Buffer::new().format(quantile))?;
            }
        }

        if buffer.is_empty() {
            return Ok(());
        }

        self.writer.write_str("{")?;
        self.writer.write_str(&buffer)?;
        self.writer.write_str("}")
    }

    fn newline(&mut self) -> Result<(), std::fmt::Error> {
        self.writer.write_str("\n")
    }
}

/// Encoder for a comma separated list of `key="value"` labels.
pub struct LabelSetEncoder<'a> {
    writer: &'a mut dyn Write,
    first: bool,
}

impl std::fmt::Debug for LabelSetEncoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LabelSetEncoder")
            .field("first", &self.first)
            .finish()
    }
}

impl LabelSetEncoder<'_> {
    /// Encode a single label, escaping its value.
    pub fn encode_label(&mut self, key: &str, value: &str) -> Result<(), std::fmt::Error> {
        if !self.first {
            self.writer.write_str(",")?;
        }
        self.first = false;

        self.writer.write_str(key)?;
        self.writer.write_str("=\"")?;
        for c in value.chars() {
            match c {
                '\\' => self.writer.write_str("\\\\")?,
                '"' => self.writer.write_str("\\\"")?,
                '\n' => self.writer.write_str("\\n")?,
                c => self.writer.write_char(c)?,
            }
        }
        self.writer.write_str("\"")
    }
}

fn write_name(writer: &mut dyn Write, name: &str, unit: Option<&Unit>) -> std::fmt::Result {
    writer.write_str(name)?;
    if let Some(unit) = unit {
        writer.write_str("_")?;
        writer.write_str(unit.as_str())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::family::Family;
    use crate::metrics::gauge::Gauge;
    use crate::metrics::summary::Summary;
    use std::time::Duration;

    #[test]
    fn encode_gauge_family() {
        let mut registry = Registry::default();
        let family = Family::<Vec<(String, String)>, Gauge>::default();
        registry.register("card_count", "Cards on server", family.clone());

        family
            .get_or_create(&vec![("category".to_owned(), "insect".to_owned())])
            .set(2.0);
        family
            .get_or_create(&vec![("category".to_owned(), "dragon".to_owned())])
            .set(7.0);

        let mut encoded = String::new();
        encode(&mut encoded, &registry).unwrap();

        let expected = "# HELP card_count Cards on server.\n".to_owned()
            + "# TYPE card_count gauge\n"
            + "card_count{category=\"dragon\"} 7.0\n"
            + "card_count{category=\"insect\"} 2.0\n"
            + "# EOF\n";
        assert_eq!(expected, encoded);
    }

    #[test]
    fn encode_summary() {
        let mut registry = Registry::default();
        let summary = Summary::new(Duration::from_secs(600), 5, &[(0.5, 0.01)]);
        registry.register("exp_count_minutes", "Experience", summary.clone());
        summary.observe(4.0);

        let mut encoded = String::new();
        encode(&mut encoded, &registry).unwrap();

        let expected = "# HELP exp_count_minutes Experience.\n".to_owned()
            + "# TYPE exp_count_minutes summary\n"
            + "exp_count_minutes{quantile=\"0.5\"} 4.0\n"
            + "exp_count_minutes_sum 4.0\n"
            + "exp_count_minutes_count 1\n"
            + "# EOF\n";
        assert_eq!(expected, encoded);
    }

    #[test]
    fn encode_with_unit() {
        let mut registry = Registry::default();
        let gauge = Gauge::default();
        registry.register_with_unit("drain", "Drain time", Unit::Seconds, gauge);

        let mut encoded = String::new();
        encode(&mut encoded, &registry).unwrap();

        let expected = "# HELP drain_seconds Drain time.\n".to_owned()
            + "# TYPE drain_seconds gauge\n"
            + "# UNIT drain_seconds seconds\n"
            + "drain_seconds 0.0\n"
            + "# EOF\n";
        assert_eq!(expected, encoded);
    }

    #[test]
    fn escape_label_values() {
        let mut buffer = String::new();
        let mut encoder = LabelSetEncoder {
            writer: &mut buffer,
            first: true,
        };
        encoder.encode_label("a", "x\"y").unwrap();
        encoder.encode_label("b", "back\\slash\n").unwrap();

        assert_eq!("a=\"x\\\"y\",b=\"back\\\\slash\\n\"", buffer);
    }
}
