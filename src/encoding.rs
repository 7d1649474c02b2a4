//! Exposition format implementations.
//!
//! [`text`] renders the pull sink's registry in the OpenMetrics text format.
//! [`line`] renders push sink observations in the line protocol.

use crate::metrics::MetricType;

pub mod line;
pub mod text;

pub use text::{DescriptorEncoder, LabelSetEncoder, MetricEncoder};

/// Trait implemented by each metric type, e.g.
/// [`Gauge`](crate::metrics::gauge::Gauge), to implement its encoding in
/// the OpenMetric text format.
pub trait EncodeMetric {
    /// Encode the given instance in the OpenMetrics text encoding.
    fn encode(&self, encoder: MetricEncoder) -> Result<(), std::fmt::Error>;

    /// The OpenMetrics metric type of the instance.
    // One can not use [`TypedMetric`] directly, as associated constants are not
    // object safe and thus can not be used with dynamic dispatching.
    fn metric_type(&self) -> MetricType;
}

/// An encodable label set.
pub trait EncodeLabelSet {
    /// Encode oneself into the given encoder.
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error>;
}

impl EncodeLabelSet for () {
    fn encode(&self, _encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        Ok(())
    }
}

impl<K: AsRef<str>, V: AsRef<str>> EncodeLabelSet for Vec<(K, V)> {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        self.as_slice().encode(encoder)
    }
}

impl<K: AsRef<str>, V: AsRef<str>> EncodeLabelSet for &[(K, V)] {
    fn encode(&self, encoder: &mut LabelSetEncoder) -> Result<(), std::fmt::Error> {
        for (key, value) in self.iter() {
            encoder.encode_label(key.as_ref(), value.as_ref())?;
        }
        Ok(())
    }
}

fn is_valid_legacy_char(c: char, i: usize) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == ':' || (c.is_ascii_digit() && i > 0)
}

/// Whether `name` is a valid metric name under the original OpenMetrics
/// character requirements.
pub fn is_valid_legacy_metric_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    for (i, c) in name.chars().enumerate() {
        if !is_valid_legacy_char(c, i) {
            return false;
        }
    }
    true
}

/// Whether `label_name` is a valid label name under the original OpenMetrics
/// character requirements.
pub fn is_valid_legacy_label_name(label_name: &str) -> bool {
    if label_name.is_empty() {
        return false;
    }
    for (i, b) in label_name.chars().enumerate() {
        if !(b.is_ascii_alphabetic() || b == '_' || (b.is_ascii_digit() && i > 0)) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_name_is_legacy_valid() {
        struct Scenario {
            input: &'static str,
            expected: bool,
        }

        let scenarios = vec![
            Scenario {
                input: "online_count_minutes",
                expected: true,
            },
            Scenario {
                input: "_leading_underscore",
                expected: true,
            },
            Scenario {
                input: "1card_count",
                expected: false,
            },
            Scenario {
                input: "colon:in:the:middle",
                expected: true,
            },
            Scenario {
                input: "card count",
                expected: false,
            },
            Scenario {
                input: "",
                expected: false,
            },
            Scenario {
                input: "aÅz",
                expected: false,
            },
        ];

        for scenario in scenarios {
            let result = is_valid_legacy_metric_name(scenario.input);
            assert_eq!(result, scenario.expected, "{}", scenario.input);
        }
    }

    #[test]
    fn label_name_is_legacy_valid() {
        assert!(is_valid_legacy_label_name("category"));
        assert!(is_valid_legacy_label_name("_x9"));
        assert!(!is_valid_legacy_label_name("9x"));
        assert!(!is_valid_legacy_label_name("with:colon"));
        assert!(!is_valid_legacy_label_name(""));
    }
}
