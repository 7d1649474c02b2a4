//! Point-in-time observations handed from the poll loops to a sink.

use std::time::{SystemTime, UNIX_EPOCH};

/// The value of an [`Observation`].
///
/// A closed set, so every encoder handles every value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// A raw count or sum.
    Int(i64),
    /// A derived value, e.g. a currency total after denomination folding.
    Float(f64),
    /// Free text. Only meaningful to the push sink.
    Str(String),
}

impl Value {
    /// The value as a float, if it is numeric.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Str(_) => None,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

/// One emitted data point of a metric family.
#[derive(Clone, Debug, PartialEq)]
pub struct Observation {
    family: String,
    labels: Vec<String>,
    value: Value,
    timestamp: SystemTime,
}

impl Observation {
    /// Create an observation of `family` with the given label values, in the
    /// order of the family's label dimensions.
    pub fn new(
        family: impl Into<String>,
        labels: Vec<String>,
        value: impl Into<Value>,
        timestamp: SystemTime,
    ) -> Self {
        Observation {
            family: family.into(),
            labels,
            value: value.into(),
            timestamp,
        }
    }

    /// Name of the family this observation belongs to.
    pub fn family(&self) -> &str {
        &self.family
    }

    /// Label values, positionally matching the family's dimensions.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// The observed value.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// When the observation was made.
    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    /// Seconds since the unix epoch, saturating at zero for earlier times.
    pub fn unix_seconds(&self) -> u64 {
        self.timestamp
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn numeric_values() {
        assert_eq!(Some(3.0), Value::Int(3).as_f64());
        assert_eq!(Some(2.5), Value::Float(2.5).as_f64());
        assert_eq!(None, Value::from("x").as_f64());
    }

    #[test]
    fn unix_seconds() {
        let at = UNIX_EPOCH + Duration::from_millis(1_700_000_000_900);
        let observation = Observation::new("online_count", vec![], 1, at);
        assert_eq!(1_700_000_000, observation.unix_seconds());
    }
}
