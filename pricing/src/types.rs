//! Derived pricing records.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operator configuration for one instance type. The set of configured
/// types is closed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InstanceTypeSpec {
    pub instance_type: String,

    /// Capacity units one instance of this type contributes.
    pub utility: f64,

    /// Per-hour deduction applied to the bid price when accounting
    /// against the budget (reserved-capacity credits and the like).
    #[serde(default)]
    pub discount: f64,
}

/// One hour bucket of a (zone, type) price series.
#[derive(Debug, Clone, PartialEq)]
pub struct HourlyPricePoint {
    pub availability_zone: String,
    pub instance_type: String,
    pub hour: DateTime<Utc>,
    pub max_price: f64,
    pub count: usize,
    /// Price of the newest sample in the series, repeated on every
    /// bucket of that series.
    pub current_price: f64,
}

/// A (zone, instance type) pairing annotated with derived pricing
/// statistics, ranked by `estimated_value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub availability_zone: String,
    pub type_spec: InstanceTypeSpec,

    /// Configured-percentile price over the hourly maxima.
    pub price_80: f64,
    pub max_price: f64,
    pub current_price: Option<f64>,

    /// Hourly maxima, ascending.
    pub all_price: Vec<f64>,

    /// `utility / price_80`, the ranking key.
    pub estimated_value: f64,

    /// Smallest observed hourly maximum strictly above `price_80`, if
    /// any price up there was seen at all.
    pub higher_price: Option<f64>,
}

/// The ranked candidate list plus a per-type index.
///
/// The index keeps the first (best-ranked) candidate per instance type;
/// it is what budget accounting and instance markup joins key on.
#[derive(Debug, Clone, Default)]
pub struct PriceTable {
    candidates: Vec<Candidate>,
    by_type: HashMap<String, usize>,
}

impl PriceTable {
    pub fn new(candidates: Vec<Candidate>) -> Self {
        let mut by_type = HashMap::new();
        for (i, c) in candidates.iter().enumerate() {
            by_type
                .entry(c.type_spec.instance_type.clone())
                .or_insert(i);
        }
        Self {
            candidates,
            by_type,
        }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn lookup(&self, instance_type: &str) -> Option<&Candidate> {
        self.by_type.get(instance_type).map(|&i| &self.candidates[i])
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
