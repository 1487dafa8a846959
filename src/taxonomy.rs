//! Per-taxonomy label and score assignments.
//!
//! A taxonomy groups sub-labels under one name (for example `hate` with
//! `positive` and `negative`). [`TaxonomyLabel`] carries the discrete 0/1
//! decision for each sub-label and [`TaxonomyScore`] the continuous
//! confidence. Both are only constructible through validating constructors.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

use crate::validation::{ValidationError, check_label_entry, check_score_entry};

/// Indicator values for one taxonomy, keyed by sub-label in emission order.
pub type LabelValues = IndexMap<String, u8>;

/// Confidence scores for one taxonomy, keyed by sub-label in emission order.
pub type ScoreValues = IndexMap<String, ScoreValue>;

/// Indicator values for every taxonomy, keyed by taxonomy name.
pub type LabelMap = IndexMap<String, LabelValues>;

/// Confidence scores for every taxonomy, keyed by taxonomy name.
pub type ScoreMap = IndexMap<String, ScoreValues>;

/// A numeric confidence score.
///
/// Integers and floats are kept apart so a document survives validation
/// without `1` turning into `1.0`.
///
/// # Examples
///
/// ```
/// use taxon_contract::taxonomy::ScoreValue;
///
/// assert_eq!(ScoreValue::from(1_i64).as_f64(), 1.0);
/// assert_eq!(ScoreValue::from(0.25).as_f64(), 0.25);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreValue {
    Integer(i64),
    Float(f64),
}

impl ScoreValue {
    /// The score as a float.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "scores are compared as floats; precision beyond 2^53 is irrelevant"
    )]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Integer(value) => value as f64,
            Self::Float(value) => value,
        }
    }

    /// Read a score from a JSON number.
    ///
    /// Returns [`None`] for anything that is not a number, including booleans.
    #[must_use]
    pub fn from_json(value: &Value) -> Option<Self> {
        let Value::Number(number) = value else {
            return None;
        };
        number
            .as_i64()
            .map(Self::Integer)
            .or_else(|| number.as_f64().map(Self::Float))
    }

    /// The score as a JSON value. Non-finite floats have no JSON form and
    /// become `null`.
    #[must_use]
    pub fn to_json(self) -> Value {
        match self {
            Self::Integer(value) => Value::from(value),
            Self::Float(value) => Number::from_f64(value).map_or(Value::Null, Value::Number),
        }
    }
}

impl From<f64> for ScoreValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<f32> for ScoreValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<i64> for ScoreValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// The 0/1 decision for every sub-label of one taxonomy.
///
/// # Examples
///
/// ```
/// use taxon_contract::taxonomy::TaxonomyLabel;
///
/// let label = TaxonomyLabel::new("hate", [("positive", 1), ("negative", 0)]).unwrap();
/// assert_eq!(label.name(), "hate");
/// assert_eq!(label.values().get("positive"), Some(&1));
///
/// assert!(TaxonomyLabel::new("hate", [("positive", 2)]).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaxonomyLabel {
    name: String,
    values: LabelValues,
}

impl TaxonomyLabel {
    /// Build a label assignment from sub-label/indicator pairs.
    ///
    /// A repeated sub-label keeps its last value.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TypeMismatch`] when the name or a sub-label
    /// is empty, no sub-labels are given, or an indicator is not 0 or 1.
    pub fn new<K, I>(name: impl Into<String>, values: I) -> Result<Self, ValidationError>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, u8)>,
    {
        let name = name.into();
        let values: LabelValues = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        check_label_entry(&name, &values)?;
        Ok(Self { name, values })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn values(&self) -> &LabelValues {
        &self.values
    }

    /// Split into the taxonomy name and its indicator map.
    #[must_use]
    pub fn into_parts(self) -> (String, LabelValues) {
        (self.name, self.values)
    }
}

/// The confidence distribution over the sub-labels of one taxonomy.
///
/// Scores are intended to lie in `[0, 1]` but only finiteness is required
/// here; the range is an opt-in policy check.
///
/// # Examples
///
/// ```
/// use taxon_contract::taxonomy::{ScoreValue, TaxonomyScore};
///
/// let score = TaxonomyScore::new("hate", [("positive", 0.82), ("negative", 0.18)]).unwrap();
/// assert_eq!(score.scores().get("negative"), Some(&ScoreValue::Float(0.18)));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct TaxonomyScore {
    name: String,
    scores: ScoreValues,
}

impl TaxonomyScore {
    /// Build a score assignment from sub-label/score pairs.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::TypeMismatch`] when the name or a sub-label
    /// is empty, no sub-labels are given, or a score is not finite.
    pub fn new<K, S, I>(name: impl Into<String>, scores: I) -> Result<Self, ValidationError>
    where
        K: Into<String>,
        S: Into<ScoreValue>,
        I: IntoIterator<Item = (K, S)>,
    {
        let name = name.into();
        let scores: ScoreValues = scores
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        check_score_entry(&name, &scores)?;
        Ok(Self { name, scores })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn scores(&self) -> &ScoreValues {
        &self.scores
    }

    #[must_use]
    pub fn into_parts(self) -> (String, ScoreValues) {
        (self.name, self.scores)
    }
}
