//! Output contract validation.
//!
//! A classifier result is a pair of maps, `predicted_labels` and
//! `confidence_scores`, each keyed by taxonomy and then by sub-label. The
//! baseline rules always apply:
//!
//! - both maps are non-empty;
//! - every taxonomy name and sub-label is a non-empty string;
//! - every label is the integer 0 or 1 and every score a finite number;
//! - both maps name the same taxonomies;
//! - within a taxonomy both maps name the same sub-labels.
//!
//! Keys are compared as sets, never by position. [`OutputValidator`] adds the
//! opt-in checks of a [`ValidationPolicy`]: ordinal monotonicity for declared
//! taxonomies and a `[0, 1]` range for scores.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::api::CanonicalOutput;
use crate::config::{TaxonomyKind, ValidationPolicy};
use crate::taxonomy::{LabelMap, LabelValues, ScoreMap, ScoreValue, ScoreValues};

/// Top-level key holding the discrete decisions.
pub const PREDICTED_LABELS: &str = "predicted_labels";

/// Top-level key holding the confidence scores.
pub const CONFIDENCE_SCORES: &str = "confidence_scores";

/// Reasons a classifier output is rejected.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// A required top-level map is absent, null, or empty.
    #[error("missing predicted_labels or confidence_scores")]
    Schema,
    /// A name, key, or value has the wrong type or domain.
    #[error("{path}: expected {expected}, found {found}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: String,
    },
    /// The two maps name different taxonomies.
    #[error(
        "predicted_labels taxonomies {labels:?} do not match confidence_scores taxonomies {scores:?}"
    )]
    TaxonomyMismatch {
        labels: Vec<String>,
        scores: Vec<String>,
    },
    /// One taxonomy has different sub-labels in the two maps.
    #[error(
        "taxonomy \"{taxonomy}\": predicted_labels sub-labels {labels:?} do not match confidence_scores sub-labels {scores:?}"
    )]
    SubLabelMismatch {
        taxonomy: String,
        labels: Vec<String>,
        scores: Vec<String>,
    },
    /// The same taxonomy was supplied twice when building from parts.
    #[error("taxonomy \"{name}\" is supplied more than once")]
    DuplicateTaxonomy { name: String },
    /// An ordinal taxonomy falls back to 0 after a 1.
    #[error("ordinal taxonomy \"{taxonomy}\": sub-label \"{sub_label}\" is 0 after a preceding 1")]
    OrdinalViolation { taxonomy: String, sub_label: String },
    /// A score lies outside `[0, 1]` under a policy that requires it.
    #[error("taxonomy \"{taxonomy}\": score {value} for \"{sub_label}\" is outside [0, 1]")]
    ScoreOutOfRange {
        taxonomy: String,
        sub_label: String,
        value: f64,
    },
}

impl ValidationError {
    /// The taxonomy the failure concerns, when it names one.
    #[must_use]
    pub fn taxonomy(&self) -> Option<&str> {
        match self {
            Self::SubLabelMismatch { taxonomy, .. }
            | Self::OrdinalViolation { taxonomy, .. }
            | Self::ScoreOutOfRange { taxonomy, .. } => Some(taxonomy),
            Self::DuplicateTaxonomy { name } => Some(name),
            Self::Schema | Self::TypeMismatch { .. } | Self::TaxonomyMismatch { .. } => None,
        }
    }
}

fn type_mismatch(path: impl Into<String>, expected: &'static str, found: impl Into<String>) -> ValidationError {
    ValidationError::TypeMismatch {
        path: path.into(),
        expected,
        found: found.into(),
    }
}

/// Short description of a JSON value for error messages.
pub(crate) fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(b) => format!("boolean {b}"),
        Value::Number(n) => n.to_string(),
        Value::String(_) => "string".to_owned(),
        Value::Array(_) => "array".to_owned(),
        Value::Object(_) => "object".to_owned(),
    }
}

fn check_name(parent: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(type_mismatch(parent, "non-empty name", "empty string"));
    }
    Ok(())
}

/// Structural checks for one taxonomy of `predicted_labels`.
///
/// # Errors
///
/// Returns [`ValidationError::TypeMismatch`] for an empty name, an empty
/// sub-label map, an empty sub-label, or an indicator other than 0 or 1.
pub fn check_label_entry(taxonomy: &str, values: &LabelValues) -> Result<(), ValidationError> {
    check_name(PREDICTED_LABELS, taxonomy)?;
    let path = format!("{PREDICTED_LABELS}.{taxonomy}");
    if values.is_empty() {
        return Err(type_mismatch(path, "at least one sub-label", "empty object"));
    }
    for (sub_label, &value) in values {
        check_name(&path, sub_label)?;
        if value > 1 {
            return Err(type_mismatch(
                format!("{path}.{sub_label}"),
                "integer 0 or 1",
                value.to_string(),
            ));
        }
    }
    Ok(())
}

/// Structural checks for one taxonomy of `confidence_scores`.
///
/// # Errors
///
/// Returns [`ValidationError::TypeMismatch`] for an empty name, an empty
/// sub-label map, an empty sub-label, or a non-finite score.
pub fn check_score_entry(taxonomy: &str, scores: &ScoreValues) -> Result<(), ValidationError> {
    check_name(CONFIDENCE_SCORES, taxonomy)?;
    let path = format!("{CONFIDENCE_SCORES}.{taxonomy}");
    if scores.is_empty() {
        return Err(type_mismatch(path, "at least one sub-label", "empty object"));
    }
    for (sub_label, score) in scores {
        check_name(&path, sub_label)?;
        if !score.as_f64().is_finite() {
            return Err(type_mismatch(
                format!("{path}.{sub_label}"),
                "finite number",
                score.as_f64().to_string(),
            ));
        }
    }
    Ok(())
}

/// Check every taxonomy of `predicted_labels`.
///
/// # Errors
///
/// Returns the first [`check_label_entry`] failure.
pub fn check_predicted_labels(labels: &LabelMap) -> Result<(), ValidationError> {
    labels
        .iter()
        .try_for_each(|(taxonomy, values)| check_label_entry(taxonomy, values))
}

/// Check every taxonomy of `confidence_scores`.
///
/// # Errors
///
/// Returns the first [`check_score_entry`] failure.
pub fn check_confidence_scores(scores: &ScoreMap) -> Result<(), ValidationError> {
    scores
        .iter()
        .try_for_each(|(taxonomy, values)| check_score_entry(taxonomy, values))
}

fn sorted_keys<V>(map: &indexmap::IndexMap<String, V>) -> Vec<String> {
    let mut keys: Vec<String> = map.keys().cloned().collect();
    keys.sort_unstable();
    keys
}

fn same_keys<A, B>(a: &indexmap::IndexMap<String, A>, b: &indexmap::IndexMap<String, B>) -> bool {
    a.len() == b.len() && a.keys().all(|key| b.contains_key(key))
}

/// Both maps must name exactly the same taxonomies.
///
/// # Errors
///
/// Returns [`ValidationError::TaxonomyMismatch`] listing both name sets.
pub fn check_keys_match(labels: &LabelMap, scores: &ScoreMap) -> Result<(), ValidationError> {
    if same_keys(labels, scores) {
        Ok(())
    } else {
        Err(ValidationError::TaxonomyMismatch {
            labels: sorted_keys(labels),
            scores: sorted_keys(scores),
        })
    }
}

/// Within every taxonomy both maps must name exactly the same sub-labels.
///
/// Two empty maps pass trivially.
///
/// # Errors
///
/// Returns [`ValidationError::SubLabelMismatch`] for the first taxonomy whose
/// sub-label sets differ, or [`ValidationError::TaxonomyMismatch`] when a
/// scored taxonomy has no labels at all.
pub fn check_value_keys_match(labels: &LabelMap, scores: &ScoreMap) -> Result<(), ValidationError> {
    if labels.is_empty() && scores.is_empty() {
        return Ok(());
    }
    for (taxonomy, score_values) in scores {
        let Some(label_values) = labels.get(taxonomy) else {
            return Err(ValidationError::TaxonomyMismatch {
                labels: sorted_keys(labels),
                scores: sorted_keys(scores),
            });
        };
        if !same_keys(label_values, score_values) {
            return Err(ValidationError::SubLabelMismatch {
                taxonomy: taxonomy.clone(),
                labels: sorted_keys(label_values),
                scores: sorted_keys(score_values),
            });
        }
    }
    Ok(())
}

/// Once an ordinal taxonomy reports 1, every later sub-label must be 1 too.
///
/// # Errors
///
/// Returns [`ValidationError::OrdinalViolation`] naming the first 0 that
/// follows a 1.
pub fn check_ordinal(taxonomy: &str, values: &LabelValues) -> Result<(), ValidationError> {
    let mut raised = false;
    for (sub_label, &value) in values {
        if value == 1 {
            raised = true;
        } else if raised {
            return Err(ValidationError::OrdinalViolation {
                taxonomy: taxonomy.to_owned(),
                sub_label: sub_label.clone(),
            });
        }
    }
    Ok(())
}

/// Every score must lie in `[0, 1]`.
///
/// # Errors
///
/// Returns [`ValidationError::ScoreOutOfRange`] for the first offending score.
pub fn check_unit_interval(scores: &ScoreMap) -> Result<(), ValidationError> {
    for (taxonomy, values) in scores {
        for (sub_label, score) in values {
            let value = score.as_f64();
            if !(0.0..=1.0).contains(&value) {
                return Err(ValidationError::ScoreOutOfRange {
                    taxonomy: taxonomy.clone(),
                    sub_label: sub_label.clone(),
                    value,
                });
            }
        }
    }
    Ok(())
}

fn object_at<'a>(path: &str, raw: &'a Value) -> Result<&'a Map<String, Value>, ValidationError> {
    raw.as_object()
        .ok_or_else(|| type_mismatch(path, "object", describe(raw)))
}

/// Read `predicted_labels` from JSON, enforcing value types.
///
/// Sub-label values must be JSON integers equal to 0 or 1; `true`, `1.0`,
/// `2` and `-1` are all rejected.
///
/// # Errors
///
/// Returns [`ValidationError::TypeMismatch`] for a non-object at either level
/// or a value outside {0, 1}.
pub fn parse_predicted_labels(raw: &Value) -> Result<LabelMap, ValidationError> {
    let taxonomies = object_at(PREDICTED_LABELS, raw)?;
    let mut labels = LabelMap::with_capacity(taxonomies.len());
    for (taxonomy, entry) in taxonomies {
        let path = format!("{PREDICTED_LABELS}.{taxonomy}");
        let sub_labels = object_at(&path, entry)?;
        let mut values = LabelValues::with_capacity(sub_labels.len());
        for (sub_label, value) in sub_labels {
            let indicator = match value.as_u64() {
                Some(0) => 0,
                Some(1) => 1,
                _ => {
                    return Err(type_mismatch(
                        format!("{path}.{sub_label}"),
                        "integer 0 or 1",
                        describe(value),
                    ));
                }
            };
            values.insert(sub_label.clone(), indicator);
        }
        labels.insert(taxonomy.clone(), values);
    }
    Ok(labels)
}

/// Read `confidence_scores` from JSON, enforcing value types.
///
/// # Errors
///
/// Returns [`ValidationError::TypeMismatch`] for a non-object at either level
/// or a value that is not a JSON number.
pub fn parse_confidence_scores(raw: &Value) -> Result<ScoreMap, ValidationError> {
    let taxonomies = object_at(CONFIDENCE_SCORES, raw)?;
    let mut scores = ScoreMap::with_capacity(taxonomies.len());
    for (taxonomy, entry) in taxonomies {
        let path = format!("{CONFIDENCE_SCORES}.{taxonomy}");
        let sub_labels = object_at(&path, entry)?;
        let mut values = ScoreValues::with_capacity(sub_labels.len());
        for (sub_label, value) in sub_labels {
            let score = ScoreValue::from_json(value).ok_or_else(|| {
                type_mismatch(format!("{path}.{sub_label}"), "number", describe(value))
            })?;
            values.insert(sub_label.clone(), score);
        }
        scores.insert(taxonomy.clone(), values);
    }
    Ok(scores)
}

/// Accept/reject decision for classifier outputs.
///
/// The default validator applies only the baseline rules.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use taxon_contract::validation::{OutputValidator, parse_confidence_scores, parse_predicted_labels};
///
/// let labels = parse_predicted_labels(&json!({"hate": {"a": 1, "b": 0}})).unwrap();
/// let scores = parse_confidence_scores(&json!({"hate": {"a": 0.5, "c": 0.5}})).unwrap();
/// assert!(OutputValidator::default().validate(&labels, &scores).is_err());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputValidator {
    policy: ValidationPolicy,
}

impl OutputValidator {
    #[must_use]
    pub fn new(policy: ValidationPolicy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &ValidationPolicy {
        &self.policy
    }

    /// Run the baseline rules followed by the policy checks.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Schema`] when either map is empty, then the
    /// first structural, key-set, or policy failure.
    pub fn validate(&self, labels: &LabelMap, scores: &ScoreMap) -> Result<(), ValidationError> {
        if labels.is_empty() || scores.is_empty() {
            return Err(ValidationError::Schema);
        }
        check_predicted_labels(labels)?;
        check_confidence_scores(scores)?;
        check_keys_match(labels, scores)?;
        check_value_keys_match(labels, scores)?;
        self.check_policy(labels, scores)
    }

    /// Apply only the policy checks to an already constructed output.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::OrdinalViolation`] or
    /// [`ValidationError::ScoreOutOfRange`].
    pub fn apply_policy(&self, output: &CanonicalOutput) -> Result<(), ValidationError> {
        self.check_policy(output.predicted_labels(), output.confidence_scores())
    }

    fn check_policy(&self, labels: &LabelMap, scores: &ScoreMap) -> Result<(), ValidationError> {
        for (taxonomy, kind) in &self.policy.taxonomies {
            if *kind != TaxonomyKind::Ordinal {
                continue;
            }
            if let Some(values) = labels.get(taxonomy) {
                check_ordinal(taxonomy, values)?;
            }
        }
        if self.policy.require_unit_interval {
            check_unit_interval(scores)?;
        }
        Ok(())
    }
}
