//! Canonical request and response shapes.
//!
//! [`CanonicalInput`] is the normalised request handed to a model adapter and
//! [`CanonicalOutput`] the validated multi-taxonomy result it must produce.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::taxonomy::{LabelMap, ScoreMap, TaxonomyLabel, TaxonomyScore};
use crate::validation::{
    CONFIDENCE_SCORES, OutputValidator, PREDICTED_LABELS, ValidationError, describe,
    parse_confidence_scores, parse_predicted_labels,
};

/// Reasons a request cannot be normalised.
#[derive(Debug, Error)]
pub enum InputError {
    /// None of `text`, `image` or `images` was supplied.
    #[error("either text, image, or images must be provided")]
    MissingModality,
    /// The request item is not a JSON object.
    #[error("request item must be a JSON object, found {found}")]
    NotAnObject { found: String },
    /// A known field has the wrong type.
    #[error("malformed request field: {0}")]
    Malformed(#[source] serde_json::Error),
}

#[derive(Debug, Default, Deserialize)]
struct RawInput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    images: Option<Vec<String>>,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
}

/// A request normalised into the modalities a model may consume.
///
/// At least one of `text`, `image` or `images` is always present. Images are
/// base64 strings; `width` and `height` are hints that are never checked
/// against the decoded media.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use taxon_contract::CanonicalInput;
///
/// let input = CanonicalInput::from_value(json!({"text": "hi"})).unwrap();
/// assert_eq!(input.text(), Some("hi"));
/// assert!(input.image().is_none());
///
/// assert!(CanonicalInput::from_value(json!({})).is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInput")]
pub struct CanonicalInput {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
}

impl TryFrom<RawInput> for CanonicalInput {
    type Error = InputError;

    fn try_from(raw: RawInput) -> Result<Self, Self::Error> {
        if raw.text.is_none() && raw.image.is_none() && raw.images.is_none() {
            return Err(InputError::MissingModality);
        }
        Ok(Self {
            text: raw.text,
            image: raw.image,
            images: raw.images,
            width: raw.width,
            height: raw.height,
        })
    }
}

impl CanonicalInput {
    /// Normalise a raw request item.
    ///
    /// Unknown keys are ignored; known keys are copied without coercion.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::NotAnObject`] for a non-object item,
    /// [`InputError::Malformed`] when a known key has the wrong type, and
    /// [`InputError::MissingModality`] when no content is supplied.
    pub fn from_value(value: Value) -> Result<Self, InputError> {
        if !value.is_object() {
            return Err(InputError::NotAnObject {
                found: describe(&value),
            });
        }
        let raw: RawInput = serde_json::from_value(value).map_err(InputError::Malformed)?;
        Self::try_from(raw)
    }

    /// A text-only request.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self::from_raw(RawInput {
            text: Some(text.into()),
            ..RawInput::default()
        })
    }

    /// A single-image request.
    #[must_use]
    pub fn from_image(image: impl Into<String>) -> Self {
        Self::from_raw(RawInput {
            image: Some(image.into()),
            ..RawInput::default()
        })
    }

    /// A multi-image request.
    #[must_use]
    pub fn from_images(images: Vec<String>) -> Self {
        Self::from_raw(RawInput {
            images: Some(images),
            ..RawInput::default()
        })
    }

    fn from_raw(raw: RawInput) -> Self {
        Self {
            text: raw.text,
            image: raw.image,
            images: raw.images,
            width: raw.width,
            height: raw.height,
        }
    }

    /// Attach text to a request that already carries another modality.
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Attach dimension hints.
    #[must_use]
    pub fn with_dimensions(mut self, width: u32, height: u32) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    #[must_use]
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    #[must_use]
    pub fn images(&self) -> Option<&[String]> {
        self.images.as_deref()
    }

    #[must_use]
    pub fn width(&self) -> Option<u32> {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> Option<u32> {
        self.height
    }
}

/// A validated multi-taxonomy classification result.
///
/// Every constructor runs the [`OutputValidator`]; there is no way to obtain
/// an unvalidated value.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use taxon_contract::CanonicalOutput;
///
/// let raw = json!({
///     "predicted_labels": {"identity_hate": {"positive": 1, "negative": 0}},
///     "confidence_scores": {"identity_hate": {"positive": 0.82, "negative": 0.18}},
/// });
/// let output = CanonicalOutput::from_value(&raw).unwrap();
/// assert_eq!(output.to_mapping(), raw);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalOutput {
    confidence_scores: ScoreMap,
    predicted_labels: LabelMap,
}

impl CanonicalOutput {
    /// Build from a raw `{predicted_labels, confidence_scores}` document
    /// using the baseline rules.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] found.
    pub fn from_value(document: &Value) -> Result<Self, ValidationError> {
        Self::from_value_with(document, &OutputValidator::default())
    }

    /// Build from a raw document using `validator`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Schema`] when either key is missing, null,
    /// or empty, and otherwise the first validation failure.
    pub fn from_value_with(
        document: &Value,
        validator: &OutputValidator,
    ) -> Result<Self, ValidationError> {
        let Some(fields) = document.as_object() else {
            return Err(ValidationError::TypeMismatch {
                path: "output".to_owned(),
                expected: "object",
                found: describe(document),
            });
        };
        let predicted_labels = parse_predicted_labels(required(fields, PREDICTED_LABELS)?)?;
        let confidence_scores = parse_confidence_scores(required(fields, CONFIDENCE_SCORES)?)?;
        validator.validate(&predicted_labels, &confidence_scores)?;
        Ok(Self {
            confidence_scores,
            predicted_labels,
        })
    }

    /// Fold per-taxonomy labels and scores into one output using the
    /// baseline rules.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::DuplicateTaxonomy`] when a taxonomy name
    /// repeats, and otherwise the first validation failure.
    pub fn from_parts(
        labels: impl IntoIterator<Item = TaxonomyLabel>,
        scores: impl IntoIterator<Item = TaxonomyScore>,
    ) -> Result<Self, ValidationError> {
        Self::from_parts_with(labels, scores, &OutputValidator::default())
    }

    /// Fold per-taxonomy labels and scores into one output using `validator`.
    ///
    /// # Errors
    ///
    /// As for [`CanonicalOutput::from_parts`].
    pub fn from_parts_with(
        labels: impl IntoIterator<Item = TaxonomyLabel>,
        scores: impl IntoIterator<Item = TaxonomyScore>,
        validator: &OutputValidator,
    ) -> Result<Self, ValidationError> {
        let mut predicted_labels = LabelMap::new();
        for label in labels {
            let (name, values) = label.into_parts();
            if predicted_labels.contains_key(&name) {
                return Err(ValidationError::DuplicateTaxonomy { name });
            }
            predicted_labels.insert(name, values);
        }
        let mut confidence_scores = ScoreMap::new();
        for score in scores {
            let (name, values) = score.into_parts();
            if confidence_scores.contains_key(&name) {
                return Err(ValidationError::DuplicateTaxonomy { name });
            }
            confidence_scores.insert(name, values);
        }
        validator.validate(&predicted_labels, &confidence_scores)?;
        Ok(Self {
            confidence_scores,
            predicted_labels,
        })
    }

    #[must_use]
    pub fn predicted_labels(&self) -> &LabelMap {
        &self.predicted_labels
    }

    #[must_use]
    pub fn confidence_scores(&self) -> &ScoreMap {
        &self.confidence_scores
    }

    /// The `{confidence_scores, predicted_labels}` response document.
    #[must_use]
    pub fn to_mapping(&self) -> Value {
        let scores: Map<String, Value> = self
            .confidence_scores
            .iter()
            .map(|(taxonomy, values)| {
                let values: Map<String, Value> = values
                    .iter()
                    .map(|(sub_label, score)| (sub_label.clone(), score.to_json()))
                    .collect();
                (taxonomy.clone(), Value::Object(values))
            })
            .collect();
        let labels: Map<String, Value> = self
            .predicted_labels
            .iter()
            .map(|(taxonomy, values)| {
                let values: Map<String, Value> = values
                    .iter()
                    .map(|(sub_label, &indicator)| (sub_label.clone(), Value::from(indicator)))
                    .collect();
                (taxonomy.clone(), Value::Object(values))
            })
            .collect();
        let mut document = Map::with_capacity(2);
        document.insert(CONFIDENCE_SCORES.to_owned(), Value::Object(scores));
        document.insert(PREDICTED_LABELS.to_owned(), Value::Object(labels));
        Value::Object(document)
    }
}

fn required<'a>(fields: &'a Map<String, Value>, key: &str) -> Result<&'a Value, ValidationError> {
    match fields.get(key) {
        None | Some(Value::Null) => Err(ValidationError::Schema),
        Some(Value::Object(entries)) if entries.is_empty() => Err(ValidationError::Schema),
        Some(value) => Ok(value),
    }
}
