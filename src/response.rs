//! Encoding inference results as plain JSON.
//!
//! Fixed-width integers, floats and booleans already serialise to JSON
//! numbers and booleans through `serde`. Non-finite floats have no JSON form
//! and become `null`. Arrays from `ndarray` are the one shape models emit
//! that `serde` would not encode as plain JSON, so [`tensor_to_json`] turns
//! them into nested lists.

use ndarray::{ArrayBase, Axis, Data, Dimension};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Failure to encode a result.
#[derive(Debug, Error)]
#[error("failed to encode inference result: {0}")]
pub struct ResponseError(#[from] serde_json::Error);

/// Encode any serialisable inference result as a JSON value.
///
/// # Errors
///
/// Returns [`ResponseError`] if the value's `Serialize` implementation fails,
/// for example a map with non-string keys.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use taxon_contract::response::build_response;
///
/// #[derive(serde::Serialize)]
/// struct Raw { score: f32, class: u8, flagged: bool }
///
/// let encoded = build_response(&Raw { score: 0.5, class: 6, flagged: true }).unwrap();
/// assert_eq!(encoded, json!({"score": 0.5, "class": 6, "flagged": true}));
/// ```
pub fn build_response<T: Serialize + ?Sized>(result: &T) -> Result<Value, ResponseError> {
    Ok(serde_json::to_value(result)?)
}

/// Convert an `ndarray` array into nested JSON arrays in row-major order.
///
/// A zero-dimensional array becomes its single element.
///
/// # Errors
///
/// Returns [`ResponseError`] if an element cannot be serialised.
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use serde_json::json;
/// use taxon_contract::response::tensor_to_json;
///
/// let probs = array![[0.25_f32, 0.75], [1.0, 0.0]];
/// assert_eq!(tensor_to_json(&probs).unwrap(), json!([[0.25, 0.75], [1.0, 0.0]]));
/// ```
pub fn tensor_to_json<S, D>(array: &ArrayBase<S, D>) -> Result<Value, ResponseError>
where
    S: Data,
    S::Elem: Serialize,
    D: Dimension,
{
    let view = array.view().into_dyn();
    if view.ndim() == 0 {
        return view
            .iter()
            .next()
            .map_or(Ok(Value::Null), build_response);
    }
    view.axis_iter(Axis(0))
        .map(|row| tensor_to_json(&row))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}
