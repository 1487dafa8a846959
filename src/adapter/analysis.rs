//! Optional translation between content-safety requests and a model.
//!
//! Some deployments front a model with a fixed four-category harm schema
//! (hate, self-harm, sexual, violence). Adapters that want to be offered
//! there implement [`TextAnalysisHooks`] and/or [`ImageAnalysisHooks`] and
//! return themselves from `ModelAdapter::text_analysis`/`image_analysis`.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

/// A text content-safety request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextAnalysisRequest {
    pub text: String,
}

/// An image content-safety request carrying raw image bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageAnalysisRequest {
    pub data: Vec<u8>,
}

/// Score and severity for one harm category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub harmful_score: f64,
    pub severity_level: u8,
}

/// Per-category analysis returned to the content-safety caller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HarmCategoryResponse {
    pub hate: AnalysisResult,
    pub self_harm: AnalysisResult,
    pub sexual: AnalysisResult,
    pub violence: AnalysisResult,
}

/// Translate text content-safety traffic to and from a model.
pub trait TextAnalysisHooks {
    type Input;
    type Output;

    fn text_request_to_input(&self, request: &TextAnalysisRequest) -> Self::Input;

    fn output_to_text_response(&self, output: Self::Output) -> HarmCategoryResponse;
}

/// Translate image content-safety traffic to and from a model.
pub trait ImageAnalysisHooks {
    type Input;
    type Output;

    fn image_request_to_input(&self, request: &ImageAnalysisRequest) -> Self::Input;

    fn output_to_image_response(&self, output: Self::Output) -> HarmCategoryResponse;
}

/// Standard base64 encoding for forwarding image bytes to a model.
///
/// # Examples
///
/// ```
/// use taxon_contract::adapter::{decode_image, encode_image};
///
/// let encoded = encode_image(b"\x89PNG");
/// assert_eq!(decode_image(&encoded).unwrap(), b"\x89PNG");
/// ```
#[must_use]
pub fn encode_image(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode a base64 image string from a canonical request.
///
/// # Errors
///
/// Returns [`base64::DecodeError`] for malformed input.
pub fn decode_image(encoded: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(encoded)
}
