//! The contract a model owner implements.
//!
//! A [`ModelAdapter`] wraps one user-supplied model. The layer never looks
//! inside the model: it builds the adapter once through [`ModelAdapter::init`],
//! then calls `map_input`, `infer`/`infer_batch` and `map_output` for every
//! request. Model state lives as long as the adapter, which is shared by all
//! calls, so implementations must tolerate concurrent `infer` calls.

mod analysis;
mod model_root;

pub use analysis::{
    AnalysisResult, HarmCategoryResponse, ImageAnalysisHooks, ImageAnalysisRequest,
    TextAnalysisHooks, TextAnalysisRequest, decode_image, encode_image,
};
pub use model_root::{InitError, ModelRoot, compute_sha256};

use serde::{Serialize, de::DeserializeOwned};

use crate::api::{CanonicalInput, CanonicalOutput};
use crate::validation::ValidationError;

/// Boxed error used where the concrete type belongs to someone else.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Bridges canonical requests and results to one concrete model.
///
/// # Examples
///
/// ```
/// use std::convert::Infallible;
/// use serde::{Deserialize, Serialize};
/// use taxon_contract::adapter::{InitError, ModelAdapter, ModelRoot};
/// use taxon_contract::taxonomy::{TaxonomyLabel, TaxonomyScore};
/// use taxon_contract::{CanonicalInput, CanonicalOutput, ValidationError};
///
/// #[derive(Deserialize)]
/// struct Text { data: String }
///
/// #[derive(Serialize)]
/// struct Score { score: f64 }
///
/// struct Shouting;
///
/// impl ModelAdapter for Shouting {
///     type Input = Text;
///     type Output = Score;
///     type Error = Infallible;
///
///     fn init(_root: &ModelRoot) -> Result<Self, InitError> {
///         Ok(Self)
///     }
///
///     fn infer(&self, input: Text) -> Result<Score, Infallible> {
///         let shouting = !input.data.is_empty() && input.data == input.data.to_uppercase();
///         Ok(Score { score: if shouting { 0.9 } else { 0.1 } })
///     }
///
///     fn map_input(&self, input: &CanonicalInput) -> Text {
///         Text { data: input.text().unwrap_or_default().to_owned() }
///     }
///
///     fn map_output(&self, output: Score) -> Result<CanonicalOutput, ValidationError> {
///         let flagged = u8::from(output.score > 0.5);
///         CanonicalOutput::from_parts(
///             [TaxonomyLabel::new("shouting", [("positive", flagged), ("negative", 1 - flagged)])?],
///             [TaxonomyScore::new("shouting", [("positive", output.score), ("negative", 1.0 - output.score)])?],
///         )
///     }
/// }
///
/// let output = Shouting.infer(Text { data: "HEY".into() }).unwrap();
/// assert!(Shouting.map_output(output).is_ok());
/// ```
pub trait ModelAdapter: Send + Sync {
    /// The model's native input, also accepted verbatim in raw mode.
    type Input: DeserializeOwned;
    /// The model's native output, returned verbatim in raw mode.
    type Output: Serialize;
    /// Failure raised by the model itself. Propagated to callers unchanged.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load weights and other artefacts from `root`.
    ///
    /// # Errors
    ///
    /// Returns an [`InitError`] when artefacts are missing or cannot be loaded.
    /// Callers treat this as fatal to start-up.
    fn init(root: &ModelRoot) -> Result<Self, InitError>
    where
        Self: Sized;

    /// Run the model on one input.
    ///
    /// # Errors
    ///
    /// Returns the model's own error.
    fn infer(&self, input: Self::Input) -> Result<Self::Output, Self::Error>;

    /// Run the model on a batch, returning outputs index-aligned with inputs.
    ///
    /// The default runs [`ModelAdapter::infer`] item by item; models that
    /// vectorise should override it.
    ///
    /// # Errors
    ///
    /// Returns the model's own error.
    fn infer_batch(&self, inputs: Vec<Self::Input>) -> Result<Vec<Self::Output>, Self::Error> {
        inputs.into_iter().map(|input| self.infer(input)).collect()
    }

    /// Project a canonical request onto the model's input.
    fn map_input(&self, input: &CanonicalInput) -> Self::Input;

    /// Shape a model output into a validated canonical result.
    ///
    /// # Errors
    ///
    /// Returns the [`ValidationError`] raised while building the output.
    fn map_output(&self, output: Self::Output) -> Result<CanonicalOutput, ValidationError>;

    /// Optional text content-safety translation. Absent by default.
    fn text_analysis(
        &self,
    ) -> Option<&dyn TextAnalysisHooks<Input = Self::Input, Output = Self::Output>> {
        None
    }

    /// Optional image content-safety translation. Absent by default.
    fn image_analysis(
        &self,
    ) -> Option<&dyn ImageAnalysisHooks<Input = Self::Input, Output = Self::Output>> {
        None
    }
}
