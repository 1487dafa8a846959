//! Single-item and batch request handling around a [`ModelAdapter`].
//!
//! Each call runs in one of two modes chosen by its [`RequestContext`]:
//!
//! - raw: the payload is the model's own input and the model's output is
//!   returned untouched (a single item comes back as a one-element list);
//! - normalised: payload → [`CanonicalInput`] → `map_input` → inference →
//!   `map_output` → [`CanonicalOutput`] → response document.
//!
//! A batch always reaches the model through exactly one `infer_batch` call,
//! so every item is prepared before inference and any item failure fails the
//! whole batch.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::adapter::{
    BoxError, HarmCategoryResponse, ImageAnalysisRequest, InitError, ModelAdapter, ModelRoot,
    TextAnalysisRequest,
};
use crate::api::{CanonicalInput, CanonicalOutput, InputError};
use crate::config::ValidationPolicy;
use crate::response::{ResponseError, build_response};
use crate::validation::{OutputValidator, ValidationError};

/// Per-call options, threaded through every request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestContext {
    /// Route the payload through the canonical input/output path.
    pub normalize: bool,
}

impl RequestContext {
    /// Payloads are the model's own input.
    pub const RAW: Self = Self { normalize: false };
    /// Payloads are canonical requests.
    pub const NORMALIZED: Self = Self { normalize: true };
}

/// Failures of a dispatched call. `E` is the adapter's own error type.
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    /// The payload is neither a single item nor a list of items.
    #[error("invalid input data format: expected an object or a list, found {found}")]
    InvalidInputShape { found: String },
    /// A canonical request could not be normalised.
    #[error("item {index}: {source}")]
    Input {
        index: usize,
        #[source]
        source: InputError,
    },
    /// A raw payload does not match the model's input type.
    #[error("item {index}: payload does not match the model input: {source}")]
    Payload {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
    /// The adapter's output violates the output contract.
    #[error("item {index}: {source}")]
    Output {
        index: usize,
        #[source]
        source: ValidationError,
    },
    /// A raw model output could not be encoded.
    #[error("item {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: ResponseError,
    },
    /// `infer_batch` broke index alignment.
    #[error("infer_batch returned {actual} outputs for {expected} inputs")]
    BatchLength { expected: usize, actual: usize },
    /// The adapter does not offer an optional capability.
    #[error("model does not support {0}")]
    Unsupported(&'static str),
    /// The external batching collaborator failed.
    #[error("batching collaborator failed: {0}")]
    Batcher(#[source] BoxError),
    /// The model itself failed.
    #[error(transparent)]
    Model(E),
}

/// List-in/list-out entry point driven by a batching collaborator.
pub trait Predictor: Send + Sync {
    /// Run a batch of payloads in the given mode.
    ///
    /// # Errors
    ///
    /// Returns the boxed [`DispatchError`] of the underlying dispatcher.
    fn predict(&self, items: Vec<Value>, context: &RequestContext) -> Result<Vec<Value>, BoxError>;
}

/// Runs requests through one model adapter.
#[derive(Debug)]
pub struct Dispatcher<A> {
    adapter: A,
    validator: OutputValidator,
}

impl<A: ModelAdapter> Dispatcher<A> {
    #[must_use]
    pub fn new(adapter: A) -> Self {
        Self {
            adapter,
            validator: OutputValidator::default(),
        }
    }

    /// Initialise the adapter from `root` and wrap it.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`InitError`].
    pub fn init(root: &ModelRoot) -> Result<Self, InitError> {
        tracing::info!(root = %root.path().display(), "initialising model adapter");
        A::init(root).map(Self::new)
    }

    /// Apply `policy` to every output on top of the baseline rules.
    #[must_use]
    pub fn with_policy(mut self, policy: ValidationPolicy) -> Self {
        self.validator = OutputValidator::new(policy);
        self
    }

    #[must_use]
    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Handle one request item.
    ///
    /// Raw mode returns a one-element list holding the model output;
    /// normalised mode returns the response document.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] for a malformed item, a model failure, or
    /// a contract violation.
    pub fn run(&self, item: Value, context: &RequestContext) -> Result<Value, DispatchError<A::Error>> {
        tracing::info!(normalize = context.normalize, "running single inference");
        if !context.normalize {
            let input = deserialize_input::<A>(0, item)?;
            let output = self.adapter.infer(input).map_err(DispatchError::Model)?;
            return Ok(Value::Array(vec![encode_output::<A>(0, &output)?]));
        }
        let canonical =
            CanonicalInput::from_value(item).map_err(|source| DispatchError::Input { index: 0, source })?;
        let input = self.adapter.map_input(&canonical);
        tracing::debug!(inputs = 1, "converted canonical inputs");
        let output = self.adapter.infer(input).map_err(DispatchError::Model)?;
        self.finish(0, output).map(|output| output.to_mapping())
    }

    /// Handle a batch of request items with a single `infer_batch` call.
    ///
    /// Results are index-aligned with `items`. An empty batch returns an
    /// empty list without calling the model.
    ///
    /// # Errors
    ///
    /// Returns the first item failure, a model failure, or
    /// [`DispatchError::BatchLength`] when the model breaks alignment.
    pub fn run_batch(
        &self,
        items: Vec<Value>,
        context: &RequestContext,
    ) -> Result<Vec<Value>, DispatchError<A::Error>> {
        tracing::info!(
            items = items.len(),
            normalize = context.normalize,
            "running batch inference"
        );
        if items.is_empty() {
            return Ok(Vec::new());
        }
        if !context.normalize {
            let inputs = items
                .into_iter()
                .enumerate()
                .map(|(index, item)| deserialize_input::<A>(index, item))
                .collect::<Result<Vec<_>, _>>()?;
            let outputs = self.infer_batch(inputs)?;
            return outputs
                .iter()
                .enumerate()
                .map(|(index, output)| encode_output::<A>(index, output))
                .collect();
        }
        let inputs = items
            .into_iter()
            .enumerate()
            .map(|(index, item)| {
                CanonicalInput::from_value(item)
                    .map(|canonical| self.adapter.map_input(&canonical))
                    .map_err(|source| DispatchError::Input { index, source })
            })
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!(inputs = inputs.len(), "converted canonical inputs");
        let outputs = self.infer_batch(inputs)?;
        outputs
            .into_iter()
            .enumerate()
            .map(|(index, output)| self.finish(index, output).map(|output| output.to_mapping()))
            .collect()
    }

    /// Run a text content-safety request through the adapter's hooks.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unsupported`] when the adapter offers no text
    /// hooks, or the model's failure.
    pub fn analyze_text(
        &self,
        request: &TextAnalysisRequest,
    ) -> Result<HarmCategoryResponse, DispatchError<A::Error>> {
        let hooks = self
            .adapter
            .text_analysis()
            .ok_or(DispatchError::Unsupported("text analysis"))?;
        let output = self
            .adapter
            .infer(hooks.text_request_to_input(request))
            .map_err(DispatchError::Model)?;
        Ok(hooks.output_to_text_response(output))
    }

    /// Run an image content-safety request through the adapter's hooks.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Unsupported`] when the adapter offers no image
    /// hooks, or the model's failure.
    pub fn analyze_image(
        &self,
        request: &ImageAnalysisRequest,
    ) -> Result<HarmCategoryResponse, DispatchError<A::Error>> {
        let hooks = self
            .adapter
            .image_analysis()
            .ok_or(DispatchError::Unsupported("image analysis"))?;
        let output = self
            .adapter
            .infer(hooks.image_request_to_input(request))
            .map_err(DispatchError::Model)?;
        Ok(hooks.output_to_image_response(output))
    }

    fn infer_batch(&self, inputs: Vec<A::Input>) -> Result<Vec<A::Output>, DispatchError<A::Error>> {
        let expected = inputs.len();
        let outputs = self
            .adapter
            .infer_batch(inputs)
            .map_err(DispatchError::Model)?;
        tracing::debug!(outputs = outputs.len(), "batch inference finished");
        if outputs.len() != expected {
            return Err(DispatchError::BatchLength {
                expected,
                actual: outputs.len(),
            });
        }
        Ok(outputs)
    }

    fn finish(&self, index: usize, output: A::Output) -> Result<CanonicalOutput, DispatchError<A::Error>> {
        let checked = self
            .adapter
            .map_output(output)
            .and_then(|canonical| self.validator.apply_policy(&canonical).map(|()| canonical));
        checked.map_err(|source| {
            tracing::warn!(
                index,
                taxonomy = source.taxonomy().unwrap_or("-"),
                "model output violates the output contract"
            );
            DispatchError::Output { index, source }
        })
    }
}

impl<A: ModelAdapter> Predictor for Dispatcher<A> {
    fn predict(&self, items: Vec<Value>, context: &RequestContext) -> Result<Vec<Value>, BoxError> {
        self.run_batch(items, context).map_err(Into::into)
    }
}

fn deserialize_input<A: ModelAdapter>(
    index: usize,
    item: Value,
) -> Result<A::Input, DispatchError<A::Error>> {
    serde_json::from_value(item).map_err(|source| DispatchError::Payload { index, source })
}

fn encode_output<A: ModelAdapter>(
    index: usize,
    output: &A::Output,
) -> Result<Value, DispatchError<A::Error>> {
    build_response(output).map_err(|source| DispatchError::Encode { index, source })
}
