//! Core library entry point.
//! Re-exports public types and traits.

pub mod adapter;
pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod dispatch;
pub mod response;
pub mod serving;
pub mod taxonomy;
pub mod validation;

pub use adapter::{InitError, ModelAdapter, ModelRoot};
pub use api::{CanonicalInput, CanonicalOutput, InputError};
#[cfg(feature = "cli")]
pub use cli::TaxoncArgs;
pub use config::{BatchingConfig, ConfigError, DynamicBatchSettings, TaxonomyKind, ValidationPolicy};
pub use dispatch::{DispatchError, Dispatcher, Predictor, RequestContext};
pub use response::{ResponseError, build_response};
pub use serving::{BatchCollaborator, Service};
pub use taxonomy::{ScoreValue, TaxonomyLabel, TaxonomyScore};
pub use validation::{OutputValidator, ValidationError};
