//! The serving context: one initialised model plus optional dynamic batching.
//!
//! A [`Service`] is built once at start-up and then shared by request
//! handlers. Batching itself is delegated to a [`BatchCollaborator`] supplied
//! by the host; the service only decides which payloads go through it.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::adapter::{BoxError, InitError, ModelAdapter, ModelRoot};
use crate::config::{BatchingConfig, ConfigError, DynamicBatchSettings};
use crate::dispatch::{DispatchError, Dispatcher, Predictor, RequestContext};
use crate::validation::describe;

/// An external component that groups concurrent requests into batches.
///
/// It receives the items of one call, may hold them until a batch fills or
/// its interval elapses, and must return results index-aligned with the
/// items it was given.
pub trait BatchCollaborator: Send + Sync {
    /// Predict a list of payloads.
    ///
    /// # Errors
    ///
    /// Returns whatever failure the collaborator or the underlying
    /// [`Predictor`] produced.
    fn predict(&self, items: Vec<Value>, context: &RequestContext) -> Result<Vec<Value>, BoxError>;
}

/// Process-wide entry point for inference requests.
pub struct Service<A> {
    dispatcher: Arc<Dispatcher<A>>,
    batcher: Option<Box<dyn BatchCollaborator>>,
}

impl<A: ModelAdapter + 'static> Service<A> {
    #[must_use]
    pub fn new(dispatcher: Dispatcher<A>) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            batcher: None,
        }
    }

    /// Initialise the adapter from `root` with the baseline output rules.
    ///
    /// # Errors
    ///
    /// Returns the adapter's [`InitError`].
    pub fn init(root: &ModelRoot) -> Result<Self, InitError> {
        Dispatcher::init(root).map(Self::new)
    }

    /// Route every call through a collaborator built by `factory`.
    ///
    /// # Errors
    ///
    /// Returns the [`BatchingConfig::validate`] failure; `factory` is not
    /// called in that case.
    pub fn with_batching<F>(mut self, config: BatchingConfig, factory: F) -> Result<Self, ConfigError>
    where
        F: FnOnce(Arc<dyn Predictor>, &BatchingConfig) -> Box<dyn BatchCollaborator>,
    {
        let config = config.validate()?;
        let predictor: Arc<dyn Predictor> = self.dispatcher.clone();
        self.batcher = Some(factory(predictor, &config));
        tracing::info!(max_batch_size = config.max_batch_size, "batching collaborator attached");
        Ok(self)
    }

    /// Wrap `dispatcher`, enabling batching when the settings file at
    /// `settings` asks for it.
    ///
    /// # Errors
    ///
    /// Returns the [`DynamicBatchSettings::load`] failure.
    pub fn from_settings<F>(
        dispatcher: Dispatcher<A>,
        settings: impl AsRef<Path>,
        factory: F,
    ) -> Result<Self, ConfigError>
    where
        F: FnOnce(Arc<dyn Predictor>, &BatchingConfig) -> Box<dyn BatchCollaborator>,
    {
        let service = Self::new(dispatcher);
        match DynamicBatchSettings::load(settings)? {
            Some(config) => service.with_batching(config, factory),
            None => Ok(service),
        }
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Dispatcher<A> {
        &self.dispatcher
    }

    #[must_use]
    pub fn is_batching(&self) -> bool {
        self.batcher.is_some()
    }

    /// Handle one inbound payload.
    ///
    /// With a collaborator attached every payload becomes a list and the
    /// response is a list. Otherwise an object is a single request and a list
    /// is a batch.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidInputShape`] for a payload that is
    /// neither an object nor a list, [`DispatchError::Batcher`] for a
    /// collaborator failure, and otherwise the dispatcher's error.
    pub fn run(&self, payload: Value, context: &RequestContext) -> Result<Value, DispatchError<A::Error>> {
        if let Some(batcher) = &self.batcher {
            let items = match payload {
                Value::Array(items) => items,
                single => vec![single],
            };
            tracing::debug!(items = items.len(), "forwarding to batching collaborator");
            return batcher
                .predict(items, context)
                .map(Value::Array)
                .map_err(DispatchError::Batcher);
        }
        match payload {
            Value::Object(_) => self.dispatcher.run(payload, context),
            Value::Array(items) => self
                .dispatcher
                .run_batch(items, context)
                .map(Value::Array),
            other => Err(DispatchError::InvalidInputShape {
                found: describe(&other),
            }),
        }
    }
}
