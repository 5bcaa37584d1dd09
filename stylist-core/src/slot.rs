use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::{DeviceKind, Loader, ModelSource, ServiceError, ServiceResult};

/// A resident model and the identifier it was built from.
pub struct LoadedModel<M: ?Sized> {
    pub source: ModelSource,
    pub model: Arc<M>,
}

impl<M: ?Sized> Clone for LoadedModel<M> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            model: Arc::clone(&self.model),
        }
    }
}

/// Holds at most one loaded model and swaps it when a different identifier
/// is requested.
pub struct ModelSlot<M: ?Sized> {
    loader: Box<dyn Loader<Model = M>>,
    default_source: ModelSource,
    current: RwLock<Option<LoadedModel<M>>>,
    load_lock: Mutex<()>,
}

impl<M: ?Sized + Send + Sync> ModelSlot<M> {
    pub fn new(loader: impl Loader<Model = M> + 'static, default_model: &str) -> Self {
        Self {
            loader: Box::new(loader),
            default_source: ModelSource::parse(default_model),
            current: RwLock::new(None),
            load_lock: Mutex::new(()),
        }
    }

    pub fn default_source(&self) -> &ModelSource {
        &self.default_source
    }

    pub fn device(&self) -> DeviceKind {
        self.loader.device()
    }

    /// The resident model, if any. Never waits on a load in progress.
    pub fn current(&self) -> Option<LoadedModel<M>> {
        match self.current.read() {
            Ok(current) => current.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Returns the model for `requested` (or the default), loading it if the
    /// resident one was built from a different identifier.
    pub async fn get(
        &self,
        requested: Option<&str>,
        token: Option<&str>,
    ) -> ServiceResult<LoadedModel<M>> {
        let source = requested
            .filter(|raw| !raw.trim().is_empty())
            .map(ModelSource::parse)
            .unwrap_or_else(|| self.default_source.clone());

        let _guard = self.load_lock.lock().await;
        if let Some(loaded) = self.current().filter(|loaded| loaded.source == source) {
            tracing::debug!(model = %source, "model already loaded");
            return Ok(loaded);
        }

        tracing::info!(model = %source, device = %self.device(), "loading model");
        let model = self
            .loader
            .load(&source, token)
            .await
            .map_err(ServiceError::ModelLoad)?;
        let loaded = LoadedModel { source, model };
        match self.current.write() {
            Ok(mut current) => *current = Some(loaded.clone()),
            Err(poisoned) => *poisoned.into_inner() = Some(loaded.clone()),
        }
        tracing::info!(model = %loaded.source, "model loaded");
        Ok(loaded)
    }
}
