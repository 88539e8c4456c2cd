use futures::future::BoxFuture;
use shared::{ModelPhase, ModelStatus};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::OnceCell;
use url::Url;

use super::model::{InferenceError, InferenceModel};
use super::preprocess::Preprocessor;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Failed to read model file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to fetch model from {url}: {source}")]
    Fetch {
        url: Url,
        #[source]
        source: reqwest::Error,
    },
    #[error("Unsupported model location scheme: {0}")]
    Location(String),
    #[error("Failed to initialize model: {0}")]
    Initialize(String),
    #[cfg_attr(feature = "torch", allow(dead_code))]
    #[error("No inference backend compiled in; rebuild with the `torch` feature")]
    BackendUnavailable,
    #[error("Warm-up inference failed: {0}")]
    WarmUp(#[from] InferenceError),
}

/// Where the serialized network comes from.
pub trait ModelSource: Send + Sync {
    fn describe(&self) -> String;
    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn InferenceModel>, ModelError>>;
}

#[derive(Debug, Clone, PartialEq)]
enum ModelLocation {
    File(PathBuf),
    Remote(Url),
}

impl ModelLocation {
    fn parse(location: &str) -> Result<Self, ModelError> {
        match Url::parse(location) {
            Ok(url) => match url.scheme() {
                "http" | "https" => Ok(ModelLocation::Remote(url)),
                "file" => url
                    .to_file_path()
                    .map(ModelLocation::File)
                    .map_err(|_| ModelError::Location(location.to_string())),
                other => Err(ModelError::Location(other.to_string())),
            },
            Err(_) => Ok(ModelLocation::File(PathBuf::from(location))),
        }
    }
}

/// Reads a TorchScript archive from disk or over HTTP.
pub struct LocationModelSource {
    location: ModelLocation,
    http_client: reqwest::Client,
}

impl LocationModelSource {
    pub fn new(location: &str) -> Result<Self, ModelError> {
        Ok(Self {
            location: ModelLocation::parse(location)?,
            http_client: reqwest::Client::new(),
        })
    }

    async fn fetch(&self) -> Result<Vec<u8>, ModelError> {
        match &self.location {
            ModelLocation::File(path) => {
                tokio::fs::read(path).await.map_err(|source| ModelError::Io {
                    path: path.clone(),
                    source,
                })
            }
            ModelLocation::Remote(url) => {
                let fetch_err = |source| ModelError::Fetch {
                    url: url.clone(),
                    source,
                };
                let response = self
                    .http_client
                    .get(url.clone())
                    .send()
                    .await
                    .and_then(|r| r.error_for_status())
                    .map_err(fetch_err)?;
                let body = response.bytes().await.map_err(fetch_err)?;
                Ok(body.to_vec())
            }
        }
    }
}

#[cfg(feature = "torch")]
fn build_model(bytes: &[u8]) -> Result<Arc<dyn InferenceModel>, ModelError> {
    let model = super::model::TorchModel::from_bytes(bytes)
        .map_err(|e| ModelError::Initialize(e.to_string()))?;
    Ok(Arc::new(model))
}

#[cfg(not(feature = "torch"))]
fn build_model(_bytes: &[u8]) -> Result<Arc<dyn InferenceModel>, ModelError> {
    Err(ModelError::BackendUnavailable)
}

impl ModelSource for LocationModelSource {
    fn describe(&self) -> String {
        match &self.location {
            ModelLocation::File(path) => path.display().to_string(),
            ModelLocation::Remote(url) => url.to_string(),
        }
    }

    fn load(&self) -> BoxFuture<'_, Result<Arc<dyn InferenceModel>, ModelError>> {
        Box::pin(async move {
            let bytes = self.fetch().await?;
            log::info!("Fetched {} bytes of model data", bytes.len());
            actix_web::web::block(move || build_model(&bytes))
                .await
                .map_err(|e| ModelError::Initialize(e.to_string()))?
        })
    }
}

/// Terminal outcome of model acquisition.
#[derive(Clone)]
pub enum ModelState {
    Ready(Arc<dyn InferenceModel>),
    Fallback,
}

impl ModelState {
    pub fn is_fallback(&self) -> bool {
        matches!(self, ModelState::Fallback)
    }
}

/// Acquires the network at most once per loader. Callers arriving while a
/// load is in flight wait for it instead of starting another.
pub struct ModelLoader {
    source: Box<dyn ModelSource>,
    preprocessor: Preprocessor,
    warm_up: bool,
    state: OnceCell<ModelState>,
    loading: AtomicBool,
}

impl ModelLoader {
    pub fn new(source: impl ModelSource + 'static, preprocessor: Preprocessor, warm_up: bool) -> Self {
        Self {
            source: Box::new(source),
            preprocessor,
            warm_up,
            state: OnceCell::new(),
            loading: AtomicBool::new(false),
        }
    }

    pub async fn ensure_loaded(&self) -> &ModelState {
        self.state.get_or_init(|| self.acquire()).await
    }

    pub fn state(&self) -> Option<&ModelState> {
        self.state.get()
    }

    pub fn status(&self) -> ModelStatus {
        let phase = match self.state.get() {
            Some(ModelState::Ready(_)) => ModelPhase::Ready,
            Some(ModelState::Fallback) => ModelPhase::Fallback,
            None if self.loading.load(Ordering::Acquire) => ModelPhase::Loading,
            None => ModelPhase::Unloaded,
        };
        ModelStatus {
            phase,
            source: self.source.describe(),
        }
    }

    async fn acquire(&self) -> ModelState {
        self.loading.store(true, Ordering::Release);
        log::info!("Loading classification model from {}", self.source.describe());

        let state = match self.load_and_warm_up().await {
            Ok(model) => {
                log::info!("Classification model ready");
                ModelState::Ready(model)
            }
            Err(e) => {
                log::warn!(
                    "Model unavailable, using heuristic classifier instead: {}",
                    e
                );
                ModelState::Fallback
            }
        };

        self.loading.store(false, Ordering::Release);
        state
    }

    async fn load_and_warm_up(&self) -> Result<Arc<dyn InferenceModel>, ModelError> {
        let model = self.source.load().await?;
        if self.warm_up {
            let output = model.forward(&self.preprocessor.blank_tensor())?;
            log::debug!("Warm-up pass produced {} outputs", output.len());
        }
        Ok(model)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::CountingSource;
    use super::*;
    use crate::inference::model::testing::FixedModel;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn loader(source: CountingSource) -> ModelLoader {
        ModelLoader::new(source, Preprocessor::new(8), true)
    }

    #[actix_web::test]
    async fn repeated_loads_fetch_once() {
        let source = CountingSource::serving(Arc::new(FixedModel::new(vec![0.25; 4])));
        let loads = source.loads.clone();
        let loader = loader(source);

        assert!(loader.state().is_none());
        assert!(matches!(loader.ensure_loaded().await, ModelState::Ready(_)));
        assert!(matches!(loader.ensure_loaded().await, ModelState::Ready(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(loader.state().is_some());
        assert_eq!(loader.status().phase, ModelPhase::Ready);
    }

    #[actix_web::test]
    async fn concurrent_callers_share_one_load() {
        let mut source = CountingSource::serving(Arc::new(FixedModel::new(vec![0.25; 4])));
        source.delay = Duration::from_millis(20);
        let loads = source.loads.clone();
        let loader = loader(source);

        let (a, b, c) = futures::join!(
            loader.ensure_loaded(),
            loader.ensure_loaded(),
            loader.ensure_loaded()
        );
        assert!(matches!(a, ModelState::Ready(_)));
        assert!(matches!(b, ModelState::Ready(_)));
        assert!(matches!(c, ModelState::Ready(_)));
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn load_failure_settles_on_fallback() {
        let source = CountingSource::failing();
        let loads = source.loads.clone();
        let loader = loader(source);

        assert!(loader.ensure_loaded().await.is_fallback());
        assert!(loader.ensure_loaded().await.is_fallback());
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert!(loader.state().is_some());
        assert_eq!(loader.status().phase, ModelPhase::Fallback);
    }

    #[actix_web::test]
    async fn warm_up_runs_once_and_failure_falls_back() {
        let model = Arc::new(FixedModel::new(vec![0.25; 4]));
        let loader = loader(CountingSource::serving(model.clone()));
        loader.ensure_loaded().await;
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);

        struct Broken(AtomicUsize);
        impl InferenceModel for Broken {
            fn forward(&self, _: &ndarray::Array4<f32>) -> Result<Vec<f32>, InferenceError> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Err(InferenceError::Forward("bad kernel".to_string()))
            }
        }
        let loader = self::loader(CountingSource::serving(Arc::new(Broken(AtomicUsize::new(0)))));
        assert!(loader.ensure_loaded().await.is_fallback());
    }

    #[test]
    fn status_starts_unloaded() {
        let loader = loader(CountingSource::failing());
        let status = loader.status();
        assert_eq!(status.phase, ModelPhase::Unloaded);
        assert_eq!(status.source, "test://model");
        assert!(loader.state().is_none());
    }

    #[test]
    fn locations_parse_to_files_or_urls() {
        assert_eq!(
            ModelLocation::parse("models/brain.pt").unwrap(),
            ModelLocation::File(PathBuf::from("models/brain.pt"))
        );
        assert!(matches!(
            ModelLocation::parse("https://cdn.example.com/brain.pt").unwrap(),
            ModelLocation::Remote(_)
        ));
        assert!(matches!(
            ModelLocation::parse("ftp://example.com/brain.pt"),
            Err(ModelError::Location(_))
        ));
    }

    #[actix_web::test]
    async fn missing_model_file_falls_back() {
        let source = LocationModelSource::new("/nonexistent/brain-tumor-model.pt").unwrap();
        let loader = ModelLoader::new(source, Preprocessor::new(8), true);
        assert!(loader.ensure_loaded().await.is_fallback());
    }

    #[actix_web::test]
    async fn model_file_is_read_and_handed_to_the_backend() {
        let path = std::env::temp_dir().join(format!("neuroscan-{}.pt", uuid::Uuid::new_v4()));
        std::fs::write(&path, b"not a torchscript archive").unwrap();
        let source = LocationModelSource::new(path.to_str().unwrap()).unwrap();

        let bytes = source.fetch().await.unwrap();
        assert_eq!(bytes, b"not a torchscript archive");
        assert!(matches!(
            source.load().await,
            Err(ModelError::BackendUnavailable | ModelError::Initialize(_))
        ));

        std::fs::remove_file(&path).unwrap();
    }
}
