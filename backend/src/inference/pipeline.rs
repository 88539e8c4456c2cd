use actix_web::error::BlockingError;
use actix_web::web;
use shared::{AnalysisResult, ClassifierKind};
use std::sync::Arc;
use std::time::Instant;

use super::features::FeatureVector;
use super::heuristic::SyntheticClassifier;
use super::loader::{ModelLoader, ModelState};
use super::model::{InferenceError, ModelBackedClassifier};
use super::preprocess::{PreprocessError, Preprocessor, ScanImage};
use super::probabilities::ClassProbabilities;
use super::report;
use super::upload::{Upload, UploadError};

pub const FALLBACK_NOTICE: &str =
    "The trained model is unavailable; results come from the heuristic image analyzer.";

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Preprocess(#[from] PreprocessError),
    #[error("Image decoding task did not complete: {0}")]
    Blocking(#[from] BlockingError),
}

/// The two interchangeable ways of turning a scan into class probabilities.
pub enum Classifier<'a> {
    Model(ModelBackedClassifier),
    Heuristic(&'a SyntheticClassifier),
}

impl<'a> Classifier<'a> {
    pub fn select(state: &ModelState, heuristic: &'a SyntheticClassifier, apply_softmax: bool) -> Self {
        match state {
            ModelState::Ready(model) => Classifier::Model(
                ModelBackedClassifier::new(model.clone()).with_softmax(apply_softmax),
            ),
            ModelState::Fallback => Classifier::Heuristic(heuristic),
        }
    }

    pub fn kind(&self) -> ClassifierKind {
        match self {
            Classifier::Model(_) => ClassifierKind::Model,
            Classifier::Heuristic(_) => ClassifierKind::Heuristic,
        }
    }

    pub fn classify(&self, image: &ScanImage) -> Result<ClassProbabilities, InferenceError> {
        match self {
            Classifier::Model(model) => model.classify(image),
            Classifier::Heuristic(heuristic) => Ok(classify_heuristic(heuristic, image)),
        }
    }
}

fn classify_heuristic(heuristic: &SyntheticClassifier, image: &ScanImage) -> ClassProbabilities {
    let features = FeatureVector::extract(image.pixels());
    let (branch, probabilities) = heuristic.classify(&features);
    log::debug!(
        "Heuristic branch {:?}: brightness {:.1}, dark {:.3}, bright {:.3}, edges {:.3}, asymmetry {:.1}",
        branch,
        features.brightness,
        features.dark_ratio,
        features.bright_ratio,
        features.edge_ratio,
        features.asymmetry
    );
    probabilities
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub result: AnalysisResult,
    pub classifier: ClassifierKind,
    pub fallback_active: bool,
}

impl AnalysisOutcome {
    pub fn fallback_notice(&self) -> Option<String> {
        (self.classifier == ClassifierKind::Heuristic).then(|| FALLBACK_NOTICE.to_string())
    }
}

pub struct Analyzer {
    loader: Arc<ModelLoader>,
    heuristic: SyntheticClassifier,
    preprocessor: Preprocessor,
    apply_softmax: bool,
}

impl Analyzer {
    pub fn new(
        loader: Arc<ModelLoader>,
        heuristic: SyntheticClassifier,
        preprocessor: Preprocessor,
    ) -> Self {
        Self {
            loader,
            heuristic,
            preprocessor,
            apply_softmax: false,
        }
    }

    pub fn with_softmax(mut self, apply_softmax: bool) -> Self {
        self.apply_softmax = apply_softmax;
        self
    }

    pub fn loader(&self) -> &ModelLoader {
        &self.loader
    }

    pub async fn analyze_upload(&self, upload: &Upload) -> Result<AnalysisOutcome, AnalysisError> {
        upload.validate()?;
        self.analyze(&upload.bytes).await
    }

    pub async fn analyze(&self, bytes: &[u8]) -> Result<AnalysisOutcome, AnalysisError> {
        let state = self.loader.ensure_loaded().await;

        let started = Instant::now();
        let image = self.decode(bytes.to_vec()).await?;
        let classifier = Classifier::select(state, &self.heuristic, self.apply_softmax);
        let (kind, probabilities) = self.run(&classifier, &image);
        let result = report::synthesize(&probabilities, started.elapsed());

        log::info!(
            "Analysis complete via {}: {} ({}%) in {:.3}s",
            kind,
            result.tumor_type,
            result.confidence,
            result.processing_time
        );

        Ok(AnalysisOutcome {
            result,
            classifier: kind,
            fallback_active: state.is_fallback(),
        })
    }

    /// Decoding and resizing run on the blocking pool, off the worker thread.
    async fn decode(&self, bytes: Vec<u8>) -> Result<ScanImage, AnalysisError> {
        let preprocessor = self.preprocessor;
        let image = web::block(move || preprocessor.prepare(&bytes)).await??;
        Ok(image)
    }

    fn run(&self, classifier: &Classifier<'_>, image: &ScanImage) -> (ClassifierKind, ClassProbabilities) {
        match classifier.classify(image) {
            Ok(probabilities) => (classifier.kind(), probabilities),
            Err(e) => {
                log::warn!("Model inference failed, degrading to heuristic for this request: {}", e);
                (
                    ClassifierKind::Heuristic,
                    classify_heuristic(&self.heuristic, image),
                )
            }
        }
    }
}
