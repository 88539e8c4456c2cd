use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};
use uuid::Uuid;

pub const CLASS_COUNT: usize = 4;

/// Diagnostic categories in the fixed order the classifiers emit them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, EnumIter,
)]
pub enum TumorClass {
    #[strum(serialize = "No Tumor")]
    #[serde(rename = "No Tumor")]
    NoTumor,
    Glioma,
    Meningioma,
    #[strum(serialize = "Pituitary Tumor")]
    #[serde(rename = "Pituitary Tumor")]
    Pituitary,
}

impl TumorClass {
    pub const ALL: [TumorClass; CLASS_COUNT] = [
        TumorClass::NoTumor,
        TumorClass::Glioma,
        TumorClass::Meningioma,
        TumorClass::Pituitary,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
pub enum TumorLevel {
    #[default]
    None,
    Small,
    Medium,
    Large,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassPrediction {
    #[serde(rename = "class")]
    pub class_name: String,
    pub confidence: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub tumor_detected: bool,
    pub confidence: u8,
    pub tumor_level: TumorLevel,
    pub tumor_type: String,
    pub recommendations: Vec<String>,
    pub processing_time: f64,
    pub all_predictions: Vec<ClassPrediction>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ClassifierKind {
    Model,
    Heuristic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedScan {
    pub record_id: Uuid,
    pub location: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub result: AnalysisResult,
    pub classifier: ClassifierKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_notice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saved: Option<SavedScan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub save_error: Option<String>,
}

/// A persisted analysis, as returned by the history endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: String,
    pub image_location: String,
    pub file_name: String,
    pub file_size: u64,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub result: AnalysisResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareRequest {
    pub ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedImageUrl {
    pub url: String,
    pub expires_in: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ModelPhase {
    Unloaded,
    Loading,
    Ready,
    Fallback,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStatus {
    pub phase: ModelPhase,
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: SessionUser,
}
