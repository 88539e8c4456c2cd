use actix_multipart::{Multipart, MultipartError};
use actix_web::{web, Error, HttpResponse};
use futures::TryStreamExt;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared::{AnalyzeResponse, CompareRequest, SignedImageUrl};
use uuid::Uuid;

use crate::auth;
use crate::auth::middleware::{AuthMiddleware, AuthenticatedUser, CurrentUser};
use crate::history::history_service::{HistoryError, SIGNED_URL_TTL, ScanHistoryService};
use crate::inference::pipeline::{AnalysisError, Analyzer};
use crate::inference::upload::{MAX_UPLOAD_BYTES, Upload, UploadError};
use crate::storage::StorageError;

const UPLOAD_FIELD: &str = "file";

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

fn error_body(message: impl ToString) -> ErrorResponse {
    ErrorResponse {
        error: message.to_string(),
    }
}

pub fn configure_routes(cfg: &mut web::ServiceConfig, auth_middleware: AuthMiddleware) {
    cfg.service(
        web::scope("/api")
            .wrap(auth_middleware)
            .route("/health", web::get().to(health))
            .route("/analyze", web::post().to(analyze_scan))
            .route("/model/status", web::get().to(model_status))
            .route("/scans", web::get().to(list_scans))
            .route("/scans/compare", web::post().to(compare_scans))
            .route("/scans/{scan_id}", web::delete().to(delete_scan))
            .route("/scans/{scan_id}/image", web::get().to(scan_image))
            .service(
                web::scope("/auth")
                    .route("/signup", web::post().to(auth::routes::sign_up))
                    .route("/signin", web::post().to(auth::routes::sign_in))
                    .route("/signout", web::post().to(auth::routes::sign_out))
                    .route("/me", web::get().to(auth::routes::me)),
            ),
    );
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

#[derive(Debug, thiserror::Error)]
enum UploadReadError {
    #[error("Malformed upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Invalid(#[from] UploadError),
}

/// Pulls the `file` field out of the form. The media type is checked before
/// the body is read, and reading stops as soon as the size limit is passed.
async fn read_upload(payload: &mut Multipart) -> Result<Upload, UploadReadError> {
    while let Some(mut field) = payload.try_next().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            while field.try_next().await?.is_some() {}
            continue;
        }

        let media_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();
        if !media_type.starts_with("image/") {
            return Err(UploadError::UnsupportedMediaType(media_type).into());
        }

        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .unwrap_or("scan")
            .to_string();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await? {
            let size = bytes.len() + chunk.len();
            if size > MAX_UPLOAD_BYTES {
                return Err(UploadError::FileTooLarge { size }.into());
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok(Upload {
            file_name,
            media_type,
            bytes,
        });
    }

    Err(UploadError::Empty.into())
}

fn upload_error_response(e: &UploadError) -> HttpResponse {
    match e {
        UploadError::FileTooLarge { .. } => HttpResponse::PayloadTooLarge().json(error_body(e)),
        UploadError::UnsupportedMediaType(_) | UploadError::Empty => {
            HttpResponse::BadRequest().json(error_body(e))
        }
    }
}

fn analysis_error_response(e: &AnalysisError) -> HttpResponse {
    match e {
        AnalysisError::Upload(upload) => upload_error_response(upload),
        AnalysisError::Preprocess(_) => HttpResponse::UnprocessableEntity().json(error_body(e)),
        AnalysisError::Blocking(_) => HttpResponse::InternalServerError().json(error_body(e)),
    }
}

fn history_error_response(e: &HistoryError) -> HttpResponse {
    match e {
        HistoryError::NotFound => HttpResponse::NotFound().json(error_body(e)),
        HistoryError::Storage(StorageError::NotFound(_)) => {
            warn!("Scan row outlived its image: {}", e);
            HttpResponse::NotFound().json(error_body("Scan image not found"))
        }
        HistoryError::TooManyScans | HistoryError::NoScansSelected => {
            HttpResponse::BadRequest().json(error_body(e))
        }
        HistoryError::Repository(_) | HistoryError::Storage(_) => {
            error!("Scan history operation failed: {}", e);
            HttpResponse::InternalServerError().json(error_body("Scan history is unavailable"))
        }
    }
}

fn parse_scan_id(raw: &str) -> Result<Uuid, HttpResponse> {
    Uuid::parse_str(raw)
        .map_err(|_| HttpResponse::BadRequest().json(error_body("Invalid scan id")))
}

async fn analyze_scan(
    analyzer: web::Data<Analyzer>,
    history: web::Data<ScanHistoryService>,
    user: CurrentUser,
    mut payload: Multipart,
) -> Result<HttpResponse, Error> {
    let upload = match read_upload(&mut payload).await {
        Ok(upload) => upload,
        Err(UploadReadError::Invalid(e)) => {
            warn!("Rejected upload: {}", e);
            return Ok(upload_error_response(&e));
        }
        Err(e @ UploadReadError::Multipart(_)) => {
            warn!("{}", e);
            return Ok(HttpResponse::BadRequest().json(error_body(e)));
        }
    };

    let outcome = match analyzer.analyze_upload(&upload).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("Analysis of {} failed: {}", upload.file_name, e);
            return Ok(analysis_error_response(&e));
        }
    };

    if outcome.fallback_active {
        info!("Model in fallback; {} analyzed heuristically", upload.file_name);
    }

    let mut response = AnalyzeResponse {
        fallback_notice: outcome.fallback_notice(),
        result: outcome.result,
        classifier: outcome.classifier,
        saved: None,
        save_error: None,
    };

    if let Some(user) = user.0 {
        match history.save(&user.id, &upload, &response.result).await {
            Ok(saved) => {
                info!("Saved scan {} for {}", saved.record_id, user.email);
                response.saved = Some(saved);
            }
            Err(e) => {
                error!("Analysis succeeded but saving it for {} failed: {}", user.email, e);
                response.save_error = Some(format!("The analysis could not be saved: {}", e));
            }
        }
    }

    Ok(HttpResponse::Ok().json(response))
}

async fn model_status(analyzer: web::Data<Analyzer>) -> HttpResponse {
    HttpResponse::Ok().json(analyzer.loader().status())
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn list_scans(
    history: web::Data<ScanHistoryService>,
    user: AuthenticatedUser,
    query: web::Query<HistoryQuery>,
) -> HttpResponse {
    match history.list(user.owner(), query.limit).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => history_error_response(&e),
    }
}

async fn delete_scan(
    history: web::Data<ScanHistoryService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> HttpResponse {
    let scan_id = match parse_scan_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match history.delete(user.owner(), scan_id).await {
        Ok(()) => {
            info!("Deleted scan {} for {}", scan_id, user.owner());
            HttpResponse::NoContent().finish()
        }
        Err(e) => history_error_response(&e),
    }
}

async fn compare_scans(
    history: web::Data<ScanHistoryService>,
    user: AuthenticatedUser,
    request: web::Json<CompareRequest>,
) -> HttpResponse {
    match history.compare(user.owner(), &request.ids).await {
        Ok(records) => HttpResponse::Ok().json(records),
        Err(e) => history_error_response(&e),
    }
}

async fn scan_image(
    history: web::Data<ScanHistoryService>,
    user: AuthenticatedUser,
    path: web::Path<String>,
) -> HttpResponse {
    let scan_id = match parse_scan_id(&path) {
        Ok(id) => id,
        Err(response) => return response,
    };
    match history.image_url(user.owner(), scan_id).await {
        Ok(url) => HttpResponse::Ok().json(SignedImageUrl {
            url,
            expires_in: SIGNED_URL_TTL.as_secs(),
        }),
        Err(e) => history_error_response(&e),
    }
}
