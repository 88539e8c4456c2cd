mod auth;
mod config;
mod db;
mod history;
mod inference;
mod routes;
mod storage;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use auth::SessionProvider;
use auth::cognito_service::CognitoService;
use auth::jwt::JwtService;
use auth::middleware::AuthMiddleware;
use aws_config::BehaviorVersion;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_s3::Client as S3Client;
use config::AppConfig;
use db::dynamodb_repository::DynamoDbRepository;
use history::history_service::ScanHistoryService;
use inference::heuristic::SyntheticClassifier;
use inference::loader::{LocationModelSource, ModelLoader};
use inference::pipeline::Analyzer;
use inference::preprocess::Preprocessor;
use routes::configure_routes;
use std::env;
use std::sync::Arc;
use storage::s3_service::S3Service;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    if let Ok(current_dir) = env::current_dir() {
        log::info!("Current working directory: {}", current_dir.display());
    }

    let config = AppConfig::from_env().map_err(|e| {
        log::error!("Invalid configuration: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    let preprocessor = Preprocessor::new(config.model.input_size);
    log::info!(
        "Scans are resized to {}x{} before classification",
        preprocessor.size(),
        preprocessor.size()
    );
    let source = LocationModelSource::new(&config.model.location).map_err(|e| {
        log::error!("Invalid model location {}: {}", config.model.location, e);
        std::io::Error::other(e.to_string())
    })?;
    let loader = Arc::new(ModelLoader::new(source, preprocessor, config.model.warm_up));

    // Start acquiring the model now; the first analysis joins this load if it is still running.
    let background_loader = loader.clone();
    actix_web::rt::spawn(async move {
        background_loader.ensure_loaded().await;
    });

    let heuristic = match config.heuristic_seed {
        Some(seed) => {
            log::info!("Heuristic classifier seeded with {}", seed);
            SyntheticClassifier::seeded(seed)
        }
        None => SyntheticClassifier::from_entropy(),
    };
    if config.model.apply_softmax {
        log::info!("Model output is treated as logits and softmaxed");
    }
    let analyzer = web::Data::new(
        Analyzer::new(loader, heuristic, preprocessor).with_softmax(config.model.apply_softmax),
    );

    let aws_config = aws_config::defaults(BehaviorVersion::latest()).load().await;

    let dynamodb_client = DynamoDbClient::new(&aws_config);
    let s3_client = S3Client::new(&aws_config);
    let cognito_client = CognitoClient::new(&aws_config);

    let db_repo = Arc::new(DynamoDbRepository::new(dynamodb_client, config.scans_table.clone()));
    let s3_service = Arc::new(S3Service::new(s3_client, config.s3_bucket.clone()));
    let history = web::Data::new(ScanHistoryService::new(db_repo, s3_service));

    let jwt_service = JwtService::new(&config.jwt_secret);
    let session_provider: Arc<dyn SessionProvider> = Arc::new(CognitoService::new(
        cognito_client,
        config.cognito_client_id.clone(),
    ));
    let auth_middleware = AuthMiddleware::new(jwt_service.clone());

    let bind_address = format!("0.0.0.0:{}", config.port);
    log::info!("Starting server on {}", bind_address);

    HttpServer::new(move || {
        App::new()
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allowed_methods(vec!["GET", "POST", "DELETE", "OPTIONS"])
                    .allowed_headers(vec![
                        actix_web::http::header::AUTHORIZATION,
                        actix_web::http::header::ACCEPT,
                        actix_web::http::header::CONTENT_TYPE,
                    ])
                    .max_age(3600),
            )
            .app_data(analyzer.clone())
            .app_data(history.clone())
            .app_data(web::Data::new(jwt_service.clone()))
            .app_data(web::Data::from(session_provider.clone()))
            .configure(|cfg| configure_routes(cfg, auth_middleware.clone()))
    })
    .bind(&bind_address)?
    .run()
    .await
}
