use actix_web::{web, HttpResponse, Result};
use log::{error, info};
use serde_json::json;
use shared::{Credentials, SessionResponse};

use super::jwt::JwtService;
use super::middleware::AuthenticatedUser;
use super::{SessionError, SessionProvider};

#[derive(serde::Serialize)]
struct ErrorResponse {
    error: String,
}

fn session_error_response(e: &SessionError) -> HttpResponse {
    let body = ErrorResponse {
        error: e.to_string(),
    };
    match e {
        SessionError::Credentials(_) => HttpResponse::BadRequest().json(body),
        SessionError::InvalidCredentials => HttpResponse::Unauthorized().json(body),
        SessionError::NotConfirmed => HttpResponse::Forbidden().json(body),
        SessionError::UserExists => HttpResponse::Conflict().json(body),
        SessionError::AwsError(_) => {
            error!("Identity provider error: {}", e);
            HttpResponse::BadGateway().json(ErrorResponse {
                error: "Authentication service unavailable".to_string(),
            })
        }
    }
}

pub async fn sign_up(
    provider: web::Data<dyn SessionProvider>,
    credentials: web::Json<Credentials>,
) -> Result<HttpResponse> {
    match provider.sign_up(&credentials.email, &credentials.password).await {
        Ok(()) => {
            info!("Account created for {}", credentials.email);
            Ok(HttpResponse::Created().json(json!({
                "message": "Account created. Check your email to confirm it before signing in."
            })))
        }
        Err(e) => Ok(session_error_response(&e)),
    }
}

pub async fn sign_in(
    provider: web::Data<dyn SessionProvider>,
    jwt_service: web::Data<JwtService>,
    credentials: web::Json<Credentials>,
) -> Result<HttpResponse> {
    let session = match provider.sign_in(&credentials.email, &credentials.password).await {
        Ok(session) => session,
        Err(e) => return Ok(session_error_response(&e)),
    };

    match jwt_service.generate_token(&session.user, &session.access_token) {
        Ok(token) => Ok(HttpResponse::Ok().json(SessionResponse {
            token,
            user: session.user,
        })),
        Err(e) => {
            error!("Failed to generate JWT token: {:?}", e);
            Ok(HttpResponse::InternalServerError().json(ErrorResponse {
                error: "Failed to generate authentication token".to_string(),
            }))
        }
    }
}

/// The local token simply expires; upstream tokens are revoked best-effort.
pub async fn sign_out(
    provider: web::Data<dyn SessionProvider>,
    user: AuthenticatedUser,
) -> Result<HttpResponse> {
    if let Err(e) = provider.sign_out(&user.0.access_token).await {
        error!("Failed to revoke upstream session for {}: {}", user.0.email, e);
    }
    info!("User signed out: {}", user.0.email);

    Ok(HttpResponse::Ok().json(json!({ "message": "Signed out successfully" })))
}

pub async fn me(user: AuthenticatedUser) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(user.0.user()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::memory::MemorySessionProvider;
    use crate::auth::middleware::AuthMiddleware;
    use actix_web::{http::StatusCode, test, App};
    use shared::SessionUser;
    use std::sync::Arc;

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials {
            email: email.into(),
            password: password.into(),
        }
    }

    #[actix_web::test]
    async fn sign_in_then_me_then_sign_out() {
        let provider = Arc::new(MemorySessionProvider::with_account("dr@clinic.org", "hunter22"));
        let jwt = JwtService::new("secret");
        let session_provider: Arc<dyn SessionProvider> = provider.clone();
        let app = test::init_service(
            App::new()
                .wrap(AuthMiddleware::new(jwt.clone()))
                .app_data(web::Data::from(session_provider))
                .app_data(web::Data::new(jwt))
                .route("/api/auth/signin", web::post().to(sign_in))
                .route("/api/auth/signout", web::post().to(sign_out))
                .route("/api/auth/me", web::get().to(me)),
        )
        .await;

        let wrong = test::TestRequest::post()
            .uri("/api/auth/signin")
            .set_json(credentials("dr@clinic.org", "nope-nope"))
            .to_request();
        assert_eq!(test::call_service(&app, wrong).await.status(), StatusCode::UNAUTHORIZED);

        let req = test::TestRequest::post()
            .uri("/api/auth/signin")
            .set_json(credentials("dr@clinic.org", "hunter22"))
            .to_request();
        let session: SessionResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(session.user.email, "dr@clinic.org");

        let req = test::TestRequest::get()
            .uri("/api/auth/me")
            .insert_header(("Authorization", format!("Bearer {}", session.token)))
            .to_request();
        let user: SessionUser = test::call_and_read_body_json(&app, req).await;
        assert_eq!(user, session.user);

        let req = test::TestRequest::post()
            .uri("/api/auth/signout")
            .insert_header(("Authorization", format!("Bearer {}", session.token)))
            .to_request();
        assert_eq!(test::call_service(&app, req).await.status(), StatusCode::OK);
        assert_eq!(
            *provider.signed_out.lock().unwrap(),
            ["access-dr@clinic.org".to_string()]
        );
    }

    #[actix_web::test]
    async fn sign_up_validates_and_rejects_duplicates() {
        let provider: Arc<dyn SessionProvider> =
            Arc::new(MemorySessionProvider::with_account("taken@clinic.org", "hunter22"));
        let app = test::init_service(
            App::new()
                .app_data(web::Data::from(provider))
                .route("/api/auth/signup", web::post().to(sign_up)),
        )
        .await;

        let cases = [
            (credentials("new@clinic.org", "hunter22"), StatusCode::CREATED),
            (credentials("new@clinic.org", "hunter22"), StatusCode::CONFLICT),
            (credentials("taken@clinic.org", "hunter22"), StatusCode::CONFLICT),
            (credentials("no-at-sign", "hunter22"), StatusCode::BAD_REQUEST),
            (credentials("short@clinic.org", "12345"), StatusCode::BAD_REQUEST),
        ];
        for (body, expected) in cases {
            let req = test::TestRequest::post()
                .uri("/api/auth/signup")
                .set_json(body)
                .to_request();
            assert_eq!(test::call_service(&app, req).await.status(), expected);
        }
    }
}
