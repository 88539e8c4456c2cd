use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use aws_sdk_cognitoidentityprovider::types::{AttributeType, AuthFlowType};
use futures::future::BoxFuture;
use shared::SessionUser;

use super::models::{UpstreamSession, validate_credentials};
use super::{SessionError, SessionProvider};

/// Email/password sessions against a Cognito user pool app client.
/// The app client is public, so no secret hash is sent.
#[derive(Clone)]
pub struct CognitoService {
    client: CognitoClient,
    client_id: String,
}

impl CognitoService {
    pub fn new(client: CognitoClient, client_id: String) -> Self {
        Self { client, client_id }
    }

    pub async fn register(&self, email: &str, password: &str) -> Result<(), SessionError> {
        validate_credentials(email, password)?;

        let email_attribute = AttributeType::builder()
            .name("email")
            .value(email.trim())
            .build()
            .map_err(|e| SessionError::AwsError(e.to_string()))?;

        match self
            .client
            .sign_up()
            .client_id(&self.client_id)
            .username(email.trim())
            .password(password)
            .user_attributes(email_attribute)
            .send()
            .await
        {
            Ok(_) => {
                log::info!("Registered Cognito user {}", email.trim());
                Ok(())
            }
            Err(e) => {
                let service_error = e.as_service_error();
                if service_error.is_some_and(|se| se.is_username_exists_exception()) {
                    Err(SessionError::UserExists)
                } else {
                    log::error!("Cognito sign_up failed: {:?}", e);
                    Err(SessionError::AwsError(e.to_string()))
                }
            }
        }
    }

    pub async fn authenticate(&self, email: &str, password: &str) -> Result<UpstreamSession, SessionError> {
        let response = self
            .client
            .initiate_auth()
            .auth_flow(AuthFlowType::UserPasswordAuth)
            .client_id(&self.client_id)
            .auth_parameters("USERNAME", email.trim())
            .auth_parameters("PASSWORD", password)
            .send()
            .await
            .map_err(|e| {
                let service_error = e.as_service_error();
                if service_error.is_some_and(|se| {
                    se.is_not_authorized_exception() || se.is_user_not_found_exception()
                }) {
                    SessionError::InvalidCredentials
                } else if service_error.is_some_and(|se| se.is_user_not_confirmed_exception()) {
                    SessionError::NotConfirmed
                } else {
                    log::error!("Cognito initiate_auth failed: {:?}", e);
                    SessionError::AwsError(e.to_string())
                }
            })?;

        let access_token = response
            .authentication_result()
            .and_then(|result| result.access_token())
            .ok_or_else(|| {
                SessionError::AwsError("Authentication returned no access token".to_string())
            })?
            .to_string();

        let user = self.get_user(&access_token).await?;
        log::info!("User {} signed in", user.email);

        Ok(UpstreamSession { user, access_token })
    }

    pub async fn get_user(&self, access_token: &str) -> Result<SessionUser, SessionError> {
        let response = self
            .client
            .get_user()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| SessionError::AwsError(e.to_string()))?;

        let attribute = |name: &str| {
            response
                .user_attributes()
                .iter()
                .find(|a| a.name() == name)
                .and_then(|a| a.value())
                .map(str::to_string)
        };

        match (attribute("sub"), attribute("email")) {
            (Some(id), Some(email)) => Ok(SessionUser { id, email }),
            _ => Err(SessionError::AwsError(
                "User profile is missing sub or email".to_string(),
            )),
        }
    }

    pub async fn revoke(&self, access_token: &str) -> Result<(), SessionError> {
        self.client
            .global_sign_out()
            .access_token(access_token)
            .send()
            .await
            .map_err(|e| SessionError::AwsError(e.to_string()))?;

        Ok(())
    }
}

impl SessionProvider for CognitoService {
    fn sign_up<'a>(&'a self, email: &'a str, password: &'a str) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(self.register(email, password))
    }

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<UpstreamSession, SessionError>> {
        Box::pin(self.authenticate(email, password))
    }

    fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), SessionError>> {
        Box::pin(self.revoke(access_token))
    }
}
