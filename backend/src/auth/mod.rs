pub mod cognito_service;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod routes;

use futures::future::BoxFuture;

use models::{CredentialsError, UpstreamSession};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Credentials(#[from] CredentialsError),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("An account with this email already exists")]
    UserExists,
    #[error("Please confirm your account before signing in")]
    NotConfirmed,
    #[error("AWS Cognito error: {0}")]
    AwsError(String),
}

/// Identity provider behind sign-up, sign-in and sign-out.
pub trait SessionProvider: Send + Sync {
    fn sign_up<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<(), SessionError>>;

    fn sign_in<'a>(
        &'a self,
        email: &'a str,
        password: &'a str,
    ) -> BoxFuture<'a, Result<UpstreamSession, SessionError>>;

    /// Revokes every upstream token issued for the session.
    fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), SessionError>>;
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use shared::SessionUser;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Accounts keyed by email; the sub is derived from the email.
    #[derive(Default)]
    pub struct MemorySessionProvider {
        pub accounts: Mutex<HashMap<String, String>>,
        pub signed_out: Mutex<Vec<String>>,
    }

    impl MemorySessionProvider {
        pub fn with_account(email: &str, password: &str) -> Self {
            let provider = Self::default();
            provider
                .accounts
                .lock()
                .unwrap()
                .insert(email.to_string(), password.to_string());
            provider
        }
    }

    impl SessionProvider for MemorySessionProvider {
        fn sign_up<'a>(
            &'a self,
            email: &'a str,
            password: &'a str,
        ) -> BoxFuture<'a, Result<(), SessionError>> {
            Box::pin(async move {
                models::validate_credentials(email, password)?;
                let mut accounts = self.accounts.lock().unwrap();
                if accounts.contains_key(email) {
                    return Err(SessionError::UserExists);
                }
                accounts.insert(email.to_string(), password.to_string());
                Ok(())
            })
        }

        fn sign_in<'a>(
            &'a self,
            email: &'a str,
            password: &'a str,
        ) -> BoxFuture<'a, Result<UpstreamSession, SessionError>> {
            Box::pin(async move {
                let accounts = self.accounts.lock().unwrap();
                match accounts.get(email) {
                    Some(stored) if stored == password => Ok(UpstreamSession {
                        user: SessionUser {
                            id: format!("sub-{}", email),
                            email: email.to_string(),
                        },
                        access_token: format!("access-{}", email),
                    }),
                    _ => Err(SessionError::InvalidCredentials),
                }
            })
        }

        fn sign_out<'a>(&'a self, access_token: &'a str) -> BoxFuture<'a, Result<(), SessionError>> {
            Box::pin(async move {
                self.signed_out
                    .lock()
                    .unwrap()
                    .push(access_token.to_string());
                Ok(())
            })
        }
    }
}
