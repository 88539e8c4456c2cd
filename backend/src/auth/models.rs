use serde::{Deserialize, Serialize};
use shared::SessionUser;

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Cognito user sub, also the storage owner key
    pub email: String,
    /// Upstream access token, needed to revoke the session on sign-out.
    pub access_token: String,
    pub exp: usize,
    pub iat: usize,
}

impl Claims {
    pub fn user(&self) -> SessionUser {
        SessionUser {
            id: self.sub.clone(),
            email: self.email.clone(),
        }
    }
}

/// Result of a successful upstream sign-in.
#[derive(Debug, Clone)]
pub struct UpstreamSession {
    pub user: SessionUser,
    pub access_token: String,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Please enter a valid email address")]
    InvalidEmail,
    #[error("Password must be at least 6 characters")]
    PasswordTooShort,
}

pub fn validate_credentials(email: &str, password: &str) -> Result<(), CredentialsError> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => return Err(CredentialsError::InvalidEmail),
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CredentialsError::PasswordTooShort);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_rules() {
        assert_eq!(validate_credentials("a@b.org", "secret"), Ok(()));
        assert_eq!(
            validate_credentials("not-an-email", "secret"),
            Err(CredentialsError::InvalidEmail)
        );
        assert_eq!(
            validate_credentials("@b.org", "secret"),
            Err(CredentialsError::InvalidEmail)
        );
        assert_eq!(
            validate_credentials("a@b.org", "12345"),
            Err(CredentialsError::PasswordTooShort)
        );
    }
}
