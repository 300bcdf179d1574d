//! Session verification seam.
//!
//! Identity is owned by an external service; the simulation core only needs
//! the verified `{user_id, name}` pair produced here.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSession {
    pub user_id: String,
    pub name: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing session token")]
    MissingToken,
    #[error("malformed session token")]
    Malformed,
    #[error("session rejected: {0}")]
    Rejected(String),
}

pub trait SessionVerifier: Send + Sync {
    fn verify_session(&self, token: &str) -> Result<VerifiedSession, AuthError>;
}

/// Development verifier accepting `"<user_id>:<display name>"` tokens.
#[derive(Debug, Default, Clone)]
pub struct DevTokenVerifier;

impl SessionVerifier for DevTokenVerifier {
    fn verify_session(&self, token: &str) -> Result<VerifiedSession, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::MissingToken);
        }
        let (user_id, name) = token.split_once(':').ok_or(AuthError::Malformed)?;
        let user_id = user_id.trim();
        if user_id.is_empty() || !user_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(AuthError::Malformed);
        }
        let name = name.trim();
        let name = if name.is_empty() { user_id } else { name };
        Ok(VerifiedSession {
            user_id: user_id.to_string(),
            name: name.chars().take(24).collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_token_accepts_user_and_name() {
        let session = DevTokenVerifier.verify_session("u-1:Alice").unwrap();
        assert_eq!(session.user_id, "u-1");
        assert_eq!(session.name, "Alice");
    }

    #[test]
    fn test_dev_token_defaults_name_to_user_id() {
        let session = DevTokenVerifier.verify_session("bob:").unwrap();
        assert_eq!(session.name, "bob");
    }

    #[test]
    fn test_dev_token_rejections() {
        assert_eq!(DevTokenVerifier.verify_session("  "), Err(AuthError::MissingToken));
        assert_eq!(DevTokenVerifier.verify_session("nocolon"), Err(AuthError::Malformed));
        assert_eq!(DevTokenVerifier.verify_session("bad id:x"), Err(AuthError::Malformed));
    }
}
