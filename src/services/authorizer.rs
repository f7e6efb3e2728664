//! Caller identity for the signing service.
//!
//! Sessions are validated by the external auth system; the signing service only
//! asks an [`Authorizer`] to turn the presented bearer credential into a
//! [`Caller`] it can trust.

use crate::errors::SigningError;
use std::{collections::HashSet, fmt};

/// A caller whose session has already been validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub subject: String,
}

impl Caller {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
        }
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.subject)
    }
}

pub trait Authorizer: Send + Sync {
    /// Resolve the bearer token from the `Authorization` header, if any.
    fn authorize(&self, bearer: Option<&str>) -> Result<Caller, SigningError>;
}

/// Accepts a fixed set of operator tokens.
///
/// With an empty set, any non-empty bearer token is accepted: the session was
/// checked upstream and only its presence is enforced here.
#[derive(Default)]
pub struct TokenAuthorizer {
    tokens: HashSet<String>,
}

impl TokenAuthorizer {
    pub fn new<I, T>(tokens: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|t: &String| !t.is_empty())
                .collect(),
        }
    }

    pub fn trusts_upstream(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authorizer for TokenAuthorizer {
    fn authorize(&self, bearer: Option<&str>) -> Result<Caller, SigningError> {
        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| SigningError::Unauthorized("No authorization header".into()))?;

        if !self.trusts_upstream() && !self.tokens.contains(token) {
            return Err(SigningError::Unauthorized("unknown session".into()));
        }

        // Only a short fingerprint of the token is kept for logs.
        let fingerprint: String = token.chars().take(6).collect();
        Ok(Caller::new(format!("session:{}…", fingerprint)))
    }
}

/// Extract the token from an `Authorization: Bearer …` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") {
        Some(token.trim())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_token_is_unauthorized() {
        let auth = TokenAuthorizer::default();
        assert!(auth.trusts_upstream());
        assert!(matches!(
            auth.authorize(None),
            Err(SigningError::Unauthorized(_))
        ));
        assert!(auth.authorize(Some("  ")).is_err());
        assert!(auth.authorize(Some("anything")).is_ok());
    }

    #[test]
    fn configured_tokens_are_enforced() {
        let auth = TokenAuthorizer::new(["op-token"]);
        assert!(!auth.trusts_upstream());
        assert!(auth.authorize(Some("op-token")).is_ok());
        assert!(auth.authorize(Some("other")).is_err());
    }

    #[test]
    fn parses_bearer_header() {
        assert_eq!(bearer_token("Bearer abc"), Some("abc"));
        assert_eq!(bearer_token("bearer  abc "), Some("abc"));
        assert_eq!(bearer_token("Basic abc"), None);
        assert_eq!(bearer_token("abc"), None);
    }
}
