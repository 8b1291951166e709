//! Credential loading.
//!
//! The credential file is a small JSON document:
//!
//! ```json
//! { "bearer_token": "AAAA..." }
//! ```

use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::error::{Result, SocialApiError};

#[derive(Deserialize)]
struct CredentialsFile {
    bearer_token: String,
}

/// App-only bearer credentials for the API.
#[derive(Clone)]
pub struct Credentials {
    bearer_token: SecretString,
}

impl Credentials {
    pub fn new(bearer_token: impl Into<String>) -> Self {
        Self {
            bearer_token: SecretString::from(bearer_token.into()),
        }
    }

    /// Read credentials from a JSON file on disk.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            SocialApiError::Credentials(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_json(&contents)
            .map_err(|e| SocialApiError::Credentials(format!("{}: {e}", path.display())))
    }

    pub fn from_json(contents: &str) -> Result<Self> {
        let file: CredentialsFile = serde_json::from_str(contents)
            .map_err(|e| SocialApiError::Credentials(e.to_string()))?;
        if file.bearer_token.trim().is_empty() {
            return Err(SocialApiError::Credentials("bearer_token is empty".into()));
        }
        Ok(Self::new(file.bearer_token))
    }

    pub(crate) fn bearer_token(&self) -> &str {
        self.bearer_token.expose_secret()
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("bearer_token", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn loads_token_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"bearer_token":"secret-token"}}"#).unwrap();

        let creds = Credentials::from_file(file.path()).unwrap();
        assert_eq!(creds.bearer_token(), "secret-token");
    }

    #[test]
    fn rejects_empty_token() {
        let err = Credentials::from_json(r#"{"bearer_token":"  "}"#).unwrap_err();
        assert!(matches!(err, SocialApiError::Credentials(_)));
    }

    #[test]
    fn debug_output_is_redacted() {
        let creds = Credentials::new("secret-token");
        assert!(!format!("{creds:?}").contains("secret-token"));
    }
}
