//! Typed errors for the crawler.
//!
//! Three families matter to callers: the API collaborator failed
//! ([`CrawlError::Network`]), it answered with something unexpected
//! ([`CrawlError::Parse`]), or the corpus could not be read or written
//! ([`CrawlError::Storage`]). Every variant names the call that failed.

use thiserror::Error;

/// A failed read or write against the corpus database.
#[derive(Debug, Error)]
#[error("storage error during {operation}: {source}")]
pub struct StorageError {
    pub operation: &'static str,
    #[source]
    pub source: sqlx::Error,
}

impl StorageError {
    pub fn new(operation: &'static str, source: sqlx::Error) -> Self {
        Self { operation, source }
    }
}

/// Attach an operation name to a sqlx result.
pub(crate) trait StorageContext<T> {
    fn during(self, operation: &'static str) -> std::result::Result<T, StorageError>;
}

impl<T> StorageContext<T> for std::result::Result<T, sqlx::Error> {
    fn during(self, operation: &'static str) -> std::result::Result<T, StorageError> {
        self.map_err(|e| StorageError::new(operation, e))
    }
}

#[derive(Debug, Error)]
pub enum CrawlError {
    /// API call failed: transport error or non-success response.
    #[error("{call} failed: {message}")]
    Network {
        call: String,
        status: Option<u16>,
        message: String,
    },

    /// API response did not have the expected shape.
    #[error("{call} returned an unexpected response: {message}")]
    Parse { call: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// The write-queue consumer is gone; nothing more can be persisted.
    #[error("store writer stopped before the write was applied")]
    WriterClosed,

    #[error("pass {pass} failed: {source}")]
    PassFailed {
        pass: &'static str,
        #[source]
        source: Box<CrawlError>,
    },

    #[error("crawl task panicked or was cancelled: {0}")]
    Task(String),
}

impl CrawlError {
    pub fn network(call: impl Into<String>, status: Option<u16>, message: impl Into<String>) -> Self {
        CrawlError::Network {
            call: call.into(),
            status,
            message: message.into(),
        }
    }

    pub fn parse(call: impl Into<String>, message: impl Into<String>) -> Self {
        CrawlError::Parse {
            call: call.into(),
            message: message.into(),
        }
    }

    /// True when the collaborator answered 404 for the requested entity.
    pub fn is_not_found(&self) -> bool {
        matches!(self, CrawlError::Network { status: Some(404), .. })
    }

    /// True for errors raised by the API collaborator rather than by storage.
    pub fn is_api_failure(&self) -> bool {
        matches!(self, CrawlError::Network { .. } | CrawlError::Parse { .. })
    }
}

pub type Result<T> = std::result::Result<T, CrawlError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_name_the_failing_call() {
        let err = CrawlError::network("resolve_profile(@someone)", Some(503), "service unavailable");
        assert_eq!(
            err.to_string(),
            "resolve_profile(@someone) failed: service unavailable"
        );
    }

    #[test]
    fn only_404_counts_as_not_found() {
        assert!(CrawlError::network("x", Some(404), "gone").is_not_found());
        assert!(!CrawlError::network("x", Some(500), "boom").is_not_found());
        assert!(!CrawlError::network("x", None, "reset").is_not_found());
    }

    #[test]
    fn storage_failures_are_not_api_failures() {
        let err = CrawlError::from(StorageError::new("store_profile", sqlx::Error::RowNotFound));
        assert!(!err.is_api_failure());
        assert!(err.to_string().contains("store_profile"));
    }

    #[test]
    fn during_names_the_storage_operation() {
        let failed: std::result::Result<(), sqlx::Error> = Err(sqlx::Error::RowNotFound);
        let err = failed.during("load_profile").unwrap_err();
        assert_eq!(err.operation, "load_profile");

        let ok: std::result::Result<i64, sqlx::Error> = Ok(7);
        assert_eq!(ok.during("load_profile").unwrap(), 7);
    }
}
