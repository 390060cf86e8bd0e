//! Error types for script loading.

/// A script could not be retrieved or executed.
///
/// Every caller sharing the failed load receives a clone of the same error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed loading script at {url}")]
pub struct LoadError {
    url: String,
    detail: Option<String>,
}

impl LoadError {
    /// Create an error for `url` without further detail.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            detail: None,
        }
    }

    /// Create an error for `url` carrying a host-supplied reason.
    pub fn with_detail(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            detail: Some(detail.into()),
        }
    }

    /// The URL that failed to load.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reason reported by the host, if any.
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_the_failed_url() {
        let err = LoadError::with_detail("https://cdn.example/bad.js", "404");

        assert_eq!(err.to_string(), "Failed loading script at https://cdn.example/bad.js");
        assert_eq!(err.detail(), Some("404"));
    }
}
