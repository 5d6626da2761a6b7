//! Error types for the duckgate engine.
//!
//! Policy rejections from the statement filter are not errors: they are
//! executed as ordinary statements that return a descriptive row. Everything
//! here is a genuine failure that the gateway reports to the client.

/// Errors from the embedded engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The trusted setup sequence failed. The session stays uninitialized
    /// and the next request retries the whole sequence.
    #[error("Initialization failed: {0}")]
    Initialization(String),

    /// DuckDB rejected the statement (syntax, binder, catalog or runtime
    /// error). The inner string is DuckDB's own diagnostic message.
    #[error("{0}")]
    Execution(String),

    /// Encoding or delivering a result stream failed after it started.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The engine could not be opened or a worker task failed.
    #[error("Engine error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Wrap a failure of the named setup step.
    ///
    /// Only the step label is included, never the statement text, because
    /// setup statements may embed credentials.
    pub fn initialization(step: &str, detail: impl std::fmt::Display) -> Self {
        Self::Initialization(format!("{}: {}", step, detail))
    }

    /// Wrap a join failure of a blocking worker.
    pub fn worker(e: tokio::task::JoinError) -> Self {
        Self::Internal(format!("engine worker failed: {}", e))
    }

    /// Returns `true` for failures that a later request may not hit again.
    pub fn is_retriable(&self) -> bool {
        matches!(self, EngineError::Initialization(_))
    }
}

impl From<duckdb::Error> for EngineError {
    fn from(e: duckdb::Error) -> Self {
        EngineError::Execution(e.to_string())
    }
}

impl From<arrow::error::ArrowError> for EngineError {
    fn from(e: arrow::error::ArrowError) -> Self {
        EngineError::Stream(e.to_string())
    }
}

/// A specialised `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initialization_error_names_step_only() {
        let err = EngineError::initialization("apply storage credentials", "bad region");
        let msg = err.to_string();
        assert!(msg.contains("apply storage credentials"));
        assert!(msg.contains("bad region"));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_execution_error_is_raw_detail() {
        let err = EngineError::Execution("Parser Error: syntax error at or near \"SELCT\"".into());
        assert_eq!(
            err.to_string(),
            "Parser Error: syntax error at or near \"SELCT\""
        );
        assert!(!err.is_retriable());
    }
}
