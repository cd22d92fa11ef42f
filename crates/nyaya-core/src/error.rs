use thiserror::Error;

/// Caller-facing failures of the pipeline entry points. Provider failures
/// never appear here; they are absorbed by per-component fallbacks.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("query is empty")]
    EmptyQuery,

    #[error("document content is empty")]
    EmptyDocument,

    #[error("unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),

    /// Carries internal detail for the log; the message shown to callers is generic.
    #[error("document indexing failed")]
    Indexing(String),

    #[error("the legal assistant is temporarily unavailable")]
    Unavailable,
}

impl PipelineError {
    /// True when the request itself was at fault (HTTP 4xx).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::EmptyQuery | Self::EmptyDocument | Self::UnknownJurisdiction(_)
        )
    }
}
