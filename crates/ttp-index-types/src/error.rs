// ─────────────────────────────────────────────────────────────────────
// TTP Index Kernel — Error Hierarchy
// ─────────────────────────────────────────────────────────────────────

use thiserror::Error;

/// Root error type for all index kernel failures.
///
/// Three families matter to callers:
/// - configuration (`Config`, `Taxonomy`): fatal, the kernel must not start;
/// - per-document input (`Validation`, `EmptyDocument`, `Cancelled`,
///   `Numerical`): the document fails, a batch continues;
/// - dependency (`Classifier`, `Timeout`): retryable by the caller.
#[derive(Error, Debug)]
pub enum IndexError {
    /// Invalid runtime configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Taxonomy table failed schema validation.
    #[error("taxonomy error: {0}")]
    Taxonomy(String),

    /// Input could not be recovered (malformed spans, unparseable payload).
    #[error("validation error: {0}")]
    Validation(String),

    /// Document has no sentences to normalise frequencies against.
    #[error("document has zero sentences")]
    EmptyDocument,

    /// External classifier failed or is unavailable.
    #[error("classifier error: {0}")]
    Classifier(String),

    /// External classifier exceeded its deadline.
    #[error("timeout: classifier exceeded {deadline_ms}ms deadline")]
    Timeout { deadline_ms: u64 },

    /// Analysis was cancelled at a stage boundary.
    #[error("analysis cancelled before {stage}")]
    Cancelled { stage: String },

    /// Numerical error (NaN/Inf escaped a computation).
    #[error("numerical error: {0}")]
    Numerical(String),
}

impl IndexError {
    /// Whether an orchestrating caller may retry the same document.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Classifier(_) | Self::Timeout { .. })
    }

    /// Whether the error prevents the kernel from starting at all.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Taxonomy(_))
    }
}

pub type IndexResult<T> = Result<T, IndexError>;
