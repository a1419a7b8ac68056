use thiserror::Error;

/// Every failure the engine can report.
///
/// Shape errors carry the operation name and both conflicting shapes so the
/// caller can tell which step of a forward/backward pass went wrong.
#[derive(Debug, Error)]
pub enum NnError {
    #[error("shape mismatch in {op}: {left:?} vs {right:?}")]
    ShapeMismatch {
        op: &'static str,
        left: Vec<usize>,
        right: Vec<usize>,
    },

    #[error("unsupported activation: {0}")]
    UnknownActivation(String),

    #[error("unsupported loss: {0}")]
    UnknownLoss(String),

    #[error("unsupported optimizer: {0}")]
    UnknownOptimizer(String),

    #[error("unsupported backend: {0}")]
    UnknownBackend(String),

    #[error("backend not available: {0}")]
    BackendUnavailable(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("{0}: no cached state from a matching forward/backward pass")]
    MissingForwardCache(&'static str),

    #[error("malformed model: {0}")]
    MalformedModel(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NnError>;

impl NnError {
    pub(crate) fn shape(op: &'static str, left: &[usize], right: &[usize]) -> NnError {
        NnError::ShapeMismatch {
            op,
            left: left.to_vec(),
            right: right.to_vec(),
        }
    }
}
