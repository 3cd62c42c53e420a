use consolle_core::ErrorCode;

/// A failure from a `Backend::eval`/`restart` call, carrying enough
/// structure to pick a wire `ErrorCode` at the socket boundary (spec.md
/// section 7: error taxonomy maps to kinds, not raw class names).
#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("evaluation exceeded its deadline")]
    ExecutionTimeout,

    #[error("console did not reach a ready prompt within the health-check window")]
    ServerUnhealthy,

    #[error("{class_name}: {message}")]
    ChildError {
        class_name: String,
        message: String,
        backtrace: Vec<String>,
    },

    #[error("console terminated")]
    ConsoleTerminated,

    #[error("pty error: {0}")]
    Pty(#[from] consolle_pty::PtyError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// Maps this failure onto the stable wire error code table (spec.md
    /// section 6). Only done at the socket boundary; internal code keeps
    /// the richer `EvalError` structure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            EvalError::ExecutionTimeout => ErrorCode::ExecutionTimeout,
            EvalError::ServerUnhealthy => ErrorCode::ServerUnhealthy,
            EvalError::ChildError { class_name, .. } => ErrorCode::from_class_name(class_name),
            EvalError::ConsoleTerminated => ErrorCode::RuntimeError,
            EvalError::Pty(_) | EvalError::Io(_) => ErrorCode::UnknownError,
        }
    }

    pub fn message(&self) -> String {
        match self {
            EvalError::ChildError { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    pub fn backtrace(&self) -> Option<&[String]> {
        match self {
            EvalError::ChildError { backtrace, .. } if !backtrace.is_empty() => Some(backtrace),
            _ => None,
        }
    }
}
