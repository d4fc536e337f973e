use thiserror::Error;

/// The five error kinds named by the error handling design, plus `Fatal` for
/// invariant violations. Each component recovers from its own errors where
/// possible (see `spec.md` §7); this enum is what crosses component
/// boundaries.
#[derive(Error, Debug)]
pub enum Error {
    #[error("schema error: {0}")]
    Schema(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("backpressure: {0}")]
    Backpressure(String),

    #[error("actor error: {0}")]
    Actor(String),

    #[error("fatal invariant violation: {0}")]
    Fatal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Error::Query(msg.into())
    }

    pub fn backpressure(msg: impl Into<String>) -> Self {
        Error::Backpressure(msg.into())
    }

    pub fn actor(msg: impl Into<String>) -> Self {
        Error::Actor(msg.into())
    }

    /// A transient error is one the caller may reasonably retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Backpressure(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Schema(e.to_string())
    }
}

/// Asserts an invariant, producing a catchable [`Error::Fatal`] in debug
/// builds instead of aborting the process; in release builds the condition
/// is trusted.
#[macro_export]
macro_rules! invariant {
    ($cond:expr, $($arg:tt)*) => {
        if cfg!(debug_assertions) && !$cond {
            return Err($crate::error::Error::Fatal(format!($($arg)*)));
        }
    };
}
