//! Crate-wide error type with process exit-code mapping.

use thiserror::Error;

/// Everything that can go wrong between argv and the last task.
#[derive(Debug, Error)]
pub enum Error {
    /// Recipe/config problems: YAML parse failures, schema violations,
    /// bad parameter specs, dangling or cyclic dependencies, import errors.
    #[error("{0}")]
    Recipe(String),

    /// State-file problems that could not be recovered locally.
    #[error("{0}")]
    State(String),

    /// Argument coercion or binding failure for an invocation.
    #[error("{0}")]
    Arg(String),

    /// A task's command exited non-zero or could not be spawned.
    #[error("task '{task}' failed: {message}")]
    Execution { task: String, message: String },

    /// The running task was cancelled from the terminal.
    #[error("interrupted")]
    Interrupted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("glob walk failed: {0}")]
    Glob(#[from] glob::GlobError),
}

impl Error {
    /// Process exit code for this error kind.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Execution { .. } => 2,
            Error::Interrupted => 130,
            _ => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
