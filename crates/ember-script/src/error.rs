use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ScriptError {
    #[error("SyntaxError: {message} at {line}:{column}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },

    /// An exception escaped to the top of the script (or of an evaluation).
    #[error("{message} at {line}:{column}")]
    Thrown {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("interrupted: {0}")]
    Interrupted(String),

    #[error("{0}")]
    Unsupported(String),
}
