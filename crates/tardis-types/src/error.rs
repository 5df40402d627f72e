use thiserror::Error;

#[derive(Error, Debug)]
pub enum TardisError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Data consistency error: {0}")]
    DataConsistency(String),

    #[error("Shape mismatch in {table}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        table: &'static str,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Index out of bounds in {table}: index={index}, len={len}")]
    IndexOutOfBounds {
        table: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Macro atom coefficients requested before initialization")]
    StaleCache,

    #[error("Macro atom level {level} has zero outgoing weight in shell {shell}")]
    ZeroWeightBlock { level: usize, shell: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type TardisResult<T> = Result<T, TardisError>;
