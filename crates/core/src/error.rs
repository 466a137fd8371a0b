use thiserror::Error;

pub type KrakensResult<T> = Result<T, KrakensError>;

#[derive(Error, Debug)]
pub enum KrakensError {
    #[error("Unauthorized")]
    Unauthorized,

    #[error("Bad input: {0}")]
    BadInput(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Active window degraded: {0}")]
    Degraded(String),

    #[error("Event store error: {0}")]
    Store(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl KrakensError {
    /// Short machine-readable label, used for metrics and API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::BadInput(_) => "bad_input",
            Self::Unavailable(_) => "unavailable",
            Self::Degraded(_) => "degraded",
            Self::Store(_) => "store_error",
            Self::Config(_) => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Internal(_) => "internal_error",
        }
    }
}
