use thiserror::Error;

#[derive(Error, Debug)]
pub enum TerascoutError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Scout not found: {0}")]
    NotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Fetch error: {0}")]
    Fetch(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
