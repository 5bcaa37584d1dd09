use thiserror::Error;

pub type ServiceResult<T> = std::result::Result<T, ServiceError>;

/// Failures a request handler can report, split into client and server faults.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0:#}")]
    ModelLoad(anyhow::Error),

    #[error("{0:#}")]
    Inference(anyhow::Error),

    #[error("{0:#}")]
    Codec(anyhow::Error),
}

impl ServiceError {
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::MissingField(_) | ServiceError::InvalidInput(_)
        )
    }
}
