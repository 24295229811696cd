use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("order {0} not found")]
    OrderNotFound(String),

    #[error("gateway error: {0}")]
    Gateway(String),

    #[error("malformed wire data: {0}")]
    Wire(String),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("minutes must be a positive whole number")]
    InvalidMinutes,

    #[error("unknown courier: {0}")]
    UnknownCourier(String),

    #[error("photo evidence required")]
    MissingPhoto,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Gateway(err.to_string())
    }
}
