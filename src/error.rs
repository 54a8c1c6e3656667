//! Error types for the propagation core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AcousticsError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Geometry error: {0}")]
    Geometry(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Receiver error: {0}")]
    Receiver(String),

    #[error("Command channel error: {0}")]
    CommandChannel(String),
}

pub type Result<T> = std::result::Result<T, AcousticsError>;
