use thiserror::Error;

/// Errors raised while reading settings or setting up logging.
#[derive(Error, Debug)]
pub enum Error {
    /// A configuration key is missing or holds an unusable value. The message
    /// names the key.
    #[error("Invalid auth configuration: {0}")]
    Config(String),

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

pub type Result<T> = std::result::Result<T, Error>;
