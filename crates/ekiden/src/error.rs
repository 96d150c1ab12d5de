use thiserror::Error;

#[derive(Error, Debug)]
pub enum EkidenError {
    #[error("HTTP error: {0}")]
    HttpError(reqwest::StatusCode),

    #[error(transparent)]
    RequestError(#[from] reqwest::Error),

    #[error(transparent)]
    IOError(#[from] std::io::Error),

    #[error("Unexpected end of input")]
    EndOfInput,

    /// The bytes do not belong to any container this crate can extract.
    #[error("Unrecognized container: {0}")]
    UnrecognizedContainer(String),

    /// A structural violation found while parsing a recognized container.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    #[error("Load canceled")]
    Canceled,

    #[error(transparent)]
    JoinError(#[from] tokio::task::JoinError),
}

impl EkidenError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedContainer(message.into())
    }

    /// Whether retrying the same load may succeed.
    ///
    /// Byte source failures are transient, parser failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::HttpError(_) | Self::RequestError(_) | Self::IOError(_) | Self::EndOfInput
        )
    }
}

pub type EkidenResult<T> = Result<T, EkidenError>;
