use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector database error: {0}")]
    VectorDb(String),

    #[error("Keyword index error: {0}")]
    Sparse(String),

    #[error("Retrieval failed: {0}")]
    Retrieval(#[source] Box<Error>),
}

impl Error {
    /// Wraps an error that surfaced while serving a query, keeping the cause.
    pub fn into_retrieval(self) -> Error {
        match self {
            Error::Retrieval(_) => self,
            other => Error::Retrieval(Box::new(other)),
        }
    }

    /// The underlying cause of a retrieval failure, or the error itself.
    pub fn cause(&self) -> &Error {
        match self {
            Error::Retrieval(inner) => inner,
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
