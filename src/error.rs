use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// The caller passed something the operation cannot accept. Nothing was changed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal bookkeeping is inconsistent or a scoped state was used unbalanced.
    #[error("logic error: {0}")]
    Logic(String),

    #[error("unsupported operation: {0}")]
    Unsupported(String),

    #[error("gpu backend error: {0}")]
    Gpu(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn logic(msg: impl Into<String>) -> Self {
        Error::Logic(msg.into())
    }
}
