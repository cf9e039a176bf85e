use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("row decode error: {0}")]
    Row(#[from] serde_rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<Error> for permissions::Error {
    fn from(e: Error) -> Self {
        permissions::Error::Persistence(e.to_string())
    }
}
