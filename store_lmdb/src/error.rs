use thiserror::Error;

#[derive(Debug, Error)]
pub enum LmdbError {
    #[error("LMDB error: {0}")]
    Heed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("corrupt record: {0}")]
    Corruption(String),
}

impl From<heed::Error> for LmdbError {
    fn from(e: heed::Error) -> Self {
        LmdbError::Heed(e.to_string())
    }
}

impl From<LmdbError> for dagchain_store::StoreError {
    fn from(e: LmdbError) -> Self {
        match e {
            LmdbError::Corruption(msg) => dagchain_store::StoreError::Corruption(msg),
            other => dagchain_store::StoreError::Backend(other.to_string()),
        }
    }
}
