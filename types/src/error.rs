//! Errors raised by the fundamental types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid compact difficulty {0:#010x}")]
    InvalidCompact(u32),
}
