//! Engine-local error type, convertible into [`lanchat_types::Error`] at any
//! crate boundary that needs the shared vocabulary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Shared(#[from] lanchat_types::Error),

    #[error(transparent)]
    Codec(#[from] lanchat_codec::CodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
