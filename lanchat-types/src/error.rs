//! Error kinds shared across the engine's crate boundaries.
//!
//! `lanchat-codec` and `lanchat-core` each carry their own error enum for
//! concerns local to that crate, but both wrap or convert into variants here
//! where the failure is one a caller outside the engine (the daemon, or a
//! test) needs to match on uniformly.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid handle: {0:?}")]
    InvalidHandle(String),

    #[error("no roster entry for handle {0:?}")]
    UnknownRecipient(String),

    #[error("malformed frame: {0}")]
    FrameMalformed(String),

    #[error("transport error (temporary): {0}")]
    TransportTemporary(#[source] std::io::Error),

    #[error("transport error (fatal): {0}")]
    TransportFatal(#[source] std::io::Error),

    #[error("front-end IPC endpoint broken: {0}")]
    IpcBroken(String),

    #[error("image transfer incomplete: {0}")]
    TransferIncomplete(String),

    #[error("configuration error: {0}")]
    Config(String),
}
