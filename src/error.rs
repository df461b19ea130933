//! Crate-wide error taxonomy.
//!
//! Mirrors the shape of `rvoip-sip-core`'s `error` module: a flat `thiserror` enum plus
//! a `Result<T>` alias, rather than a tree of per-module error types.

use thiserror::Error;

use crate::transaction::TransactionKey;

/// A type alias for handling `Result`s with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur anywhere in the stack.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A message, header, URI, or authorization value could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),

    /// A required header or field was missing for the operation being attempted.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The transport layer failed to deliver a message.
    #[error("transport error ({kind:?}): {cause}")]
    Transport {
        /// Whether the failure is worth retrying.
        kind: TransportErrorKind,
        /// Human-readable cause, supplied by the transport implementation.
        cause: String,
    },

    /// A transaction ran its terminal timer out without reaching a final outcome.
    #[error("transaction {0} timed out")]
    TransactionTimeout(TransactionKey),

    /// The router could not find any transport matching the request.
    #[error("no available transport")]
    NoAvailableTransport,

    /// An inbound response's branch did not match any known transaction.
    #[error("uncorrelated response")]
    UncorrelatedResponse,

    /// A digest challenge or credential requested an algorithm other than MD5.
    #[error("unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Catch-all for state-machine invariant violations (e.g. an invalid transition).
    #[error("transaction error ({key}): {0}", key = .1)]
    Transaction(String, TransactionKey),

    /// Catch-all for errors that don't fit the categories above.
    #[error("{0}")]
    Other(String),
}

/// Distinguishes transient from permanent transport failures (§7 `TransportError`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The send did not complete in time; a retransmit may succeed.
    Timeout,
    /// The transport (or peer) rejected the send outright; retrying won't help.
    Rejected,
}

impl Error {
    /// Build a [`Error::Transport`] with [`TransportErrorKind::Timeout`].
    pub fn transport_timeout(cause: impl Into<String>) -> Self {
        Error::Transport {
            kind: TransportErrorKind::Timeout,
            cause: cause.into(),
        }
    }

    /// Build a [`Error::Transport`] with [`TransportErrorKind::Rejected`].
    pub fn transport_rejected(cause: impl Into<String>) -> Self {
        Error::Transport {
            kind: TransportErrorKind::Rejected,
            cause: cause.into(),
        }
    }
}
