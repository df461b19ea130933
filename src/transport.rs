//! The `Transport` capability (§2, §6 "Transport contract"): a pluggable delivery
//! mechanism the core and transaction layer send bytes through. Concrete UDP/TCP/TLS
//! transports are out of scope; this module specifies only the contract they implement.

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, TransportErrorKind};

/// The wire protocol a [`Transport`] speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportType {
    Udp,
    Tcp,
    Tls,
}

impl TransportType {
    pub fn name(self) -> &'static str {
        match self {
            TransportType::Udp => "UDP",
            TransportType::Tcp => "TCP",
            TransportType::Tls => "TLS",
        }
    }

    /// Whether a transaction on this transport skips retransmission (it relies on the
    /// stream to redeliver) per §4.4/§4.5 ("UDP only"/"0 (reliable)").
    pub fn is_reliable(self) -> bool {
        !matches!(self, TransportType::Udp)
    }
}

/// Base timer values a transport may override (§4.10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransportSettings {
    pub external_binding: SocketAddr,
    pub t1: Duration,
    pub t2: Duration,
    pub t4: Duration,
}

/// A transport delivery failure (§7).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub cause: String,
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport {
            kind: e.kind,
            cause: e.cause,
        }
    }
}

/// A pluggable delivery mechanism. Implementations own the actual socket; this stack
/// only needs to send bytes to an endpoint and learn the transport's identity and base
/// timer settings.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `"UDP"`, `"TCP"`, or `"TLS"`.
    fn name(&self) -> &'static str {
        self.transport_type().name()
    }

    fn transport_type(&self) -> TransportType;

    fn settings(&self) -> TransportSettings;

    /// Send a framed message to `remote_endpoint`.
    async fn send(&self, remote_endpoint: SocketAddr, bytes: &[u8]) -> Result<(), TransportError>;
}
