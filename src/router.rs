//! Transport selection for outbound requests and dispatch for inbound messages (§4.6).

use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::transport::{Transport, TransportType};
use crate::uri::Uri;

/// Selects a transport/endpoint for an outbound request, and dispatches inbound
/// messages to the right agent.
pub struct Router {
    transports: Vec<Arc<dyn Transport>>,
    outbound_proxy: Option<Uri>,
}

impl Router {
    pub fn new(transports: Vec<Arc<dyn Transport>>, outbound_proxy: Option<Uri>) -> Self {
        Router {
            transports,
            outbound_proxy,
        }
    }

    /// Pick a transport and remote endpoint for `request_uri`, preferring the
    /// configured outbound proxy when present (§4.6).
    pub fn select_transport(&self, request_uri: &Uri) -> Result<(Arc<dyn Transport>, SocketAddr)> {
        let target = self.outbound_proxy.as_ref().unwrap_or(request_uri);
        let preferred = target.transport_param();

        let transport = match preferred {
            None => self.transports.iter().find(|t| t.transport_type() == TransportType::Udp),
            Some(pref) => {
                let wanted = match pref.to_ascii_uppercase().as_str() {
                    "UDP" => TransportType::Udp,
                    "TCP" => TransportType::Tcp,
                    "TLS" => TransportType::Tls,
                    _ => return Err(Error::NoAvailableTransport),
                };
                self.transports.iter().find(|t| t.transport_type() == wanted)
            }
        }
        .ok_or(Error::NoAvailableTransport)?;

        let endpoint = resolve_endpoint(target)?;
        Ok((transport.clone(), endpoint))
    }
}

fn resolve_endpoint(uri: &Uri) -> Result<SocketAddr> {
    let host_port = format!("{}:{}", uri.host.trim_start_matches('[').trim_end_matches(']'), uri.effective_port());
    host_port
        .to_socket_addrs()
        .map_err(|e| Error::Parse(format!("could not resolve {}: {e}", uri.host)))?
        .next()
        .ok_or_else(|| Error::Parse(format!("no address for {}", uri.host)))
}
