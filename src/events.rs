//! Event dispatch: the completion payload a transaction's outcome is enriched into
//! ([`SipResult`]), and the core's named callback hooks (§4.7).
//!
//! Grounded in `dialog-core`'s `SessionCoordinator`/`message_routing` trait shape:
//! one async trait of named hooks with default no-op bodies, so an application
//! overrides only what it cares about.

use std::sync::{Arc, Weak};

use async_trait::async_trait;

use crate::agent::ClientAgent;
use crate::auth::AuthenticateValue;
use crate::core::Core;
use crate::dialog::{Dialog, DialogId};
use crate::message::{Request, Response};
use crate::status::StatusCode;
use crate::transaction::TransactionKey;

/// The outcome of a client request, handed to the application once its transaction
/// terminates. `response` is `None` when `status` encodes a stack-internal failure
/// (timeout, no transport, ...).
#[derive(Debug, Clone)]
pub struct SipResult {
    pub request: Request,
    pub response: Option<Response>,
    pub status: StatusCode,
    pub dialog: Option<Arc<dyn Dialog>>,
    pub transaction: TransactionKey,
}

impl std::fmt::Debug for dyn Dialog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dialog").field("call_id", &self.call_id()).finish()
    }
}

/// Event payload passed to `on_response_received` and friends: everything about a
/// completed (or failed) request/response exchange.
#[derive(Debug, Clone)]
pub struct ResponseEventArgs {
    pub status: StatusCode,
    pub response: Option<Response>,
    pub transaction: TransactionKey,
    pub dialog: Option<Arc<dyn Dialog>>,
    /// The client agent that ran this transaction, so a callback can submit a
    /// follow-up request (e.g. the 2xx ACK) without closing over one itself.
    pub agent: Arc<ClientAgent>,
    /// The owning core, so a callback can reach `respond`/`send_request` directly.
    /// `Weak` since `Core` owns the agent that produces this payload.
    pub core: Weak<Core>,
}

/// The core's event surface. Every method has a no-op default so an application
/// implements only the hooks relevant to it.
#[async_trait]
pub trait CoreCallbacks: Send + Sync {
    /// Any inbound request the server agent created a transaction for.
    async fn on_request_received(&self, _request: &Request) {}

    /// An inbound INVITE specifically (before the application's final response).
    async fn on_invite_received(&self, _request: &Request) {}

    /// Any response delivered by a client transaction, successful or not.
    async fn on_response_received(&self, _args: &ResponseEventArgs) {}

    /// A client INVITE transaction completed with a 2xx.
    async fn on_invite_confirmed(&self, _args: &ResponseEventArgs) {}

    /// A client INVITE transaction completed with a non-2xx final or a stack timeout.
    async fn on_invite_failed(&self, _args: &ResponseEventArgs) {}

    /// A response whose branch matched no known transaction.
    async fn on_uncorrelated_response(&self, _response: &Response) {}

    /// A confirming ACK for a 2xx response, routed outside the transaction layer.
    async fn on_confirming_ack(&self, _request: &Request) {}

    async fn dialog_created(&self, _dialog: &Arc<dyn Dialog>) {}

    async fn dialog_confirmed(&self, _dialog: &Arc<dyn Dialog>, _id: &DialogId) {}

    async fn dialog_closed(&self, _dialog: &Arc<dyn Dialog>) {}

    /// A REGISTER exchange completed; `challenge` is set when the peer demanded
    /// authentication.
    async fn registration_changed(&self, _response: &Response, _challenge: Option<&AuthenticateValue>) {}
}
