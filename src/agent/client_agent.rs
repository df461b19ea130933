//! The client agent (§4.4): submits requests, owns a branch→transaction map, and
//! raises the resulting [`SipResult`] back to its caller (normally the core).

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use rand::Rng;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::StackConfig;
use crate::dialog::Dialog;
use crate::error::{Error, Result};
use crate::events::SipResult;
use crate::message::{Request, MAGIC_COOKIE};
use crate::method::Method;
use crate::router::Router;
use crate::transaction::client_invite::{ClientInviteTransaction, TransactionEvent as InviteEvent};
use crate::transaction::client_non_invite::{ClientNonInviteTransaction, TransactionEvent as NonInviteEvent};
use crate::transaction::TransactionKey;

enum ClientHandle {
    Invite(mpsc::Sender<InviteEvent>),
    NonInvite(mpsc::Sender<NonInviteEvent>),
}

/// Submits requests on behalf of the application and tracks one transaction per
/// outstanding branch.
pub struct ClientAgent {
    router: Arc<Router>,
    config: StackConfig,
    transactions: Mutex<HashMap<TransactionKey, ClientHandle>>,
    cseq_counter: AtomicU32,
}

impl std::fmt::Debug for ClientAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientAgent").finish_non_exhaustive()
    }
}

impl ClientAgent {
    pub fn new(router: Arc<Router>, config: StackConfig) -> Self {
        ClientAgent {
            router,
            config,
            transactions: Mutex::new(HashMap::new()),
            cseq_counter: AtomicU32::new(1),
        }
    }

    fn fresh_branch() -> String {
        let mut rng = rand::thread_rng();
        format!("{MAGIC_COOKIE}{:016x}", rng.gen::<u64>())
    }

    fn fresh_call_id() -> String {
        Uuid::new_v4().to_string()
    }

    fn next_cseq(&self) -> u32 {
        self.cseq_counter.fetch_add(1, Ordering::Relaxed)
    }

    /// Blocking convenience wrapper over [`ClientAgent::begin_request`], for callers
    /// not already inside an async context.
    pub fn request(&self, request: Request, dialog: Option<Arc<dyn Dialog>>) -> Result<SipResult> {
        tokio::task::block_in_place(|| {
            tokio::runtime::Handle::current().block_on(self.begin_request(request, dialog))
        })
    }

    /// Submit `request`, returning once its transaction reaches a terminal outcome.
    pub async fn begin_request(&self, mut request: Request, dialog: Option<Arc<dyn Dialog>>) -> Result<SipResult> {
        if dialog.is_some() && request.method != Method::Invite {
            return Err(Error::ProtocolViolation(
                "a dialog may only be supplied for an INVITE request".to_string(),
            ));
        }

        let (transport, remote) = self.router.select_transport(&request.uri)?;

        let branch = Self::fresh_branch();
        let via = format!(
            "SIP/2.0/{} {};branch={};rport",
            transport.name(),
            transport.settings().external_binding,
            branch
        );
        request.base.headers.prepend("Via", &via)?;

        if request.base.headers.get("Call-ID").is_none() {
            request.base.headers.add("Call-ID", &Self::fresh_call_id())?;
        }
        if request.base.headers.get("CSeq").is_none() {
            let cseq = self.next_cseq();
            request
                .base
                .headers
                .add("CSeq", &format!("{cseq} {}", request.method))?;
        }

        let key = TransactionKey::client(branch.clone());
        let bytes = request.serialize();

        let outcome = if request.method == Method::Invite {
            let (tx, rx) = mpsc::channel(8);
            let txn = ClientInviteTransaction::new(key.clone(), transport, remote, bytes, request.clone());
            self.transactions
                .lock()
                .await
                .insert(key.clone(), ClientHandle::Invite(tx));
            info!(transaction_id = %key, "client INVITE transaction created");
            let outcome = txn.run(rx).await;
            self.transactions.lock().await.remove(&key);
            info!(transaction_id = %key, "client INVITE transaction terminated");
            outcome
        } else {
            let (tx, rx) = mpsc::channel(8);
            let txn = ClientNonInviteTransaction::new(key.clone(), transport, remote, bytes);
            self.transactions
                .lock()
                .await
                .insert(key.clone(), ClientHandle::NonInvite(tx));
            info!(transaction_id = %key, "client non-INVITE transaction created");
            let outcome = txn.run(rx).await;
            self.transactions.lock().await.remove(&key);
            info!(transaction_id = %key, "client non-INVITE transaction terminated");
            outcome
        };

        Ok(SipResult {
            request,
            response: outcome.response,
            status: outcome.status,
            dialog,
            transaction: key,
        })
    }

    /// Feed an inbound response to its matching transaction. Returns `false` (and logs
    /// a warning) if no transaction matches the response's branch.
    pub async fn deliver_response(&self, branch: &str, response: crate::message::Response) -> bool {
        let key = TransactionKey::client(branch.to_string());
        // Clone the sender and release the map lock before awaiting the send, so no
        // lock is held across I/O (§5).
        let handle = self.transactions.lock().await.get(&key).map(|h| match h {
            ClientHandle::Invite(tx) => ClientHandle::Invite(tx.clone()),
            ClientHandle::NonInvite(tx) => ClientHandle::NonInvite(tx.clone()),
        });
        match handle {
            Some(ClientHandle::Invite(tx)) => {
                debug!(transaction_id = %key, status = response.status.0, "dispatching response to invite transaction");
                let _ = tx.send(InviteEvent::Response(response)).await;
                true
            }
            Some(ClientHandle::NonInvite(tx)) => {
                debug!(transaction_id = %key, status = response.status.0, "dispatching response to non-invite transaction");
                let _ = tx.send(NonInviteEvent::Response(response)).await;
                true
            }
            None => {
                warn!(branch, status = response.status.0, "uncorrelated response");
                false
            }
        }
    }

    /// Background tick: a no-op placeholder today since each transaction drives its own
    /// timers on its own task; kept so the core's periodic tick has a uniform shape
    /// across both agents (§4.7).
    pub async fn on_bk_task(&self) {}

    /// Graceful shutdown (§5): close every tracked transaction's event channel. Each
    /// transaction's own `run()` loop observes the closed channel on its next `recv()`
    /// and resolves with a stack-level failure rather than waiting out its timers.
    pub async fn stop(&self) {
        let mut transactions = self.transactions.lock().await;
        let count = transactions.len();
        transactions.clear();
        if count > 0 {
            info!(count, "client agent stopped, closing in-flight transactions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use crate::header::HeaderCollection;
    use crate::message::MessageBase;
    use crate::status::StatusCode;
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportType;
    use crate::uri::parse_uri;

    fn options_request() -> Request {
        Request {
            method: Method::Options,
            uri: parse_uri("sip:bob@127.0.0.1:5060").unwrap(),
            base: MessageBase {
                sip_version: "SIP/2.0".to_string(),
                headers: HeaderCollection::new(),
                body: Vec::new(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn begin_request_prepends_branch_with_magic_cookie_and_fills_call_id_cseq() {
        let udp = Arc::new(MockTransport::new(TransportType::Udp));
        let router = Arc::new(Router::new(vec![udp.clone()], None));
        let agent = Arc::new(ClientAgent::new(router, StackConfig::default()));

        let agent2 = agent.clone();
        let task = tokio::spawn(async move { agent2.begin_request(options_request(), None).await });

        tokio::time::advance(Duration::from_millis(10)).await;
        let sent = udp.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        let parsed = crate::parser::parse_message(&sent[0].1).unwrap();
        let crate::parser::ParsedMessage::Request(sent_request) = parsed else {
            panic!("expected a request frame");
        };
        let via = sent_request.base.headers.get_value("Via").unwrap();
        assert!(via.contains(&format!("branch={MAGIC_COOKIE}")));
        assert!(sent_request.base.headers.get("Call-ID").is_some());
        assert!(sent_request.base.headers.get("CSeq").is_some());

        let response = sent_request.create_response(StatusCode::OK, "OK");
        let via = sent_request.base.headers.get_value("Via").unwrap().to_string();
        let branch = via.split(';').find_map(|p| p.strip_prefix("branch=")).unwrap();
        agent.deliver_response(branch, response).await;

        let result = task.await.unwrap().unwrap();
        assert_eq!(result.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn deliver_response_with_no_matching_transaction_returns_false() {
        let udp = Arc::new(MockTransport::new(TransportType::Udp));
        let router = Arc::new(Router::new(vec![udp], None));
        let agent = ClientAgent::new(router, StackConfig::default());
        let response = crate::message::Response::new(StatusCode::OK, "OK");
        assert!(!agent.deliver_response("z9hG4bKnosuchtxn", response).await);
    }
}
