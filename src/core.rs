//! The core (§4.7): binds transports to one client and one server agent, owns the
//! dialog tables, and dispatches the named callbacks in [`crate::events::CoreCallbacks`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::agent::{ClientAgent, Reception, ServerAgent};
use crate::config::StackConfig;
use crate::dialog::{Dialog, DialogFactory, DialogId};
use crate::error::Result;
use crate::events::{CoreCallbacks, ResponseEventArgs, SipResult};
use crate::message::{Request, Response};
use crate::method::Method;
use crate::parser::{parse_message, ParsedMessage};
use crate::router::Router;
use crate::transport::Transport;

/// Owns the transports, agents, and dialog tables for one SIP endpoint.
pub struct Core {
    transports: Vec<Arc<dyn Transport>>,
    client_agent: Arc<ClientAgent>,
    server_agent: Arc<ServerAgent>,
    early_dialogs: Mutex<HashMap<String, Arc<dyn Dialog>>>,
    confirmed_dialogs: Mutex<HashMap<DialogId, Arc<dyn Dialog>>>,
    callbacks: Arc<dyn CoreCallbacks>,
    dialog_factory: Option<Arc<dyn DialogFactory>>,
}

impl Core {
    pub fn new(
        transports: Vec<Arc<dyn Transport>>,
        config: StackConfig,
        callbacks: Arc<dyn CoreCallbacks>,
        dialog_factory: Option<Arc<dyn DialogFactory>>,
    ) -> Self {
        let router = Arc::new(Router::new(transports.clone(), config.outbound_proxy.clone()));
        let client_agent = Arc::new(ClientAgent::new(router, config.clone()));
        let server_agent = Arc::new(ServerAgent::new(config));
        Core {
            transports,
            client_agent,
            server_agent,
            early_dialogs: Mutex::new(HashMap::new()),
            confirmed_dialogs: Mutex::new(HashMap::new()),
            callbacks,
            dialog_factory,
        }
    }

    /// Submit an outbound request (§4.4). For an INVITE starting a new dialog, records
    /// the dialog in the early-dialog table keyed by Call-ID before the transaction
    /// runs so provisional responses can be correlated as they arrive.
    pub async fn send_request(self: &Arc<Self>, request: Request, dialog: Option<Arc<dyn Dialog>>) -> Result<SipResult> {
        if let Some(dialog) = &dialog {
            let call_id = dialog.call_id().to_string();
            self.early_dialogs.lock().await.insert(call_id, dialog.clone());
            self.callbacks.dialog_created(dialog).await;
        }

        let result = self.client_agent.begin_request(request, dialog.clone()).await?;

        let args = ResponseEventArgs {
            status: result.status,
            response: result.response.clone(),
            transaction: result.transaction.clone(),
            dialog: result.dialog.clone(),
            agent: self.client_agent.clone(),
            core: Arc::downgrade(self),
        };
        self.callbacks.on_response_received(&args).await;

        if result.request.method == Method::Invite {
            if result.status.is_success() {
                self.callbacks.on_invite_confirmed(&args).await;
                if let (Some(dialog), Some(response)) = (&dialog, &result.response) {
                    let call_id = dialog.call_id().to_string();
                    self.early_dialogs.lock().await.remove(&call_id);
                    let local_tag = tag_from(&response.base, "From");
                    let remote_tag = tag_from(&response.base, "To");
                    let id = DialogId::new(call_id, local_tag, remote_tag);
                    dialog.on_confirmed(id.clone()).await;
                    self.confirmed_dialogs.lock().await.insert(id.clone(), dialog.clone());
                    self.callbacks.dialog_confirmed(dialog, &id).await;
                }
            } else {
                self.callbacks.on_invite_failed(&args).await;
                if let Some(dialog) = &dialog {
                    let call_id = dialog.call_id().to_string();
                    self.early_dialogs.lock().await.remove(&call_id);
                    dialog.on_closed().await;
                    self.callbacks.dialog_closed(dialog).await;
                }
            }
        }

        Ok(result)
    }

    /// Parse and dispatch an inbound frame (§4.6 "Given an inbound message").
    pub async fn handle_inbound(&self, transport: Arc<dyn Transport>, remote: SocketAddr, bytes: &[u8]) -> Result<()> {
        let parsed = match parse_message(bytes) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(error = ?e, "dropping malformed inbound message");
                return Ok(());
            }
        };

        match parsed {
            ParsedMessage::Request(request) => self.handle_inbound_request(request, transport, remote).await,
            ParsedMessage::Response(response) => self.handle_inbound_response(response).await,
        }
    }

    async fn handle_inbound_request(&self, request: Request, transport: Arc<dyn Transport>, remote: SocketAddr) -> Result<()> {
        self.callbacks.on_request_received(&request).await;
        if request.method == Method::Invite {
            self.callbacks.on_invite_received(&request).await;
        }

        match self.server_agent.receive(request, transport, remote).await? {
            Reception::NewRequest { key: _, request } => {
                if let Some(factory) = &self.dialog_factory {
                    if request.method == Method::Invite {
                        let call_id = request.base.headers.get_value("Call-ID").unwrap_or_default();
                        let dialog = factory.for_server_invite(&call_id).await;
                        self.early_dialogs.lock().await.insert(call_id, dialog.clone());
                        self.callbacks.dialog_created(&dialog).await;
                    }
                }
            }
            Reception::Retransmit => {}
            Reception::ConfirmingAck(request) => {
                self.callbacks.on_confirming_ack(&request).await;
            }
        }
        Ok(())
    }

    async fn handle_inbound_response(&self, response: Response) -> Result<()> {
        let Some(via) = response.base.headers.get_value("Via") else {
            self.callbacks.on_uncorrelated_response(&response).await;
            return Ok(());
        };
        let Some(branch) = extract_branch(via) else {
            self.callbacks.on_uncorrelated_response(&response).await;
            return Ok(());
        };

        if !self.client_agent.deliver_response(&branch, response.clone()).await {
            self.callbacks.on_uncorrelated_response(&response).await;
        }
        Ok(())
    }

    /// Deliver the application's response for a server transaction.
    pub async fn respond(&self, transaction: &crate::transaction::TransactionKey, response: Response) -> Result<()> {
        self.server_agent.respond(transaction, response).await
    }

    /// Spawn the periodic background tick (§4.7, §5). Each tick forwards to both
    /// agents' `on_bk_task`; reaping of terminated transactions happens inline as each
    /// transaction's own task completes, so the tick itself only needs to exist for
    /// agent implementations that accumulate per-tick bookkeeping.
    pub fn spawn_background_tick(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let core = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                core.client_agent.on_bk_task().await;
                core.server_agent.on_bk_task().await;
            }
        })
    }

    pub fn transports(&self) -> &[Arc<dyn Transport>] {
        &self.transports
    }

    /// Graceful shutdown (§5): stop both agents, terminating every tracked
    /// transaction and resolving its pending waiters with a stack-level failure.
    pub async fn stop(&self) {
        self.client_agent.stop().await;
        self.server_agent.stop().await;
    }
}

fn extract_branch(via: &str) -> Option<String> {
    via.split(';').find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("branch") {
            Some(value.trim().to_string())
        } else {
            None
        }
    })
}

fn tag_from(base: &crate::message::MessageBase, header: &str) -> String {
    base.headers
        .get_value(header)
        .and_then(|v| v.split(';').find_map(|p| p.trim().strip_prefix("tag=").map(str::to_string)))
        .unwrap_or_default()
}

impl std::fmt::Debug for Core {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Core").field("transports", &self.transports.len()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderCollection;
    use crate::message::MessageBase;
    use crate::method::Method;
    use crate::status::StatusCode;
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportType;
    use crate::uri::parse_uri;

    struct NoopCallbacks;
    impl CoreCallbacks for NoopCallbacks {}

    fn options_request(uri: &str) -> Request {
        let mut headers = HeaderCollection::new();
        headers.add("Max-Forwards", "70").unwrap();
        headers.add("To", "<sip:bob@example.com>").unwrap();
        headers.add("From", "<sip:alice@example.com>;tag=abc").unwrap();
        Request {
            method: Method::Options,
            uri: parse_uri(uri).unwrap(),
            base: MessageBase {
                sip_version: "SIP/2.0".to_string(),
                headers,
                body: Vec::new(),
            },
        }
    }

    #[tokio::test(start_paused = true)]
    async fn client_non_invite_round_trip_through_core() {
        let udp = Arc::new(MockTransport::new(TransportType::Udp));
        let core = Arc::new(Core::new(
            vec![udp.clone()],
            StackConfig::default(),
            Arc::new(NoopCallbacks),
            None,
        ));

        let core_for_request = core.clone();
        let request_task = tokio::spawn(async move {
            core_for_request
                .send_request(options_request("sip:bob@127.0.0.1:5060"), None)
                .await
        });

        // Pump the runtime so the spawned transaction sends its initial request and
        // parks on the response channel, then feed back a 200 OK as if it arrived from
        // the network, mirroring what `handle_inbound` does for a real socket.
        tokio::time::advance(Duration::from_millis(10)).await;
        let sent = udp.sent.lock().await.clone();
        assert_eq!(sent.len(), 1);
        let outbound = crate::parser::parse_message(&sent[0].1).unwrap();
        let crate::parser::ParsedMessage::Request(sent_request) = outbound else {
            panic!("expected a request frame");
        };

        let mut response = sent_request.create_response(StatusCode::OK, "OK");
        core.handle_inbound(udp.clone(), sent[0].0, &response.serialize()).await.unwrap();

        let result = request_task.await.unwrap().unwrap();
        assert_eq!(result.status, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_resolves_in_flight_client_transaction_with_stack_failure() {
        let udp = Arc::new(MockTransport::new(TransportType::Udp));
        let core = Arc::new(Core::new(
            vec![udp.clone()],
            StackConfig::default(),
            Arc::new(NoopCallbacks),
            None,
        ));

        let core_for_request = core.clone();
        let request_task = tokio::spawn(async move {
            core_for_request
                .send_request(options_request("sip:bob@127.0.0.1:5060"), None)
                .await
        });

        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(udp.sent.lock().await.len(), 1);

        core.stop().await;
        let result = request_task.await.unwrap().unwrap();
        assert_eq!(result.status, StatusCode::STACK_TIMEOUT);
    }

    #[tokio::test]
    async fn inbound_request_reaches_server_agent_as_new_request() {
        let udp = Arc::new(MockTransport::new(TransportType::Udp));
        let core = Core::new(vec![udp.clone()], StackConfig::default(), Arc::new(NoopCallbacks), None);

        let mut request = options_request("sip:bob@127.0.0.1:5060");
        request
            .base
            .headers
            .add("Via", "SIP/2.0/UDP 127.0.0.1:5061;branch=z9hG4bK1234")
            .unwrap();
        request.base.headers.add("Call-ID", "abc123@127.0.0.1").unwrap();
        request.base.headers.add("CSeq", "1 OPTIONS").unwrap();

        let remote: SocketAddr = "127.0.0.1:5061".parse().unwrap();
        core.handle_inbound(udp.clone(), remote, &request.serialize()).await.unwrap();
        // No response submitted yet; the transaction should still be tracked.
        assert!(core
            .respond(
                &crate::transaction::TransactionKey::server("z9hG4bK1234", "127.0.0.1:5061", "OPTIONS"),
                request.create_response(StatusCode::OK, "OK"),
            )
            .await
            .is_ok());
    }
}
