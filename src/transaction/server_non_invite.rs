//! Non-INVITE server transaction (§4.5): buffers the request, resends the last
//! response on retransmitted requests, timer J absorbs the retransmit window.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::message::{Request, Response};
use crate::transaction::key::TransactionKey;
use crate::transaction::state::TransactionState;
use crate::transport::{Transport, TransportSettings};

pub enum TransactionEvent {
    /// A retransmitted copy of the original request.
    Retransmit,
    /// The application's response (provisional or final).
    Respond(Response),
}

pub struct ServerNonInviteTransaction {
    pub key: TransactionKey,
    pub request: Request,
    transport: Arc<dyn Transport>,
    remote: SocketAddr,
    settings: TransportSettings,
    state: Mutex<TransactionState>,
    last_response: Mutex<Option<Vec<u8>>>,
}

impl ServerNonInviteTransaction {
    pub fn new(key: TransactionKey, request: Request, transport: Arc<dyn Transport>, remote: SocketAddr) -> Self {
        let settings = transport.settings();
        ServerNonInviteTransaction {
            key,
            request,
            transport,
            remote,
            settings,
            state: Mutex::new(TransactionState::Trying),
            last_response: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> TransactionState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: TransactionState) {
        *self.state.lock().await = state;
        debug!(transaction_id = %self.key, ?state, "non-invite server transaction state change");
    }

    async fn send_and_remember(&self, mut response: Response) {
        let bytes = response.serialize();
        if let Err(e) = self.transport.send(self.remote, &bytes).await {
            warn!(transaction_id = %self.key, error = ?e, "response send failed");
        }
        *self.last_response.lock().await = Some(bytes);
    }

    async fn resend_last(&self) {
        if let Some(bytes) = self.last_response.lock().await.clone() {
            if let Err(e) = self.transport.send(self.remote, &bytes).await {
                warn!(transaction_id = %self.key, error = ?e, "resend of last response failed");
            }
        }
    }

    /// Drive the transaction: `events` carries retransmitted requests and the
    /// application's provisional/final responses.
    pub async fn run(&self, mut events: mpsc::Receiver<TransactionEvent>) {
        let reliable = self.transport.transport_type().is_reliable();
        let t1 = self.settings.t1;

        loop {
            match events.recv().await {
                Some(TransactionEvent::Retransmit) => {
                    trace!(transaction_id = %self.key, "retransmitted request, resending last response");
                    self.resend_last().await;
                }
                Some(TransactionEvent::Respond(response)) => {
                    if response.status.is_provisional() {
                        self.set_state(TransactionState::Proceeding).await;
                        self.send_and_remember(response).await;
                        continue;
                    }
                    self.set_state(TransactionState::Completed).await;
                    self.send_and_remember(response).await;
                    if reliable || t1.is_zero() {
                        self.set_state(TransactionState::Terminated).await;
                        return;
                    }
                    // Timer J: absorb request retransmits for 64*T1 starting now that the
                    // final response has gone out, not from transaction start.
                    let timer_j_deadline = Instant::now() + t1 * 64;
                    self.absorb_until(timer_j_deadline, &mut events).await;
                    self.set_state(TransactionState::Terminated).await;
                    return;
                }
                None => {
                    self.set_state(TransactionState::Terminated).await;
                    return;
                }
            }
        }
    }

    async fn absorb_until(&self, deadline: Instant, events: &mut mpsc::Receiver<TransactionEvent>) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Retransmit) => self.resend_last().await,
                        Some(TransactionEvent::Respond(_)) | None => return,
                    }
                }
                _ = tokio::time::sleep_until(deadline) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;
    use crate::status::StatusCode;
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportType;
    use crate::uri::parse_uri;

    #[tokio::test(start_paused = true)]
    async fn retransmitted_request_resends_last_response() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let req = Request::new(Method::Options, parse_uri("sip:bob@example.com").unwrap());
        let txn = Arc::new(ServerNonInviteTransaction::new(
            TransactionKey::client("z9hG4bK1"),
            req,
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        tx.send(TransactionEvent::Respond(Response::new(StatusCode::OK, "OK")))
            .await
            .unwrap();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        tx.send(TransactionEvent::Retransmit).await.unwrap();
        tokio::time::advance(std::time::Duration::from_secs(33)).await;
        handle.await.unwrap();
        assert_eq!(transport.sent_count().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_application_response_is_not_preempted_by_timer_j() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let req = Request::new(Method::Options, parse_uri("sip:bob@example.com").unwrap());
        let txn = Arc::new(ServerNonInviteTransaction::new(
            TransactionKey::client("z9hG4bK2"),
            req,
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        // The application takes longer than 64*T1 to respond; since timer J only
        // starts once the final response goes out, the transaction must still be
        // waiting, not terminated.
        tokio::time::advance(std::time::Duration::from_secs(40)).await;
        assert_eq!(transport.sent_count().await, 0);

        tx.send(TransactionEvent::Respond(Response::new(StatusCode::OK, "OK")))
            .await
            .unwrap();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        assert_eq!(transport.sent_count().await, 1);

        tokio::time::advance(std::time::Duration::from_secs(33)).await;
        handle.await.unwrap();
    }
}
