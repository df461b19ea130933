//! INVITE server transaction (§4.5): retransmits the last provisional on a
//! retransmitted INVITE; for non-2xx finals, retransmits (timer G, doubling to T2)
//! until ACK or timer H; timer I absorbs late ACK retransmits.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::message::{Request, Response};
use crate::status::StatusCode;
use crate::transaction::key::TransactionKey;
use crate::transaction::outcome::TransactionOutcome;
use crate::transaction::state::TransactionState;
use crate::transport::{Transport, TransportSettings};

pub enum TransactionEvent {
    /// A retransmitted copy of the INVITE.
    RetransmitInvite,
    /// The confirming ACK.
    Ack,
    /// The application's provisional/final response.
    Respond(Response),
}

pub struct ServerInviteTransaction {
    pub key: TransactionKey,
    pub request: Request,
    transport: Arc<dyn Transport>,
    remote: SocketAddr,
    settings: TransportSettings,
    state: Mutex<TransactionState>,
    last_response: Mutex<Option<Vec<u8>>>,
}

impl ServerInviteTransaction {
    pub fn new(key: TransactionKey, request: Request, transport: Arc<dyn Transport>, remote: SocketAddr) -> Self {
        let settings = transport.settings();
        ServerInviteTransaction {
            key,
            request,
            transport,
            remote,
            settings,
            state: Mutex::new(TransactionState::Proceeding),
            last_response: Mutex::new(None),
        }
    }

    pub async fn state(&self) -> TransactionState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: TransactionState) {
        *self.state.lock().await = state;
        debug!(transaction_id = %self.key, ?state, "invite server transaction state change");
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

    /// If the application hasn't responded within 200ms, send `100 Trying` on its
    /// behalf so the peer's own retransmit timer doesn't fire first.
    async fn next_event_with_auto_trying(
        &self,
        events: &mut mpsc::Receiver<TransactionEvent>,
    ) -> Option<TransactionEvent> {
        let deadline = Instant::now() + Duration::from_millis(200);
        tokio::select! {
            event = events.recv() => event,
            _ = tokio::time::sleep_until(deadline) => {
                trace!(transaction_id = %self.key, "200ms elapsed with no response, sending 100 Trying");
                self.send_and_remember(Response::new(StatusCode::TRYING, "Trying")).await;
                events.recv().await
            }
        }
    }

    /// Drive the transaction. Returns the outcome once ACK is received (or timer H
    /// fires, reported as `InviteFailed(Stack_Timeout)` to the caller via the status).
    pub async fn run(&self, mut events: mpsc::Receiver<TransactionEvent>) -> TransactionOutcome {
        let reliable = self.transport.transport_type().is_reliable();
        let t1 = self.settings.t1;
        let t2 = self.settings.t2;
        let t4 = self.settings.t4;

        let mut first_event = Some(self.next_event_with_auto_trying(&mut events).await);

        loop {
            let event = match first_event.take() {
                Some(event) => event,
                None => events.recv().await,
            };
            match event {
                Some(TransactionEvent::RetransmitInvite) => {
                    trace!(transaction_id = %self.key, "retransmitted INVITE, resending last provisional");
                    self.resend_last().await;
                }
                Some(TransactionEvent::Respond(response)) => {
                    if response.status.is_provisional() {
                        self.send_and_remember(response).await;
                        continue;
                    }
                    if response.status.is_success() {
                        let outcome = TransactionOutcome::from_response(response.clone());
                        self.send_and_remember(response).await;
                        self.set_state(TransactionState::Terminated).await;
                        return outcome;
                    }
                    // 3xx-6xx: Completed, retransmit (timer G) until ACK or timer H.
                    self.set_state(TransactionState::Completed).await;
                    let outcome = TransactionOutcome::from_response(response.clone());
                    self.send_and_remember(response).await;
                    let ack_seen = self.wait_for_ack_or_timeout(reliable, t1, t2, &mut events).await;
                    if ack_seen {
                        self.set_state(TransactionState::Confirmed).await;
                        if !reliable && !t4.is_zero() {
                            self.absorb_acks(t4, &mut events).await;
                        }
                        self.set_state(TransactionState::Terminated).await;
                        return outcome;
                    }
                    self.set_state(TransactionState::Terminated).await;
                    return TransactionOutcome::stack_failure(StatusCode::STACK_TIMEOUT);
                }
                Some(TransactionEvent::Ack) | None => {
                    self.set_state(TransactionState::Terminated).await;
                    return TransactionOutcome::stack_failure(StatusCode::STACK_TIMEOUT);
                }
            }
        }
    }

    /// Timer G (retransmit the final, doubling from T1 to T2) and timer H (64·T1 ACK
    /// wait). Returns `true` if an ACK arrived before H fired.
    async fn wait_for_ack_or_timeout(
        &self,
        reliable: bool,
        t1: Duration,
        t2: Duration,
        events: &mut mpsc::Receiver<TransactionEvent>,
    ) -> bool {
        let timer_h_deadline = Instant::now() + t1 * 64;
        let mut retransmit_interval = t1;
        let mut next_retransmit = Instant::now() + retransmit_interval;

        loop {
            let retransmit_sleep = tokio::time::sleep_until(next_retransmit);
            let timeout_sleep = tokio::time::sleep_until(timer_h_deadline);

            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Ack) => return true,
                        Some(TransactionEvent::RetransmitInvite) => {
                            self.resend_last().await;
                        }
                        Some(TransactionEvent::Respond(_)) | None => return false,
                    }
                }
                _ = retransmit_sleep, if !reliable => {
                    trace!(transaction_id = %self.key, "timer G fired, retransmitting final");
                    self.resend_last().await;
                    retransmit_interval = (retransmit_interval * 2).min(t2);
                    next_retransmit = Instant::now() + retransmit_interval;
                }
                _ = timeout_sleep => {
                    trace!(transaction_id = %self.key, "timer H fired with no ACK");
                    return false;
                }
            }
        }
    }

    /// Timer I: absorb ACK retransmits for T4 after reaching Confirmed.
    async fn absorb_acks(&self, t4: Duration, events: &mut mpsc::Receiver<TransactionEvent>) {
        let deadline = Instant::now() + t4;
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Ack) => {
                            trace!(transaction_id = %self.key, "timer I: swallowed retransmitted ACK");
                        }
                        _ => return,
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
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportType;
    use crate::uri::parse_uri;

    #[tokio::test(start_paused = true)]
    async fn retransmits_500_until_ack_then_confirmed() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let req = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        let txn = Arc::new(ServerInviteTransaction::new(
            TransactionKey::client("z9hG4bK1"),
            req,
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        tx.send(TransactionEvent::Respond(Response::new(
            StatusCode::SERVER_INTERNAL_ERROR,
            "Server Internal Error",
        )))
        .await
        .unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        assert_eq!(transport.sent_count().await, 1);

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(transport.sent_count().await >= 2);

        tx.send(TransactionEvent::Ack).await.unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusCode::SERVER_INTERNAL_ERROR);
    }

    #[tokio::test(start_paused = true)]
    async fn sends_trying_after_200ms_if_application_has_not_responded() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let req = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        let txn = Arc::new(ServerInviteTransaction::new(
            TransactionKey::client("z9hG4bK3"),
            req,
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        tokio::time::advance(Duration::from_millis(250)).await;
        assert_eq!(transport.sent_count().await, 1);
        let (_, bytes) = transport.sent.lock().await.last().unwrap().clone();
        assert!(String::from_utf8(bytes).unwrap().starts_with("SIP/2.0 100 Trying"));

        tx.send(TransactionEvent::Respond(Response::new(StatusCode::OK, "OK")))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusCode::OK);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_on_timer_h_without_ack() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let req = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        let txn = ServerInviteTransaction::new(
            TransactionKey::client("z9hG4bK2"),
            req,
            transport,
            "127.0.0.1:5060".parse().unwrap(),
        );
        let (tx, rx) = mpsc::channel(4);
        tx.send(TransactionEvent::Respond(Response::new(StatusCode::BUSY_HERE, "Busy Here")))
            .await
            .unwrap();
        let outcome = txn.run(rx).await;
        assert_eq!(outcome.status, StatusCode::STACK_TIMEOUT);
    }
}
