//! INVITE client transaction (§4.4): timer A retransmits, timer B terminal timeout,
//! automatic ACK generation for non-2xx finals, timer D absorbs late retransmits.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::message::{Request, Response};
use crate::method::Method;
use crate::status::StatusCode;
use crate::transaction::key::TransactionKey;
use crate::transaction::outcome::TransactionOutcome;
use crate::transaction::state::TransactionState;
use crate::transport::{Transport, TransportSettings};

pub enum TransactionEvent {
    Response(Response),
}

pub struct ClientInviteTransaction {
    pub key: TransactionKey,
    transport: Arc<dyn Transport>,
    remote: SocketAddr,
    request_bytes: Vec<u8>,
    /// Kept to build the ACK for non-2xx finals (same branch, copied From/To/Call-ID,
    /// CSeq number with method=ACK).
    original_request: Request,
    settings: TransportSettings,
    state: Mutex<TransactionState>,
}

impl ClientInviteTransaction {
    pub fn new(
        key: TransactionKey,
        transport: Arc<dyn Transport>,
        remote: SocketAddr,
        request_bytes: Vec<u8>,
        original_request: Request,
    ) -> Self {
        let settings = transport.settings();
        ClientInviteTransaction {
            key,
            transport,
            remote,
            request_bytes,
            original_request,
            settings,
            state: Mutex::new(TransactionState::Unknown),
        }
    }

    pub async fn state(&self) -> TransactionState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: TransactionState) {
        *self.state.lock().await = state;
        debug!(transaction_id = %self.key, ?state, "invite client transaction state change");
    }

    fn build_ack(&self, response: &Response) -> Request {
        let mut ack = Request::new(Method::Ack, self.original_request.uri.clone());
        if let Some(via) = self.original_request.base.headers.get_value("Via") {
            let _ = ack.base.headers.add("Via", via);
        }
        if let Some(from) = self.original_request.base.headers.get_value("From") {
            let _ = ack.base.headers.add("From", from);
        }
        if let Some(to) = response.base.headers.get_value("To") {
            let _ = ack.base.headers.add("To", to);
        }
        if let Some(call_id) = self.original_request.base.headers.get_value("Call-ID") {
            let _ = ack.base.headers.add("Call-ID", call_id);
        }
        if let Some(cseq) = self.original_request.base.headers.get_value("CSeq") {
            if let Ok(cseq) = crate::value::CSeqValue::parse(cseq) {
                let _ = ack
                    .base
                    .headers
                    .add("CSeq", &crate::value::CSeqValue::new(cseq.number, "ACK").to_string());
            }
        }
        ack
    }

    async fn send_ack(&self, response: &Response) {
        let mut ack = self.build_ack(response);
        let bytes = ack.serialize();
        if let Err(e) = self.transport.send(self.remote, &bytes).await {
            warn!(transaction_id = %self.key, error = ?e, "ACK send failed");
        }
    }

    /// Drive the transaction to completion.
    pub async fn run(&self, mut events: mpsc::Receiver<TransactionEvent>) -> TransactionOutcome {
        if let Err(e) = self.transport.send(self.remote, &self.request_bytes).await {
            warn!(transaction_id = %self.key, error = ?e, "initial INVITE send failed");
        }
        self.set_state(TransactionState::Calling).await;

        let reliable = self.transport.transport_type().is_reliable();
        let t1 = self.settings.t1;
        let timer_b_deadline = Instant::now() + t1 * 64;
        let mut retransmit_interval = t1;
        let mut next_retransmit = Instant::now() + retransmit_interval;
        let mut in_proceeding = false;

        loop {
            let retransmit_sleep = tokio::time::sleep_until(next_retransmit);
            let timeout_sleep = tokio::time::sleep_until(timer_b_deadline);

            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Response(response)) => {
                            if response.status.is_provisional() {
                                self.set_state(TransactionState::Proceeding).await;
                                in_proceeding = true;
                                continue;
                            }
                            if response.status.is_success() {
                                self.set_state(TransactionState::Terminated).await;
                                return TransactionOutcome::from_response(response);
                            }
                            // 3xx-6xx: ACK automatically, enter Completed, absorb
                            // retransmits for timer D, then Terminated.
                            self.send_ack(&response).await;
                            self.set_state(TransactionState::Completed).await;
                            let outcome = TransactionOutcome::from_response(response);
                            if !reliable {
                                self.absorb_retransmits_with_ack(&mut events).await;
                            }
                            self.set_state(TransactionState::Terminated).await;
                            return outcome;
                        }
                        None => {
                            self.set_state(TransactionState::Terminated).await;
                            return TransactionOutcome::stack_failure(StatusCode::STACK_TIMEOUT);
                        }
                    }
                }
                _ = retransmit_sleep, if !reliable && !in_proceeding => {
                    trace!(transaction_id = %self.key, "timer A fired, retransmitting");
                    if let Err(e) = self.transport.send(self.remote, &self.request_bytes).await {
                        warn!(transaction_id = %self.key, error = ?e, "retransmit send failed");
                    }
                    retransmit_interval *= 2;
                    next_retransmit = Instant::now() + retransmit_interval;
                }
                _ = timeout_sleep => {
                    trace!(transaction_id = %self.key, "timer B fired");
                    self.set_state(TransactionState::Terminated).await;
                    return TransactionOutcome::stack_failure(StatusCode::STACK_TIMEOUT);
                }
            }
        }
    }

    /// Timer D: absorb retransmitted non-2xx finals, re-sending the ACK each time
    /// (§4.4 "a retransmitted 486 within timer D re-emits the ACK").
    async fn absorb_retransmits_with_ack(&self, events: &mut mpsc::Receiver<TransactionEvent>) {
        // Timer D: 32s for unreliable transports, 0 (skipped by the caller) for reliable
        // ones. Unlike timers E/F/G/H/I/J, it is not derived from T1/T4.
        let deadline = Instant::now() + std::time::Duration::from_secs(32);
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Response(response)) => {
                            trace!(transaction_id = %self.key, "timer D: re-emitting ACK for retransmitted final");
                            self.send_ack(&response).await;
                        }
                        None => return,
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
    use crate::transport::mock::MockTransport;
    use crate::transport::TransportType;
    use crate::uri::parse_uri;

    fn sample_invite() -> Request {
        let mut req = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        let _ = req.base.headers.add("Via", "SIP/2.0/UDP host;branch=z9hG4bK1");
        let _ = req.base.headers.add("From", "<sip:alice@example.com>;tag=1");
        let _ = req.base.headers.add("To", "<sip:bob@example.com>");
        let _ = req.base.headers.add("Call-ID", "abc@host");
        let _ = req.base.headers.add("CSeq", "1 INVITE");
        req
    }

    #[tokio::test(start_paused = true)]
    async fn trace_is_proceeding_then_complete_with_no_ack_on_success() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let mut req = sample_invite();
        let bytes = req.serialize();
        let txn = Arc::new(ClientInviteTransaction::new(
            TransactionKey::client("z9hG4bK1"),
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
            bytes,
            req,
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        tx.send(TransactionEvent::Response(Response::new(StatusCode::TRYING, "Trying")))
            .await
            .unwrap();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        assert_eq!(txn.state().await, TransactionState::Proceeding);

        tx.send(TransactionEvent::Response(Response::new(StatusCode::RINGING, "Ringing")))
            .await
            .unwrap();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;

        tx.send(TransactionEvent::Response(Response::new(StatusCode::OK, "OK")))
            .await
            .unwrap();
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusCode::OK);
        // One send for the INVITE itself; no ACK is sent by the transaction on 2xx.
        assert_eq!(transport.sent_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn busy_here_emits_exactly_one_ack_and_swallows_retransmit() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let mut req = sample_invite();
        let bytes = req.serialize();
        let txn = Arc::new(ClientInviteTransaction::new(
            TransactionKey::client("z9hG4bK2"),
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
            bytes,
            req,
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        let mut busy = Response::new(StatusCode::BUSY_HERE, "Busy Here");
        let _ = busy.base.headers.add("To", "<sip:bob@example.com>;tag=2");
        tx.send(TransactionEvent::Response(busy.clone())).await.unwrap();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        // INVITE + ACK = 2 sends so far.
        assert_eq!(transport.sent_count().await, 2);

        // A retransmitted 486 within timer D re-emits the ACK.
        tx.send(TransactionEvent::Response(busy)).await.unwrap();
        tokio::time::advance(std::time::Duration::from_millis(10)).await;
        assert_eq!(transport.sent_count().await, 3);

        tokio::time::advance(std::time::Duration::from_secs(33)).await;
        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusCode::BUSY_HERE);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_with_stack_timeout_on_timer_b() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let mut req = sample_invite();
        let bytes = req.serialize();
        let txn = ClientInviteTransaction::new(
            TransactionKey::client("z9hG4bK3"),
            transport,
            "127.0.0.1:5060".parse().unwrap(),
            bytes,
            req,
        );
        let (_tx, rx) = mpsc::channel(1);
        let outcome = txn.run(rx).await;
        assert_eq!(outcome.status, StatusCode::STACK_TIMEOUT);
    }
}
