//! Non-INVITE client transaction (§4.4): timer E retransmits, timer F terminal
//! timeout, timer K absorbs late retransmitted finals.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::message::Response;
use crate::status::StatusCode;
use crate::transaction::key::TransactionKey;
use crate::transaction::state::TransactionState;
use crate::transaction::outcome::TransactionOutcome;
use crate::transport::{Transport, TransportSettings};

/// Events an agent feeds into a running transaction.
pub enum TransactionEvent {
    Response(Response),
}

pub struct ClientNonInviteTransaction {
    pub key: TransactionKey,
    transport: Arc<dyn Transport>,
    remote: SocketAddr,
    request_bytes: Vec<u8>,
    settings: TransportSettings,
    state: Mutex<TransactionState>,
}

impl ClientNonInviteTransaction {
    pub fn new(
        key: TransactionKey,
        transport: Arc<dyn Transport>,
        remote: SocketAddr,
        request_bytes: Vec<u8>,
    ) -> Self {
        let settings = transport.settings();
        ClientNonInviteTransaction {
            key,
            transport,
            remote,
            request_bytes,
            settings,
            state: Mutex::new(TransactionState::Unknown),
        }
    }

    pub async fn state(&self) -> TransactionState {
        *self.state.lock().await
    }

    async fn set_state(&self, state: TransactionState) {
        *self.state.lock().await = state;
        debug!(transaction_id = %self.key, ?state, "non-invite client transaction state change");
    }

    /// Drive the transaction to completion, consuming inbound responses from `events`.
    pub async fn run(&self, mut events: mpsc::Receiver<TransactionEvent>) -> TransactionOutcome {
        if let Err(e) = self.transport.send(self.remote, &self.request_bytes).await {
            warn!(transaction_id = %self.key, error = ?e, "initial send failed");
        }
        self.set_state(TransactionState::Trying).await;

        let reliable = self.transport.transport_type().is_reliable();
        let t1 = self.settings.t1;
        let t2 = self.settings.t2;
        let t4 = self.settings.t4;

        let timer_f_deadline = Instant::now() + t1 * 64;
        let mut retransmit_interval = t1;
        let mut next_retransmit = Instant::now() + retransmit_interval;

        loop {
            let retransmit_sleep = tokio::time::sleep_until(next_retransmit);
            let timeout_sleep = tokio::time::sleep_until(timer_f_deadline);

            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Response(response)) => {
                            if response.status.is_provisional() {
                                self.set_state(TransactionState::Proceeding).await;
                                retransmit_interval = t2;
                                continue;
                            }
                            self.set_state(TransactionState::Completed).await;
                            let outcome = TransactionOutcome::from_response(response);
                            if !reliable && !t4.is_zero() {
                                self.absorb_retransmits(&mut events, t4).await;
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
                _ = retransmit_sleep, if !reliable => {
                    trace!(transaction_id = %self.key, "timer E fired, retransmitting");
                    if let Err(e) = self.transport.send(self.remote, &self.request_bytes).await {
                        warn!(transaction_id = %self.key, error = ?e, "retransmit send failed");
                    }
                    retransmit_interval = (retransmit_interval * 2).min(t2);
                    next_retransmit = Instant::now() + retransmit_interval;
                }
                _ = timeout_sleep => {
                    trace!(transaction_id = %self.key, "timer F fired");
                    self.set_state(TransactionState::Terminated).await;
                    return TransactionOutcome::stack_failure(StatusCode::STACK_TIMEOUT);
                }
            }
        }
    }

    /// Swallow retransmitted final responses for the timer K window after completion.
    async fn absorb_retransmits(&self, events: &mut mpsc::Receiver<TransactionEvent>, t4: Duration) {
        let deadline = Instant::now() + t4;
        loop {
            tokio::select! {
                event = events.recv() => {
                    match event {
                        Some(TransactionEvent::Response(_)) => {
                            trace!(transaction_id = %self.key, "timer K: swallowed retransmitted final");
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

    #[tokio::test(start_paused = true)]
    async fn retransmits_at_t1_2t1_4t1_capped_at_t2_then_times_out() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let key = TransactionKey::client("z9hG4bK1");
        let txn = ClientNonInviteTransaction::new(
            key,
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
            b"OPTIONS sip:bob@example.com SIP/2.0\r\n\r\n".to_vec(),
        );
        let (_tx, rx) = mpsc::channel(1);
        let outcome = txn.run(rx).await;
        assert_eq!(outcome.status, StatusCode::STACK_TIMEOUT);
        assert!(transport.sent_count().await >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn provisional_then_final_completes_without_retransmit_storm() {
        let transport = Arc::new(MockTransport::new(TransportType::Udp));
        let key = TransactionKey::client("z9hG4bK2");
        let txn = Arc::new(ClientNonInviteTransaction::new(
            key,
            transport.clone(),
            "127.0.0.1:5060".parse().unwrap(),
            b"OPTIONS sip:bob@example.com SIP/2.0\r\n\r\n".to_vec(),
        ));
        let (tx, rx) = mpsc::channel(4);
        let txn2 = txn.clone();
        let handle = tokio::spawn(async move { txn2.run(rx).await });

        tx.send(TransactionEvent::Response(Response::new(StatusCode::TRYING, "Trying")))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_millis(10)).await;
        tx.send(TransactionEvent::Response(Response::new(StatusCode::OK, "OK")))
            .await
            .unwrap();

        let outcome = handle.await.unwrap();
        assert_eq!(outcome.status, StatusCode::OK);
    }
}
