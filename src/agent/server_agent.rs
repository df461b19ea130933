//! The server agent (§4.5): receives requests, owns a branch→transaction map, and
//! distinguishes confirming ACKs (handed straight to the core) from new requests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::config::StackConfig;
use crate::message::{Request, Response};
use crate::method::Method;
use crate::transaction::server_invite::{ServerInviteTransaction, TransactionEvent as InviteEvent};
use crate::transaction::server_non_invite::{ServerNonInviteTransaction, TransactionEvent as NonInviteEvent};
use crate::transaction::TransactionKey;
use crate::transport::Transport;

enum ServerHandle {
    Invite(mpsc::Sender<InviteEvent>),
    NonInvite(mpsc::Sender<NonInviteEvent>),
}

/// What the server agent did with an inbound request.
#[derive(Debug)]
pub enum Reception {
    /// A new transaction was created; `request` should be forwarded to the core.
    NewRequest { key: TransactionKey, request: Request },
    /// The request retransmitted an existing transaction; already handled internally.
    Retransmit,
    /// A confirming ACK for a 2xx with no matching transaction (out-of-transaction,
    /// per §4.5).
    ConfirmingAck(Request),
}

pub struct ServerAgent {
    config: StackConfig,
    transactions: Arc<Mutex<HashMap<TransactionKey, ServerHandle>>>,
}

impl ServerAgent {
    pub fn new(config: StackConfig) -> Self {
        ServerAgent {
            config,
            transactions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Handle an inbound request, creating a transaction when needed (§4.5 "On
    /// reception").
    pub async fn receive(
        &self,
        request: Request,
        transport: Arc<dyn Transport>,
        remote: SocketAddr,
    ) -> crate::error::Result<Reception> {
        let id = request.try_get_transaction_id()?;
        let key = TransactionKey::from_raw(id);

        // Clone out the matching sender (if any) and release the map lock before
        // awaiting the send, so no lock is held across I/O (§5).
        let existing = self.transactions.lock().await.get(&key).map(|h| match h {
            ServerHandle::Invite(tx) => ServerHandle::Invite(tx.clone()),
            ServerHandle::NonInvite(tx) => ServerHandle::NonInvite(tx.clone()),
        });

        if let Some(handle) = existing {
            match (handle, &request.method) {
                (ServerHandle::Invite(tx), Method::Ack) => {
                    debug!(transaction_id = %key, "confirming ACK delivered to invite transaction");
                    let _ = tx.send(InviteEvent::Ack).await;
                }
                (ServerHandle::Invite(tx), Method::Invite) => {
                    let _ = tx.send(InviteEvent::RetransmitInvite).await;
                }
                (ServerHandle::NonInvite(tx), _) => {
                    let _ = tx.send(NonInviteEvent::Retransmit).await;
                }
                _ => {}
            }
            return Ok(Reception::Retransmit);
        }

        if request.method == Method::Ack {
            debug!(transaction_id = %key, "unmatched ACK treated as confirming ACK");
            return Ok(Reception::ConfirmingAck(request));
        }

        if request.method == Method::Invite {
            let (tx, rx) = mpsc::channel(8);
            self.transactions.lock().await.insert(key.clone(), ServerHandle::Invite(tx));
            let txn = Arc::new(ServerInviteTransaction::new(key.clone(), request.clone(), transport, remote));
            let key_for_task = key.clone();
            let transactions = self.transactions.clone();
            tokio::spawn(async move {
                txn.run(rx).await;
                transactions.lock().await.remove(&key_for_task);
            });
            info!(transaction_id = %key, "server INVITE transaction created");
            Ok(Reception::NewRequest { key, request })
        } else {
            let (tx, rx) = mpsc::channel(8);
            self.transactions.lock().await.insert(key.clone(), ServerHandle::NonInvite(tx));
            let txn = Arc::new(ServerNonInviteTransaction::new(key.clone(), request.clone(), transport, remote));
            let key_for_task = key.clone();
            let transactions = self.transactions.clone();
            tokio::spawn(async move {
                txn.run(rx).await;
                transactions.lock().await.remove(&key_for_task);
            });
            info!(transaction_id = %key, "server non-INVITE transaction created");
            Ok(Reception::NewRequest { key, request })
        }
    }

    /// Deliver the application's response to the transaction identified by `key`.
    pub async fn respond(&self, key: &TransactionKey, response: Response) -> crate::error::Result<()> {
        let handle = self.transactions.lock().await.get(key).map(|h| match h {
            ServerHandle::Invite(tx) => ServerHandle::Invite(tx.clone()),
            ServerHandle::NonInvite(tx) => ServerHandle::NonInvite(tx.clone()),
        });
        match handle {
            Some(ServerHandle::Invite(tx)) => {
                let _ = tx.send(InviteEvent::Respond(response)).await;
                Ok(())
            }
            Some(ServerHandle::NonInvite(tx)) => {
                let _ = tx.send(NonInviteEvent::Respond(response)).await;
                Ok(())
            }
            None => {
                warn!(transaction_id = %key, "respond() called for unknown/terminated transaction");
                Err(crate::error::Error::Transaction(
                    "unknown transaction".to_string(),
                    key.clone(),
                ))
            }
        }
    }

    pub async fn on_bk_task(&self) {}

    pub fn server_transaction_ttl(&self) -> std::time::Duration {
        self.config.server_transaction_ttl
    }

    /// Graceful shutdown (§5): close every tracked transaction's event channel. Each
    /// transaction's own `run()` loop observes the closed channel on its next `recv()`
    /// and terminates rather than waiting out its timers.
    pub async fn stop(&self) {
        let mut transactions = self.transactions.lock().await;
        let count = transactions.len();
        transactions.clear();
        if count > 0 {
            info!(count, "server agent stopped, closing in-flight transactions");
        }
    }
}
