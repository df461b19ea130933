//! Transaction state (§3).

/// A transaction's position in its RFC 3261 state machine. Not every state is reachable
/// by every transaction type — see §4.4/§4.5 for the per-type transition tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Unknown,
    Calling,
    Trying,
    Proceeding,
    Completed,
    Confirmed,
    Terminated,
}

impl TransactionState {
    pub fn is_terminated(self) -> bool {
        matches!(self, TransactionState::Terminated)
    }
}
