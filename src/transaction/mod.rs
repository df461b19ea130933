//! The transaction layer (§4.4, §4.5): client/server state machines for INVITE and
//! non-INVITE methods, each serialised behind its own lock (§5).

pub mod client_invite;
pub mod client_non_invite;
pub mod key;
pub mod outcome;
pub mod server_invite;
pub mod server_non_invite;
pub mod state;

pub use key::TransactionKey;
pub use outcome::TransactionOutcome;
pub use state::TransactionState;
