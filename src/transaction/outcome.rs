//! The minimal result a transaction hands back to its owning agent (§4.4 "Completion of
//! a transaction calls back into the client agent..."). The agent/core layer enriches
//! this with dialog and agent context before it becomes a [`crate::events::SipResult`].

use crate::message::Response;
use crate::status::StatusCode;

/// The terminal outcome of a client transaction.
#[derive(Debug, Clone)]
pub struct TransactionOutcome {
    pub status: StatusCode,
    pub response: Option<Response>,
}

impl TransactionOutcome {
    pub fn from_response(response: Response) -> Self {
        TransactionOutcome {
            status: response.status,
            response: Some(response),
        }
    }

    pub fn stack_failure(status: StatusCode) -> Self {
        TransactionOutcome {
            status,
            response: None,
        }
    }
}
