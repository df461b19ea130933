//! Transaction identity (§3 invariants, §4.3).

use std::fmt;

/// Identifies a transaction. A client transaction id is simply its branch; a server
/// transaction id is `branch:sent-by:method` with `ACK` mapped to `INVITE` so a
/// confirming ACK correlates with its INVITE server transaction (scenario S2).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionKey(String);

impl TransactionKey {
    /// A client transaction id: its branch, verbatim.
    pub fn client(branch: impl Into<String>) -> Self {
        TransactionKey(branch.into())
    }

    /// A server transaction id: `branch:sent-by:method`, mapping `ACK` to `INVITE`.
    pub fn server(branch: &str, sent_by: &str, method: &str) -> Self {
        let method = if method.eq_ignore_ascii_case("ACK") {
            "INVITE"
        } else {
            method
        };
        TransactionKey(format!("{branch}:{sent_by}:{method}"))
    }

    /// Parse a previously-rendered `branch:sent-by:method` id directly (used when a
    /// request's `try_get_transaction_id` has already assembled the string).
    pub fn from_raw(id: impl Into<String>) -> Self {
        TransactionKey(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s2_txn_id() {
        let id = TransactionKey::server("z9hG4bK776asdhds", "host", "INVITE");
        assert_eq!(id.as_str(), "z9hG4bK776asdhds:host:INVITE");
        let ack_id = TransactionKey::server("z9hG4bK776asdhds", "host", "ACK");
        assert_eq!(id, ack_id);
    }

    #[test]
    fn scenario_s2_txn_id_derived_from_via() {
        use crate::message::Request;
        use crate::method::Method;
        use crate::uri::parse_uri;

        let mut invite = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        invite
            .base
            .headers
            .add("Via", "SIP/2.0/UDP host;branch=z9hG4bK776asdhds")
            .unwrap();
        let id = invite.try_get_transaction_id().unwrap();
        assert_eq!(id, "z9hG4bK776asdhds:host:INVITE");
    }
}
