//! The message model (§3, §4.3): a common base plus `Request`/`Response` variants, and
//! the construction helpers (`try_get_transaction_id`, `create_response`,
//! `create_cancel_request`) the transaction and agent layers build on.

use crate::error::{Error, Result};
use crate::header::HeaderCollection;
use crate::method::Method;
use crate::uri::Uri;
use crate::value::CSeqValue;

pub const MAGIC_COOKIE: &str = "z9hG4bK";
const DEFAULT_SIP_VERSION: &str = "SIP/2.0";

/// Header/body state shared by requests and responses.
#[derive(Debug, Clone)]
pub struct MessageBase {
    pub sip_version: String,
    pub headers: HeaderCollection,
    pub body: Vec<u8>,
}

impl Default for MessageBase {
    fn default() -> Self {
        MessageBase {
            sip_version: DEFAULT_SIP_VERSION.to_string(),
            headers: HeaderCollection::new(),
            body: Vec::new(),
        }
    }
}

impl MessageBase {
    fn set_content_length(&mut self) {
        self.headers.remove("Content-Length");
        let _ = self
            .headers
            .add("Content-Length", &self.body.len().to_string());
    }
}

/// A SIP request: method, Request-URI, plus the common headers/body.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub uri: Uri,
    pub base: MessageBase,
}

impl Request {
    pub fn new(method: Method, uri: Uri) -> Self {
        Request {
            method,
            uri,
            base: MessageBase::default(),
        }
    }

    /// Serialise the request-line, headers, and body, rewriting `Content-Length`.
    pub fn serialize(&mut self) -> Vec<u8> {
        self.base.set_content_length();
        let mut out = format!(
            "{} {} {}\r\n",
            self.method, self.uri, self.base.sip_version
        )
        .into_bytes();
        out.extend(self.base.headers.serialize().into_bytes());
        out.extend_from_slice(&self.base.body);
        out
    }

    /// The topmost `Via`'s transport token and sent-by host, used to build a server
    /// transaction id (§3 invariants, §4.4 step 3).
    fn topmost_via(&self) -> Option<&str> {
        self.base.headers.get_value("Via")
    }

    /// Returns the transaction id per §3/§4.3: for a client transaction this is simply
    /// the branch; callers building a server transaction id append `:sent-by:method`
    /// with `ACK` mapped to `INVITE`. Fails when the topmost Via has no `z9hG4bK`
    /// branch (the RFC 2543 compatibility path is out of scope).
    pub fn try_get_transaction_id(&self) -> Result<String> {
        let via = self
            .topmost_via()
            .ok_or_else(|| Error::ProtocolViolation("request has no Via header".to_string()))?;
        let branch = extract_branch(via).ok_or_else(|| {
            Error::ProtocolViolation("topmost Via has no branch parameter".to_string())
        })?;
        if !branch.starts_with(MAGIC_COOKIE) {
            return Err(Error::ProtocolViolation(format!(
                "branch {branch} is missing the {MAGIC_COOKIE} magic cookie"
            )));
        }
        let method_for_correlation = match self.method {
            Method::Ack => "INVITE",
            _ => self.method.as_str(),
        };
        let sent_by = extract_sent_by(via).unwrap_or_default();
        Ok(format!("{branch}:{sent_by}:{method_for_correlation}"))
    }

    /// Build a response to this request, copying `Via`, `To`, `From`, `Call-ID`, and
    /// `CSeq` (cloned, not aliased) per §4.3.
    pub fn create_response(&self, status: crate::status::StatusCode, reason: &str) -> Response {
        let mut response = Response::new(status, reason.to_string());
        for name in ["Via", "To", "From", "Call-ID", "CSeq"] {
            if let Some(header) = self.base.headers.get(name) {
                for value in &header.values {
                    let _ = response.base.headers.add(name, value);
                }
            }
        }
        response
    }

    /// Build the CANCEL for this request per §4.3. Fails if Via, Call-ID, or CSeq is
    /// absent; the caller is expected to have those on any in-flight INVITE.
    pub fn create_cancel_request(&self) -> Result<Request> {
        let via = self
            .base
            .headers
            .get("Via")
            .and_then(|h| h.values.first())
            .ok_or_else(|| Error::ProtocolViolation("request has no Via header".to_string()))?
            .clone();
        let call_id = self
            .base
            .headers
            .get("Call-ID")
            .and_then(|h| h.values.first())
            .ok_or_else(|| Error::ProtocolViolation("request has no Call-ID header".to_string()))?
            .clone();
        let cseq = self
            .base
            .headers
            .get("CSeq")
            .and_then(|h| h.values.first())
            .ok_or_else(|| Error::ProtocolViolation("request has no CSeq header".to_string()))?
            .clone();
        let cseq = CSeqValue::parse(&cseq)?;

        let mut cancel = Request::new(Method::Cancel, self.uri.clone());
        let _ = cancel.base.headers.add("Via", &via);
        if let Some(route) = self.base.headers.get("Route") {
            for value in &route.values {
                let _ = cancel.base.headers.add("Route", value);
            }
        }
        if let Some(to) = self.base.headers.get("To") {
            for value in &to.values {
                let _ = cancel.base.headers.add("To", value);
            }
        }
        if let Some(from) = self.base.headers.get("From") {
            for value in &from.values {
                let _ = cancel.base.headers.add("From", value);
            }
        }
        let _ = cancel.base.headers.add("Call-ID", &call_id);
        let _ = cancel
            .base
            .headers
            .add("CSeq", &CSeqValue::new(cseq.number, "CANCEL").to_string());
        Ok(cancel)
    }
}

/// A SIP response: status code and reason phrase, plus the common headers/body.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: crate::status::StatusCode,
    pub reason: String,
    pub base: MessageBase,
}

impl Response {
    pub fn new(status: crate::status::StatusCode, reason: impl Into<String>) -> Self {
        Response {
            status,
            reason: reason.into(),
            base: MessageBase::default(),
        }
    }

    pub fn serialize(&mut self) -> Vec<u8> {
        self.base.set_content_length();
        let mut out = format!(
            "{} {} {}\r\n",
            self.base.sip_version, self.status.0, self.reason
        )
        .into_bytes();
        out.extend(self.base.headers.serialize().into_bytes());
        out.extend_from_slice(&self.base.body);
        out
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

fn extract_sent_by(via: &str) -> Option<String> {
    // `SIP/2.0/UDP host:port;branch=...` — the transport token and sent-by are
    // space-separated after the two `/`-separated protocol fields; sent-by is
    // whatever follows the last space before the parameter list.
    let without_params = via.split(';').next()?;
    let mut slash_parts = without_params.splitn(3, '/');
    slash_parts.next()?;
    slash_parts.next()?;
    let transport_and_sent_by = slash_parts.next()?.trim();
    let sent_by = transport_and_sent_by.split_once(char::is_whitespace)?.1;
    Some(sent_by.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use crate::uri::parse_uri;

    fn invite_with_via(branch: &str) -> Request {
        let mut req = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        let _ = req
            .base
            .headers
            .add("Via", &format!("SIP/2.0/UDP host.example.com;branch={branch}"));
        let _ = req.base.headers.add("Call-ID", "abc123@host");
        let _ = req.base.headers.add("CSeq", "7 INVITE");
        let _ = req.base.headers.add("From", "<sip:alice@example.com>;tag=1");
        let _ = req.base.headers.add("To", "<sip:bob@example.com>");
        req
    }

    #[test]
    fn scenario_s2_server_transaction_id_maps_ack_to_invite() {
        let invite = invite_with_via("z9hG4bK776asdhds");
        let invite_id = invite.try_get_transaction_id().unwrap();

        let mut ack = Request::new(Method::Ack, parse_uri("sip:bob@example.com").unwrap());
        let _ = ack.base.headers.add(
            "Via",
            "SIP/2.0/UDP host.example.com;branch=z9hG4bK776asdhds",
        );
        let ack_id = ack.try_get_transaction_id().unwrap();

        assert_eq!(invite_id, ack_id);
        assert_eq!(invite_id, "z9hG4bK776asdhds:host.example.com:INVITE");
    }

    #[test]
    fn rejects_branch_without_magic_cookie() {
        let req = invite_with_via("legacy-branch-123");
        assert!(req.try_get_transaction_id().is_err());
    }

    #[test]
    fn create_response_copies_correlation_headers() {
        let invite = invite_with_via("z9hG4bK1");
        let response = invite.create_response(StatusCode::OK, "OK");
        assert_eq!(response.base.headers.get_value("Call-ID"), Some("abc123@host"));
        assert_eq!(response.base.headers.get_value("CSeq"), Some("7 INVITE"));
    }

    #[test]
    fn scenario_s5_cancel_build() {
        let invite = invite_with_via("z9hG4bK1");
        let cancel = invite.create_cancel_request().unwrap();
        assert_eq!(cancel.method, Method::Cancel);
        assert_eq!(cancel.base.headers.get_value("Via"), invite.base.headers.get_value("Via"));
        assert_eq!(cancel.base.headers.get_value("Call-ID"), Some("abc123@host"));
        assert_eq!(cancel.base.headers.get_value("CSeq"), Some("7 CANCEL"));
    }

    #[test]
    fn cancel_build_fails_without_via() {
        let req = Request::new(Method::Invite, parse_uri("sip:bob@example.com").unwrap());
        assert!(req.create_cancel_request().is_err());
    }

    #[test]
    fn serialize_rewrites_content_length() {
        let mut req = invite_with_via("z9hG4bK1");
        req.base.body = b"v=0\r\n".to_vec();
        let bytes = req.serialize();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains("Content-Length: 5"));
    }
}
