//! SIP request methods (§3).

use std::fmt;
use std::str::FromStr;

/// A SIP request method.
///
/// `Unknown` carries the verbatim method token so extension methods round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Register,
    Ack,
    Cancel,
    Bye,
    Options,
    Info,
    Notify,
    Subscribe,
    Unsubscribe,
    Update,
    Message,
    Refer,
    Prack,
    Publish,
    Unknown(String),
}

impl Method {
    /// The uppercase wire token for this method.
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Register => "REGISTER",
            Method::Ack => "ACK",
            Method::Cancel => "CANCEL",
            Method::Bye => "BYE",
            Method::Options => "OPTIONS",
            Method::Info => "INFO",
            Method::Notify => "NOTIFY",
            Method::Subscribe => "SUBSCRIBE",
            Method::Unsubscribe => "UNSUBSCRIBE",
            Method::Update => "UPDATE",
            Method::Message => "MESSAGE",
            Method::Refer => "REFER",
            Method::Prack => "PRACK",
            Method::Publish => "PUBLISH",
            Method::Unknown(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_uppercase().as_str() {
            "INVITE" => Method::Invite,
            "REGISTER" => Method::Register,
            "ACK" => Method::Ack,
            "CANCEL" => Method::Cancel,
            "BYE" => Method::Bye,
            "OPTIONS" => Method::Options,
            "INFO" => Method::Info,
            "NOTIFY" => Method::Notify,
            "SUBSCRIBE" => Method::Subscribe,
            "UNSUBSCRIBE" => Method::Unsubscribe,
            "UPDATE" => Method::Update,
            "MESSAGE" => Method::Message,
            "REFER" => Method::Refer,
            "PRACK" => Method::Prack,
            "PUBLISH" => Method::Publish,
            other => Method::Unknown(other.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_known_methods() {
        for m in [Method::Invite, Method::Ack, Method::Bye, Method::Subscribe] {
            let s = m.to_string();
            assert_eq!(Method::from_str(&s).unwrap(), m);
        }
    }

    #[test]
    fn unknown_method_round_trips_verbatim() {
        let m = Method::from_str("FOOBAR").unwrap();
        assert_eq!(m, Method::Unknown("FOOBAR".to_string()));
        assert_eq!(m.to_string(), "FOOBAR");
    }
}
