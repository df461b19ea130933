//! Digest challenge/credential values: `WWW-Authenticate`/`Proxy-Authenticate`
//! ([`AuthenticateValue`]) and `Authorization`/`Proxy-Authorization`
//! ([`AuthorizationValue`]) (§3, §4.8).

use std::fmt;

use crate::digest;
use crate::error::{Error, Result};

const DEFAULT_ALGORITHM: &str = "MD5";

/// A `WWW-Authenticate`/`Proxy-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticateValue {
    pub realm: String,
    pub nonce: String,
    pub algorithm: String,
    pub qop: Option<String>,
    pub opaque: Option<String>,
}

impl AuthenticateValue {
    pub fn new(realm: impl Into<String>, nonce: impl Into<String>) -> Self {
        AuthenticateValue {
            realm: realm.into(),
            nonce: nonce.into(),
            algorithm: DEFAULT_ALGORITHM.to_string(),
            qop: None,
            opaque: None,
        }
    }

    /// Parse a `Digest realm="...", nonce="...", ...` challenge. Tolerates unquoted
    /// values and skips fields with no `=` rather than failing outright.
    pub fn parse(input: &str) -> Result<Self> {
        let rest = strip_digest_scheme(input)?;
        let fields = parse_digest_fields(rest);

        let realm = fields.get("realm").cloned().unwrap_or_default();
        let nonce = fields.get("nonce").cloned().unwrap_or_default();
        let algorithm = fields
            .get("algorithm")
            .cloned()
            .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string());

        Ok(AuthenticateValue {
            realm,
            nonce,
            algorithm,
            qop: fields.get("qop").cloned(),
            opaque: fields.get("opaque").cloned(),
        })
    }

    /// Build the `Authorization`/`Proxy-Authorization` value answering this challenge.
    pub fn authorize(
        &self,
        username: &str,
        password: &str,
        method: &str,
        digest_uri: &str,
    ) -> Result<AuthorizationValue> {
        let response = digest::compute_response(
            &self.algorithm,
            &self.realm,
            &self.nonce,
            username,
            password,
            method,
            digest_uri,
        )?;
        Ok(AuthorizationValue {
            username: username.to_string(),
            realm: self.realm.clone(),
            nonce: self.nonce.clone(),
            uri: digest_uri.to_string(),
            response,
            algorithm: self.algorithm.clone(),
            opaque: self.opaque.clone(),
        })
    }
}

impl fmt::Display for AuthenticateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest realm=\"{}\", nonce=\"{}\", algorithm={}",
            self.realm, self.nonce, self.algorithm
        )?;
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{opaque}\"")?;
        }
        if let Some(qop) = &self.qop {
            write!(f, ", qop=\"{qop}\"")?;
        }
        Ok(())
    }
}

/// An `Authorization`/`Proxy-Authorization` credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationValue {
    pub username: String,
    pub realm: String,
    pub nonce: String,
    pub uri: String,
    pub response: String,
    pub algorithm: String,
    pub opaque: Option<String>,
}

impl AuthorizationValue {
    pub fn parse(input: &str) -> Result<Self> {
        let rest = strip_digest_scheme(input)?;
        let fields = parse_digest_fields(rest);
        Ok(AuthorizationValue {
            username: fields.get("username").cloned().unwrap_or_default(),
            realm: fields.get("realm").cloned().unwrap_or_default(),
            nonce: fields.get("nonce").cloned().unwrap_or_default(),
            uri: fields.get("uri").cloned().unwrap_or_default(),
            response: fields.get("response").cloned().unwrap_or_default(),
            algorithm: fields
                .get("algorithm")
                .cloned()
                .unwrap_or_else(|| DEFAULT_ALGORITHM.to_string()),
            opaque: fields.get("opaque").cloned(),
        })
    }
}

impl fmt::Display for AuthorizationValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Digest username=\"{}\", realm=\"{}\", nonce=\"{}\", uri=\"{}\", response=\"{}\", algorithm={}",
            self.username, self.realm, self.nonce, self.uri, self.response, self.algorithm
        )?;
        if let Some(opaque) = &self.opaque {
            write!(f, ", opaque=\"{opaque}\"")?;
        }
        Ok(())
    }
}

fn strip_digest_scheme(input: &str) -> Result<&str> {
    let input = input.trim();
    let rest = input
        .strip_prefix("Digest")
        .or_else(|| input.strip_prefix("digest"))
        .ok_or_else(|| Error::Parse(format!("unsupported auth scheme: {input}")))?;
    Ok(rest.trim_start())
}

/// Lenient `name=value, name="value", ...` field parser: skips entries with no `=`
/// instead of failing, and accepts both quoted and bare values.
fn parse_digest_fields(input: &str) -> std::collections::HashMap<String, String> {
    let mut fields = std::collections::HashMap::new();
    for chunk in split_commas_outside_quotes(input) {
        let chunk = chunk.trim();
        if chunk.is_empty() {
            continue;
        }
        let Some((name, value)) = chunk.split_once('=') else {
            continue;
        };
        let value = value.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);
        fields.insert(name.trim().to_ascii_lowercase(), value.to_string());
    }
    fields
}

fn split_commas_outside_quotes(input: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in input.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                out.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    out.push(&input[start..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_challenge_and_answers_it() {
        let challenge =
            AuthenticateValue::parse(r#"Digest realm="sip.example", nonce="dcd98b7102dd2f0e""#)
                .unwrap();
        assert_eq!(challenge.algorithm, "MD5");
        let answer = challenge
            .authorize("alice", "secret", "INVITE", "sip:bob@example.com")
            .unwrap();
        assert_eq!(answer.response.len(), 32);
    }

    #[test]
    fn tolerates_malformed_fields() {
        let challenge = AuthenticateValue::parse(r#"Digest realm="r", garbage, nonce="n""#).unwrap();
        assert_eq!(challenge.realm, "r");
        assert_eq!(challenge.nonce, "n");
    }

    #[test]
    fn rejects_non_digest_scheme() {
        assert!(AuthenticateValue::parse("Basic realm=\"x\"").is_err());
    }
}
