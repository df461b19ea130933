//! RFC 2069/3261 MD5 digest computation (§4.8), grounded in `auth-core`'s choice of the
//! `md5` + `hex` crates for SIP digest authentication.

use crate::error::{Error, Result};

/// Compute `HA1 = hex(md5(user ":" realm ":" password))`.
pub fn ha1(user: &str, realm: &str, password: &str) -> String {
    md5_hex(format!("{user}:{realm}:{password}").as_bytes())
}

/// Compute `HA2 = hex(md5(upper(method) ":" digest-uri))`.
pub fn ha2(method: &str, digest_uri: &str) -> String {
    md5_hex(format!("{}:{digest_uri}", method.to_ascii_uppercase()).as_bytes())
}

/// Compute `response = hex(md5(HA1 ":" nonce ":" HA2))`.
pub fn response(ha1: &str, nonce: &str, ha2: &str) -> String {
    md5_hex(format!("{ha1}:{nonce}:{ha2}").as_bytes())
}

/// Full digest response for `(realm, nonce)` + `(user, password, method, digest-uri)`,
/// per §3/scenario S3. Only the `MD5` algorithm is supported.
pub fn compute_response(
    algorithm: &str,
    realm: &str,
    nonce: &str,
    user: &str,
    password: &str,
    method: &str,
    digest_uri: &str,
) -> Result<String> {
    if !algorithm.eq_ignore_ascii_case("MD5") {
        return Err(Error::UnsupportedAlgorithm(algorithm.to_string()));
    }
    let ha1 = ha1(user, realm, password);
    let ha2 = ha2(method, digest_uri);
    Ok(response(&ha1, nonce, &ha2))
}

fn md5_hex(input: &[u8]) -> String {
    hex::encode(md5::compute(input).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_s3_digest_response() {
        let expected = "f3c9b557ac63530969451c8d5a743ff9";
        let got = compute_response(
            "MD5",
            "sip.example",
            "dcd98b7102dd2f0e",
            "alice",
            "secret",
            "INVITE",
            "sip:bob@example.com",
        )
        .unwrap();
        assert_eq!(got, expected);
        assert_eq!(got.len(), 32);
        assert!(got.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn rejects_non_md5_algorithm() {
        let err = compute_response(
            "SHA-256",
            "r",
            "n",
            "u",
            "p",
            "INVITE",
            "sip:bob@example.com",
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(a) if a == "SHA-256"));
    }
}
