//! SIP / SIPS URI (§4.1).
//!
//! Modeled after `rvoip-sip-core`'s `types::uri::Uri`, scaled down to the grammar
//! subset this stack needs: `sip:`/`sips:`, optional `user@host[:port]`, ordered
//! `;param[=value]` pairs, and an ordered `?header=value&...` list. Percent-decoding is
//! applied on parse and re-applied (escaping) on render so the two are inverses of each
//! other for the supported grammar.

use std::fmt;

use crate::error::{Error, Result};

/// An ordered `name -> Option<value>` parameter/header list that preserves insertion
/// order and resolves lookups case-insensitively on the name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct OrderedParams(Vec<(String, Option<String>)>);

impl OrderedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(String, Option<String>)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Option<&str>> {
        self.0
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    /// Insert or overwrite a parameter, preserving its original position on overwrite.
    pub fn set(&mut self, name: impl Into<String>, value: Option<String>) {
        let name = name.into();
        if let Some(entry) = self.0.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(&name)) {
            entry.1 = value;
        } else {
            self.0.push((name, value));
        }
    }

    fn push_raw(&mut self, name: String, value: Option<String>) {
        self.0.push((name, value));
    }
}

/// A parsed `sip:`/`sips:` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Uri {
    pub is_secure: bool,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: OrderedParams,
    pub headers: OrderedParams,
}

impl Uri {
    /// The default port for the URI's scheme when none is given explicitly.
    pub fn default_port(&self) -> u16 {
        if self.is_secure {
            5061
        } else {
            5060
        }
    }

    /// The port to dial: the explicit port, or the scheme default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.default_port())
    }

    pub fn transport_param(&self) -> Option<&str> {
        self.params.get("transport").flatten()
    }

    /// Build a bare `sip:host` URI.
    pub fn new(host: impl Into<String>) -> Self {
        Uri {
            is_secure: false,
            user: None,
            host: host.into(),
            port: None,
            params: OrderedParams::new(),
            headers: OrderedParams::new(),
        }
    }
}

impl fmt::Display for Uri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", if self.is_secure { "sips" } else { "sip" })?;
        if let Some(user) = &self.user {
            write!(f, "{}@", escape_user(user))?;
        }
        write!(f, "{}", escape_host(&self.host))?;
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        for (name, value) in self.params.iter() {
            write!(f, ";{}", escape_param(name))?;
            if let Some(value) = value {
                write!(f, "={}", escape_param(value))?;
            }
        }
        if !self.headers.is_empty() {
            f.write_str("?")?;
            for (i, (name, value)) in self.headers.iter().enumerate() {
                if i > 0 {
                    f.write_str("&")?;
                }
                write!(f, "{}", escape_header(name))?;
                if let Some(value) = value {
                    write!(f, "={}", escape_header(value))?;
                }
            }
        }
        Ok(())
    }
}

impl std::str::FromStr for Uri {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        parse_uri(s)
    }
}

/// Parse a SIP/SIPS URI per §4.1.
///
/// Accepts `sip:`/`sips:`, optional `user@`, a host (name or address literal, used
/// verbatim), an optional `:port` in `[1, 65535)`, `;name[=value]` parameters, and a
/// trailing `?name=value&...` header list.
pub fn parse_uri(input: &str) -> Result<Uri> {
    let (scheme, rest) = input
        .split_once(':')
        .ok_or_else(|| Error::Parse("uri missing scheme".to_string()))?;
    let is_secure = match scheme {
        "sip" => false,
        "sips" => true,
        other => return Err(Error::Parse(format!("unsupported uri scheme: {other}"))),
    };

    // Split off the header block first: it's delimited by the first unescaped '?'.
    let (before_headers, header_part) = match rest.split_once('?') {
        Some((a, b)) => (a, Some(b)),
        None => (rest, None),
    };

    // Split off parameters: everything after the first ';' not inside the authority.
    let (authority, param_part) = match before_headers.split_once(';') {
        Some((a, b)) => (a, Some(b)),
        None => (before_headers, None),
    };

    let (userinfo, hostport) = match authority.rsplit_once('@') {
        Some((u, h)) => (Some(u), h),
        None => (None, authority),
    };
    if hostport.is_empty() {
        return Err(Error::Parse("uri missing host".to_string()));
    }

    let (host, port) = split_hostport(hostport)?;

    let user = userinfo
        .map(percent_decode)
        .transpose()?
        .filter(|u| !u.is_empty());

    let mut params = OrderedParams::new();
    if let Some(param_part) = param_part {
        for chunk in param_part.split(';') {
            if chunk.is_empty() {
                continue;
            }
            let (name, value) = split_name_value(chunk)?;
            params.push_raw(name, value);
        }
    }

    let mut headers = OrderedParams::new();
    if let Some(header_part) = header_part {
        for chunk in header_part.split('&') {
            if chunk.is_empty() {
                continue;
            }
            let (name, value) = split_name_value(chunk)?;
            headers.push_raw(name, value);
        }
    }

    Ok(Uri {
        is_secure,
        user,
        host: percent_decode(&host)?,
        port,
        params,
        headers,
    })
}

fn split_hostport(hostport: &str) -> Result<(String, Option<u16>)> {
    // IPv6 reference: "[::1]:5060" or "[::1]".
    if let Some(rest) = hostport.strip_prefix('[') {
        let (addr, after) = rest
            .split_once(']')
            .ok_or_else(|| Error::Parse("unterminated ipv6 host literal".to_string()))?;
        let host = format!("[{addr}]");
        let port = match after.strip_prefix(':') {
            Some(p) => Some(parse_port(p)?),
            None if after.is_empty() => None,
            None => return Err(Error::Parse("junk after ipv6 host literal".to_string())),
        };
        return Ok((host, port));
    }
    match hostport.rsplit_once(':') {
        Some((host, port)) => Ok((host.to_string(), Some(parse_port(port)?))),
        None => Ok((hostport.to_string(), None)),
    }
}

fn parse_port(s: &str) -> Result<u16> {
    let port: u32 = s
        .parse()
        .map_err(|_| Error::Parse(format!("invalid port: {s}")))?;
    if port == 0 || port >= 65535 {
        return Err(Error::Parse(format!("port out of range: {port}")));
    }
    Ok(port as u16)
}

fn split_name_value(chunk: &str) -> Result<(String, Option<String>)> {
    match chunk.split_once('=') {
        Some((name, value)) => Ok((percent_decode(name)?, Some(percent_decode(value)?))),
        None => Ok((percent_decode(chunk)?, None)),
    }
}

fn percent_decode(s: &str) -> Result<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .ok_or_else(|| Error::Parse("truncated percent-escape".to_string()))?;
            let hex = std::str::from_utf8(hex).map_err(|e| Error::Parse(e.to_string()))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| Error::Parse(format!("invalid percent-escape: %{hex}")))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|e| Error::Parse(e.to_string()))
}

fn percent_encode(s: &str, is_safe: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        if is_safe(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

fn is_unreserved(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~')
}

fn escape_user(s: &str) -> String {
    percent_encode(s, |b| is_unreserved(b) || matches!(b, b'&' | b'=' | b'+' | b'$' | b','))
}

fn escape_host(s: &str) -> String {
    // Hosts are rendered verbatim: dotted names, IPv4, and bracketed IPv6 literals
    // don't need escaping for the grammar subset this stack accepts.
    s.to_string()
}

fn escape_param(s: &str) -> String {
    percent_encode(s, |b| is_unreserved(b) || matches!(b, b'[' | b']' | b'/' | b':' | b'&' | b'+' | b'$'))
}

fn escape_header(s: &str) -> String {
    percent_encode(s, is_unreserved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_uri() {
        let uri = parse_uri("sip:alice@example.com:5060;transport=udp?subject=meeting").unwrap();
        assert!(!uri.is_secure);
        assert_eq!(uri.user.as_deref(), Some("alice"));
        assert_eq!(uri.host, "example.com");
        assert_eq!(uri.port, Some(5060));
        assert_eq!(uri.params.get("transport"), Some(Some("udp")));
        assert_eq!(uri.headers.get("subject"), Some(Some("meeting")));
    }

    #[test]
    fn rejects_port_zero() {
        assert!(parse_uri("sip:alice@example.com:0").is_err());
    }

    #[test]
    fn round_trips_sips_with_params_and_headers() {
        let original = "sips:bob@example.com:5061;transport=tcp;lr?to=sales&x=1";
        let uri = parse_uri(original).unwrap();
        assert_eq!(parse_uri(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn default_port_depends_on_scheme() {
        let sip = parse_uri("sip:a@b.com").unwrap();
        assert_eq!(sip.effective_port(), 5060);
        let sips = parse_uri("sips:a@b.com").unwrap();
        assert_eq!(sips.effective_port(), 5061);
    }

    #[test]
    fn ipv6_host_literal_round_trips() {
        let original = "sip:alice@[2001:db8::1]:5060";
        let uri = parse_uri(original).unwrap();
        assert_eq!(uri.host, "[2001:db8::1]");
        assert_eq!(parse_uri(&uri.to_string()).unwrap(), uri);
    }

    #[test]
    fn percent_decodes_user_and_params() {
        let uri = parse_uri("sip:al%20ice@example.com;q=hi%3Bthere").unwrap();
        assert_eq!(uri.user.as_deref(), Some("al ice"));
        assert_eq!(uri.params.get("q"), Some(Some("hi;there")));
    }
}
