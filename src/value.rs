//! Generic header values with a textual prefix plus `;param[=value]` parameters
//! (§3 "Header Value"), and the two concrete specialisations this stack needs on top of
//! that shape: [`ContactValue`] and [`CSeqValue`].

use std::fmt;

use crate::error::{Error, Result};
use crate::uri::{parse_uri, OrderedParams, Uri};

/// A header value: free-text prefix (e.g. a quoted display name, a bare token, or an
/// angle-bracketed URI) followed by ordered `;name[=value]` parameters.
///
/// The parser tolerates a `;` appearing inside a double-quoted string or inside
/// `<...>` before it is treated as a parameter separator, since both are common in
/// `Contact`/`To`/`From`-style values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Value {
    pub text: String,
    pub params: OrderedParams,
}

impl Value {
    pub fn new(text: impl Into<String>) -> Self {
        Value {
            text: text.into(),
            params: OrderedParams::new(),
        }
    }

    /// Parse `text;name=value;name` honouring quoted and angle-bracketed spans.
    pub fn parse(input: &str) -> Result<Self> {
        let split_at = find_unquoted_semicolon(input);
        let (text, rest) = match split_at {
            Some(i) => (&input[..i], Some(&input[i + 1..])),
            None => (input, None),
        };

        let mut params = OrderedParams::new();
        if let Some(rest) = rest {
            for chunk in split_unquoted(rest, ';') {
                if chunk.is_empty() {
                    continue;
                }
                match chunk.split_once('=') {
                    Some((name, value)) => params.set(name.trim(), Some(unquote(value.trim()))),
                    None => params.set(chunk.trim(), None),
                }
            }
        }

        Ok(Value {
            text: text.trim().to_string(),
            params,
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)?;
        for (name, value) in self.params.iter() {
            write!(f, ";{name}")?;
            if let Some(value) = value {
                write!(f, "={value}")?;
            }
        }
        Ok(())
    }
}

/// A `display-name <uri>` value, as used by `Contact`, `To`, and `From`.
///
/// Display names containing `"` or `\` are always rendered quoted and escaped; the URI
/// is always rendered angle-bracketed on serialisation regardless of how it was parsed,
/// per the source behaviour this is modelled on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactValue {
    pub display_name: Option<String>,
    pub uri: Uri,
    pub params: OrderedParams,
}

impl ContactValue {
    pub fn new(uri: Uri) -> Self {
        ContactValue {
            display_name: None,
            uri,
            params: OrderedParams::new(),
        }
    }

    /// Parse scenario S1's shape: `"Jeff \"The Lill\"" <sip:jeff@lilltek.com;transport=tcp>;q=10`.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (display_name, rest) = if let Some(open) = input.find('<') {
            let prefix = input[..open].trim();
            let display_name = if prefix.is_empty() {
                None
            } else if let Some(inner) = prefix.strip_prefix('"').and_then(|s| s.strip_suffix('"'))
            {
                Some(unescape_quoted(inner))
            } else {
                Some(prefix.to_string())
            };
            let close = input[open..]
                .find('>')
                .map(|i| open + i)
                .ok_or_else(|| Error::Parse("unterminated <uri> in contact value".to_string()))?;
            (display_name, &input[open + 1..close])
        } else {
            // Bare URI without angle brackets: parameters belong to the URI itself, not
            // the contact, so defer to Value's quote-aware splitter for the boundary.
            let split_at = find_unquoted_semicolon(input);
            match split_at {
                Some(i) => (None, &input[..i]),
                None => (None, input),
            }
        };

        let uri = parse_uri(rest.trim())?;

        // Trailing params after the closing '>' (or after the bare URI).
        let tail_start = if let Some(open) = input.find('<') {
            input[open..].find('>').map(|i| open + i + 1)
        } else {
            find_unquoted_semicolon(input).map(|i| i)
        };
        let mut params = OrderedParams::new();
        if let Some(start) = tail_start {
            let tail = &input[start..];
            let tail = tail.strip_prefix(';').unwrap_or(tail);
            for chunk in split_unquoted(tail, ';') {
                if chunk.is_empty() {
                    continue;
                }
                match chunk.split_once('=') {
                    Some((name, value)) => params.set(name.trim(), Some(unquote(value.trim()))),
                    None => params.set(chunk.trim(), None),
                }
            }
        }

        Ok(ContactValue {
            display_name,
            uri,
            params,
        })
    }
}

impl fmt::Display for ContactValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.display_name {
            if name.contains('"') || name.contains('\\') {
                write!(f, "\"{}\" ", escape_quoted(name))?;
            } else if !name.is_empty() {
                write!(f, "{name} ")?;
            }
        }
        write!(f, "<{}>", self.uri)?;
        for (name, value) in self.params.iter() {
            write!(f, ";{name}")?;
            if let Some(value) = value {
                write!(f, "={value}")?;
            }
        }
        Ok(())
    }
}

/// A `CSeq` value: `(number, method)`, e.g. `"42 INVITE"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CSeqValue {
    pub number: u32,
    pub method: String,
}

impl CSeqValue {
    pub fn new(number: u32, method: impl Into<String>) -> Self {
        CSeqValue {
            number,
            method: method.into(),
        }
    }

    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let (number, method) = input
            .split_once(char::is_whitespace)
            .ok_or_else(|| Error::Parse(format!("malformed CSeq: {input}")))?;
        let number: u32 = number
            .parse()
            .map_err(|_| Error::Parse(format!("malformed CSeq number: {number}")))?;
        Ok(CSeqValue {
            number,
            method: method.trim().to_string(),
        })
    }
}

impl fmt::Display for CSeqValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.number, self.method)
    }
}

/// Find the first `;` not enclosed in `"..."` or `<...>`.
fn find_unquoted_semicolon(s: &str) -> Option<usize> {
    let mut in_quotes = false;
    let mut angle_depth = 0i32;
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => in_quotes = !in_quotes,
            '\\' if in_quotes => {
                chars.next();
            }
            '<' if !in_quotes => angle_depth += 1,
            '>' if !in_quotes => angle_depth -= 1,
            ';' if !in_quotes && angle_depth <= 0 => return Some(i),
            _ => {}
        }
    }
    None
}

/// Split on `sep` outside of `"..."` spans (used for parameter lists once the value
/// prefix has already been removed).
fn split_unquoted(s: &str, sep: char) -> Vec<&str> {
    let mut out = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        if c == '"' {
            in_quotes = !in_quotes;
        } else if c == '\\' && in_quotes {
            i += 1;
        } else if c == sep && !in_quotes {
            out.push(&s[start..i]);
            start = i + 1;
        }
        i += 1;
    }
    out.push(&s[start..]);
    out
}

fn unquote(s: &str) -> String {
    if let Some(inner) = s.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        unescape_quoted(inner)
    } else {
        s.to_string()
    }
}

fn unescape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn escape_quoted(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_value_with_quoted_semicolon() {
        let v = Value::parse(r#""a;b";q=1"#).unwrap();
        assert_eq!(v.text, "\"a;b\"");
        assert_eq!(v.params.get("q"), Some(Some("1")));
    }

    #[test]
    fn scenario_s1_parse_contact() {
        let c = ContactValue::parse(
            r#""Jeff \"The Lill\"" <sip:jeff@lilltek.com;transport=tcp>;q=10"#,
        )
        .unwrap();
        assert_eq!(c.display_name.as_deref(), Some("Jeff \"The Lill\""));
        assert_eq!(c.uri.to_string(), "sip:jeff@lilltek.com;transport=tcp");
        assert_eq!(c.params.get("q"), Some(Some("10")));
    }

    #[test]
    fn contact_value_round_trips_quoted_display_name() {
        let original = ContactValue {
            display_name: Some("Jeff \"The Lill\"".to_string()),
            uri: parse_uri("sip:jeff@lilltek.com").unwrap(),
            params: OrderedParams::new(),
        };
        let rendered = original.to_string();
        let reparsed = ContactValue::parse(&rendered).unwrap();
        assert_eq!(reparsed.display_name, original.display_name);
        assert_eq!(reparsed.uri, original.uri);
    }

    #[test]
    fn scenario_s4_cseq_round_trip() {
        let cseq = CSeqValue::new(42, "INVITE");
        assert_eq!(cseq.to_string(), "42 INVITE");
        let parsed = CSeqValue::parse("42 INVITE").unwrap();
        assert_eq!(parsed.number, 42);
        assert_eq!(parsed.method, "INVITE");
    }
}
