//! Request-line/status-line parsing via `nom`, grounded in `rvoip-sip-core`'s
//! `parser::response::parse_response_line` combinator shape, generalised to also parse
//! a request line and to hand headers/body off to the rest of the message model.

use nom::branch::alt;
use nom::bytes::complete::{tag, take_till, take_till1};
use nom::character::complete::{digit1, space1};
use nom::combinator::map_res;
use nom::sequence::tuple;
use nom::IResult;

use crate::error::{Error, Result};
use crate::header::HeaderCollection;
use crate::message::{MessageBase, Request, Response};
use crate::method::Method;
use crate::status::StatusCode;
use crate::uri::parse_uri;

/// A parsed message: either a request or a response, sharing one parse/serialise
/// round-trip contract (§8 testable property 1).
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Request(Request),
    Response(Response),
}

fn sip_version(input: &str) -> IResult<&str, &str> {
    tag("SIP/2.0")(input)
}

fn request_line(input: &str) -> IResult<&str, (&str, &str)> {
    let (input, (method, _, uri, _, _version)) = tuple((
        take_till1(|c| c == ' '),
        space1,
        take_till1(|c| c == ' '),
        space1,
        sip_version,
    ))(input)?;
    Ok((input, (method, uri)))
}

fn status_line(input: &str) -> IResult<&str, (u16, &str)> {
    let (input, (_version, _, status, _, reason)) = tuple((
        sip_version,
        space1,
        map_res(digit1, |s: &str| s.parse::<u16>()),
        space1,
        take_till(|c| c == '\r' || c == '\n'),
    ))(input)?;
    Ok((input, (status, reason)))
}

fn start_line(input: &str) -> IResult<&str, StartLine<'_>> {
    alt((
        nom::combinator::map(status_line, StartLine::Status),
        nom::combinator::map(request_line, StartLine::Request),
    ))(input)
}

enum StartLine<'a> {
    Request((&'a str, &'a str)),
    Status((u16, &'a str)),
}

/// Parse a complete SIP message: start-line, headers (with RFC 3261 line-folding
/// unfolded), blank line, and body (taken verbatim, sized by `Content-Length` when
/// present, else the remainder of the input).
pub fn parse_message(input: &[u8]) -> Result<ParsedMessage> {
    let text = std::str::from_utf8(input).map_err(|e| Error::Parse(e.to_string()))?;
    let unfolded = unfold_lws(text);

    let (after_start, _) = unfolded
        .find("\r\n")
        .map(|i| (i, ()))
        .ok_or_else(|| Error::Parse("message has no start-line terminator".to_string()))?;
    let start = &unfolded[..after_start];
    let rest = &unfolded[after_start + 2..];

    let (_, parsed_start) =
        start_line(start).map_err(|e| Error::Parse(format!("malformed start-line: {e}")))?;

    let header_end = rest
        .find("\r\n\r\n")
        .ok_or_else(|| Error::Parse("message has no header/body separator".to_string()))?;
    let header_block = &rest[..header_end];
    let body_start = header_end + 4;
    let mut body = rest.as_bytes()[body_start..].to_vec();

    let mut headers = HeaderCollection::new();
    for line in header_block.split("\r\n") {
        if line.is_empty() {
            continue;
        }
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| Error::Parse(format!("malformed header line: {line}")))?;
        headers.add(name.trim(), value.trim())?;
    }

    if let Some(len) = headers
        .get_value("Content-Length")
        .and_then(|v| v.trim().parse::<usize>().ok())
    {
        if len <= body.len() {
            body.truncate(len);
        }
    }

    match parsed_start {
        StartLine::Request((method, uri)) => {
            let method: Method = method.parse().unwrap_or(Method::Unknown(method.to_string()));
            let uri = parse_uri(uri)?;
            let base = MessageBase {
                sip_version: "SIP/2.0".to_string(),
                headers,
                body,
            };
            Ok(ParsedMessage::Request(Request { method, uri, base }))
        }
        StartLine::Status((status, reason)) => {
            let base = MessageBase {
                sip_version: "SIP/2.0".to_string(),
                headers,
                body,
            };
            Ok(ParsedMessage::Response(Response {
                status: StatusCode(status as i32),
                reason: reason.to_string(),
                base,
            }))
        }
    }
}

/// Unfold RFC 3261 line-folded header continuations (`CRLF` followed by `SP`/`HTAB`)
/// into a single space, leaving the start-line and header/body separators intact.
fn unfold_lws(input: &str) -> String {
    let bytes = input.as_bytes();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\r'
            && bytes.get(i + 1) == Some(&b'\n')
            && matches!(bytes.get(i + 2), Some(b' ') | Some(b'\t'))
        {
            out.push(' ');
            i += 2;
            while matches!(bytes.get(i), Some(b' ') | Some(b'\t')) {
                i += 1;
            }
        } else {
            out.push(bytes[i] as char);
            i += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::method::Method;

    fn sample_invite() -> Vec<u8> {
        concat!(
            "INVITE sip:bob@example.com SIP/2.0\r\n",
            "Via: SIP/2.0/UDP host.example.com;branch=z9hG4bK1\r\n",
            "To: <sip:bob@example.com>\r\n",
            "From: <sip:alice@example.com>;tag=1\r\n",
            "Call-ID: abc123@host\r\n",
            "CSeq: 1 INVITE\r\n",
            "Content-Length: 0\r\n",
            "\r\n",
        )
        .as_bytes()
        .to_vec()
    }

    #[test]
    fn parses_request_start_line_and_headers() {
        let parsed = parse_message(&sample_invite()).unwrap();
        match parsed {
            ParsedMessage::Request(req) => {
                assert_eq!(req.method, Method::Invite);
                assert_eq!(req.uri.host, "example.com");
                assert_eq!(req.base.headers.get_value("Call-ID"), Some("abc123@host"));
            }
            ParsedMessage::Response(_) => panic!("expected request"),
        }
    }

    #[test]
    fn parses_status_line() {
        let raw = b"SIP/2.0 486 Busy Here\r\nVia: SIP/2.0/UDP host;branch=z9hG4bK1\r\nContent-Length: 0\r\n\r\n";
        let parsed = parse_message(raw).unwrap();
        match parsed {
            ParsedMessage::Response(resp) => {
                assert_eq!(resp.status.0, 486);
                assert_eq!(resp.reason, "Busy Here");
            }
            ParsedMessage::Request(_) => panic!("expected response"),
        }
    }

    #[test]
    fn round_trip_preserves_body_and_content_length() {
        let mut req = {
            match parse_message(&sample_invite()).unwrap() {
                ParsedMessage::Request(req) => req,
                _ => unreachable!(),
            }
        };
        req.base.body = b"v=0\r\n".to_vec();
        let bytes = req.serialize();
        let reparsed = parse_message(&bytes).unwrap();
        match reparsed {
            ParsedMessage::Request(req2) => {
                assert_eq!(req2.base.body, b"v=0\r\n".to_vec());
                assert_eq!(req2.base.headers.get_value("Content-Length"), Some("5"));
            }
            _ => panic!("expected request"),
        }
    }

    #[test]
    fn unfolds_continuation_lines() {
        let raw = concat!(
            "INVITE sip:bob@example.com SIP/2.0\r\n",
            "Subject: long\r\n subject text\r\n",
            "Via: SIP/2.0/UDP host;branch=z9hG4bK1\r\n",
            "Call-ID: x@h\r\n",
            "CSeq: 1 INVITE\r\n",
            "Content-Length: 0\r\n",
            "\r\n",
        )
        .as_bytes();
        let parsed = parse_message(raw).unwrap();
        match parsed {
            ParsedMessage::Request(req) => {
                assert_eq!(req.base.headers.get_value("Subject"), Some("long subject text"));
            }
            _ => panic!("expected request"),
        }
    }
}
