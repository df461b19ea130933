//! Header and header-collection model (§3, §4.2): compact-alias resolution, the
//! special-header single-instance rule, and proxy-optimised serialisation ordering.

use std::fmt;

/// Headers that may contain literal commas and are therefore never comma-merged; a
/// collection holds at most one instance of each.
const SPECIAL_HEADERS: &[&str] = &[
    "WWW-Authenticate",
    "Authorization",
    "Proxy-Authenticate",
    "Proxy-Authorization",
    "Date",
    "Subject",
    "Supported",
    "Unsupported",
    "Require",
    "User-Agent",
];

/// Headers that always serialise one value per line regardless of `is_special`.
const MULTILINE_HEADERS: &[&str] = &["Via", "Route"];

/// Long-form headers that may be written compact, and their single-letter alias.
const COMPACT_ALIASES: &[(&str, char)] = &[
    ("Call-ID", 'i'),
    ("Contact", 'm'),
    ("Content-Encoding", 'e'),
    ("Content-Length", 'l'),
    ("Content-Type", 'c'),
    ("From", 'f'),
    ("Subject", 's'),
    ("Supported", 'k'),
    ("To", 't'),
    ("Via", 'v'),
];

/// Headers emitted first, in this order, ahead of all other headers (proxy
/// optimisation per §4.2).
const LEADING_HEADER_ORDER: &[&str] = &[
    "Via",
    "Route",
    "Record-Route",
    "Proxy-Require",
    "Max-Forwards",
    "Proxy-Authorization",
];

fn canonical_name(name: &str) -> String {
    if name.chars().count() == 1 {
        let c = name.chars().next().unwrap().to_ascii_lowercase();
        if let Some((long, _)) = COMPACT_ALIASES.iter().find(|(_, alias)| *alias == c) {
            return (*long).to_string();
        }
    }
    for (long, _) in COMPACT_ALIASES {
        if long.eq_ignore_ascii_case(name) {
            return (*long).to_string();
        }
    }
    name.to_string()
}

fn is_special(name: &str) -> bool {
    SPECIAL_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name))
}

fn is_multiline(name: &str) -> bool {
    MULTILINE_HEADERS.iter().any(|h| h.eq_ignore_ascii_case(name)) || is_special(name)
}

fn compact_alias_for(name: &str) -> Option<char> {
    COMPACT_ALIASES
        .iter()
        .find(|(long, _)| long.eq_ignore_ascii_case(name))
        .map(|(_, alias)| *alias)
}

/// A single header: its canonical long-form name, its ordered values, and whether it
/// belongs to the special (never comma-merged, single-instance) set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub name: String,
    pub values: Vec<String>,
    pub is_special: bool,
}

/// An ordered, case-insensitive collection of [`Header`]s.
///
/// Resolves compact single-letter aliases to long form on insert and lookup. Once any
/// compact alias has been observed on input, [`HeaderCollection::serialize`] emits
/// compact names for every header that has one.
#[derive(Debug, Clone, Default)]
pub struct HeaderCollection {
    headers: Vec<Header>,
    saw_compact_alias: bool,
}

impl HeaderCollection {
    pub fn new() -> Self {
        Self::default()
    }

    fn find_index(&self, name: &str) -> Option<usize> {
        let canonical = canonical_name(name);
        self.headers
            .iter()
            .position(|h| h.name.eq_ignore_ascii_case(&canonical))
    }

    pub fn get(&self, name: &str) -> Option<&Header> {
        self.find_index(name).map(|i| &self.headers[i])
    }

    /// The first value of `name`, if present.
    pub fn get_value(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(|h| h.values.first()).map(String::as_str)
    }

    pub fn remove(&mut self, name: &str) {
        if let Some(i) = self.find_index(name) {
            self.headers.remove(i);
        }
    }

    fn note_alias_usage(&mut self, original_name: &str) {
        if original_name.chars().count() == 1 {
            self.saw_compact_alias = true;
        }
    }

    /// Append `value` to `name`. Comma-separated ordinary values are split and appended
    /// individually; special headers are never split and may appear only once.
    pub fn add(&mut self, name: &str, value: &str) -> crate::error::Result<()> {
        self.note_alias_usage(name);
        let canonical = canonical_name(name);
        let special = is_special(&canonical);

        if special {
            if self.find_index(&canonical).is_some() {
                return Err(crate::error::Error::ProtocolViolation(format!(
                    "special header {canonical} already present"
                )));
            }
            self.headers.push(Header {
                name: canonical,
                values: vec![value.to_string()],
                is_special: true,
            });
            return Ok(());
        }

        let new_values: Vec<String> = if value.contains(',') {
            value.split(',').map(|v| v.trim().to_string()).collect()
        } else {
            vec![value.to_string()]
        };

        match self.find_index(&canonical) {
            Some(i) => self.headers[i].values.extend(new_values),
            None => self.headers.push(Header {
                name: canonical,
                values: new_values,
                is_special: false,
            }),
        }
        Ok(())
    }

    /// Like [`HeaderCollection::add`] but inserts before any existing values.
    pub fn prepend(&mut self, name: &str, value: &str) -> crate::error::Result<()> {
        self.note_alias_usage(name);
        let canonical = canonical_name(name);
        let special = is_special(&canonical);

        if special {
            if self.find_index(&canonical).is_some() {
                return Err(crate::error::Error::ProtocolViolation(format!(
                    "special header {canonical} already present"
                )));
            }
            self.headers.push(Header {
                name: canonical,
                values: vec![value.to_string()],
                is_special: true,
            });
            return Ok(());
        }

        let new_values: Vec<String> = if value.contains(',') {
            value.split(',').map(|v| v.trim().to_string()).collect()
        } else {
            vec![value.to_string()]
        };

        match self.find_index(&canonical) {
            Some(i) => {
                let mut combined = new_values;
                combined.extend(self.headers[i].values.drain(..));
                self.headers[i].values = combined;
            }
            None => self.headers.push(Header {
                name: canonical,
                values: new_values,
                is_special: false,
            }),
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Header> {
        self.headers.iter()
    }

    /// Serialise all headers as `Name: value\r\n` lines (including the trailing blank
    /// line separating headers from the body), honouring the leading-header ordering
    /// and compact-name preference.
    pub fn serialize(&self) -> String {
        let mut out = String::new();

        let mut leading: Vec<&Header> = Vec::new();
        let mut rest: Vec<&Header> = Vec::new();
        for header in &self.headers {
            if LEADING_HEADER_ORDER
                .iter()
                .any(|n| n.eq_ignore_ascii_case(&header.name))
            {
                leading.push(header);
            } else {
                rest.push(header);
            }
        }
        leading.sort_by_key(|h| {
            LEADING_HEADER_ORDER
                .iter()
                .position(|n| n.eq_ignore_ascii_case(&h.name))
                .unwrap_or(usize::MAX)
        });

        for header in leading.into_iter().chain(rest) {
            self.serialize_header(header, &mut out);
        }
        out.push_str("\r\n");
        out
    }

    fn serialize_header(&self, header: &Header, out: &mut String) {
        let name = if self.saw_compact_alias {
            compact_alias_for(&header.name)
                .map(|c| c.to_string())
                .unwrap_or_else(|| header.name.clone())
        } else {
            header.name.clone()
        };

        if is_multiline(&header.name) {
            for value in &header.values {
                out.push_str(&name);
                out.push_str(": ");
                out.push_str(value);
                out.push_str("\r\n");
            }
        } else {
            out.push_str(&name);
            out.push_str(": ");
            out.push_str(&header.values.join(","));
            out.push_str("\r\n");
        }
    }
}

impl fmt::Display for HeaderCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.serialize())
    }
}
