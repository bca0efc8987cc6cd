//! Low-level non-validating streaming tokenizer.
//!
//! Bytes are pushed in arbitrary chunks; complete events come out the
//! other side with byte-accurate positions. Predefined entities and
//! character references are decoded in chardata and attribute values;
//! any other entity reference is passed through untouched as a
//! [`XmlEvent::Default`] so that documents survive round-tripping.

use std::collections::VecDeque;

use memchr::memchr;

use crate::attlist::AttributeList;
use crate::entities::{expand_entity, is_name_char, is_name_start_char, is_xml_space};

/// Classification of a document node, used by path labels, the skip
/// engine and the file-block parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeKind {
    None,
    Space,
    Default,
    Chardata,
    Comment,
    Pi,
    StartTag,
    EndTag,
    StartCdata,
    EndCdata,
    StartDoctype,
    EndDoctype,
    EntityDecl,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlEvent {
    StartTag {
        name: String,
        attrs: AttributeList,
    },
    EndTag {
        name: String,
    },
    Chardata(String),
    CdataStart,
    CdataEnd,
    Comment(String),
    Pi {
        target: String,
        data: String,
    },
    DoctypeStart {
        name: String,
        sysid: Option<String>,
        pubid: Option<String>,
        internal_subset: bool,
    },
    DoctypeEnd,
    EntityDecl {
        name: String,
        value: Option<String>,
    },
    /// Raw source bytes passed through unparsed: the XML declaration,
    /// unexpanded entity references, prolog whitespace, DTD internals.
    Default(Vec<u8>),
}

impl XmlEvent {
    pub fn kind(&self) -> NodeKind {
        match self {
            XmlEvent::StartTag { .. } => NodeKind::StartTag,
            XmlEvent::EndTag { .. } => NodeKind::EndTag,
            XmlEvent::Chardata(s) => {
                if is_xml_space(s.as_bytes()) {
                    NodeKind::Space
                } else {
                    NodeKind::Chardata
                }
            }
            XmlEvent::CdataStart => NodeKind::StartCdata,
            XmlEvent::CdataEnd => NodeKind::EndCdata,
            XmlEvent::Comment(_) => NodeKind::Comment,
            XmlEvent::Pi { .. } => NodeKind::Pi,
            XmlEvent::DoctypeStart { .. } => NodeKind::StartDoctype,
            XmlEvent::DoctypeEnd => NodeKind::EndDoctype,
            XmlEvent::EntityDecl { .. } => NodeKind::EntityDecl,
            XmlEvent::Default(d) => {
                if is_xml_space(d) {
                    NodeKind::Space
                } else {
                    NodeKind::Default
                }
            }
        }
    }
}

/// An event plus the source position it was tokenized from and the raw
/// source bytes it covers.
#[derive(Debug, Clone)]
pub struct Located {
    pub event: XmlEvent,
    pub line: u64,
    pub column: u64,
    pub byte: u64,
    pub len: usize,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct TokenError {
    pub message: String,
    pub line: u64,
    pub column: u64,
    pub byte: u64,
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TokenError {}

/// One event computed from the working buffer: `rel` is its offset from
/// the current consume position, `len` its source byte length.
struct Pending {
    event: XmlEvent,
    rel: usize,
    len: usize,
}

enum Step {
    Events(Vec<Pending>, usize),
    More,
    Fail(String),
}

pub struct Tokenizer {
    buf: Vec<u8>,
    pos: usize,
    /// Bytes consumed before buf[0].
    base: u64,
    line: u64,
    column: u64,
    /// Open elements, for depth and end-tag matching.
    stack: Vec<String>,
    seen_root: bool,
    at_start: bool,
    queue: VecDeque<Located>,
    failed: Option<TokenError>,
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Tokenizer {
    pub fn new() -> Self {
        Tokenizer {
            buf: Vec::new(),
            pos: 0,
            base: 0,
            line: 1,
            column: 0,
            stack: Vec::new(),
            seen_root: false,
            at_start: true,
            queue: VecDeque::new(),
            failed: None,
        }
    }

    pub fn reset(&mut self) {
        *self = Tokenizer::new();
    }

    /// Absolute byte position of the next unconsumed byte.
    pub fn byte(&self) -> u64 {
        self.base + self.pos as u64
    }

    pub fn line(&self) -> u64 {
        self.line
    }

    pub fn column(&self) -> u64 {
        self.column
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn seen_root(&self) -> bool {
        self.seen_root
    }

    pub fn push_bytes(&mut self, input: &[u8]) {
        self.buf.extend_from_slice(input);
    }

    fn fail(&mut self, message: String) -> TokenError {
        let e = TokenError {
            message,
            line: self.line,
            column: self.column,
            byte: self.byte(),
        };
        self.failed = Some(e.clone());
        e
    }

    fn consume(&mut self, n: usize) {
        for &b in &self.buf[self.pos..self.pos + n] {
            if b == b'\n' {
                self.line += 1;
                self.column = 0;
            } else {
                self.column += 1;
            }
        }
        self.pos += n;
        if self.pos > 64 * 1024 {
            self.buf.drain(..self.pos);
            self.base += self.pos as u64;
            self.pos = 0;
        }
    }

    /// Pull the next tokenized event, or None if more input is needed.
    /// `eof` flushes trailing text and diagnoses truncated markup.
    pub fn next_event(&mut self, eof: bool) -> Result<Option<Located>, TokenError> {
        loop {
            if let Some(ev) = self.queue.pop_front() {
                return Ok(Some(ev));
            }
            if let Some(e) = &self.failed {
                return Err(e.clone());
            }
            if self.pos >= self.buf.len() {
                if eof && !self.stack.is_empty() {
                    return Err(self.fail("unexpected end of document".into()));
                }
                return Ok(None);
            }
            let step = if self.buf[self.pos] == b'<' {
                self.step_markup()
            } else {
                self.step_text(eof)
            };
            match step {
                Step::Events(pendings, consumed) => {
                    let byte0 = self.byte();
                    for p in pendings {
                        let raw = self.buf[self.pos + p.rel..self.pos + p.rel + p.len].to_vec();
                        self.queue.push_back(Located {
                            event: p.event,
                            line: self.line,
                            column: self.column,
                            byte: byte0 + p.rel as u64,
                            len: p.len,
                            raw,
                        });
                    }
                    self.consume(consumed);
                }
                Step::More => {
                    if eof {
                        return Err(self.fail("unexpected end of document".into()));
                    }
                    return Ok(None);
                }
                Step::Fail(msg) => return Err(self.fail(msg)),
            }
        }
    }

    /// Text run up to the next `<`. Predefined entities and character
    /// references decode in place; unknown references pass through raw.
    fn step_text(&mut self, eof: bool) -> Step {
        let rest = &self.buf[self.pos..];
        let end = memchr(b'<', rest).unwrap_or(rest.len());
        let complete = end < rest.len() || eof;
        let text = &rest[..end];
        let depth = self.stack.len();

        let mut out = String::new();
        let mut out_start = 0;
        let mut pend = Vec::new();
        let mut consumed = 0;
        while consumed < text.len() {
            match memchr(b'&', &text[consumed..]) {
                None => {
                    if !complete {
                        break;
                    }
                    out.push_str(&lossy(&text[consumed..]));
                    consumed = text.len();
                }
                Some(i) => {
                    out.push_str(&lossy(&text[consumed..consumed + i]));
                    consumed += i;
                    let refend = match memchr(b';', &text[consumed..]) {
                        Some(j) => consumed + j,
                        None if complete => {
                            return Step::Fail("bare ampersand in character data".into())
                        }
                        None => break,
                    };
                    let raw = &text[consumed..=refend];
                    match decode_reference(raw) {
                        Some(c) => out.push(c),
                        None => {
                            if depth == 0 && !is_xml_space(out.as_bytes()) {
                                return Step::Fail("junk outside document element".into());
                            }
                            if !out.is_empty() {
                                pend.push(text_event(out, depth, out_start, consumed - out_start));
                                out = String::new();
                            }
                            pend.push(Pending {
                                event: XmlEvent::Default(raw.to_vec()),
                                rel: consumed,
                                len: raw.len(),
                            });
                            out_start = refend + 1;
                        }
                    }
                    consumed = refend + 1;
                }
            }
        }
        if !out.is_empty() {
            if depth == 0 && !is_xml_space(out.as_bytes()) {
                return Step::Fail("junk outside document element".into());
            }
            pend.push(text_event(out, depth, out_start, consumed - out_start));
        }
        if pend.is_empty() {
            return Step::More;
        }
        Step::Events(pend, consumed)
    }

    fn step_markup(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        if rest.len() < 2 {
            return Step::More;
        }
        match rest[1] {
            b'?' => self.step_pi(),
            b'!' => self.step_bang(),
            b'/' => self.step_end_tag(),
            c if is_name_start_char(c) => self.step_start_tag(),
            _ => Step::Fail("malformed markup after '<'".into()),
        }
    }

    fn step_pi(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        let close = match find_sub(rest, b"?>") {
            Some(i) => i,
            None => return Step::More,
        };
        let inner = &rest[2..close];
        let len = close + 2;
        let name_end = inner
            .iter()
            .position(|b| !is_name_char(*b))
            .unwrap_or(inner.len());
        let target = lossy(&inner[..name_end]).into_owned();
        if target.is_empty() {
            return Step::Fail("processing instruction without target".into());
        }
        let event = if target.eq_ignore_ascii_case("xml") && self.at_start {
            // the declaration is prolog plumbing, pass it through raw
            XmlEvent::Default(rest[..len].to_vec())
        } else {
            XmlEvent::Pi {
                target,
                data: lossy(skip_space(&inner[name_end..])).into_owned(),
            }
        };
        self.at_start = false;
        Step::Events(vec![Pending { event, rel: 0, len }], len)
    }

    fn step_bang(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        if rest.starts_with(b"<!--") {
            return self.step_comment();
        }
        if rest.starts_with(b"<![CDATA[") {
            return self.step_cdata();
        }
        if rest.starts_with(b"<!DOCTYPE") {
            return self.step_doctype();
        }
        if pre_matches(rest, b"<!--")
            || pre_matches(rest, b"<![CDATA[")
            || pre_matches(rest, b"<!DOCTYPE")
        {
            return Step::More;
        }
        Step::Fail("unrecognized markup declaration".into())
    }

    fn step_comment(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        let close = match find_sub(&rest[4..], b"-->") {
            Some(i) => i,
            None => return Step::More,
        };
        let text = lossy(&rest[4..4 + close]).into_owned();
        let len = 4 + close + 3;
        self.at_start = false;
        Step::Events(
            vec![Pending {
                event: XmlEvent::Comment(text),
                rel: 0,
                len,
            }],
            len,
        )
    }

    fn step_cdata(&mut self) -> Step {
        if self.stack.is_empty() {
            return Step::Fail("CDATA section outside document element".into());
        }
        let rest = &self.buf[self.pos..];
        let close = match find_sub(&rest[9..], b"]]>") {
            Some(i) => i,
            None => return Step::More,
        };
        let text = lossy(&rest[9..9 + close]).into_owned();
        let len = 9 + close + 3;
        Step::Events(
            vec![
                Pending {
                    event: XmlEvent::CdataStart,
                    rel: 0,
                    len: 9,
                },
                Pending {
                    event: XmlEvent::Chardata(text),
                    rel: 9,
                    len: close,
                },
                Pending {
                    event: XmlEvent::CdataEnd,
                    rel: 9 + close,
                    len: 3,
                },
            ],
            len,
        )
    }

    fn step_doctype(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        // the closing '>' must sit at bracket depth zero, outside quotes
        let mut brackets = 0i32;
        let mut quote = 0u8;
        let mut close = None;
        for (i, &b) in rest.iter().enumerate() {
            match b {
                _ if quote != 0 => {
                    if b == quote {
                        quote = 0;
                    }
                }
                b'"' | b'\'' => quote = b,
                b'[' => brackets += 1,
                b']' => brackets -= 1,
                b'>' if brackets == 0 && i > 0 => {
                    close = Some(i);
                    break;
                }
                _ => {}
            }
        }
        let close = match close {
            Some(i) => i,
            None => return Step::More,
        };
        let inner = &rest[9..close];
        let header_end = memchr(b'[', inner).unwrap_or(inner.len());
        let header = DoctypeHeader::parse(&lossy(&inner[..header_end]));
        let internal_subset = header_end < inner.len();
        let mut pend = vec![Pending {
            event: XmlEvent::DoctypeStart {
                name: header.name.unwrap_or_default(),
                sysid: header.sysid,
                pubid: header.pubid,
                internal_subset,
            },
            rel: 0,
            len: header_end + 9,
        }];
        if internal_subset {
            let subset = &inner[header_end..];
            for (name, value) in scan_entity_decls(subset) {
                pend.push(Pending {
                    event: XmlEvent::EntityDecl { name, value },
                    rel: 9 + header_end,
                    len: 0,
                });
            }
            pend.push(Pending {
                event: XmlEvent::Default(subset.to_vec()),
                rel: 9 + header_end,
                len: subset.len(),
            });
        }
        pend.push(Pending {
            event: XmlEvent::DoctypeEnd,
            rel: close,
            len: 1,
        });
        self.at_start = false;
        Step::Events(pend, close + 1)
    }

    fn step_end_tag(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        let close = match memchr(b'>', rest) {
            Some(i) => i,
            None => return Step::More,
        };
        let name = lossy(trim_space(&rest[2..close])).into_owned();
        if name.is_empty() || !is_name_start_char(name.as_bytes()[0]) {
            return Step::Fail("invalid end-tag name".into());
        }
        match self.stack.last() {
            None => return Step::Fail("end-tag with no open element".into()),
            Some(open) if *open != name => {
                return Step::Fail(format!("mismatched tag (expected </{open}>)"))
            }
            Some(_) => {}
        }
        self.stack.pop();
        Step::Events(
            vec![Pending {
                event: XmlEvent::EndTag { name },
                rel: 0,
                len: close + 1,
            }],
            close + 1,
        )
    }

    fn step_start_tag(&mut self) -> Step {
        let rest = &self.buf[self.pos..];
        // '>' inside quoted attribute values does not close the tag
        let mut quote = 0u8;
        let mut close = None;
        for (i, &b) in rest.iter().enumerate() {
            match b {
                _ if quote != 0 => {
                    if b == quote {
                        quote = 0;
                    }
                }
                b'"' | b'\'' => quote = b,
                b'>' => {
                    close = Some(i);
                    break;
                }
                b'<' if i > 0 => return Step::Fail("'<' inside tag".into()),
                _ => {}
            }
        }
        let close = match close {
            Some(i) => i,
            None => return Step::More,
        };
        let self_closing = close > 1 && rest[close - 1] == b'/';
        let inner = &rest[1..if self_closing { close - 1 } else { close }];
        let name_end = inner
            .iter()
            .position(|b| !is_name_char(*b))
            .unwrap_or(inner.len());
        let name = lossy(&inner[..name_end]).into_owned();
        if name.is_empty() {
            return Step::Fail("invalid start-tag name".into());
        }
        if self.stack.is_empty() && self.seen_root {
            return Step::Fail("junk after document element".into());
        }
        let attrs = match parse_attributes(&inner[name_end..]) {
            Ok(a) => a,
            Err(msg) => return Step::Fail(msg),
        };
        let len = close + 1;
        self.seen_root = true;
        self.at_start = false;
        let mut pend = vec![Pending {
            event: XmlEvent::StartTag {
                name: name.clone(),
                attrs,
            },
            rel: 0,
            len,
        }];
        if self_closing {
            // <a/> yields two events sharing one offset; the cursor
            // layer knows to filter the duplicate
            pend.push(Pending {
                event: XmlEvent::EndTag { name },
                rel: 0,
                len: 0,
            });
        } else {
            self.stack.push(name);
        }
        Step::Events(pend, len)
    }
}

fn text_event(text: String, depth: usize, rel: usize, len: usize) -> Pending {
    // text at depth 0 can only be whitespace, reported raw
    let event = if depth == 0 {
        XmlEvent::Default(text.into_bytes())
    } else {
        XmlEvent::Chardata(text)
    };
    Pending { event, rel, len }
}

fn parse_attributes(mut s: &[u8]) -> Result<AttributeList, String> {
    let mut attrs = AttributeList::new();
    loop {
        s = skip_space(s);
        if s.is_empty() {
            return Ok(attrs);
        }
        let name_end = s.iter().position(|b| !is_name_char(*b)).unwrap_or(s.len());
        if name_end == 0 {
            return Err("malformed attribute name".into());
        }
        let name = lossy(&s[..name_end]).into_owned();
        s = skip_space(&s[name_end..]);
        if s.first() != Some(&b'=') {
            return Err("attribute without value".into());
        }
        s = skip_space(&s[1..]);
        let quote = match s.first() {
            Some(&q @ (b'"' | b'\'')) => q,
            _ => return Err("unquoted attribute value".into()),
        };
        let vend = match memchr(quote, &s[1..]) {
            Some(i) => i + 1,
            None => return Err("unterminated attribute value".into()),
        };
        let raw = &s[1..vend];
        if memchr(b'<', raw).is_some() {
            return Err("'<' in attribute value".into());
        }
        let value = decode_attvalue(raw).ok_or("bad entity reference in attribute value")?;
        attrs.push(&name, &value);
        s = &s[vend + 1..];
    }
}

struct DoctypeHeader {
    name: Option<String>,
    sysid: Option<String>,
    pubid: Option<String>,
}

impl DoctypeHeader {
    fn parse(header: &str) -> DoctypeHeader {
        let mut name = None;
        let mut rest = header.trim();
        if let Some(end) = rest.find(|c: char| c.is_whitespace()) {
            name = Some(rest[..end].to_string());
            rest = rest[end..].trim_start();
        } else if !rest.is_empty() {
            name = Some(rest.to_string());
            rest = "";
        }
        let mut literals = rest
            .split(['"', '\''])
            .skip(1)
            .step_by(2)
            .map(str::to_string);
        let (pubid, sysid) = if rest.starts_with("SYSTEM") {
            (None, literals.next())
        } else if rest.starts_with("PUBLIC") {
            (literals.next(), literals.next())
        } else {
            (None, None)
        };
        DoctypeHeader { name, sysid, pubid }
    }
}

/// Pick general entity declarations with literal values out of an
/// internal subset. Parameter and external entities are left alone.
fn scan_entity_decls(subset: &[u8]) -> Vec<(String, Option<String>)> {
    let mut out = Vec::new();
    let mut s = subset;
    while let Some(i) = find_sub(s, b"<!ENTITY") {
        s = &s[i + 8..];
        let rest = skip_space(s);
        if rest.first() == Some(&b'%') {
            continue;
        }
        let name_end = rest
            .iter()
            .position(|b| !is_name_char(*b))
            .unwrap_or(rest.len());
        if name_end == 0 {
            continue;
        }
        let name = lossy(&rest[..name_end]).into_owned();
        let after = skip_space(&rest[name_end..]);
        let value = match after.first() {
            Some(&q @ (b'"' | b'\'')) => {
                memchr(q, &after[1..]).map(|end| lossy(&after[1..end + 1]).into_owned())
            }
            _ => None,
        };
        out.push((name, value));
    }
    out
}

fn decode_reference(raw: &[u8]) -> Option<char> {
    // raw includes the leading '&' and trailing ';'
    let inner = &raw[1..raw.len() - 1];
    if let Some(rest) = inner.strip_prefix(b"#") {
        let (digits, radix) = match rest.strip_prefix(b"x").or_else(|| rest.strip_prefix(b"X")) {
            Some(hex) => (hex, 16),
            None => (rest, 10),
        };
        let s = std::str::from_utf8(digits).ok()?;
        let n = u32::from_str_radix(s, radix).ok()?;
        char::from_u32(n)
    } else {
        expand_entity(std::str::from_utf8(inner).ok()?)
    }
}

fn decode_attvalue(raw: &[u8]) -> Option<String> {
    let mut out = String::new();
    let mut rest = raw;
    while let Some(i) = memchr(b'&', rest) {
        out.push_str(&lossy(&rest[..i]));
        let end = memchr(b';', &rest[i..])? + i;
        out.push(decode_reference(&rest[i..=end])?);
        rest = &rest[end + 1..];
    }
    out.push_str(&lossy(rest));
    Some(out)
}

fn lossy(bytes: &[u8]) -> std::borrow::Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

fn skip_space(s: &[u8]) -> &[u8] {
    let n = s
        .iter()
        .take_while(|b| crate::entities::is_xml_whitespace(**b))
        .count();
    &s[n..]
}

fn trim_space(s: &[u8]) -> &[u8] {
    let s = skip_space(s);
    let n = s
        .iter()
        .rev()
        .take_while(|b| crate::entities::is_xml_whitespace(**b))
        .count();
    &s[..s.len() - n]
}

fn find_sub(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    let mut from = 0;
    while let Some(i) = memchr(needle[0], &haystack[from..]) {
        let at = from + i;
        if haystack.len() - at < needle.len() {
            return None;
        }
        if &haystack[at..at + needle.len()] == needle {
            return Some(at);
        }
        from = at + 1;
    }
    None
}

/// True when `buf` could still turn out to start with `prefix` once more
/// bytes arrive.
fn pre_matches(buf: &[u8], prefix: &[u8]) -> bool {
    let n = buf.len().min(prefix.len());
    buf[..n] == prefix[..n] && buf.len() < prefix.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_events(input: &str) -> Vec<XmlEvent> {
        let mut tk = Tokenizer::new();
        tk.push_bytes(input.as_bytes());
        let mut out = Vec::new();
        while let Some(ev) = tk.next_event(true).unwrap() {
            out.push(ev.event);
        }
        out
    }

    #[test]
    fn simple_document() {
        let evs = all_events("<a x=\"1\">hi</a>");
        assert_eq!(
            evs[0],
            XmlEvent::StartTag {
                name: "a".into(),
                attrs: [("x".to_string(), "1".to_string())].into_iter().collect(),
            }
        );
        assert_eq!(evs[1], XmlEvent::Chardata("hi".into()));
        assert_eq!(evs[2], XmlEvent::EndTag { name: "a".into() });
    }

    #[test]
    fn self_closing_yields_two_events_sharing_offset() {
        let mut tk = Tokenizer::new();
        tk.push_bytes(b"<a/>");
        let start = tk.next_event(true).unwrap().unwrap();
        let end = tk.next_event(true).unwrap().unwrap();
        assert!(matches!(start.event, XmlEvent::StartTag { .. }));
        assert!(matches!(end.event, XmlEvent::EndTag { .. }));
        assert_eq!(start.byte, end.byte);
    }

    #[test]
    fn predefined_entities_decode() {
        let evs = all_events("<a>x &amp; y &#65;</a>");
        assert_eq!(evs[1], XmlEvent::Chardata("x & y A".into()));
    }

    #[test]
    fn unknown_entities_pass_through_raw() {
        let evs = all_events("<a>pre&foo;post</a>");
        assert_eq!(evs[1], XmlEvent::Chardata("pre".into()));
        assert_eq!(evs[2], XmlEvent::Default(b"&foo;".to_vec()));
        assert_eq!(evs[3], XmlEvent::Chardata("post".into()));
    }

    #[test]
    fn cdata_bracketing() {
        let evs = all_events("<a><![CDATA[x < y]]></a>");
        assert_eq!(evs[1], XmlEvent::CdataStart);
        assert_eq!(evs[2], XmlEvent::Chardata("x < y".into()));
        assert_eq!(evs[3], XmlEvent::CdataEnd);
    }

    #[test]
    fn xml_declaration_is_default_passthrough() {
        let evs = all_events("<?xml version=\"1.0\"?>\n<a/>");
        assert_eq!(
            evs[0],
            XmlEvent::Default(b"<?xml version=\"1.0\"?>".to_vec())
        );
        assert_eq!(evs[1], XmlEvent::Default(b"\n".to_vec()));
    }

    #[test]
    fn pi_events() {
        let evs = all_events("<a><?go fast?></a>");
        assert_eq!(
            evs[1],
            XmlEvent::Pi {
                target: "go".into(),
                data: "fast".into()
            }
        );
    }

    #[test]
    fn doctype_with_entity_decl() {
        let evs = all_events("<!DOCTYPE r [<!ENTITY foo \"bar\">]><r>&foo;</r>");
        assert!(matches!(
            &evs[0],
            XmlEvent::DoctypeStart { name, internal_subset: true, .. } if name == "r"
        ));
        assert!(evs.iter().any(|e| matches!(
            e,
            XmlEvent::EntityDecl { name, value: Some(v) } if name == "foo" && v == "bar"
        )));
        assert!(evs.contains(&XmlEvent::DoctypeEnd));
        assert!(evs.contains(&XmlEvent::Default(b"&foo;".to_vec())));
    }

    #[test]
    fn doctype_system_literal() {
        let evs = all_events("<!DOCTYPE r SYSTEM \"r.dtd\"><r/>");
        assert!(matches!(
            &evs[0],
            XmlEvent::DoctypeStart { sysid: Some(s), internal_subset: false, .. } if s == "r.dtd"
        ));
    }

    #[test]
    fn split_feeds_reassemble_tokens() {
        let doc = b"<root a=\"1\"><child>text &amp; more</child></root>";
        let mut tk = Tokenizer::new();
        let mut events = Vec::new();
        for chunk in doc.chunks(3) {
            tk.push_bytes(chunk);
            while let Some(ev) = tk.next_event(false).unwrap() {
                events.push(ev.event);
            }
        }
        while let Some(ev) = tk.next_event(true).unwrap() {
            events.push(ev.event);
        }
        assert!(matches!(events[0], XmlEvent::StartTag { ref name, .. } if name == "root"));
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                XmlEvent::Chardata(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "text & more");
        assert!(matches!(events.last(), Some(XmlEvent::EndTag { name }) if name == "root"));
    }

    #[test]
    fn junk_after_root_is_an_error() {
        let mut tk = Tokenizer::new();
        tk.push_bytes(b"<a/><b/>");
        tk.next_event(true).unwrap();
        tk.next_event(true).unwrap();
        assert!(tk.next_event(true).is_err());
    }

    #[test]
    fn position_tracking() {
        let mut tk = Tokenizer::new();
        tk.push_bytes(b"<a>\n  <b/></a>");
        tk.next_event(true).unwrap(); // <a>
        tk.next_event(true).unwrap(); // chardata
        let b = tk.next_event(true).unwrap().unwrap();
        assert_eq!(b.line, 2);
        assert_eq!(b.byte, 6);
    }

    #[test]
    fn unterminated_tag_reports_eof() {
        let mut tk = Tokenizer::new();
        tk.push_bytes(b"<a><unclosed");
        tk.next_event(true).unwrap();
        assert!(tk.next_event(true).is_err());
    }

    #[test]
    fn attribute_entities_decode() {
        let evs = all_events("<a k=\"x&lt;y\"/>");
        match &evs[0] {
            XmlEvent::StartTag { attrs, .. } => assert_eq!(attrs.get("k"), Some("x<y")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn whitespace_only_end_tag_padding() {
        let evs = all_events("<a></a >");
        assert_eq!(evs[1], XmlEvent::EndTag { name: "a".into() });
    }
}
