//! Repairing sub-parser: scans possibly malformed XML one byte at a
//! time through a pushdown state machine and emits a well-formed
//! approximation.
//!
//! Each state is a program counter over a small instruction set
//! (literal, skip, string, multiplex); calls between states go through
//! an explicit frame stack, never host recursion. Two buffering modes
//! coexist: a *peg* marking input echoed verbatim, and *sbuf* capturing
//! one token for post-validation. Repairs happen by editing sbuf or by
//! emitting fixups at the peg.

use crate::entities::{
    is_name_char, is_name_start_char, is_xml_digit, is_xml_whitespace, is_xml_xdigit,
};
use crate::error::XmlkitError;
use crate::path::XmlPath;
use crate::wrap::Wrap;
use crate::Result;

/// Parser states, drawn from the XML 1.0 (5th ed) grammar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
enum S {
    XmlStart,
    Literal,
    SkipChars,
    Multiplex,
    Text,
    QuotedText,
    RemExcl,
    Document,
    Chardata,
    MainLoop,
    PiOrXmlDecl,
    Pi,
    PiTarget,
    Space,
    OptSpace,
    Eq,
    STag,
    ETag,
    Name,
    NameStartChar,
    NameChar,
    Attribute,
    AttValue,
    SystemLiteral,
    PubidLiteral,
    Reference,
    CharRef,
    Digits,
    XDigits,
    PeReference,
    EntityValue,
    Meta,
    Meta1,
    Meta2,
    Comment,
    CdSect,
    XmlDecl,
    VersionInfo,
    EncodingDecl,
    SdDecl,
    DoctypeDecl,
    ExternalId,
    SystemId,
    PublicId1,
    PublicId2,
    IntSubset,
    ElementDeclOrEntityDecl,
    ElementDecl,
    EntityDecl,
    PeDecl,
    GeDecl,
    PeDef,
    EntityDef,
    AttlistDecl,
    AttDef,
    AttType,
    NotationType,
    Enumeration,
    Nmtoken,
    DefaultDecl,
    NotationDecl,
    ContentSpec,
    Mixed,
    Children,
    ChoiceOrSeq,
    Choice,
    Seq,
    Cp,
    XmlEnd,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    state: S,
    pos: u32,
}

#[derive(Debug, Clone, Default)]
struct StrSpec {
    delim: Option<&'static str>,
    expand: Option<&'static str>,
    bailout: Option<&'static str>,
}

pub struct Fixtags {
    frame: Frame,
    stack: Vec<Frame>,

    lit: String,
    lit_pos: usize,
    skip_accept: Option<&'static str>,
    skip_reject: Option<&'static str>,
    strspec: StrSpec,
    multi: Vec<(Option<&'static str>, S, u32)>,

    sbuf: String,
    pegged: bool,

    entities: Vec<String>,
    attributes: Vec<String>,
    xpath: XmlPath,
    wrap: Wrap,
    root_wrap: bool,
    finished: bool,

    out: Vec<u8>,
}

enum Act {
    /// Consume the current byte and stay in state.
    Consume,
    /// Re-dispatch the current byte under the (possibly new) state.
    Again,
    /// Terminal state: ignore all remaining input.
    Halt,
}

impl Fixtags {
    pub fn new(root_wrap: bool) -> Self {
        let mut ft = Fixtags {
            frame: Frame {
                state: S::XmlEnd,
                pos: 0,
            },
            stack: Vec::new(),
            lit: String::new(),
            lit_pos: 0,
            skip_accept: None,
            skip_reject: None,
            strspec: StrSpec::default(),
            multi: Vec::new(),
            sbuf: String::new(),
            pegged: false,
            entities: ["amp", "lt", "gt", "apos", "quot"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            attributes: Vec::new(),
            xpath: XmlPath::new(),
            wrap: Wrap::default(),
            root_wrap,
            finished: false,
            out: Vec::new(),
        };
        ft.call(S::XmlStart, 0);
        ft
    }

    pub fn take_output(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }

    // --- machine primitives -------------------------------------------

    fn call(&mut self, state: S, pos: u32) {
        self.stack.push(self.frame);
        self.frame = Frame { state, pos };
    }

    fn next(&mut self) {
        self.frame.pos += 1;
    }

    fn goto(&mut self, pos: u32) {
        self.frame.pos = pos;
    }

    fn done(&mut self) {
        self.frame = self.stack.pop().unwrap_or(Frame {
            state: S::XmlEnd,
            pos: 0,
        });
    }

    fn literal(&mut self, s: &str) {
        self.lit = s.to_string();
        self.lit_pos = 0;
        self.call(S::Literal, 0);
    }

    fn skip_until(&mut self, accept: Option<&'static str>, reject: Option<&'static str>) {
        self.skip_accept = accept;
        self.skip_reject = reject;
        self.call(S::SkipChars, 0);
    }

    fn quoted(&mut self, expand: Option<&'static str>) {
        self.strspec.expand = expand;
        self.call(S::QuotedText, 0);
    }

    fn multiplex(&mut self, dests: &[(Option<&'static str>, S, u32)]) {
        self.multi = dests.to_vec();
        self.next();
        self.call(S::Multiplex, 0);
    }

    fn test(&mut self, accept: &str, c: u8, apos: u32, rpos: u32) {
        self.frame.pos = if accept.as_bytes().contains(&c) {
            apos
        } else {
            rpos
        };
    }

    fn test_literal(&mut self, lit: &'static str, c: u8, apos: u32, rpos: u32) {
        if lit.as_bytes()[0] == c {
            self.frame.pos = apos;
            self.literal(lit);
        } else {
            self.frame.pos = rpos;
        }
    }

    fn test_call(&mut self, accept: &str, c: u8, state: S) {
        self.next();
        if accept.as_bytes().contains(&c) {
            self.call(state, 0);
        }
    }

    /// Flush pegged input, then append `s`. While buffering, `s` goes
    /// into sbuf instead.
    fn emit(&mut self, buf: &[u8], peg: &mut usize, begin: usize, s: Option<&str>) {
        if self.pegged {
            if *peg < begin {
                self.out.extend_from_slice(&buf[*peg..begin]);
                *peg = begin;
            }
            if let Some(s) = s {
                self.out.extend_from_slice(s.as_bytes());
            }
        } else if let Some(s) = s {
            self.sbuf.push_str(s);
        }
    }

    fn enable_buffering(&mut self, buf: &[u8], peg: &mut usize, begin: usize, enable: bool) {
        if self.pegged && enable {
            self.emit(buf, peg, begin, None);
            self.pegged = false;
            self.sbuf.clear();
        } else if !self.pegged && !enable {
            self.pegged = true;
            *peg = begin;
            let sbuf = std::mem::take(&mut self.sbuf);
            self.emit(buf, peg, begin, Some(&sbuf));
        }
    }

    // --- repairs -------------------------------------------------------

    fn declare_entity(&mut self) {
        let name = self.sbuf.clone();
        if !self.entities.contains(&name) {
            self.entities.push(name);
        }
    }

    /// Rewrite an undeclared `&name;` to `&amp;name;` (WFC: Entity
    /// Declared). sbuf holds the whole reference.
    fn verify_entity(&mut self) {
        let s = self.sbuf.as_bytes();
        if s.first() == Some(&b'&') && s.get(1) != Some(&b'#') {
            let name = self.sbuf[1..self.sbuf.len() - 1].to_string();
            if !self.entities.contains(&name) {
                self.sbuf = format!("&amp;{name};");
            }
        }
    }

    fn verify_per(&mut self) {
        // parameter entities pass through unchecked
    }

    /// Duplicate attribute names get a numeric suffix until unique
    /// (WFC: Unique Att Spec).
    fn verify_attribute(&mut self) {
        if self.attributes.contains(&self.sbuf) {
            let base = self.sbuf.clone();
            let mut n: u32 = 1;
            while self.attributes.contains(&format!("{base}{n}")) {
                n += 1;
            }
            self.sbuf = format!("{base}{n}");
        }
        self.attributes.push(self.sbuf.clone());
    }

    fn enter_stag(&mut self) {
        let name = self.sbuf.clone();
        self.xpath.push_tag(&name);
        self.attributes.clear();
    }

    /// Repair a close tag (WFC: Element Type Match). sbuf holds
    /// `/name`. If the name is open somewhere on the path, intermediate
    /// tags are auto-closed; otherwise the tag becomes self-closing.
    /// Emitted spellings always come from the path, so open and close
    /// tags agree even when the input played with case.
    fn close_etag(&mut self) {
        let name = self.sbuf[1..].to_string();
        if name.is_empty() {
            return;
        }
        let open: Vec<String> = self
            .xpath
            .segments()
            .map(|(_, s)| s.to_string())
            .collect();
        let matched = open
            .iter()
            .rposition(|t| t.eq_ignore_ascii_case(&name));
        match matched {
            Some(idx) => {
                // the surrounding literals supply the first '<' and the
                // final '>', so the joined form is "/t0></t1>...</tj"
                let mut repl = String::new();
                for (i, tag) in open[idx..].iter().rev().enumerate() {
                    if i == 0 {
                        repl.push('/');
                    } else {
                        repl.push_str("></");
                    }
                    repl.push_str(tag);
                    self.xpath.pop();
                }
                self.sbuf = repl;
            }
            None => {
                // unknown close tag: emit <name/>
                self.sbuf = format!("{name}/");
            }
        }
    }

    fn error(&mut self, buf: &mut [u8], peg: &mut usize, begin: usize, e: Repair) -> Result<()> {
        match e {
            Repair::Unrecoverable => return Err(XmlkitError::Unrecoverable),
            Repair::MissingRoot => {
                let already = self
                    .xpath
                    .segments()
                    .next()
                    .map(|(_, s)| s == self.wrap.root_tag())
                    .unwrap_or(false);
                if !already {
                    let head = format!("{}{}", self.wrap.headwrap(), self.wrap.open_root());
                    self.emit(buf, peg, begin, Some(&head));
                    let root = self.wrap.root_tag().to_string();
                    self.xpath.push_tag(&root);
                }
            }
            Repair::MalformedTag => {
                // the '<' in sbuf becomes a literal
                self.sbuf = self.sbuf.replacen('<', "&lt;", 1);
            }
            Repair::MissingEq => {
                self.emit(buf, peg, begin, Some("="));
                self.done();
            }
            Repair::UnexpectedLiteral => {}
            Repair::UnexpectedName => {
                if matches!(buf[begin], b'\'' | b'"' | b'<' | b'>') {
                    self.done();
                    self.done();
                } else {
                    buf[begin] = b'_';
                }
            }
        }
        Ok(())
    }

    // --- driver --------------------------------------------------------

    /// Push one chunk of input through the machine.
    pub fn filter(&mut self, input: &[u8]) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let mut buf = input.to_vec();
        let mut begin = 0usize;
        let mut peg = 0usize;

        while begin < buf.len() {
            match self.dispatch(&mut buf, &mut peg, begin)? {
                Act::Consume => {
                    if !self.pegged {
                        self.sbuf.push(buf[begin] as char);
                    }
                    begin += 1;
                }
                Act::Again => {}
                Act::Halt => {
                    self.finished = true;
                    break;
                }
            }
        }
        // flush whatever was pegged; it is verbatim output
        self.emit(&buf, &mut peg, begin, None);
        Ok(())
    }

    /// End of input: close all still-open tags in reverse order.
    pub fn finish(&mut self) -> Result<()> {
        while let Some(last) = self.xpath.last() {
            if last.is_empty() {
                break;
            }
            let name = last.to_string();
            self.out.extend_from_slice(b"</");
            self.out.extend_from_slice(name.as_bytes());
            self.out.extend_from_slice(b">\n");
            self.xpath.pop();
        }
        Ok(())
    }

    #[allow(clippy::too_many_lines)]
    fn dispatch(&mut self, buf: &mut Vec<u8>, peg: &mut usize, begin: usize) -> Result<Act> {
        let c = buf[begin];
        let pos = self.frame.pos;
        macro_rules! lit {
            ($s:expr) => {{
                self.next();
                self.literal($s);
                return Ok(Act::Again);
            }};
        }
        macro_rules! call {
            ($f:expr) => {{
                self.next();
                self.call($f, 0);
                return Ok(Act::Again);
            }};
        }
        macro_rules! ret {
            () => {{
                self.done();
                return Ok(Act::Again);
            }};
        }
        macro_rules! goto {
            ($n:expr) => {{
                self.goto($n);
                return Ok(Act::Again);
            }};
        }
        macro_rules! iff {
            ($s:expr, $t:expr, $f:expr) => {{
                self.test($s, c, $t, $f);
                return Ok(Act::Again);
            }};
        }
        macro_rules! if_lit {
            ($s:expr, $t:expr, $f:expr) => {{
                self.test_literal($s, c, $t, $f);
                return Ok(Act::Again);
            }};
        }
        macro_rules! if_call {
            ($s:expr, $f:expr) => {{
                self.test_call($s, c, $f);
                return Ok(Act::Again);
            }};
        }
        macro_rules! switch {
            ($($a:expr, $f:expr, $p:expr);+) => {{
                self.multiplex(&[$(($a, $f, $p)),+]);
                return Ok(Act::Again);
            }};
        }
        macro_rules! wait_for {
            ($s:expr) => {{
                self.next();
                self.skip_until(None, Some($s));
                return Ok(Act::Again);
            }};
        }
        macro_rules! save {
            () => {{
                self.next();
                self.enable_buffering(buf, peg, begin, true);
                return Ok(Act::Again);
            }};
        }
        macro_rules! restore {
            () => {{
                self.next();
                self.enable_buffering(buf, peg, begin, false);
                return Ok(Act::Again);
            }};
        }

        match self.frame.state {
            S::XmlStart => {
                self.enable_buffering(buf, peg, begin, false);
                if self.root_wrap {
                    self.error(buf, peg, begin, Repair::MissingRoot)?;
                    call!(S::MainLoop);
                } else {
                    call!(S::Document);
                }
            }

            S::Literal => {
                let lb = self.lit.as_bytes();
                if self.lit_pos < lb.len() {
                    if lb[self.lit_pos] == c {
                        self.lit_pos += 1;
                        Ok(Act::Consume)
                    } else {
                        // unexpected or incomplete: emit the rest of the
                        // literal so the syntactic sugar stays correct
                        if self.lit_pos == 0 {
                            self.error(buf, peg, begin, Repair::UnexpectedLiteral)?;
                        }
                        let rest = self.lit[self.lit_pos..].to_string();
                        self.emit(buf, peg, begin, Some(&rest));
                        self.lit.clear();
                        ret!()
                    }
                } else {
                    self.lit.clear();
                    ret!()
                }
            }

            S::SkipChars => {
                let rejected = self
                    .skip_reject
                    .map(|r| r.as_bytes().contains(&c))
                    .unwrap_or(false);
                let not_accepted = self
                    .skip_accept
                    .map(|a| !a.as_bytes().contains(&c))
                    .unwrap_or(false);
                if rejected || not_accepted {
                    ret!()
                }
                Ok(Act::Consume)
            }

            S::Text => {
                if let Some(d) = self.strspec.delim {
                    if d.as_bytes().first() == Some(&c) {
                        ret!()
                    }
                }
                let expand = self.strspec.expand.unwrap_or("");
                if c == b'&' && expand.contains('&') {
                    self.call(S::Reference, 0);
                    return Ok(Act::Again);
                }
                if c == b'%' && expand.contains('%') {
                    self.call(S::PeReference, 0);
                    return Ok(Act::Again);
                }
                if let Some(bail) = self.strspec.bailout {
                    if bail.as_bytes().contains(&c) {
                        ret!()
                    }
                }
                if expand.as_bytes().contains(&c) {
                    let coded = match c {
                        b'&' => "&amp",
                        b'>' => "&gt",
                        b'\'' => "&apos",
                        b'"' => "&quot",
                        b'<' => "&lt",
                        _ => "",
                    };
                    self.emit(buf, peg, begin, Some(coded));
                    buf[begin] = b';';
                    return Ok(Act::Again);
                }
                Ok(Act::Consume)
            }

            S::QuotedText => match pos {
                0 => {
                    match c {
                        b'"' => {
                            self.strspec.delim = Some("\"");
                            self.strspec.bailout = None;
                        }
                        b'\'' => {
                            self.strspec.delim = Some("'");
                            self.strspec.bailout = None;
                        }
                        _ => {
                            self.strspec.delim = Some("\"");
                            self.strspec.bailout = Some(" \t\r\n>'\"");
                        }
                    }
                    self.next();
                    let delim = self.strspec.delim.unwrap();
                    self.literal(delim);
                    Ok(Act::Again)
                }
                1 => call!(S::Text),
                2 => {
                    self.next();
                    let delim = self.strspec.delim.unwrap();
                    self.literal(delim);
                    Ok(Act::Again)
                }
                _ => ret!(),
            },

            S::RemExcl => match pos {
                // wraps an unknown <!xyz> tag in a comment
                0 => lit!("-- "),
                1 => wait_for!(">"),
                2 => lit!(" --"),
                3 => lit!(">"),
                _ => ret!(),
            },

            S::Multiplex => match pos {
                0 => {
                    let hit = self
                        .multi
                        .iter()
                        .find(|(accept, _, _)| {
                            accept.map(|a| a.as_bytes().contains(&c)).unwrap_or(true)
                        })
                        .copied();
                    match hit {
                        Some((_, state, p)) => {
                            self.next();
                            self.call(state, p);
                            Ok(Act::Again)
                        }
                        None => Err(XmlkitError::Unrecoverable),
                    }
                }
                _ => ret!(),
            },

            S::Document => match pos {
                0 => {
                    if is_xml_whitespace(c) || c == b'<' {
                        if_lit!("<", 1, 4)
                    }
                    // chardata before any root tag: open a synthetic one
                    goto!(3)
                }
                1 => switch!(Some("?"), S::PiOrXmlDecl, 1;
                             Some("!"), S::Meta, 1;
                             Some("/"), S::ETag, 1;
                             None, S::STag, 1),
                2 => goto!(4),
                3 => {
                    self.error(buf, peg, begin, Repair::MissingRoot)?;
                    call!(S::Chardata)
                }
                4 => call!(S::MainLoop),
                _ => ret!(),
            },

            S::Chardata => match pos {
                0 => {
                    self.strspec.delim = None;
                    self.strspec.expand = Some("&");
                    self.strspec.bailout = Some("<");
                    call!(S::Text)
                }
                _ => ret!(),
            },

            S::MainLoop => match pos {
                0 => iff!("<", 1, 8),
                1 => save!(),
                2 => lit!("<"),
                3 => iff!("<>&'\" \t\r\n0123456789", 4, 6),
                4 => {
                    self.error(buf, peg, begin, Repair::MalformedTag)?;
                    restore!()
                }
                5 => goto!(9),
                6 => restore!(),
                7 => switch!(Some("?"), S::Pi, 1;
                             Some("!"), S::Meta1, 1;
                             Some("/"), S::ETag, 1;
                             None, S::STag, 1),
                8 => {
                    // scan text, then come back through the '<' branch
                    self.goto(1);
                    self.call(S::Chardata, 0);
                    Ok(Act::Again)
                }
                9 => call!(S::Chardata),
                10 => goto!(0),
                _ => ret!(),
            },

            S::PiOrXmlDecl => match pos {
                0 => lit!("<"),
                1 => lit!("?"),
                2 => switch!(Some("x"), S::XmlDecl, 1;
                             None, S::Pi, 1),
                _ => ret!(),
            },

            S::Pi => match pos {
                0 => lit!("<"),
                1 => lit!("?"),
                2 => call!(S::PiTarget),
                3 => call!(S::OptSpace),
                4 => wait_for!(">?"),
                5 => lit!("?"),
                6 => if_lit!(">", 7, 4),
                _ => ret!(),
            },

            S::PiTarget => match pos {
                // a target spelling "xml" is reserved; its last letter
                // becomes '_' so later tokenizers see a plain PI
                0 => iff!("xX", 1, 8),
                1 => {
                    self.next();
                    Ok(Act::Consume)
                }
                2 => iff!("mM", 3, 6),
                3 => {
                    self.next();
                    Ok(Act::Consume)
                }
                4 => iff!("lL", 5, 6),
                5 => {
                    self.next();
                    buf[begin] = b'_';
                    Ok(Act::Again)
                }
                6 => {
                    self.next();
                    self.call(S::Name, 1);
                    Ok(Act::Again)
                }
                7 => ret!(),
                8 => call!(S::Name),
                _ => ret!(),
            },

            S::Space => {
                // a mandatory space; fabricate one if missing
                if !is_xml_whitespace(c) {
                    self.emit(buf, peg, begin, Some(" "));
                    ret!()
                }
                self.frame.state = S::OptSpace;
                Ok(Act::Consume)
            }

            S::OptSpace => {
                if !is_xml_whitespace(c) {
                    ret!()
                }
                Ok(Act::Consume)
            }

            S::Eq => match pos {
                0 => call!(S::OptSpace),
                1 => if_lit!("=", 3, 2),
                2 => {
                    self.next();
                    self.error(buf, peg, begin, Repair::MissingEq)?;
                    Ok(Act::Again)
                }
                3 => call!(S::OptSpace),
                _ => ret!(),
            },

            S::STag => match pos {
                0 => lit!("<"),
                1 => save!(),
                2 => call!(S::Name),
                3 => {
                    self.enter_stag();
                    restore!()
                }
                4 => call!(S::OptSpace),
                5 => iff!(">/", 8, 6),
                6 => call!(S::Attribute),
                7 => goto!(4),
                8 => if_lit!("/", 9, 10),
                9 => {
                    self.xpath.pop();
                    self.next();
                    Ok(Act::Again)
                }
                10 => lit!(">"),
                _ => ret!(),
            },

            S::Name => match pos {
                0 => call!(S::NameStartChar),
                1 => call!(S::NameChar),
                _ => ret!(),
            },

            S::NameStartChar => {
                if !is_name_start_char(c) {
                    self.error(buf, peg, begin, Repair::UnexpectedName)?;
                    return Ok(Act::Again);
                }
                self.done();
                Ok(Act::Consume)
            }

            S::NameChar => {
                if !is_name_char(c) {
                    ret!()
                }
                Ok(Act::Consume)
            }

            S::Attribute => match pos {
                0 => save!(),
                1 => call!(S::Name),
                2 => {
                    self.verify_attribute();
                    restore!()
                }
                3 => call!(S::Eq),
                4 => call!(S::AttValue),
                _ => ret!(),
            },

            S::AttValue => match pos {
                // WFC: No < in Attribute Values
                0 => {
                    self.next();
                    self.quoted(Some("&<>'\""));
                    Ok(Act::Again)
                }
                _ => ret!(),
            },

            S::SystemLiteral | S::PubidLiteral => match pos {
                0 => {
                    self.next();
                    self.quoted(None);
                    Ok(Act::Again)
                }
                _ => ret!(),
            },

            S::ETag => match pos {
                // WFC: Element Type Match
                0 => lit!("<"),
                1 => save!(),
                2 => lit!("/"),
                3 => call!(S::Name),
                4 => {
                    self.close_etag();
                    restore!()
                }
                5 => call!(S::OptSpace),
                6 => lit!(">"),
                _ => {
                    if self.xpath.is_empty() {
                        self.call(S::XmlEnd, 0);
                        Ok(Act::Again)
                    } else {
                        ret!()
                    }
                }
            },

            S::Reference => match pos {
                // WFC: Entity Declared
                0 => save!(),
                1 => lit!("&"),
                2 => iff!("#", 3, 5),
                3 => call!(S::CharRef),
                4 => goto!(6),
                5 => call!(S::Name),
                6 => lit!(";"),
                7 => {
                    self.verify_entity();
                    restore!()
                }
                _ => ret!(),
            },

            S::CharRef => match pos {
                0 => lit!("#"),
                1 => {
                    if c == b'X' {
                        buf[begin] = b'x';
                    }
                    if_lit!("x", 2, 4)
                }
                2 => call!(S::XDigits),
                3 => goto!(5),
                4 => call!(S::Digits),
                5 => lit!(";"),
                _ => ret!(),
            },

            S::Digits => {
                if !is_xml_digit(c) {
                    ret!()
                }
                Ok(Act::Consume)
            }

            S::XDigits => {
                if !is_xml_xdigit(c) {
                    ret!()
                }
                Ok(Act::Consume)
            }

            S::PeReference => match pos {
                0 => save!(),
                1 => lit!("%"),
                2 => call!(S::Name),
                3 => lit!(";"),
                4 => {
                    self.verify_per();
                    restore!()
                }
                _ => ret!(),
            },

            S::EntityValue => match pos {
                0 => {
                    self.next();
                    self.quoted(Some("&%"));
                    Ok(Act::Again)
                }
                _ => ret!(),
            },

            S::Meta => match pos {
                // in the prolog
                0 => lit!("<"),
                1 => lit!("!"),
                2 => switch!(Some("-"), S::Comment, 1;
                             Some("["), S::CdSect, 1;
                             Some("D"), S::DoctypeDecl, 1),
                _ => ret!(),
            },

            S::Meta1 => match pos {
                // in element content
                0 => lit!("<"),
                1 => lit!("!"),
                2 => switch!(Some("-"), S::Comment, 1;
                             Some("["), S::CdSect, 1;
                             None, S::RemExcl, 0),
                _ => ret!(),
            },

            S::Meta2 => match pos {
                // in the internal subset
                0 => lit!("<"),
                1 => lit!("!"),
                2 => switch!(Some("-"), S::Comment, 1;
                             Some("E"), S::ElementDeclOrEntityDecl, 1;
                             Some("A"), S::AttlistDecl, 1;
                             Some("N"), S::NotationDecl, 1),
                _ => ret!(),
            },

            S::Comment => match pos {
                0 => lit!("<!"),
                1 => lit!("--"),
                2 => wait_for!("-"),
                3 => lit!("-"),
                4 => if_lit!("->", 5, 2),
                _ => ret!(),
            },

            S::CdSect => match pos {
                0 => lit!("<!"),
                1 => lit!("[CDATA["),
                2 => wait_for!("]"),
                3 => lit!("]"),
                4 => if_lit!("]", 5, 2),
                5 => if_lit!(">", 6, 2),
                6 => lit!(">"),
                _ => ret!(),
            },

            S::XmlDecl => match pos {
                0 => lit!("<?"),
                1 => lit!("xml"),
                2 => call!(S::VersionInfo),
                3 => iff!("?", 8, 4),
                4 => call!(S::OptSpace),
                5 => if_call!("e", S::EncodingDecl),
                6 => if_call!("s", S::SdDecl),
                7 => call!(S::OptSpace),
                8 => lit!("?>"),
                _ => ret!(),
            },

            S::VersionInfo => match pos {
                0 => call!(S::Space),
                1 => lit!("version"),
                2 => call!(S::Eq),
                3 => lit!("\"1.0\""),
                _ => ret!(),
            },

            S::EncodingDecl => match pos {
                0 => lit!("encoding"),
                1 => call!(S::Eq),
                2 => call!(S::AttValue),
                _ => ret!(),
            },

            S::SdDecl => match pos {
                0 => lit!("standalone"),
                1 => call!(S::Eq),
                2 => call!(S::AttValue),
                _ => ret!(),
            },

            S::DoctypeDecl => match pos {
                0 => lit!("<!"),
                1 => lit!("DOCTYPE"),
                2 => call!(S::Space),
                3 => call!(S::Name),
                4 => call!(S::OptSpace),
                5 => if_call!("SP", S::ExternalId),
                6 => call!(S::OptSpace),
                7 => if_call!("[", S::IntSubset),
                8 => lit!(">"),
                _ => ret!(),
            },

            S::ExternalId => match pos {
                0 => switch!(Some("S"), S::SystemId, 0;
                             Some("P"), S::PublicId1, 0),
                _ => ret!(),
            },

            S::SystemId => match pos {
                0 => lit!("SYSTEM"),
                1 => call!(S::Space),
                2 => call!(S::SystemLiteral),
                _ => ret!(),
            },

            S::PublicId1 => match pos {
                0 => lit!("PUBLIC"),
                1 => call!(S::Space),
                2 => call!(S::PubidLiteral),
                3 => call!(S::Space),
                4 => call!(S::SystemLiteral),
                _ => ret!(),
            },

            S::PublicId2 => match pos {
                0 => lit!("PUBLIC"),
                1 => call!(S::Space),
                2 => call!(S::PubidLiteral),
                3 => call!(S::OptSpace),
                4 => if_call!("\"'", S::SystemLiteral),
                _ => ret!(),
            },

            S::IntSubset => match pos {
                0 => lit!("["),
                1 => call!(S::OptSpace),
                2 => if_lit!("<", 3, 5),
                3 => switch!(Some("!"), S::Meta2, 1;
                             Some("?"), S::Pi, 1;
                             Some("%"), S::PeReference, 1),
                4 => goto!(1),
                5 => lit!("]"),
                6 => call!(S::OptSpace),
                _ => ret!(),
            },

            S::ElementDeclOrEntityDecl => match pos {
                0 => lit!("<!"),
                1 => lit!("E"),
                2 => switch!(Some("L"), S::ElementDecl, 1;
                             Some("N"), S::EntityDecl, 1),
                _ => ret!(),
            },

            S::ElementDecl => match pos {
                0 => lit!("<!E"),
                1 => lit!("LEMENT"),
                2 => call!(S::Space),
                3 => call!(S::Name),
                4 => call!(S::Space),
                5 => call!(S::ContentSpec),
                6 => call!(S::OptSpace),
                7 => lit!(">"),
                _ => ret!(),
            },

            S::EntityDecl => match pos {
                0 => lit!("<!E"),
                1 => lit!("NTITY"),
                2 => call!(S::Space),
                3 => switch!(Some("%"), S::PeDecl, 0;
                             None, S::GeDecl, 0),
                4 => call!(S::OptSpace),
                5 => lit!(">"),
                _ => ret!(),
            },

            S::PeDecl => match pos {
                0 => lit!("%"),
                1 => call!(S::Space),
                2 => save!(),
                3 => call!(S::Name),
                4 => {
                    self.verify_per();
                    restore!()
                }
                5 => call!(S::Space),
                6 => call!(S::PeDef),
                _ => ret!(),
            },

            S::PeDef => match pos {
                0 => iff!("SP", 1, 3),
                1 => call!(S::ExternalId),
                2 => ret!(),
                3 => call!(S::EntityValue),
                _ => ret!(),
            },

            S::GeDecl => match pos {
                0 => save!(),
                1 => call!(S::Name),
                2 => {
                    self.declare_entity();
                    restore!()
                }
                3 => call!(S::Space),
                4 => call!(S::EntityDef),
                _ => ret!(),
            },

            S::EntityDef => match pos {
                0 => iff!("SP", 1, 7),
                1 => call!(S::ExternalId),
                2 => call!(S::OptSpace),
                3 => if_lit!("NDATA", 4, 6),
                4 => call!(S::Space),
                5 => call!(S::Name),
                6 => ret!(),
                7 => call!(S::EntityValue),
                _ => ret!(),
            },

            S::AttlistDecl => match pos {
                0 => lit!("<!"),
                1 => lit!("ATTLIST"),
                2 => call!(S::Space),
                3 => call!(S::Name),
                4 => iff!(">", 9, 5),
                5 => call!(S::Space),
                6 => iff!(">", 9, 7),
                7 => call!(S::AttDef),
                8 => goto!(4),
                9 => lit!(">"),
                _ => ret!(),
            },

            S::AttDef => match pos {
                0 => call!(S::Name),
                1 => call!(S::Space),
                2 => call!(S::AttType),
                3 => call!(S::Space),
                4 => call!(S::DefaultDecl),
                _ => ret!(),
            },

            S::AttType => match pos {
                0 => if_lit!("CDATA", 1, 2),
                1 => ret!(),
                2 => if_lit!("ID", 3, 6),
                3 => if_lit!("REF", 4, 5),
                4 => if_lit!("S", 5, 5),
                5 => ret!(),
                6 => if_lit!("ENTIT", 7, 10),
                7 => if_lit!("IES", 9, 8),
                8 => lit!("Y"),
                9 => ret!(),
                10 => if_lit!("NMTOKEN", 11, 13),
                11 => if_lit!("S", 12, 12),
                12 => ret!(),
                13 => switch!(Some("N"), S::NotationType, 0;
                              None, S::Enumeration, 0),
                _ => ret!(),
            },

            S::NotationType => match pos {
                0 => lit!("NOTATION"),
                1 => call!(S::Space),
                2 => lit!("("),
                3 => call!(S::OptSpace),
                4 => call!(S::Name),
                5 => call!(S::OptSpace),
                6 => if_lit!("|", 7, 10),
                7 => call!(S::OptSpace),
                8 => call!(S::Name),
                9 => goto!(5),
                10 => lit!(")"),
                _ => ret!(),
            },

            S::Enumeration => match pos {
                0 => lit!("("),
                1 => call!(S::OptSpace),
                2 => call!(S::Nmtoken),
                3 => call!(S::OptSpace),
                4 => if_lit!("|", 5, 8),
                5 => call!(S::OptSpace),
                6 => call!(S::Nmtoken),
                7 => goto!(3),
                8 => lit!(")"),
                _ => ret!(),
            },

            S::Nmtoken => match pos {
                0 => {
                    if is_name_char(c) {
                        self.next();
                        Ok(Act::Consume)
                    } else {
                        Err(XmlkitError::Unrecoverable)
                    }
                }
                _ => {
                    if !is_name_char(c) {
                        ret!()
                    }
                    Ok(Act::Consume)
                }
            },

            S::DefaultDecl => match pos {
                0 => if_lit!("#", 1, 5),
                1 => if_lit!("REQUIRED", 6, 2),
                2 => if_lit!("IMPLIED", 6, 3),
                3 => lit!("FIXED"),
                4 => call!(S::Space),
                5 => call!(S::AttValue),
                _ => ret!(),
            },

            S::NotationDecl => match pos {
                0 => lit!("NOTATION"),
                1 => call!(S::Space),
                2 => call!(S::Name),
                3 => call!(S::Space),
                4 => switch!(Some("S"), S::SystemId, 0;
                             Some("P"), S::PublicId2, 0),
                5 => call!(S::OptSpace),
                6 => lit!(">"),
                _ => ret!(),
            },

            S::ContentSpec => match pos {
                0 => if_lit!("EMPTY", 5, 1),
                1 => if_lit!("ANY", 5, 2),
                2 => lit!("("),
                3 => call!(S::OptSpace),
                4 => switch!(Some("#"), S::Mixed, 1;
                             None, S::Children, 0),
                _ => ret!(),
            },

            S::Mixed => match pos {
                0 => lit!("("),
                1 => call!(S::OptSpace),
                2 => lit!("#PCDATA"),
                3 => call!(S::OptSpace),
                4 => if_lit!(")", 11, 5),
                5 => if_lit!("|", 6, 10),
                6 => call!(S::OptSpace),
                7 => call!(S::Name),
                8 => call!(S::OptSpace),
                9 => goto!(5),
                10 => lit!(")*"),
                _ => ret!(),
            },

            S::Children => match pos {
                0 => {
                    self.next();
                    self.call(S::ChoiceOrSeq, 2);
                    Ok(Act::Again)
                }
                1 => if_lit!("?", 4, 2),
                2 => if_lit!("*", 4, 3),
                3 => if_lit!("+", 4, 4),
                _ => ret!(),
            },

            S::ChoiceOrSeq => match pos {
                0 => lit!("("),
                1 => call!(S::OptSpace),
                2 => call!(S::Cp),
                3 => call!(S::OptSpace),
                4 => if_lit!(")", 6, 5),
                5 => switch!(Some(","), S::Seq, 4;
                             None, S::Choice, 4),
                _ => ret!(),
            },

            S::Cp => match pos {
                0 => switch!(Some("("), S::ChoiceOrSeq, 0;
                             None, S::Name, 0),
                1 => if_lit!("?", 4, 2),
                2 => if_lit!("*", 4, 3),
                3 => if_lit!("+", 4, 4),
                _ => ret!(),
            },

            S::Seq => match pos {
                0 => lit!("("),
                1 => call!(S::OptSpace),
                2 => call!(S::Cp),
                3 => call!(S::OptSpace),
                4 => if_lit!(",", 5, 8),
                5 => call!(S::OptSpace),
                6 => call!(S::Cp),
                7 => goto!(3),
                8 => lit!(")"),
                _ => ret!(),
            },

            S::Choice => match pos {
                0 => lit!("("),
                1 => call!(S::OptSpace),
                2 => call!(S::Cp),
                3 => call!(S::OptSpace),
                4 => if_lit!("|", 5, 9),
                5 => call!(S::OptSpace),
                6 => call!(S::Cp),
                7 => call!(S::OptSpace),
                8 => goto!(4),
                9 => lit!(")"),
                _ => ret!(),
            },

            S::XmlEnd => {
                self.emit(buf, peg, begin, None);
                Ok(Act::Halt)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Repair {
    Unrecoverable,
    MissingRoot,
    MissingEq,
    MalformedTag,
    UnexpectedLiteral,
    UnexpectedName,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fix(input: &str) -> String {
        fix_wrap(input, false)
    }

    fn fix_wrap(input: &str, wrap: bool) -> String {
        let mut ft = Fixtags::new(wrap);
        ft.filter(input.as_bytes()).unwrap();
        ft.finish().unwrap();
        String::from_utf8(ft.take_output()).unwrap()
    }

    #[test]
    fn well_formed_input_is_byte_identical() {
        for doc in [
            "<a><b>x</b></a>",
            "<a k=\"v\">text &amp; more</a>",
            "<a><!-- note --><b/></a>",
            "<?xml version=\"1.0\"?>\n<a>x</a>",
        ] {
            assert_eq!(fix(doc), doc);
        }
    }

    #[test]
    fn unclosed_tags_are_closed_at_eof() {
        assert_eq!(fix("<p>Hello <b>world"), "<p>Hello <b>world</b>\n</p>\n");
    }

    #[test]
    fn root_wrap_adds_envelope() {
        let out = fix_wrap("<p>Hello <b>world", true);
        assert!(out.starts_with("<?xml version=\"1.0\"?>\n<root>"));
        assert!(out.contains("<p>Hello <b>world"));
        assert!(out.contains("</b>"));
        assert!(out.contains("</p>"));
        assert!(out.trim_end().ends_with("</root>"));
    }

    #[test]
    fn mismatched_close_auto_closes_intermediates() {
        assert_eq!(fix("<a><b>x</a>"), "<a><b>x</b></a>");
    }

    #[test]
    fn unknown_close_becomes_self_closing() {
        assert_eq!(fix("<a>x</q></a>"), "<a>x<q/></a>");
    }

    #[test]
    fn unknown_entity_is_escaped() {
        assert_eq!(fix("<a>&foo;</a>"), "<a>&amp;foo;</a>");
    }

    #[test]
    fn declared_entity_is_kept() {
        let doc = "<!DOCTYPE a [<!ENTITY foo \"1\">]><a>&foo;</a>";
        assert_eq!(fix(doc), doc);
    }

    #[test]
    fn malformed_langle_becomes_entity() {
        assert_eq!(fix("<a>4 < 5</a>"), "<a>4 &lt; 5</a>");
    }

    #[test]
    fn duplicate_attributes_get_suffix() {
        assert_eq!(fix("<a k=\"1\" k=\"2\"/>"), "<a k=\"1\" k1=\"2\"/>");
    }

    #[test]
    fn unquoted_attribute_value_gets_quotes() {
        assert_eq!(fix("<a k=v>x</a>"), "<a k=\"v\">x</a>");
    }

    #[test]
    fn missing_eq_is_inserted() {
        assert_eq!(fix("<a k\"v\">x</a>"), "<a k=\"v\">x</a>");
    }

    #[test]
    fn unknown_bang_tag_is_commented() {
        assert_eq!(fix("<a><!xyz></a>"), "<a><!-- xyz --></a>");
    }

    #[test]
    fn midstream_xml_decl_is_neutralized() {
        assert_eq!(fix("<a><?xml foo?></a>"), "<a><?xm_ foo?></a>");
    }

    #[test]
    fn naked_ampersand_in_attvalue() {
        // the reference scanner supplies the missing ';' before the
        // entity check runs
        assert_eq!(fix("<a k=\"x&y\"/>"), "<a k=\"x&amp;y;\"/>");
    }

    #[test]
    fn case_insensitive_close_uses_open_spelling() {
        assert_eq!(fix("<DIV>x</div>"), "<DIV>x</DIV>");
    }
}
