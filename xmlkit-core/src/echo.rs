//! Echo formatter: parses strings of interleaved bracketed path
//! fragments and chardata, emitting tags lazily. The inverse of the
//! unecho formatter.

use bitflags::bitflags;

use crate::entities::push_coded_entities;
use crate::error::XmlkitError;
use crate::escape::{convert_backslash, skip_unescaped_delimiters, ESC};
use crate::path::{SegmentKind, XmlPath};
use crate::wrap::Wrap;
use crate::Result;

/// Indent every depth.
pub const INDENT_ALL: usize = usize::MAX;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    struct EchoState: u8 {
        const CDATA = 1 << 0;
        const COMMENT = 1 << 1;
        const SUPPRESS_NL = 1 << 2;
    }
}

pub struct Echo {
    out: Vec<u8>,
    xpath: XmlPath,
    root: Option<String>,
    wrap: Wrap,
    depth: usize,
    indentdepth: usize,
    state: EchoState,
}

impl Echo {
    pub fn new(indentdepth: usize) -> Self {
        Echo {
            out: Vec::new(),
            xpath: XmlPath::new(),
            root: None,
            wrap: Wrap::default(),
            depth: 0,
            indentdepth,
            state: EchoState::empty(),
        }
    }

    pub fn with_wrap(mut self, wrap: Wrap) -> Self {
        self.wrap = wrap;
        self
    }

    /// Formatted output accumulated so far.
    pub fn output(&self) -> &[u8] {
        &self.out
    }

    pub fn into_output(self) -> Vec<u8> {
        self.out
    }

    fn puts_raw(&mut self, s: &str) {
        self.out.extend_from_slice(s.as_bytes());
    }

    fn putc(&mut self, c: u8) {
        self.out.push(c);
    }

    /// `\b` in the input drops the previously emitted byte.
    fn backspace(&mut self) {
        self.out.pop();
    }

    fn write_indent(&mut self) {
        if self.indentdepth > self.depth {
            if !self.state.contains(EchoState::SUPPRESS_NL) {
                self.putc(b'\n');
            }
            self.state.remove(EchoState::SUPPRESS_NL);
            for _ in 0..self.depth {
                self.putc(b'\t');
            }
        }
    }

    fn open_cdata(&mut self) {
        if !self.state.contains(EchoState::CDATA) {
            self.state.insert(EchoState::CDATA);
            self.puts_raw("<![CDATA[");
        }
    }

    fn close_cdata(&mut self) {
        if self.state.contains(EchoState::CDATA) {
            self.state.remove(EchoState::CDATA);
            self.puts_raw("]]>");
        }
    }

    fn open_comment(&mut self) {
        if !self.state.contains(EchoState::COMMENT) {
            self.state.insert(EchoState::COMMENT);
            self.puts_raw("<!-- ");
        }
    }

    fn close_comment(&mut self) {
        if self.state.contains(EchoState::COMMENT) {
            self.state.remove(EchoState::COMMENT);
            self.puts_raw(" -->");
        }
    }

    /// Set the root tag and emit it. A document has exactly one root;
    /// the first path (or chardata) fixes it.
    pub fn open_root(&mut self, root: &str) {
        self.state.insert(EchoState::SUPPRESS_NL);
        if self.root.is_none() {
            self.root = Some(root.to_string());
            self.xpath.push_tag(root);
            let seg = root.to_string();
            self.write_single_tag(&seg, true);
            self.depth += 1;
        }
    }

    /// Close every open construct and all remaining tags in reverse
    /// order.
    pub fn close(&mut self) -> Result<()> {
        self.close_cdata();
        self.close_comment();
        self.close_path()?;
        if let Some(root) = self.root.clone() {
            self.depth = self.depth.saturating_sub(1);
            self.write_single_tag(&root, false);
            self.xpath.pop();
        }
        Ok(())
    }

    /// Feed one echo string. Structural elements must be complete.
    pub fn puts(&mut self, s: &str) -> Result<()> {
        let mut p = 0;
        while p < s.len() {
            let q = skip_unescaped_delimiters(s, p, "[");
            self.write_chardata(&s[p..q])?;
            if q >= s.len() {
                break;
            }
            let r = skip_unescaped_delimiters(s, q + 1, "]");
            let body = &s[q + 1..r.min(s.len())];
            if self.state.contains(EchoState::COMMENT) {
                // inside a comment, brackets are plain text
                self.write_chardata(&s[q..(r + 1).min(s.len())])?;
            } else if let Some(pi) = body.strip_prefix('?') {
                self.write_pidata(pi)?;
            } else {
                self.write_pathdata(body)?;
            }
            if r >= s.len() {
                break;
            }
            p = r + 1;
        }
        Ok(())
    }

    fn write_chardata(&mut self, text: &str) -> Result<()> {
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == ESC {
                let c = *bytes.get(i + 1).unwrap_or(&b'\\');
                match c {
                    b'b' => self.backspace(),
                    b'c' => self.open_comment(),
                    b'C' => self.close_comment(),
                    b'I' => self.indentdepth = self.depth,
                    b'i' => self.indentdepth = INDENT_ALL,
                    b'n' => {
                        self.putc(b'\n');
                        self.write_indent();
                    }
                    b'Q' => self.open_cdata(),
                    b'q' => self.close_cdata(),
                    other => self.putc(convert_backslash(other)),
                }
                i += 2;
            } else {
                if self.root.is_none() {
                    let root = self.wrap.root_tag().to_string();
                    self.open_root(&root);
                }
                self.write_indent();
                let stop = memchr::memchr(ESC, &bytes[i..])
                    .map(|n| i + n)
                    .unwrap_or(bytes.len());
                let chunk = &bytes[i..stop];
                if self
                    .state
                    .intersects(EchoState::CDATA | EchoState::COMMENT)
                {
                    self.out.extend_from_slice(chunk);
                } else {
                    let mut coded = Vec::with_capacity(chunk.len());
                    push_coded_entities(&mut coded, chunk);
                    self.out.extend_from_slice(&coded);
                }
                i = stop;
            }
        }
        Ok(())
    }

    /// One `@name=value` decoration inside a tag segment. Returns the
    /// index just past the attribute value.
    fn write_single_attribute(&mut self, seg: &str, from: usize) -> Result<usize> {
        let stop = skip_unescaped_delimiters(seg, from, "@");
        let eq = skip_unescaped_delimiters(seg, from, "=");
        if eq >= stop {
            return Err(XmlkitError::EchoSyntax(format!(
                "cannot parse attribute {}",
                &seg[from..]
            )));
        }
        self.putc(b' ');
        self.puts_raw(&seg[from..eq]);
        self.puts_raw("=\"");
        let value = &seg[eq + 1..stop];
        self.puts_raw(&unescape(value));
        self.putc(b'"');
        Ok(stop)
    }

    /// Emit `<seg>` or `</seg>`; a start tag carries its `@` attributes.
    fn write_single_tag(&mut self, seg: &str, start: bool) {
        if seg == "." {
            return;
        }
        let name_end = skip_unescaped_delimiters(seg, 0, "@");
        if name_end == 0 {
            return;
        }
        self.write_indent();
        self.putc(b'<');
        if !start {
            self.putc(b'/');
        }
        self.puts_raw(&seg[..name_end]);
        if start {
            let mut q = name_end;
            while q < seg.len() {
                // q sits on '@'
                match self.write_single_attribute(seg, q + 1) {
                    Ok(next) => q = next,
                    Err(_) => break,
                }
            }
        }
        self.putc(b'>');
    }

    fn write_pathdata(&mut self, body: &str) -> Result<()> {
        let path = XmlPath::from(body);
        self.close_cdata();
        if path.is_absolute() {
            self.close_path()?;
            self.open_absolute(&path)
        } else if path.is_relative() {
            self.open_relative(&path)
        } else {
            Err(XmlkitError::EchoSyntax(format!("bad path {body}")))
        }
    }

    fn open_absolute(&mut self, path: &XmlPath) -> Result<()> {
        let mut full = path.clone();
        if !full.normalize() {
            return Err(XmlkitError::EchoSyntax(format!("bad path {path}")));
        }
        self.xpath = full.clone();
        self.depth = 0;
        let segments: Vec<(SegmentKind, String)> = full
            .segments()
            .map(|(k, s)| (k, s.to_string()))
            .collect();
        for (kind, seg) in segments {
            match kind {
                SegmentKind::Root => {
                    let tag_end = skip_unescaped_delimiters(&seg, 0, "@");
                    let tag = seg[..tag_end].to_string();
                    match &self.root {
                        None => {
                            self.root = Some(tag);
                            self.write_single_tag(&seg, true);
                        }
                        Some(root) if *root == tag => {}
                        Some(_) => {
                            return Err(XmlkitError::EchoSyntax(format!(
                                "document can only have one root ({path})"
                            )))
                        }
                    }
                    self.depth += 1;
                }
                SegmentKind::Simple => {
                    self.write_single_tag(&seg, true);
                    self.depth += 1;
                }
                _ => return Err(XmlkitError::EchoSyntax(format!("bad path {path}"))),
            }
        }
        Ok(())
    }

    fn open_relative(&mut self, path: &XmlPath) -> Result<()> {
        let segments: Vec<(SegmentKind, String)> = path
            .segments()
            .map(|(k, s)| (k, s.to_string()))
            .collect();
        for (kind, seg) in segments {
            match kind {
                SegmentKind::Current => {
                    // [.] closes and reopens the current element
                    if self.xpath.len_segments() > 1 {
                        let last = match self.xpath.last() {
                            Some(l) => l.to_string(),
                            None => {
                                return Err(XmlkitError::EchoSyntax(format!("bad path {path}")))
                            }
                        };
                        self.depth -= 1;
                        self.write_single_tag(&last, false);
                        self.write_single_tag(&last, true);
                        self.depth += 1;
                    }
                }
                SegmentKind::Parent => {
                    let last = self
                        .xpath
                        .last()
                        .map(str::to_string)
                        .ok_or_else(|| XmlkitError::EchoSyntax(format!("bad path {path}")))?;
                    if !self.xpath.pop() || self.xpath.is_empty() {
                        return Err(XmlkitError::EchoSyntax(format!(
                            "path climbs above the root ({path})"
                        )));
                    }
                    self.depth -= 1;
                    self.write_single_tag(&last, false);
                }
                SegmentKind::Root | SegmentKind::Simple => {
                    let tag_end = skip_unescaped_delimiters(&seg, 0, "@");
                    if self.root.is_none() {
                        self.root = Some(seg[..tag_end].to_string());
                    }
                    self.write_single_tag(&seg, true);
                    self.xpath.push_tag(&seg);
                    self.depth += 1;
                }
                SegmentKind::Empty => {
                    return Err(XmlkitError::EchoSyntax(format!("bad path {path}")))
                }
            }
        }
        self.xpath.normalize();
        Ok(())
    }

    /// Close all but the root tag, in reverse order.
    fn close_path(&mut self) -> Result<()> {
        self.close_cdata();
        while self.xpath.len_segments() > 1 {
            let last = self
                .xpath
                .last()
                .map(str::to_string)
                .ok_or_else(|| XmlkitError::Internal("echo path underflow".into()))?;
            self.depth -= 1;
            self.write_single_tag(&last, false);
            self.xpath.pop();
        }
        Ok(())
    }

    fn write_pidata(&mut self, body: &str) -> Result<()> {
        let target_end = skip_unescaped_delimiters(body, 0, "@ \t\r\n");
        if target_end == 0 {
            return Err(XmlkitError::EchoSyntax(format!(
                "bad processing instruction {body}"
            )));
        }
        self.write_indent();
        self.puts_raw("<?");
        self.puts_raw(&body[..target_end]);
        let mut q = target_end;
        while q < body.len() {
            if body.as_bytes()[q] == b'@' {
                q = self.write_single_attribute(body, q + 1)?;
            } else {
                self.putc(body.as_bytes()[q]);
                q += 1;
            }
        }
        self.puts_raw("?>");
        Ok(())
    }
}

fn unescape(s: &str) -> String {
    let mut out = Vec::with_capacity(s.len());
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == ESC && i + 1 < bytes.len() {
            out.push(bytes[i + 1]);
            i += 2;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn render(input: &str) -> String {
        let mut e = Echo::new(0);
        e.puts(input).unwrap();
        e.close().unwrap();
        String::from_utf8(e.into_output()).unwrap()
    }

    #[test]
    fn relative_path_opens_tags() {
        assert_eq!(render("[a/b]hello"), "<a><b>hello</b></a>");
    }

    #[test]
    fn parent_step_closes_and_opens() {
        assert_eq!(render("[a/b]x[../c]y"), "<a><b>x</b><c>y</c></a>");
    }

    #[test]
    fn absolute_path_closes_to_common_prefix() {
        assert_eq!(render("[/a/b]x[/a/c]y"), "<a><b>x</b><c>y</c></a>");
    }

    #[test]
    fn attributes_in_segments() {
        assert_eq!(render("[a@k=v]x"), "<a k=\"v\">x</a>");
        assert_eq!(
            render("[a/b@k=v@q=w]x"),
            "<a><b k=\"v\" q=\"w\">x</b></a>"
        );
    }

    #[test]
    fn bare_chardata_gets_default_root() {
        assert_eq!(render("hello"), "<root>hello</root>");
    }

    #[test]
    fn chardata_entities_are_coded() {
        assert_eq!(render("[a]x<y"), "<a>x&lt;y</a>");
    }

    #[test]
    fn cdata_escapes() {
        assert_eq!(render("[a]\\Qx<y\\q"), "<a><![CDATA[x<y]]></a>");
    }

    #[test]
    fn comment_escapes() {
        assert_eq!(render("[a]\\chello\\C"), "<a><!-- hello --></a>");
    }

    #[test]
    fn backspace_drops_a_byte() {
        assert_eq!(render("[a]xy\\b"), "<a>x</a>");
    }

    #[test]
    fn newline_escape() {
        assert_eq!(render("[a]x\\ny"), "<a>x\ny</a>");
    }

    #[test]
    fn processing_instruction() {
        assert_eq!(render("[?go fast]"), "<?go fast?>");
    }

    #[test]
    fn second_root_is_rejected() {
        let mut e = Echo::new(0);
        e.puts("[/a]x").unwrap();
        assert!(e.puts("[/b]y").is_err());
    }

    #[test]
    fn escaped_bracket_is_chardata() {
        assert_eq!(render("[a]x\\[y\\]z"), "<a>x[y]z</a>");
    }
}
