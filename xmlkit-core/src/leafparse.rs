//! Leaf parser: collapses each maximal chardata-capable position into
//! one leaf carrying the current path and accumulated string value.
//! Exposed as an iterator over [`Leaf`] values.

use std::collections::VecDeque;

use bitflags::bitflags;

use crate::attlist::AttributeList;
use crate::entities::is_xml_space;
use crate::error::XmlkitError;
use crate::input::ByteStream;
use crate::parser::{Consumer, EventParser, Flow};
use crate::path::XmlPath;
use crate::select::Selector;
use crate::signal;
use crate::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LeafFlags: u16 {
        /// Collapse whitespace runs in values to a single space.
        const SQUEEZE = 1 << 0;
        /// Report full paths, never relative ones (consumed by the
        /// unecho formatter).
        const ABSOLUTE_PATH = 1 << 1;
        /// Drop whitespace-only leaves.
        const SKIP_EMPTY = 1 << 2;
        /// Include attributes in the reported path.
        const ATTRIBUTES = 1 << 3;
        /// Emit an empty-value leaf at tag boundaries with no text.
        const ALWAYS_CHARDATA = 1 << 4;
        const PRE_OPEN = 1 << 5;
        const POST_OPEN = 1 << 6;
        const PRE_CLOSE = 1 << 7;
        const POST_CLOSE = 1 << 8;
    }
}

/// Which of the four logical boundaries around a tag fired the leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boundary {
    PreOpen,
    PostOpen,
    PreClose,
    PostClose,
}

#[derive(Debug, Clone)]
pub struct Leaf {
    /// Absolute path of the enclosing element.
    pub path: String,
    /// Accumulated string value; CDATA runs are bracketed by `\Q`/`\q`.
    pub value: String,
    pub boundary: Boundary,
    pub selected: bool,
    /// Leaf ordinal within the file.
    pub line: u64,
    /// First boundary of the document (the root opens).
    pub first: bool,
    /// Last boundary of the document (the root closes).
    pub last: bool,
}

struct LeafCollector {
    flags: LeafFlags,
    depth: usize,
    maxdepth: usize,
    path: XmlPath,
    sel: Selector,
    value: String,
    has_chardata: bool,
    in_cdata: bool,
    line: u64,
    out: VecDeque<Leaf>,
    error: Option<XmlkitError>,
}

impl LeafCollector {
    fn new(flags: LeafFlags) -> Self {
        LeafCollector {
            flags,
            depth: 0,
            maxdepth: 0,
            path: XmlPath::new(),
            sel: Selector::new(),
            value: String::new(),
            has_chardata: false,
            in_cdata: false,
            line: 0,
            out: VecDeque::new(),
            error: None,
        }
    }

    fn fail(&mut self, e: XmlkitError) -> Flow {
        self.error = Some(e);
        Flow::ABORT
    }

    fn value_is_space(&self) -> bool {
        is_xml_space(self.value.as_bytes())
    }

    fn emit(&mut self, boundary: Boundary, value: String, first: bool, last: bool) {
        self.out.push_back(Leaf {
            path: self.path.as_str().to_string(),
            value,
            boundary,
            selected: self.sel.active,
            line: self.line,
            first,
            last,
        });
    }

    fn append_chardata(&mut self, text: &str) {
        self.has_chardata = true;
        if self.flags.contains(LeafFlags::SKIP_EMPTY) && is_xml_space(text.as_bytes()) {
            return;
        }
        if self.in_cdata {
            self.value.push_str("\\Q");
        }
        if self.flags.contains(LeafFlags::SQUEEZE) {
            let mut rest = text;
            let mut last_space = self
                .value
                .as_bytes()
                .last()
                .map(|b| is_xml_space(&[*b]))
                .unwrap_or(true);
            while let Some(c) = rest.chars().next() {
                if c.is_ascii_whitespace() {
                    if !last_space {
                        self.value.push(' ');
                        last_space = true;
                    }
                    rest = rest.trim_start_matches(|c: char| c.is_ascii_whitespace());
                } else {
                    self.value.push(c);
                    last_space = false;
                    rest = &rest[c.len_utf8()..];
                }
            }
        } else {
            self.value.push_str(text);
        }
        if self.in_cdata {
            self.value.push_str("\\q");
        }
    }

    fn synth_empty_chardata(&mut self) {
        if self.flags.contains(LeafFlags::ALWAYS_CHARDATA) && !self.has_chardata {
            self.append_chardata("");
        }
    }
}

impl Consumer for LeafCollector {
    fn start_tag(&mut self, name: &str, attrs: &AttributeList) -> Flow {
        let first = self.depth == 0;
        if !first {
            self.synth_empty_chardata();
        }

        if let Err(e) = self.sel.activate_node(self.depth, &self.path) {
            return self.fail(e);
        }
        let skip = self.flags.contains(LeafFlags::SKIP_EMPTY) && self.value_is_space();
        if !first && !skip && self.flags.contains(LeafFlags::PRE_OPEN) {
            let value = std::mem::take(&mut self.value);
            self.emit(Boundary::PreOpen, value, false, false);
        }
        self.value.clear();
        self.has_chardata = false;

        self.depth += 1;
        self.maxdepth = self.maxdepth.max(self.depth);
        self.line += 1;
        self.path.push_tag(name);
        if let Err(e) = self.sel.activate_node(self.depth, &self.path) {
            return self.fail(e);
        }
        if self.flags.contains(LeafFlags::ATTRIBUTES) {
            self.path.push_attributes_values(attrs.iter());
        }
        if self.flags.contains(LeafFlags::POST_OPEN) {
            self.emit(Boundary::PostOpen, String::new(), first, false);
        }
        Flow::OK
    }

    fn end_tag(&mut self, _name: &str) -> Flow {
        self.synth_empty_chardata();

        if let Err(e) = self.sel.activate_node(self.depth, &self.path) {
            return self.fail(e);
        }
        let last = self.depth == 1;
        let skip = self.flags.contains(LeafFlags::SKIP_EMPTY) && self.value_is_space();
        if !skip && self.flags.contains(LeafFlags::PRE_CLOSE) {
            let value = std::mem::take(&mut self.value);
            self.emit(Boundary::PreClose, value, false, last);
        }
        self.value.clear();
        self.has_chardata = false;

        self.depth -= 1;
        self.line += 1;
        self.path.pop();
        if let Err(e) = self.sel.activate_node(self.depth, &self.path) {
            return self.fail(e);
        }
        if self.depth > 0 && self.flags.contains(LeafFlags::POST_CLOSE) {
            self.emit(Boundary::PostClose, String::new(), false, false);
        }
        Flow::OK
    }

    fn chardata(&mut self, text: &str) -> Flow {
        if self.depth > 0 {
            self.append_chardata(text);
        }
        Flow::OK
    }

    fn start_cdata(&mut self) -> Flow {
        self.in_cdata = true;
        Flow::OK
    }

    fn end_cdata(&mut self) -> Flow {
        self.in_cdata = false;
        Flow::OK
    }

    fn default_data(&mut self, _raw: &[u8]) -> Flow {
        Flow::OK
    }
}

/// Iterator over the leaves of one file.
pub struct LeafReader {
    file: String,
    stream: ByteStream,
    parser: EventParser,
    collector: LeafCollector,
    buf: Vec<u8>,
    eof: bool,
    done: bool,
}

impl LeafReader {
    pub fn open<S: AsRef<str>>(file: &str, xpaths: &[S], flags: LeafFlags) -> Result<LeafReader> {
        let mut collector = LeafCollector::new(flags);
        collector.sel.set_patterns(xpaths)?;
        collector.sel.reset();
        Ok(LeafReader {
            file: file.to_string(),
            stream: ByteStream::open(file)?,
            parser: EventParser::new(),
            collector,
            buf: Vec::new(),
            eof: false,
            done: false,
        })
    }

    fn pump(&mut self) -> Result<()> {
        while self.collector.out.is_empty() && !self.eof {
            if signal::quit_requested() {
                self.eof = true;
                break;
            }
            let n = self.stream.read_block(&mut self.buf)?;
            let ok = if n == 0 {
                self.eof = true;
                self.parser.finish(&mut self.collector)
            } else {
                self.parser.feed(&self.buf, &mut self.collector)
            };
            if !ok {
                if let Some(e) = self.collector.error.take() {
                    return Err(e);
                }
                if self.collector.depth == 0 && self.collector.maxdepth > 0 {
                    self.eof = true;
                    break;
                }
                if self.parser.aborted() {
                    self.eof = true;
                    break;
                }
                return Err(XmlkitError::Parse {
                    file: self.file.clone(),
                    message: self.parser.error_message().to_string(),
                    line: self.parser.cur.line,
                    column: self.parser.cur.column,
                    byte: self.parser.cur.byte,
                    depth: self.collector.depth,
                });
            }
        }
        Ok(())
    }
}

impl Iterator for LeafReader {
    type Item = Result<Leaf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        if self.collector.out.is_empty() {
            if let Err(e) = self.pump() {
                self.done = true;
                return Some(Err(e));
            }
        }
        match self.collector.out.pop_front() {
            Some(leaf) => Some(Ok(leaf)),
            None => {
                self.done = true;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn leaves(content: &str, xpaths: &[&str], flags: LeafFlags) -> Vec<Leaf> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.xml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        LeafReader::open(path.to_str().unwrap(), xpaths, flags)
            .unwrap()
            .collect::<Result<Vec<_>>>()
            .unwrap()
    }

    #[test]
    fn one_leaf_per_chardata_slot() {
        let ls = leaves(
            "<r><a>one</a><b>two</b></r>",
            &["/"],
            LeafFlags::PRE_CLOSE | LeafFlags::SKIP_EMPTY,
        );
        let pairs: Vec<_> = ls
            .iter()
            .map(|l| (l.path.as_str(), l.value.as_str()))
            .collect();
        assert_eq!(pairs, vec![("/r/a", "one"), ("/r/b", "two")]);
    }

    #[test]
    fn squeeze_collapses_whitespace() {
        let ls = leaves(
            "<r>  a \n b  </r>",
            &["/"],
            LeafFlags::PRE_CLOSE | LeafFlags::SQUEEZE,
        );
        assert_eq!(ls[0].value, "a b ");
    }

    #[test]
    fn cdata_is_bracketed() {
        let ls = leaves(
            "<r>x<![CDATA[a<b]]>y</r>",
            &["/"],
            LeafFlags::PRE_CLOSE,
        );
        assert_eq!(ls[0].value, "x\\Qa<b\\qy");
    }

    #[test]
    fn attributes_join_the_path() {
        let ls = leaves(
            "<r><a k=\"v\">x</a></r>",
            &["/"],
            LeafFlags::PRE_CLOSE | LeafFlags::SKIP_EMPTY | LeafFlags::ATTRIBUTES,
        );
        assert_eq!(ls[0].path, "/r/a@k=v");
    }

    #[test]
    fn selection_marks_leaves() {
        let ls = leaves(
            "<r><a>one</a><b>two</b></r>",
            &["/r/b"],
            LeafFlags::PRE_CLOSE | LeafFlags::SKIP_EMPTY,
        );
        assert_eq!(ls.len(), 2);
        assert!(!ls[0].selected);
        assert!(ls[1].selected);
    }

    #[test]
    fn boundaries_mark_first_and_last() {
        let ls = leaves(
            "<r><a>x</a></r>",
            &["/"],
            LeafFlags::POST_OPEN | LeafFlags::PRE_CLOSE,
        );
        assert!(ls.first().unwrap().first);
        assert!(ls.last().unwrap().last);
    }

    #[test]
    fn always_chardata_emits_empty_leaves() {
        let ls = leaves(
            "<r><a/></r>",
            &["/"],
            LeafFlags::PRE_CLOSE | LeafFlags::ALWAYS_CHARDATA,
        );
        // every tag boundary yields a leaf even without text
        assert!(ls.iter().any(|l| l.path == "/r/a" && l.value.is_empty()));
    }
}
