//! Skip engine: advance or retreat a cursor by re-parsing from its
//! position, counting nodes that satisfy a depth/node-type predicate.

use bitflags::bitflags;

use crate::cursor::Cursor;
use crate::fbparser::{FbInfo, FbVisitor, FileBlockParser, Position};
use crate::token::NodeKind;
use crate::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NodeMask: u16 {
        const SPACE = 1 << 0;
        const DEFAULT = 1 << 1;
        const CHARDATA = 1 << 2;
        const COMMENT = 1 << 3;
        const PI = 1 << 4;
        const START_TAG = 1 << 5;
        const END_TAG = 1 << 6;
        const CDATA = 1 << 7;
        const DOCTYPE = 1 << 8;
    }
}

impl NodeMask {
    pub fn all_nodes() -> NodeMask {
        NodeMask::all()
    }

    pub fn covers(self, kind: NodeKind) -> bool {
        let bit = match kind {
            NodeKind::None => return false,
            NodeKind::Space => NodeMask::SPACE,
            NodeKind::Default => NodeMask::DEFAULT,
            NodeKind::Chardata => NodeMask::CHARDATA,
            NodeKind::Comment => NodeMask::COMMENT,
            NodeKind::Pi => NodeMask::PI,
            NodeKind::StartTag => NodeMask::START_TAG,
            NodeKind::EndTag => NodeMask::END_TAG,
            NodeKind::StartCdata | NodeKind::EndCdata => NodeMask::CDATA,
            NodeKind::StartDoctype | NodeKind::EndDoctype | NodeKind::EntityDecl => {
                NodeMask::DOCTYPE
            }
        };
        self.contains(bit)
    }
}

/// Predicate on the node position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCond {
    /// Any node. Rarely what you want.
    Any,
    EqDepth(usize),
    GtDepth(usize),
    GteDepth(usize),
    LtDepth(usize),
    LteDepth(usize),
    NotEndTag,
}

#[derive(Debug, Clone)]
pub struct Skip {
    pub cond: SkipCond,
    pub nodemask: NodeMask,
    /// Number of satisfying nodes to pass before stopping.
    pub count: u64,
}

impl Skip {
    pub fn new(cond: SkipCond, nodemask: NodeMask, count: u64) -> Self {
        Skip {
            cond,
            nodemask,
            count,
        }
    }

    fn check(&self, info: &FbInfo) -> bool {
        if info.ignore || !self.nodemask.covers(info.nodetype) {
            return false;
        }
        match self.cond {
            SkipCond::Any => true,
            SkipCond::EqDepth(d) => info.depth == d,
            SkipCond::GtDepth(d) => info.depth > d,
            SkipCond::GteDepth(d) => info.depth >= d,
            SkipCond::LtDepth(d) => info.depth < d,
            SkipCond::LteDepth(d) => info.depth <= d,
            SkipCond::NotEndTag => info.nodetype != NodeKind::EndTag,
        }
    }
}

struct Forward<'a> {
    done: bool,
    cursor: &'a mut Cursor,
    skip: &'a mut Skip,
}

impl<'a> FbVisitor for Forward<'a> {
    fn node(&mut self, info: &FbInfo) {
        if self.done {
            return;
        }
        if self.skip.check(info) {
            self.cursor.bump(info.depth, info.offset, info.nodecount);
            self.skip.count = self.skip.count.saturating_sub(1);
            self.done = self.skip.count == 0;
        }
    }
}

/// Advance the cursor to the `count`-th node satisfying the predicate.
pub fn forward_skip(skip: &mut Skip, cursor: &mut Cursor, fbp: &mut FileBlockParser) -> Result<bool> {
    let start = cursor.clone();
    let mut pos = match fbp.parse_cursor(&start, &mut NoopVisitor, false)? {
        Some(pos) => pos,
        None => return Ok(false),
    };
    let mut fw = Forward {
        done: false,
        cursor,
        skip,
    };
    while !fw.done && fbp.parse_next(&mut pos, &mut fw)? {}
    Ok(fw.done)
}

struct NoopVisitor;
impl FbVisitor for NoopVisitor {}

struct Backward<'a> {
    done: bool,
    cursor: &'a mut Cursor,
    target: u64,
    skip: &'a Skip,
}

impl<'a> FbVisitor for Backward<'a> {
    fn node(&mut self, info: &FbInfo) {
        if self.done {
            return;
        }
        self.done = info.offset >= self.target;
        if !self.done && self.skip.check(info) {
            self.cursor.bump(info.depth, info.offset, info.nodecount);
        }
    }
}

/// Retreat the cursor: find the last satisfying node before the current
/// position by restarting above it and scanning forward. Not fast.
pub fn backward_skip(skip: &mut Skip, cursor: &mut Cursor, fbp: &mut FileBlockParser) -> Result<bool> {
    while skip.count > 0 {
        skip.count -= 1;
        let target = cursor.top_offset();
        if !cursor.parent() {
            return Ok(true);
        }
        let start = cursor.clone();
        let mut pos = match fbp.parse_cursor(&start, &mut NoopVisitor, false)? {
            Some(pos) => pos,
            None => return Ok(false),
        };
        let mut bw = Backward {
            done: false,
            cursor: &mut *cursor,
            target,
            skip: &*skip,
        };
        while !bw.done && fbp.parse_next(&mut pos, &mut bw)? {}
        if !bw.done {
            return Ok(false);
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn open(content: &str, dir: &tempfile::TempDir) -> FileBlockParser {
        let path = dir.path().join("doc.xml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        FileBlockParser::open(&path, 4).unwrap()
    }

    #[test]
    fn forward_skip_counts_start_tags() {
        let dir = tempfile::tempdir().unwrap();
        // offsets: <a>=0 <b>=3 </b>=6 <c>=10 </c>=13 </a>=17
        let mut fbp = open("<a><b></b><c></c></a>", &dir);
        let mut cursor = Cursor::new();
        let mut skip = Skip::new(SkipCond::EqDepth(1), NodeMask::START_TAG, 2);
        assert!(forward_skip(&mut skip, &mut cursor, &mut fbp).unwrap());
        // second depth-1 start tag is <c> at offset 10
        assert_eq!(cursor.top_offset(), 10);
    }

    #[test]
    fn forward_skip_fails_past_eof() {
        let dir = tempfile::tempdir().unwrap();
        let mut fbp = open("<a><b></b></a>", &dir);
        let mut cursor = Cursor::new();
        let mut skip = Skip::new(SkipCond::EqDepth(1), NodeMask::START_TAG, 5);
        assert!(!forward_skip(&mut skip, &mut cursor, &mut fbp).unwrap());
    }

    #[test]
    fn backward_skip_returns_to_previous_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let mut fbp = open("<a><b></b><c></c></a>", &dir);
        let mut cursor = Cursor::new();

        let mut fwd = Skip::new(SkipCond::EqDepth(1), NodeMask::START_TAG, 2);
        forward_skip(&mut fwd, &mut cursor, &mut fbp).unwrap();
        assert_eq!(cursor.top_offset(), 10);

        let mut back = Skip::new(SkipCond::EqDepth(1), NodeMask::START_TAG, 1);
        backward_skip(&mut back, &mut cursor, &mut fbp).unwrap();
        assert_eq!(cursor.top_offset(), 3);
    }
}
