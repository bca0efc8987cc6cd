//! File-block parser: layers the tokenizer over the block reader so
//! parsing can restart at any byte offset. A cursor re-enters the
//! document by replaying one node per stacked frame, then continuing
//! with callbacks from the top frame on.

use std::path::Path;

use memchr::memchr;

use crate::attlist::AttributeList;
use crate::cursor::Cursor;
use crate::fbreader::FileBlockReader;
use crate::token::{NodeKind, Tokenizer, XmlEvent};
use crate::Result;

/// How much of a node the current chunk represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum NodeRep {
    Na,
    MidFrag,
    EndFrag,
    Full,
}

#[derive(Debug, Clone)]
pub struct FbInfo {
    pub depth: usize,
    pub maxdepth: usize,
    pub nodetype: NodeKind,
    pub noderep: NodeRep,
    pub nodecount: u64,
    pub offset: u64,
    /// Inside CDATA or DOCTYPE; such nodes do not count.
    pub ignore: bool,
}

impl FbInfo {
    fn new() -> Self {
        FbInfo {
            depth: 0,
            maxdepth: 0,
            nodetype: NodeKind::None,
            noderep: NodeRep::Na,
            nodecount: 0,
            offset: 0,
            ignore: false,
        }
    }
}

/// Position handed between successive parse_next calls.
#[derive(Debug, Clone, Copy, Default)]
pub struct Position {
    pub offset: u64,
    pub nodecount: u64,
}

/// Node-level callbacks for cursor traversal.
#[allow(unused_variables)]
pub trait FbVisitor {
    /// Called once per node-worthy event, after the typed callback.
    fn node(&mut self, info: &FbInfo) {}
    fn start_tag(&mut self, info: &FbInfo, name: &str, attrs: &AttributeList) {}
    fn end_tag(&mut self, info: &FbInfo, name: &str) {}
    fn chardata(&mut self, info: &FbInfo, text: &str) {}
}

struct NoVisitor;
impl FbVisitor for NoVisitor {}

pub struct FileBlockParser {
    reader: FileBlockReader,
    tokenizer: Tokenizer,
    pub info: FbInfo,
}

impl FileBlockParser {
    pub fn open(path: &Path, maxblocks: usize) -> Result<FileBlockParser> {
        Ok(FileBlockParser {
            reader: FileBlockReader::open(path, maxblocks)?,
            tokenizer: Tokenizer::new(),
            info: FbInfo::new(),
        })
    }

    pub fn reader(&mut self) -> &mut FileBlockReader {
        &mut self.reader
    }

    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.info = FbInfo::new();
    }

    /// Replay the cursor's frames, then deliver callbacks from the top
    /// frame onwards. Returns the position after the top node, or None
    /// when the cursor points past the document.
    pub fn parse_cursor(
        &mut self,
        cursor: &Cursor,
        visitor: &mut dyn FbVisitor,
        callbacks_below: bool,
    ) -> Result<Option<Position>> {
        self.reset();
        let mut pos = Position::default();

        if cursor.len() > 1 {
            for depth in 0..cursor.len() - 1 {
                let frame = cursor.frame(depth).expect("frame in range");
                pos.offset = frame.offset;
                pos.nodecount = frame.nord;
                let advanced = if callbacks_below {
                    self.parse_next(&mut pos, visitor)?
                } else {
                    self.parse_next(&mut pos, &mut NoVisitor)?
                };
                if !advanced {
                    return Ok(None);
                }
                self.reader.touch(self.info.offset);
            }
        }

        let top = cursor.top().expect("cursor never empty");
        pos.offset = top.offset;
        pos.nodecount = top.nord;
        self.reader.touch(self.info.offset);
        if self.parse_next(&mut pos, visitor)? {
            Ok(Some(pos))
        } else {
            Ok(None)
        }
    }

    /// Parse forward from `pos` until one node boundary is crossed,
    /// delivering events to `visitor`. Returns false at end of file.
    pub fn parse_next(&mut self, pos: &mut Position, visitor: &mut dyn FbVisitor) -> Result<bool> {
        self.info.offset = pos.offset;
        self.info.nodecount = pos.nodecount;
        let mut delivered = false;

        loop {
            let chunk = self.reader.read(self.info.offset)?;
            if chunk.is_empty() {
                return Ok(false);
            }
            // one node-ish chunk: a tag up to '>', or text up to '<'
            let lookfor = if chunk[0] == b'<' { b'>' } else { b'<' };
            let (len, noderep) = match memchr(lookfor, chunk) {
                Some(e) if lookfor == b'>' => (e + 1, NodeRep::Full),
                Some(e) if e > 0 => (e, NodeRep::EndFrag),
                Some(_) => (chunk.len(), NodeRep::MidFrag),
                None => (chunk.len(), NodeRep::MidFrag),
            };
            self.info.noderep = noderep;
            let chunk = chunk[..len].to_vec();
            self.tokenizer.push_bytes(&chunk);

            while let Some(located) = self
                .tokenizer
                .next_event(false)
                .map_err(|e| crate::error::XmlkitError::Parse {
                    file: String::new(),
                    message: e.message.clone(),
                    line: e.line,
                    column: e.column,
                    byte: e.byte,
                    depth: self.info.depth,
                })?
            {
                self.deliver(&located.event, visitor);
                delivered = true;
            }

            self.info.offset += len as u64;

            if noderep >= NodeRep::EndFrag && delivered {
                pos.offset = self.info.offset;
                pos.nodecount = self.info.nodecount;
                return Ok(true);
            }
        }
    }

    fn deliver(&mut self, event: &XmlEvent, visitor: &mut dyn FbVisitor) {
        match event {
            XmlEvent::StartTag { name, attrs } => {
                self.info.nodetype = NodeKind::StartTag;
                visitor.start_tag(&self.info, name, attrs);
                self.count_node(visitor);
                self.info.depth += 1;
                self.info.maxdepth = self.info.maxdepth.max(self.info.depth);
            }
            XmlEvent::EndTag { name } => {
                self.info.nodetype = NodeKind::EndTag;
                visitor.end_tag(&self.info, name);
                // depth decrements after the callback; the skip engine
                // depends on end-tags sitting one deeper than their
                // start-tag
                self.count_node(visitor);
                self.info.depth = self.info.depth.saturating_sub(1);
            }
            XmlEvent::Chardata(text) => {
                self.info.nodetype = event.kind();
                visitor.chardata(&self.info, text);
                self.count_node(visitor);
            }
            XmlEvent::CdataStart => {
                self.info.nodetype = NodeKind::StartCdata;
                self.info.ignore = true;
                self.count_node(visitor);
            }
            XmlEvent::CdataEnd => {
                self.info.nodetype = NodeKind::EndCdata;
                self.count_node(visitor);
                self.info.ignore = false;
            }
            XmlEvent::DoctypeStart { .. } => {
                self.info.nodetype = NodeKind::StartDoctype;
                self.info.ignore = true;
                self.count_node(visitor);
            }
            XmlEvent::DoctypeEnd => {
                self.info.nodetype = NodeKind::EndDoctype;
                self.count_node(visitor);
                self.info.ignore = false;
            }
            XmlEvent::Comment(_) => {
                self.info.nodetype = NodeKind::Comment;
                self.count_node(visitor);
            }
            XmlEvent::Pi { .. } => {
                self.info.nodetype = NodeKind::Pi;
                self.count_node(visitor);
            }
            XmlEvent::EntityDecl { .. } => {
                self.info.nodetype = NodeKind::EntityDecl;
                self.count_node(visitor);
            }
            XmlEvent::Default(raw) => {
                self.info.nodetype = if crate::entities::is_xml_space(raw) {
                    NodeKind::Space
                } else {
                    NodeKind::Default
                };
                self.count_node(visitor);
            }
        }
    }

    fn count_node(&mut self, visitor: &mut dyn FbVisitor) {
        visitor.node(&self.info);
        if self.info.nodetype > NodeKind::Space && !self.info.ignore {
            self.info.nodecount += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(dir: &tempfile::TempDir, content: &str) -> std::path::PathBuf {
        let path = dir.path().join("doc.xml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path
    }

    #[derive(Default)]
    struct Trace {
        nodes: Vec<(NodeKind, usize)>,
    }
    impl FbVisitor for Trace {
        fn node(&mut self, info: &FbInfo) {
            self.nodes.push((info.nodetype, info.depth));
        }
    }

    #[test]
    fn walks_nodes_with_depths() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, "<a><b>x</b></a>");
        let mut fbp = FileBlockParser::open(&path, 4).unwrap();
        let mut trace = Trace::default();
        let mut pos = Position::default();
        while fbp.parse_next(&mut pos, &mut trace).unwrap() {}
        assert_eq!(
            trace.nodes,
            vec![
                (NodeKind::StartTag, 0),
                (NodeKind::StartTag, 1),
                (NodeKind::Chardata, 2),
                (NodeKind::EndTag, 2),
                (NodeKind::EndTag, 1),
            ]
        );
    }

    #[test]
    fn cursor_reentry_resumes_mid_document() {
        let dir = tempfile::tempdir().unwrap();
        // offsets:  0:<a> 3:<b> 6:x 7:</b> 11:<c> 14:y ...
        let path = sample(&dir, "<a><b>x</b><c>y</c></a>");
        let mut fbp = FileBlockParser::open(&path, 4).unwrap();

        let mut cursor = Cursor::new();
        cursor.push(11, 1, 3); // the <c> element
        let mut trace = Trace::default();
        let pos = fbp
            .parse_cursor(&cursor, &mut trace, true)
            .unwrap()
            .unwrap();
        // the replayed top frame delivers the <c> start tag
        assert_eq!(trace.nodes.first().unwrap().0, NodeKind::StartTag);
        assert!(pos.offset > 11);
    }
}
