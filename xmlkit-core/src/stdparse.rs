//! Std-parser: walks every file of a file list, feeding events through
//! the selection engine and invoking the consumer only where selection
//! fires (or unconditionally under `ALLNODES`).

use bitflags::bitflags;
use tracing::debug;

use crate::attlist::AttributeList;
use crate::error::XmlkitError;
use crate::filelist::{FileList, FileListFlags};
use crate::input::ByteStream;
use crate::parser::{Consumer, EventParser, Flow};
use crate::path::XmlPath;
use crate::select::Selector;
use crate::signal;
use crate::token::NodeKind;
use crate::Result;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParseFlags: u16 {
        /// Deliver every node, not only selected ones.
        const ALLNODES = 1 << 0;
        /// Tool accepts exactly one file.
        const EQ1FILE = 1 << 1;
        /// Tool does not accept path expressions.
        const NOXPATHS = 1 << 2;
        /// Tool accepts stdin when no file is named.
        const MIN1FILE = 1 << 3;
        /// Synthesize an empty chardata event at tag boundaries that
        /// carry no text.
        const ALWAYS_CHARDATA = 1 << 4;
        /// Suppress parse-error reporting; record failure instead.
        const QUIET = 1 << 5;
    }
}

/// Walker state visible to consumer callbacks.
pub struct StdState {
    pub depth: usize,
    pub maxdepth: usize,
    pub path: XmlPath,
    pub sel: Selector,
}

impl StdState {
    fn new() -> Self {
        StdState {
            depth: 0,
            maxdepth: 0,
            path: XmlPath::new(),
            sel: Selector::new(),
        }
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.maxdepth = 0;
        self.path.reset();
        self.sel.reset();
    }
}

/// Per-tool callbacks. Methods left at their default report
/// `UNHANDLED`, and the event's raw bytes fall through to
/// `default_data`, selection-gated.
#[allow(unused_variables)]
pub trait StdConsumer {
    /// Returning false skips the file.
    fn start_file(&mut self, file: &str, xpaths: &[String]) -> Result<bool> {
        Ok(true)
    }
    /// Returning false stops iteration over the remaining files.
    fn end_file(&mut self, file: &str, xpaths: &[String]) -> Result<bool> {
        Ok(true)
    }
    fn start_tag(&mut self, state: &StdState, name: &str, attrs: &AttributeList) -> Flow {
        Flow::UNHANDLED
    }
    fn end_tag(&mut self, state: &StdState, name: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn attribute(&mut self, state: &StdState, name: &str, value: &str) -> Flow {
        Flow::OK
    }
    fn chardata(&mut self, state: &StdState, text: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn start_cdata(&mut self, state: &StdState) -> Flow {
        Flow::UNHANDLED
    }
    fn end_cdata(&mut self, state: &StdState) -> Flow {
        Flow::UNHANDLED
    }
    fn comment(&mut self, state: &StdState, text: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn pi(&mut self, state: &StdState, target: &str, data: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn doctype_start(
        &mut self,
        state: &StdState,
        name: &str,
        sysid: Option<&str>,
        pubid: Option<&str>,
        internal_subset: bool,
    ) -> Flow {
        Flow::UNHANDLED
    }
    fn doctype_end(&mut self, state: &StdState) -> Flow {
        Flow::UNHANDLED
    }
    fn entity_decl(&mut self, state: &StdState, name: &str, value: Option<&str>) -> Flow {
        Flow::UNHANDLED
    }
    fn default_data(&mut self, state: &StdState, raw: &[u8]) -> Flow {
        Flow::OK
    }
}

/// Adapter dispatching parser events through selection to the consumer.
struct SelectingAdapter<'a> {
    state: &'a mut StdState,
    consumer: &'a mut dyn StdConsumer,
    flags: ParseFlags,
    chardata_seen: bool,
    error: Option<XmlkitError>,
}

impl<'a> SelectingAdapter<'a> {
    fn allnodes(&self) -> bool {
        self.flags.contains(ParseFlags::ALLNODES)
    }

    fn fail(&mut self, e: XmlkitError) -> Flow {
        self.error = Some(e);
        Flow::ABORT
    }

    fn do_chardata(&mut self, text: &str) -> Flow {
        self.chardata_seen = true;

        self.state.path.push_node(NodeKind::Chardata);
        if let Err(e) = self
            .state
            .sel
            .activate_stringval(self.state.depth, &self.state.path)
        {
            return self.fail(e);
        }
        let r = if self.state.sel.active || self.allnodes() {
            self.consumer.chardata(self.state, text)
        } else {
            Flow::OK
        };
        self.state.path.pop();
        if let Err(e) = self
            .state
            .sel
            .activate_tag(self.state.depth, &self.state.path, None)
        {
            return self.fail(e);
        }
        r
    }

    fn synth_empty_chardata(&mut self) -> Flow {
        if self.flags.contains(ParseFlags::ALWAYS_CHARDATA) && !self.chardata_seen {
            self.do_chardata("") & !Flow::UNHANDLED
        } else {
            Flow::OK
        }
    }

    fn gate(&self) -> bool {
        self.state.sel.active || self.allnodes()
    }
}

impl<'a> Consumer for SelectingAdapter<'a> {
    fn start_tag(&mut self, name: &str, attrs: &AttributeList) -> Flow {
        let mut r = self.synth_empty_chardata();
        self.chardata_seen = false;

        self.state.depth += 1;
        self.state.maxdepth = self.state.maxdepth.max(self.state.depth);
        self.state.path.push_tag(name);
        if let Err(e) =
            self.state
                .sel
                .activate_tag(self.state.depth, &self.state.path, Some(attrs))
        {
            return self.fail(e);
        }

        if self.gate() {
            r |= self.consumer.start_tag(self.state, name, attrs) & !Flow::UNHANDLED;
        }

        if !attrs.is_empty() && (self.allnodes() || self.state.sel.attrib) {
            for (aname, avalue) in attrs.iter() {
                self.state.path.push_attribute(aname);
                self.state.sel.activate_attribute(&self.state.path, aname);
                if self.state.sel.active || self.allnodes() {
                    r |= self.consumer.attribute(self.state, aname, avalue);
                }
                self.state.path.pop_attribute();
            }
            if let Err(e) = self
                .state
                .sel
                .activate_tag(self.state.depth, &self.state.path, None)
            {
                return self.fail(e);
            }
        }
        r & !Flow::UNHANDLED
    }

    fn end_tag(&mut self, name: &str) -> Flow {
        let mut r = self.synth_empty_chardata();
        self.chardata_seen = false;

        if self.gate() {
            r |= self.consumer.end_tag(self.state, name) & !Flow::UNHANDLED;
        }

        self.state.depth -= 1;
        self.state.path.pop();
        if let Err(e) = self
            .state
            .sel
            .activate_tag(self.state.depth, &self.state.path, None)
        {
            return self.fail(e);
        }
        r
    }

    fn chardata(&mut self, text: &str) -> Flow {
        self.do_chardata(text)
    }

    fn start_cdata(&mut self) -> Flow {
        if self.gate() {
            self.consumer.start_cdata(self.state)
        } else {
            Flow::OK
        }
    }

    fn end_cdata(&mut self) -> Flow {
        if self.gate() {
            self.consumer.end_cdata(self.state)
        } else {
            Flow::OK
        }
    }

    fn comment(&mut self, text: &str) -> Flow {
        if self.gate() {
            self.consumer.comment(self.state, text)
        } else {
            Flow::OK
        }
    }

    fn pi(&mut self, target: &str, data: &str) -> Flow {
        if self.gate() {
            self.consumer.pi(self.state, target, data)
        } else {
            Flow::OK
        }
    }

    fn doctype_start(
        &mut self,
        name: &str,
        sysid: Option<&str>,
        pubid: Option<&str>,
        internal_subset: bool,
    ) -> Flow {
        self.consumer
            .doctype_start(self.state, name, sysid, pubid, internal_subset)
    }

    fn doctype_end(&mut self) -> Flow {
        self.consumer.doctype_end(self.state)
    }

    fn entity_decl(&mut self, name: &str, value: Option<&str>) -> Flow {
        self.consumer.entity_decl(self.state, name, value)
    }

    fn default_data(&mut self, raw: &[u8]) -> Flow {
        if self.gate() {
            self.consumer.default_data(self.state, raw) & !Flow::UNHANDLED
        } else {
            Flow::OK
        }
    }
}

pub struct StdParser {
    pub flags: ParseFlags,
}

impl StdParser {
    pub fn new(flags: ParseFlags) -> Self {
        StdParser { flags }
    }

    /// Parse the interleaved FILE/`:XPATH` argument list.
    pub fn run_args<S: AsRef<str>>(
        &self,
        args: &[S],
        consumer: &mut dyn StdConsumer,
    ) -> Result<bool> {
        let mut ff = FileListFlags::empty();
        if self.flags.contains(ParseFlags::EQ1FILE) {
            ff |= FileListFlags::EQ1;
        }
        if self.flags.contains(ParseFlags::MIN1FILE) {
            ff |= FileListFlags::MIN1;
        }
        let fl = FileList::parse(args, ff);
        if self.flags.contains(ParseFlags::EQ1FILE) && fl.len() > 1 {
            return Err(XmlkitError::Usage("too many input files".into()));
        }
        if fl.has_xpaths() && self.flags.contains(ParseFlags::NOXPATHS) {
            return Err(XmlkitError::Usage(
                "command does not accept XPATH after filename(s)".into(),
            ));
        }
        self.run(&fl, consumer)
    }

    /// Walk every file; returns false if any file failed to parse
    /// (only reachable with `QUIET`, otherwise the error propagates).
    pub fn run(&self, files: &FileList, consumer: &mut dyn StdConsumer) -> Result<bool> {
        let mut state = StdState::new();
        let mut parsefail = false;

        for (file, xpaths) in files.entries() {
            if signal::quit_requested() {
                break;
            }
            state.reset();
            state.sel.set_patterns(xpaths)?;

            if !consumer.start_file(file, xpaths)? {
                continue;
            }

            let mut parser = EventParser::new();
            let mut adapter = SelectingAdapter {
                state: &mut state,
                consumer: &mut *consumer,
                flags: self.flags,
                chardata_seen: false,
                error: None,
            };

            let mut stream = ByteStream::open(file)?;
            let mut buf = Vec::new();
            let failed = loop {
                if signal::quit_requested() {
                    break false;
                }
                signal::process_pending_signal();
                let n = stream.read_block(&mut buf)?;
                let ok = if n == 0 {
                    let ok = parser.finish(&mut adapter);
                    if ok {
                        break false;
                    }
                    ok
                } else {
                    parser.feed(&buf, &mut adapter)
                };
                if !ok {
                    if let Some(e) = adapter.error.take() {
                        return Err(e);
                    }
                    if adapter.state.depth == 0 && adapter.state.maxdepth > 0 {
                        // clean end of the document
                        break false;
                    }
                    if parser.aborted() {
                        // consumer abort, not an error
                        break false;
                    }
                    if !self.flags.contains(ParseFlags::QUIET) {
                        return Err(XmlkitError::Parse {
                            file: file.to_string(),
                            message: parser.error_message().to_string(),
                            line: parser.cur.line,
                            column: parser.cur.column,
                            byte: parser.cur.byte,
                            depth: adapter.state.depth,
                        });
                    }
                    debug!(file, "parse failed: {}", parser.error_message());
                    break true;
                }
            };
            parsefail |= failed;

            if !consumer.end_file(file, xpaths)? {
                break;
            }
        }
        Ok(!parsefail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    struct Collect {
        flagged: Vec<String>,
        text: String,
        attrs: Vec<(String, String)>,
        files: Vec<String>,
    }

    impl Collect {
        fn new() -> Self {
            Collect {
                flagged: Vec::new(),
                text: String::new(),
                attrs: Vec::new(),
                files: Vec::new(),
            }
        }
    }

    impl StdConsumer for Collect {
        fn start_file(&mut self, file: &str, _xpaths: &[String]) -> Result<bool> {
            self.files.push(file.to_string());
            Ok(true)
        }
        fn start_tag(&mut self, state: &StdState, _name: &str, _attrs: &AttributeList) -> Flow {
            self.flagged.push(state.path.as_str().to_string());
            Flow::OK
        }
        fn attribute(&mut self, _state: &StdState, name: &str, value: &str) -> Flow {
            self.attrs.push((name.to_string(), value.to_string()));
            Flow::OK
        }
        fn chardata(&mut self, _state: &StdState, text: &str) -> Flow {
            self.text.push_str(text);
            Flow::OK
        }
    }

    fn write_file(dir: &tempfile::TempDir, name: &str, content: &str) -> String {
        let path = dir.path().join(name);
        std::fs::File::create(&path)
            .unwrap()
            .write_all(content.as_bytes())
            .unwrap();
        path.to_str().unwrap().to_string()
    }

    #[test]
    fn selection_gates_callbacks() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_file(&dir, "t.xml", "<r><x>hello</x><y>world</y></r>");
        let mut c = Collect::new();
        let args = [f, ":/r/x".to_string()];
        StdParser::new(ParseFlags::empty())
            .run_args(&args, &mut c)
            .unwrap();
        assert_eq!(c.flagged, ["/r/x"]);
        assert_eq!(c.text, "hello");
    }

    #[test]
    fn allnodes_sees_everything() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_file(&dir, "t.xml", "<r><x>hello</x></r>");
        let mut c = Collect::new();
        let args = [f, ":/r/nothing".to_string()];
        StdParser::new(ParseFlags::ALLNODES)
            .run_args(&args, &mut c)
            .unwrap();
        assert_eq!(c.flagged, ["/r", "/r/x"]);
    }

    #[test]
    fn attribute_callbacks_fire_for_selected_attributes() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_file(&dir, "t.xml", "<r><x k=\"1\" q=\"2\"/></r>");
        let mut c = Collect::new();
        let args = [f, ":/r/x@k".to_string()];
        StdParser::new(ParseFlags::empty())
            .run_args(&args, &mut c)
            .unwrap();
        assert_eq!(c.attrs, [("k".to_string(), "1".to_string())]);
    }

    #[test]
    fn default_pattern_selects_all() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_file(&dir, "t.xml", "<r><x>a</x></r>");
        let mut c = Collect::new();
        StdParser::new(ParseFlags::empty())
            .run_args(&[f], &mut c)
            .unwrap();
        assert_eq!(c.flagged, ["/r", "/r/x"]);
        assert_eq!(c.text, "a");
    }

    #[test]
    fn parse_error_reports_location() {
        let dir = tempfile::tempdir().unwrap();
        let f = write_file(&dir, "t.xml", "<r><x></r>");
        let mut c = Collect::new();
        let err = StdParser::new(ParseFlags::empty())
            .run_args(&[f], &mut c)
            .unwrap_err();
        match err {
            XmlkitError::Parse { line, .. } => assert_eq!(line, 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn quiet_records_failure_and_continues() {
        let dir = tempfile::tempdir().unwrap();
        let bad = write_file(&dir, "bad.xml", "<r><x></r>");
        let good = write_file(&dir, "good.xml", "<ok/>");
        let mut c = Collect::new();
        let clean = StdParser::new(ParseFlags::QUIET)
            .run_args(&[bad, good], &mut c)
            .unwrap();
        assert!(!clean);
        assert_eq!(c.files.len(), 2);
        assert!(c.flagged.contains(&"/ok".to_string()));
    }

    #[test]
    fn eq1file_rejects_two_files() {
        let mut c = Collect::new();
        let err = StdParser::new(ParseFlags::EQ1FILE)
            .run_args(&["a.xml", "b.xml"], &mut c)
            .unwrap_err();
        assert!(matches!(err, XmlkitError::Usage(_)));
    }
}
