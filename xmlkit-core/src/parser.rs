//! Event parser: wraps the tokenizer and drives a [`Consumer`] whose
//! callbacks return a [`Flow`] bitmask. `STOP` suspends delivery after
//! the current event (resume with [`EventParser::restart`]), `ABORT`
//! terminates, and `DEFAULT` requests that the raw source bytes of the
//! current event be fed to the consumer's `default_data` callback.
//!
//! A callback left at its default implementation reports `UNHANDLED`,
//! and its event falls through to `default_data` — the same routing an
//! unset handler gets from expat-style parsers.

use bitflags::bitflags;

use crate::attlist::AttributeList;
use crate::token::{Located, TokenError, Tokenizer, XmlEvent};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flow: u8 {
        const STOP = 1 << 0;
        const ABORT = 1 << 1;
        const DEFAULT = 1 << 2;
        /// Callback not overridden; event falls through to default_data.
        const UNHANDLED = 1 << 3;
    }
}

impl Flow {
    pub const OK: Flow = Flow::empty();
}

#[allow(unused_variables)]
pub trait Consumer {
    fn start_tag(&mut self, name: &str, attrs: &AttributeList) -> Flow {
        Flow::UNHANDLED
    }
    fn end_tag(&mut self, name: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn chardata(&mut self, text: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn start_cdata(&mut self) -> Flow {
        Flow::UNHANDLED
    }
    fn end_cdata(&mut self) -> Flow {
        Flow::UNHANDLED
    }
    fn comment(&mut self, text: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn pi(&mut self, target: &str, data: &str) -> Flow {
        Flow::UNHANDLED
    }
    fn doctype_start(
        &mut self,
        name: &str,
        sysid: Option<&str>,
        pubid: Option<&str>,
        internal_subset: bool,
    ) -> Flow {
        Flow::UNHANDLED
    }
    fn doctype_end(&mut self) -> Flow {
        Flow::UNHANDLED
    }
    fn entity_decl(&mut self, name: &str, value: Option<&str>) -> Flow {
        Flow::UNHANDLED
    }
    /// Raw source bytes of events nobody else claimed, or of events
    /// whose callback asked for `DEFAULT`.
    fn default_data(&mut self, raw: &[u8]) -> Flow {
        Flow::OK
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RStatus {
    Ok,
    Suspended,
    Aborted,
    Failed,
}

/// Position snapshot of the most recent event.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParsePosition {
    pub line: u64,
    pub column: u64,
    pub byte: u64,
    pub length: usize,
}

pub struct EventParser {
    tokenizer: Tokenizer,
    status: RStatus,
    error: Option<TokenError>,
    pub cur: ParsePosition,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        EventParser {
            tokenizer: Tokenizer::new(),
            status: RStatus::Ok,
            error: None,
            cur: ParsePosition::default(),
        }
    }

    pub fn reset(&mut self) {
        self.tokenizer.reset();
        self.status = RStatus::Ok;
        self.error = None;
        self.cur = ParsePosition::default();
    }

    pub fn status(&self) -> RStatus {
        self.status
    }

    pub fn ok(&self) -> bool {
        self.status == RStatus::Ok
    }

    pub fn aborted(&self) -> bool {
        self.status == RStatus::Aborted
    }

    pub fn suspended(&self) -> bool {
        self.status == RStatus::Suspended
    }

    pub fn error_message(&self) -> &str {
        self.error.as_ref().map(|e| e.message.as_str()).unwrap_or("")
    }

    /// Tokenizer element depth (open start-tags minus end-tags).
    pub fn depth(&self) -> usize {
        self.tokenizer.depth()
    }

    pub fn seen_root(&self) -> bool {
        self.tokenizer.seen_root()
    }

    /// Feed a chunk of input and deliver resulting events. Returns false
    /// once the parser has aborted, suspended or failed.
    pub fn feed(&mut self, bytes: &[u8], consumer: &mut dyn Consumer) -> bool {
        if self.status == RStatus::Failed || self.status == RStatus::Aborted {
            return false;
        }
        self.tokenizer.push_bytes(bytes);
        if self.status == RStatus::Suspended {
            // bytes are retained; delivery resumes on restart()
            return false;
        }
        self.drain_with(false, consumer)
    }

    /// Signal end of input, flushing trailing events.
    pub fn finish(&mut self, consumer: &mut dyn Consumer) -> bool {
        if self.status != RStatus::Ok {
            return false;
        }
        self.drain_with(true, consumer)
    }

    /// Re-enter delivery after a STOP.
    pub fn restart(&mut self, consumer: &mut dyn Consumer) -> bool {
        if self.status != RStatus::Suspended {
            return false;
        }
        self.status = RStatus::Ok;
        self.drain_with(false, consumer)
    }

    fn drain_with(&mut self, eof: bool, consumer: &mut dyn Consumer) -> bool {
        loop {
            match self.tokenizer.next_event(eof) {
                Ok(Some(located)) => {
                    self.cur = ParsePosition {
                        line: located.line,
                        column: located.column,
                        byte: located.byte,
                        length: located.len,
                    };
                    let flow = dispatch(consumer, &located);
                    if flow.contains(Flow::ABORT) {
                        self.status = RStatus::Aborted;
                        return false;
                    }
                    let flow = if flow.contains(Flow::UNHANDLED) || flow.contains(Flow::DEFAULT) {
                        consumer.default_data(&located.raw) & !Flow::UNHANDLED
                    } else {
                        flow
                    };
                    if flow.contains(Flow::ABORT) {
                        self.status = RStatus::Aborted;
                        return false;
                    }
                    if flow.contains(Flow::STOP) {
                        self.status = RStatus::Suspended;
                        return false;
                    }
                }
                Ok(None) => return true,
                Err(e) => {
                    self.cur.line = e.line;
                    self.cur.column = e.column;
                    self.cur.byte = e.byte;
                    self.error = Some(e);
                    self.status = RStatus::Failed;
                    return false;
                }
            }
        }
    }
}

fn dispatch(consumer: &mut dyn Consumer, located: &Located) -> Flow {
    match &located.event {
        XmlEvent::StartTag { name, attrs } => consumer.start_tag(name, attrs),
        XmlEvent::EndTag { name } => consumer.end_tag(name),
        XmlEvent::Chardata(text) => consumer.chardata(text),
        XmlEvent::CdataStart => consumer.start_cdata(),
        XmlEvent::CdataEnd => consumer.end_cdata(),
        XmlEvent::Comment(text) => consumer.comment(text),
        XmlEvent::Pi { target, data } => consumer.pi(target, data),
        XmlEvent::DoctypeStart {
            name,
            sysid,
            pubid,
            internal_subset,
        } => consumer.doctype_start(name, sysid.as_deref(), pubid.as_deref(), *internal_subset),
        XmlEvent::DoctypeEnd => consumer.doctype_end(),
        XmlEvent::EntityDecl { name, value } => consumer.entity_decl(name, value.as_deref()),
        XmlEvent::Default(raw) => consumer.default_data(raw) & !Flow::UNHANDLED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder {
        tags: Vec<String>,
        text: String,
        raw: Vec<u8>,
        stop_at: Option<String>,
    }

    impl Consumer for Recorder {
        fn start_tag(&mut self, name: &str, _attrs: &AttributeList) -> Flow {
            self.tags.push(name.to_string());
            if self.stop_at.as_deref() == Some(name) {
                Flow::STOP
            } else {
                Flow::OK
            }
        }
        fn chardata(&mut self, text: &str) -> Flow {
            self.text.push_str(text);
            Flow::OK
        }
        fn default_data(&mut self, raw: &[u8]) -> Flow {
            self.raw.extend_from_slice(raw);
            Flow::OK
        }
    }

    #[test]
    fn events_flow_to_overridden_callbacks() {
        let mut p = EventParser::new();
        let mut r = Recorder::default();
        assert!(p.feed(b"<a><b>hi</b></a>", &mut r));
        assert!(p.finish(&mut r));
        assert_eq!(r.tags, ["a", "b"]);
        assert_eq!(r.text, "hi");
    }

    #[test]
    fn unhandled_events_fall_through_to_default() {
        // end tags are not overridden by Recorder, so their raw bytes
        // arrive via default_data
        let mut p = EventParser::new();
        let mut r = Recorder::default();
        p.feed(b"<a>x</a>", &mut r);
        p.finish(&mut r);
        assert_eq!(r.raw, b"</a>");
    }

    #[test]
    fn stop_suspends_and_restart_resumes() {
        let mut p = EventParser::new();
        let mut r = Recorder {
            stop_at: Some("b".to_string()),
            ..Default::default()
        };
        assert!(!p.feed(b"<a><b/><c/></a>", &mut r));
        assert!(p.suspended());
        assert_eq!(r.tags, ["a", "b"]);
        assert!(p.restart(&mut r));
        p.finish(&mut r);
        assert_eq!(r.tags, ["a", "b", "c"]);
    }

    #[test]
    fn abort_is_distinguished_from_error() {
        struct Abort;
        impl Consumer for Abort {
            fn start_tag(&mut self, _: &str, _: &AttributeList) -> Flow {
                Flow::ABORT
            }
        }
        let mut p = EventParser::new();
        assert!(!p.feed(b"<a/>", &mut Abort));
        assert!(p.aborted());

        let mut p = EventParser::new();
        let mut r = Recorder::default();
        assert!(!p.feed(b"<a><<", &mut r));
        assert!(!p.aborted());
        assert_eq!(p.status(), RStatus::Failed);
        assert!(!p.error_message().is_empty());
    }

    #[test]
    fn position_reported_on_error() {
        let mut p = EventParser::new();
        let mut r = Recorder::default();
        p.feed(b"<a>\n<%</a>", &mut r);
        assert_eq!(p.status(), RStatus::Failed);
        assert_eq!(p.cur.line, 2);
    }
}
