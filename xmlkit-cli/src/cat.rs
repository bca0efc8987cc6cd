//! `xmlkit cat`: concatenate the XML contents of the input files into
//! a single well-formed document wrapped in the standard envelope.

use std::io::{BufWriter, Stdout, Write};

use xmlkit_core::filelist::{FileList, FileListFlags};
use xmlkit_core::input::ByteStream;
use xmlkit_core::parser::{Consumer, EventParser, Flow};
use xmlkit_core::signal;
use xmlkit_core::{AttributeList, Wrap, XmlkitError};

/// Byte filter neutralizing `<?xml` declarations: the literal `l`
/// becomes `_`, so concatenated documents cannot smuggle a second
/// declaration past a strict tokenizer. The state machine runs one
/// byte at a time because a buffer may end mid-pattern.
#[derive(Clone, Copy, Default)]
enum XdeclFilter {
    #[default]
    Idle,
    Langle,
    Qmark,
    Ex,
    Em,
}

impl XdeclFilter {
    fn apply(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *self = match (*self, *b) {
                (XdeclFilter::Idle, b'<') => XdeclFilter::Langle,
                (XdeclFilter::Langle, b'?') => XdeclFilter::Qmark,
                (XdeclFilter::Qmark, b'x') => XdeclFilter::Ex,
                (XdeclFilter::Ex, b'm') => XdeclFilter::Em,
                (XdeclFilter::Em, b'l') => {
                    *b = b'_';
                    XdeclFilter::Idle
                }
                _ => XdeclFilter::Idle,
            };
        }
    }
}

struct CatConsumer {
    out: BufWriter<Stdout>,
    wrap: Wrap,
    depth: usize,
    maxdepth: usize,
    started: bool,
    /// An end-tag's raw bytes are still in flight; pop the depth once
    /// they have been echoed.
    pop_after_echo: bool,
}

impl CatConsumer {
    fn echo(&mut self, raw: &[u8]) {
        let _ = self.out.write_all(raw);
    }
}

impl Consumer for CatConsumer {
    fn start_tag(&mut self, _name: &str, _attrs: &AttributeList) -> Flow {
        self.depth += 1;
        self.maxdepth = self.maxdepth.max(self.depth);
        if !self.started {
            self.started = true;
            let _ = self.out.write_all(self.wrap.headwrap().as_bytes());
            let _ = self.out.write_all(self.wrap.open_root().as_bytes());
            let _ = self.out.write_all(b"\n");
        }
        Flow::DEFAULT
    }

    fn end_tag(&mut self, _name: &str) -> Flow {
        // the raw `</tag>` is echoed by default_data; the depth must
        // not drop before then, or the root's close tag would be
        // gated out as epilog
        self.pop_after_echo = true;
        Flow::DEFAULT
    }

    fn default_data(&mut self, raw: &[u8]) -> Flow {
        // prolog and epilog bytes are dropped; the envelope replaces them
        if self.depth > 0 {
            self.echo(raw);
        }
        if self.pop_after_echo {
            self.pop_after_echo = false;
            self.depth -= 1;
        }
        Flow::OK
    }
}

pub fn run(args: &[String]) -> xmlkit_core::Result<i32> {
    let fl = FileList::parse(args, FileListFlags::MIN1);
    if fl.has_xpaths() {
        tracing::warn!("ignoring XPATH(s) after filename(s)");
    }

    let mut consumer = CatConsumer {
        out: BufWriter::new(std::io::stdout()),
        wrap: Wrap::default(),
        depth: 0,
        maxdepth: 0,
        started: false,
        pop_after_echo: false,
    };

    for (file, _) in fl.entries() {
        if signal::quit_requested() {
            break;
        }
        let mut stream = ByteStream::open(file)?;
        let mut parser = EventParser::new();
        let mut filter = XdeclFilter::default();
        let mut buf = Vec::new();
        let mut leading = true;
        consumer.depth = 0;
        consumer.maxdepth = 0;
        consumer.pop_after_echo = false;

        loop {
            signal::process_pending_signal();
            if signal::quit_requested() {
                break;
            }
            let n = stream.read_block(&mut buf)?;
            if n == 0 {
                if !parser.finish(&mut consumer) && !done(&parser, &consumer) {
                    return Err(parse_error(file, &parser, consumer.depth));
                }
                break;
            }
            filter.apply(&mut buf);
            let mut chunk: &[u8] = &buf;
            if leading {
                // plain text may precede the XML; skip to the first '<'
                match chunk.iter().position(|b| *b == b'<') {
                    Some(i) => {
                        chunk = &chunk[i..];
                        leading = false;
                    }
                    None => continue,
                }
            }
            if !parser.feed(chunk, &mut consumer) {
                if done(&parser, &consumer) {
                    break;
                }
                return Err(parse_error(file, &parser, consumer.depth));
            }
        }

        if consumer.depth > 0 {
            return Err(XmlkitError::Parse {
                file: file.to_string(),
                message: "incomplete XML".into(),
                line: parser.cur.line,
                column: parser.cur.column,
                byte: parser.cur.byte,
                depth: consumer.depth,
            });
        }
    }

    if consumer.started {
        let _ = consumer.out.write_all(consumer.wrap.close_root().as_bytes());
        let _ = consumer.out.write_all(consumer.wrap.footwrap().as_bytes());
    }
    let _ = consumer.out.flush();
    Ok(0)
}

fn done(parser: &EventParser, consumer: &CatConsumer) -> bool {
    // trailing bytes after a complete document are not an error here
    consumer.depth == 0 && consumer.maxdepth > 0 && !parser.suspended()
}

fn parse_error(file: &str, parser: &EventParser, depth: usize) -> XmlkitError {
    XmlkitError::Parse {
        file: file.to_string(),
        message: parser.error_message().to_string(),
        line: parser.cur.line,
        column: parser.cur.column,
        byte: parser.cur.byte,
        depth,
    }
}
