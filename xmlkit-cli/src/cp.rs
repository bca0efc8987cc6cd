//! `xmlkit cp`: copy the selection from source files into a target
//! document. Two passes: gather the source selection into an insert
//! payload, then rewrite the target threading the payload in at the
//! selection boundary.

use xmlkit_core::collect::{TempCollect, MAX_COLLECT_SIZE};
use xmlkit_core::input::STDIN_NAME;
use xmlkit_core::parser::Flow;
use xmlkit_core::rcm::{Rcm, RcmFlags};
use xmlkit_core::stdparse::{ParseFlags, StdConsumer, StdParser, StdState};
use xmlkit_core::{AttributeList, XmlkitError};

pub struct Options {
    pub prepend: bool,
    pub append: bool,
    pub multi: bool,
    pub write_files: bool,
}

/// Phase 1: collect everything inside the source selection.
struct Gather {
    sav: TempCollect,
    failed: Option<XmlkitError>,
}

impl Gather {
    fn check(&mut self, r: xmlkit_core::Result<()>) -> Flow {
        match r {
            Ok(()) => Flow::OK,
            Err(e) => {
                self.failed = Some(e);
                Flow::ABORT
            }
        }
    }
}

impl StdConsumer for Gather {
    fn start_tag(&mut self, state: &StdState, name: &str, attrs: &AttributeList) -> Flow {
        if state.sel.active {
            let r = self.sav.write_start_tag(name, attrs);
            self.check(r)
        } else if state.sel.attrib {
            // attribute selection copies the attribute values
            let path = state.path.as_str();
            for (aname, avalue) in attrs.iter() {
                if state.sel.check_attribute(path, aname) {
                    let r = self.sav.puts(avalue);
                    if self.check(r) == Flow::ABORT {
                        return Flow::ABORT;
                    }
                }
            }
            Flow::OK
        } else {
            Flow::OK
        }
    }

    fn end_tag(&mut self, state: &StdState, name: &str) -> Flow {
        if state.sel.active {
            let r = self.sav.write_end_tag(name);
            self.check(r)
        } else {
            Flow::OK
        }
    }

    fn chardata(&mut self, state: &StdState, text: &str) -> Flow {
        if state.sel.active {
            let r = self.sav.write_coded_entities(text.as_bytes());
            self.check(r)
        } else {
            Flow::OK
        }
    }

    fn default_data(&mut self, state: &StdState, raw: &[u8]) -> Flow {
        if state.sel.active {
            let r = self.sav.write(raw);
            self.check(r)
        } else {
            Flow::OK
        }
    }
}

/// Phase 2: emit the target with the payload threaded in.
struct Paste {
    rcm: Rcm,
    failed: Option<XmlkitError>,
}

impl Paste {
    fn check(&mut self, r: xmlkit_core::Result<()>) -> Flow {
        match r {
            Ok(()) => Flow::OK,
            Err(e) => {
                self.failed = Some(e);
                Flow::ABORT
            }
        }
    }
}

impl StdConsumer for Paste {
    fn start_file(&mut self, file: &str, _xpaths: &[String]) -> xmlkit_core::Result<bool> {
        if file == STDIN_NAME && self.rcm.flags.contains(RcmFlags::WRITE_FILES) {
            tracing::warn!("cannot write to stdin, ignoring this file");
            return Ok(false);
        }
        self.rcm.start_file(file, true)?;
        Ok(true)
    }

    fn end_file(&mut self, _file: &str, _xpaths: &[String]) -> xmlkit_core::Result<bool> {
        if !self.rcm.insert_consumed() && !self.rcm.flags.contains(RcmFlags::CP_MULTI) {
            tracing::warn!("missing target insertion point, nothing copied");
        }
        self.rcm.end_file()?;
        Ok(true)
    }

    fn start_tag(&mut self, state: &StdState, name: &str, attrs: &AttributeList) -> Flow {
        let r = self.rcm.cp_start_tag(state, name, attrs);
        self.check(r)
    }

    fn end_tag(&mut self, state: &StdState, name: &str) -> Flow {
        let r = self.rcm.cp_end_tag(state, name);
        self.check(r)
    }

    fn chardata(&mut self, state: &StdState, text: &str) -> Flow {
        let r = self.rcm.cp_chardata(state, text);
        self.check(r)
    }

    fn default_data(&mut self, state: &StdState, raw: &[u8]) -> Flow {
        let r = self.rcm.cp_default(state, raw);
        self.check(r)
    }
}

/// Split the argument list into sources and target: the target is the
/// last FILE token together with the path expressions that follow it.
fn split_target(args: &[String]) -> Option<(Vec<String>, Vec<String>)> {
    let last_file = args.iter().rposition(|a| !a.starts_with(':'))?;
    Some((args[..last_file].to_vec(), args[last_file..].to_vec()))
}

pub fn run(opts: Options, args: &[String]) -> xmlkit_core::Result<i32> {
    let (sources, target) = split_target(args)
        .ok_or_else(|| XmlkitError::Usage("cp needs a target file".into()))?;

    let mut gather = Gather {
        sav: TempCollect::new("sav", MAX_COLLECT_SIZE),
        failed: None,
    };
    StdParser::new(ParseFlags::ALLNODES | ParseFlags::ALWAYS_CHARDATA | ParseFlags::MIN1FILE)
        .run_args(&sources, &mut gather)?;
    if let Some(e) = gather.failed.take() {
        return Err(e);
    }

    let mut rcm = Rcm::new("xmlkit");
    rcm.flags |= if opts.prepend {
        RcmFlags::CP_PREPEND
    } else if opts.append {
        RcmFlags::CP_APPEND
    } else {
        RcmFlags::CP_REPLACE
    };
    if opts.multi {
        rcm.flags |= RcmFlags::CP_MULTI;
    }
    if opts.write_files {
        rcm.flags |= RcmFlags::WRITE_FILES;
    } else {
        rcm.flags |= RcmFlags::CP_OUTPUT;
        rcm.set_writer(Box::new(std::io::stdout()));
    }
    rcm.set_insert(gather.sav.copy_to_vec()?);

    let mut paste = Paste { rcm, failed: None };
    StdParser::new(ParseFlags::ALLNODES | ParseFlags::ALWAYS_CHARDATA | ParseFlags::EQ1FILE)
        .run_args(&target, &mut paste)?;
    if let Some(e) = paste.failed.take() {
        return Err(e);
    }
    Ok(0)
}
