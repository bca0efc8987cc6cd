//! `xmlkit rm`: remove selected nodes, printing the remainder to
//! stdout or rewriting the files in place.

use xmlkit_core::input::STDIN_NAME;
use xmlkit_core::parser::Flow;
use xmlkit_core::rcm::{Rcm, RcmFlags};
use xmlkit_core::stdparse::{ParseFlags, StdConsumer, StdParser, StdState};
use xmlkit_core::{AttributeList, XmlkitError};

struct RmConsumer {
    rcm: Rcm,
    failed: Option<XmlkitError>,
}

impl RmConsumer {
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

impl StdConsumer for RmConsumer {
    fn start_file(&mut self, file: &str, _xpaths: &[String]) -> xmlkit_core::Result<bool> {
        if file == STDIN_NAME && self.rcm.flags.contains(RcmFlags::WRITE_FILES) {
            tracing::warn!("cannot write to stdin, ignoring this file");
            return Ok(false);
        }
        self.rcm.start_file(file, false)?;
        Ok(true)
    }

    fn end_file(&mut self, _file: &str, _xpaths: &[String]) -> xmlkit_core::Result<bool> {
        self.rcm.end_file()?;
        Ok(true)
    }

    fn start_tag(&mut self, state: &StdState, name: &str, attrs: &AttributeList) -> Flow {
        let r = self.rcm.rm_start_tag(state, name, attrs);
        self.check(r)
    }

    fn end_tag(&mut self, state: &StdState, name: &str) -> Flow {
        let r = self.rcm.rm_end_tag(state, name);
        self.check(r)
    }

    fn chardata(&mut self, state: &StdState, text: &str) -> Flow {
        let r = self.rcm.rm_chardata(state, text);
        self.check(r)
    }

    fn default_data(&mut self, state: &StdState, raw: &[u8]) -> Flow {
        let r = self.rcm.rm_default(state, raw);
        self.check(r)
    }
}

pub fn run(write_files: bool, args: &[String]) -> xmlkit_core::Result<i32> {
    let mut rcm = Rcm::new("xmlkit");
    if write_files {
        rcm.flags |= RcmFlags::WRITE_FILES;
    } else {
        rcm.flags |= RcmFlags::RM_OUTPUT;
        rcm.set_writer(Box::new(std::io::stdout()));
    }

    let n_files = args.iter().filter(|a| !a.starts_with(':')).count();
    if n_files > 1 && !write_files {
        return Err(XmlkitError::Usage(
            "too many input files (use --write-files)".into(),
        ));
    }

    let mut consumer = RmConsumer { rcm, failed: None };
    StdParser::new(ParseFlags::ALLNODES | ParseFlags::MIN1FILE).run_args(args, &mut consumer)?;
    if let Some(e) = consumer.failed.take() {
        return Err(e);
    }
    Ok(0)
}
