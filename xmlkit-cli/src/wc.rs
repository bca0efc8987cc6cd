//! `xmlkit wc`: per-file node statistics (height, depth, tags), plus a
//! totals line when more than one file was counted.

use xmlkit_core::parser::Flow;
use xmlkit_core::stdparse::{ParseFlags, StdConsumer, StdParser, StdState};
use xmlkit_core::AttributeList;

#[derive(Default, Clone, Copy)]
struct Stats {
    tags: u64,
    depth: usize,
    /// Number of children of the root element.
    height: u64,
}

struct WcConsumer {
    file: Stats,
    summary: Stats,
    numfiles: u64,
}

impl StdConsumer for WcConsumer {
    fn start_file(&mut self, _file: &str, _xpaths: &[String]) -> xmlkit_core::Result<bool> {
        self.file = Stats::default();
        self.numfiles += 1;
        Ok(true)
    }

    fn start_tag(&mut self, state: &StdState, _name: &str, _attrs: &AttributeList) -> Flow {
        self.file.tags += 1;
        if state.depth == 2 {
            self.file.height += 1;
        }
        Flow::OK
    }

    fn end_file(&mut self, file: &str, xpaths: &[String]) -> xmlkit_core::Result<bool> {
        // maxdepth is not visible here; track it through depth instead
        self.summary.tags += self.file.tags;
        self.summary.depth = self.summary.depth.max(self.file.depth);
        self.summary.height += self.file.height;
        print!(
            "{:7} {:7} {:7} {}",
            self.file.height, self.file.depth, self.file.tags, file
        );
        for xp in xpaths {
            print!(" :{xp}");
        }
        println!();
        Ok(true)
    }

    fn end_tag(&mut self, state: &StdState, _name: &str) -> Flow {
        self.file.depth = self.file.depth.max(state.depth);
        Flow::OK
    }
}

pub fn run(args: &[String]) -> xmlkit_core::Result<i32> {
    let mut consumer = WcConsumer {
        file: Stats::default(),
        summary: Stats::default(),
        numfiles: 0,
    };
    StdParser::new(ParseFlags::MIN1FILE).run_args(args, &mut consumer)?;
    if consumer.numfiles > 1 {
        println!(
            "{:7} {:7} {:7} total",
            consumer.summary.height, consumer.summary.depth, consumer.summary.tags
        );
    }
    Ok(0)
}
