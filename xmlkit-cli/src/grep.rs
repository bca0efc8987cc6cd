//! `xmlkit grep`: print nodes whose string value matches a pattern,
//! wrapped as a well-formed document. Exit status 0 on match, 1 on no
//! match.

use std::io::Write;

use regex::RegexBuilder;

use xmlkit_core::echo::Echo;
use xmlkit_core::filelist::{FileList, FileListFlags};
use xmlkit_core::leafparse::{LeafFlags, LeafReader};
use xmlkit_core::signal;
use xmlkit_core::unecho::{Unecho, UnechoFlags};
use xmlkit_core::Wrap;

pub fn run(pattern: &str, invert: bool, ignore_case: bool, args: &[String]) -> xmlkit_core::Result<i32> {
    let re = RegexBuilder::new(pattern)
        .case_insensitive(ignore_case)
        .build()?;

    let fl = FileList::parse(args, FileListFlags::MIN1);
    let wrap = Wrap::default();
    let mut echo = Echo::new(0);
    let mut unecho = Unecho::new(UnechoFlags::empty());
    let mut emitted = false;

    for (file, xpaths) in fl.entries() {
        if signal::quit_requested() {
            break;
        }
        let reader = LeafReader::open(
            file,
            xpaths,
            LeafFlags::PRE_CLOSE | LeafFlags::SKIP_EMPTY,
        )?;
        for leaf in reader {
            let leaf = leaf?;
            if !leaf.selected {
                continue;
            }
            if re.is_match(&leaf.value) != invert {
                emitted = true;
                // anchor the leaf under the synthetic wrap root
                let path = format!("/{}{}", wrap.root_tag(), leaf.path);
                let line = unecho.format_leaf(&path, &leaf.value);
                echo.puts(&line)?;
            }
        }
    }

    echo.close()?;
    let body = echo.into_output();
    let mut out = std::io::stdout().lock();
    if !body.is_empty() {
        out.write_all(wrap.headwrap().as_bytes())?;
        out.write_all(&body)?;
        out.write_all(wrap.footwrap().as_bytes())?;
    }
    out.flush()?;

    Ok(if emitted { 0 } else { 1 })
}
