//! `xmlkit unecho`: print an echo line for each leaf node.

use std::io::Write;

use xmlkit_core::filelist::{FileList, FileListFlags};
use xmlkit_core::leafparse::{LeafFlags, LeafReader};
use xmlkit_core::unecho::{Unecho, UnechoFlags};

pub fn run(xml_sed: bool, squeeze: bool, skip_empty: bool, args: &[String]) -> xmlkit_core::Result<i32> {
    let fl = FileList::parse(args, FileListFlags::EQ1);
    let mut out = std::io::stdout().lock();

    if let Some((file, xpaths)) = fl.entries().next() {
        let ue_flags = if xml_sed {
            UnechoFlags::ABSOLUTE
        } else {
            UnechoFlags::empty()
        };
        let mut lf_flags = LeafFlags::PRE_OPEN | LeafFlags::PRE_CLOSE;
        if squeeze {
            lf_flags |= LeafFlags::SQUEEZE;
        }
        if skip_empty {
            lf_flags |= LeafFlags::SKIP_EMPTY;
        }
        let mut unecho = Unecho::new(ue_flags);
        let reader = LeafReader::open(file, xpaths, lf_flags)?;
        for leaf in reader {
            let leaf = leaf?;
            if !leaf.selected {
                continue;
            }
            let line = unecho.format_leaf(&leaf.path, &leaf.value);
            out.write_all(line.as_bytes())?;
            if xml_sed {
                out.write_all(b"\n")?;
            }
        }
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(0)
}
