//! `xmlkit fixtags`: stream possibly malformed XML through the repair
//! machine.

use std::io::Write;

use xmlkit_core::filelist::{FileList, FileListFlags};
use xmlkit_core::input::ByteStream;
use xmlkit_core::signal;
use xmlkit_core::Fixtags;

pub fn run(root_wrap: bool, args: &[String]) -> xmlkit_core::Result<i32> {
    let fl = FileList::parse(args, FileListFlags::EQ1);
    let mut out = std::io::stdout().lock();

    if let Some((file, _)) = fl.entries().next() {
        let mut stream = ByteStream::open(file)?;
        let mut ft = Fixtags::new(root_wrap);
        let mut buf = Vec::new();
        loop {
            signal::process_pending_signal();
            if signal::quit_requested() {
                break;
            }
            let n = stream.read_block(&mut buf)?;
            if n == 0 {
                break;
            }
            ft.filter(&buf)?;
            out.write_all(&ft.take_output())?;
        }
        ft.finish()?;
        out.write_all(&ft.take_output())?;
    }
    out.flush()?;
    Ok(0)
}
