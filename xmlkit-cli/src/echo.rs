//! `xmlkit echo`: render bracketed path/chardata strings as XML.

use std::io::Write;

use xmlkit_core::echo::{Echo, INDENT_ALL};
use xmlkit_core::Wrap;

pub fn run(indent: bool, strings: &[String]) -> xmlkit_core::Result<i32> {
    let wrap = Wrap::default();
    let mut echo = Echo::new(if indent { INDENT_ALL } else { 0 });
    for s in strings {
        echo.puts(s)?;
    }
    echo.close()?;

    let mut out = std::io::stdout().lock();
    out.write_all(wrap.headwrap().as_bytes())?;
    out.write_all(&echo.into_output())?;
    out.write_all(wrap.footwrap().as_bytes())?;
    out.flush()?;
    Ok(0)
}
