//! Unbounded byte collection: memory-resident until a threshold, then
//! spilled to a private anonymous temp file. Readback streams the file
//! contents followed by whatever is still in memory.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};

use crate::attlist::AttributeList;
use crate::entities::{is_xml_whitespace, push_coded_entities, skip_xml_whitespace};
use crate::Result;

/// Default in-memory ceiling before spilling (64 MiB).
pub const MAX_COLLECT_SIZE: usize = 64 * 1024 * 1024;

/// Starting size for small collectors used as scratch variables.
pub const MIN_COLLECT_SIZE: usize = 1024;

pub struct TempCollect {
    name: &'static str,
    buf: Vec<u8>,
    max_buflen: usize,
    spill: Option<File>,
    spilled: u64,
}

impl TempCollect {
    pub fn new(name: &'static str, max_buflen: usize) -> Self {
        TempCollect {
            name,
            buf: Vec::new(),
            max_buflen,
            spill: None,
            spilled: 0,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.spill = None;
        self.spilled = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty() && self.spill.is_none()
    }

    /// Total bytes collected so far.
    pub fn tell(&self) -> u64 {
        self.spilled + self.buf.len() as u64
    }

    /// tempfile() gives an unlinked descriptor with CLOEXEC set, honouring
    /// TMPDIR; nothing to clean up if the process dies.
    fn flush_to_spill(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        if self.spill.is_none() {
            self.spill = Some(tempfile::tempfile()?);
        }
        let f = self.spill.as_mut().unwrap();
        f.seek(SeekFrom::End(0))?;
        f.write_all(&self.buf)?;
        self.spilled += self.buf.len() as u64;
        self.buf.clear();
        Ok(())
    }

    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if self.buf.len() + data.len() > self.max_buflen {
            self.flush_to_spill()?;
        }
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn puts(&mut self, s: &str) -> Result<()> {
        self.write(s.as_bytes())
    }

    pub fn putc(&mut self, c: u8) -> Result<()> {
        self.write(&[c])
    }

    pub fn nputc(&mut self, c: u8, n: usize) -> Result<()> {
        for _ in 0..n {
            self.putc(c)?;
        }
        Ok(())
    }

    /// Append with runs of whitespace coalesced to a single space. A run
    /// continuing from the previous write stays coalesced.
    pub fn squeeze(&mut self, data: &[u8]) -> Result<()> {
        let mut pending = if self.buf.last().copied().map(is_xml_whitespace).unwrap_or(
            // an empty, never-spilled collector behaves as if preceded by space
            self.spill.is_none() && self.buf.is_empty(),
        ) {
            skip_xml_whitespace(data)
        } else {
            data
        };
        let mut out = Vec::with_capacity(pending.len());
        while let Some(&c) = pending.first() {
            if is_xml_whitespace(c) {
                out.push(b' ');
                pending = skip_xml_whitespace(pending);
            } else {
                out.push(c);
                pending = &pending[1..];
            }
        }
        self.write(&out)
    }

    /// Append chardata with special bytes entity-encoded.
    pub fn write_coded_entities(&mut self, data: &[u8]) -> Result<()> {
        let mut coded = Vec::with_capacity(data.len());
        push_coded_entities(&mut coded, data);
        self.write(&coded)
    }

    pub fn write_start_tag(&mut self, name: &str, attrs: &AttributeList) -> Result<()> {
        self.putc(b'<')?;
        self.puts(name)?;
        for (k, v) in attrs.iter() {
            self.putc(b' ')?;
            self.puts(k)?;
            self.puts("=\"")?;
            self.puts(v)?;
            self.putc(b'"')?;
        }
        self.putc(b'>')
    }

    pub fn write_end_tag(&mut self, name: &str) -> Result<()> {
        self.puts("</")?;
        self.puts(name)?;
        self.putc(b'>')
    }

    /// Discard everything past `newlen`. Truncation into the spilled
    /// region rewinds the file as well.
    pub fn truncate(&mut self, newlen: u64) -> Result<()> {
        let total = self.tell();
        if newlen >= total {
            return Ok(());
        }
        let kill = total - newlen;
        if kill <= self.buf.len() as u64 {
            self.buf.truncate(self.buf.len() - kill as usize);
        } else if let Some(f) = self.spill.as_mut() {
            f.set_len(newlen)?;
            f.seek(SeekFrom::Start(newlen))?;
            self.spilled = newlen;
            self.buf.clear();
        }
        Ok(())
    }

    /// Borrow the memory-resident bytes. Only possible before any spill.
    pub fn peek(&self) -> Option<&[u8]> {
        if self.spill.is_none() {
            Some(&self.buf)
        } else {
            None
        }
    }

    /// Stream the collected bytes through `sink` in write order. The
    /// collector is drained in the process.
    pub fn drain_to<F>(&mut self, mut sink: F) -> Result<()>
    where
        F: FnMut(&[u8]) -> Result<()>,
    {
        if let Some(mut f) = self.spill.take() {
            self.flush_back(&mut f)?;
            f.seek(SeekFrom::Start(0))?;
            let mut chunk = vec![0u8; 64 * 1024];
            loop {
                let n = f.read(&mut chunk)?;
                if n == 0 {
                    break;
                }
                sink(&chunk[..n])?;
            }
            self.spilled = 0;
        }
        if !self.buf.is_empty() {
            sink(&self.buf)?;
            self.buf.clear();
        }
        Ok(())
    }

    fn flush_back(&mut self, f: &mut File) -> Result<()> {
        // pending memory bytes belong after the file contents
        if !self.buf.is_empty() {
            f.seek(SeekFrom::End(0))?;
            f.write_all(&self.buf)?;
            self.spilled += self.buf.len() as u64;
            self.buf.clear();
        }
        Ok(())
    }

    /// Copy the collected bytes into `out` without draining, by cloning
    /// through the sink path.
    pub fn copy_to_vec(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.drain_to(|chunk| {
            out.extend_from_slice(chunk);
            Ok(())
        })?;
        // restore as memory-resident so the collector stays usable
        self.buf = out.clone();
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attlist::AttributeList;

    #[test]
    fn collects_in_memory() {
        let mut tc = TempCollect::new("t", MAX_COLLECT_SIZE);
        tc.puts("hello ").unwrap();
        tc.puts("world").unwrap();
        assert_eq!(tc.tell(), 11);
        assert_eq!(tc.peek().unwrap(), b"hello world");
    }

    #[test]
    fn spills_past_threshold_and_reads_back_in_order() {
        let mut tc = TempCollect::new("t", 8);
        tc.puts("abcdefgh").unwrap();
        tc.puts("ijkl").unwrap();
        assert!(tc.peek().is_none());
        let mut out = Vec::new();
        tc.drain_to(|c| {
            out.extend_from_slice(c);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, b"abcdefghijkl");
    }

    #[test]
    fn squeeze_coalesces_whitespace_runs() {
        let mut tc = TempCollect::new("t", MAX_COLLECT_SIZE);
        tc.squeeze(b"  a \t\n b").unwrap();
        assert_eq!(tc.peek().unwrap(), b"a b");
        tc.squeeze(b"   c").unwrap();
        assert_eq!(tc.peek().unwrap(), b"a b c");
    }

    #[test]
    fn squeeze_coalesces_across_writes() {
        let mut tc = TempCollect::new("t", MAX_COLLECT_SIZE);
        tc.squeeze(b"a ").unwrap();
        tc.squeeze(b" b").unwrap();
        assert_eq!(tc.peek().unwrap(), b"a b");
    }

    #[test]
    fn truncate_memory_and_file() {
        let mut tc = TempCollect::new("t", MAX_COLLECT_SIZE);
        tc.puts("abcdef").unwrap();
        tc.truncate(3).unwrap();
        assert_eq!(tc.peek().unwrap(), b"abc");

        let mut tc = TempCollect::new("t", 4);
        tc.puts("abcd").unwrap();
        tc.puts("efgh").unwrap(); // forces spill of abcd
        tc.truncate(2).unwrap();
        let mut out = Vec::new();
        tc.drain_to(|c| {
            out.extend_from_slice(c);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, b"ab");
    }

    #[test]
    fn start_tag_rendering() {
        let mut tc = TempCollect::new("t", MAX_COLLECT_SIZE);
        let mut attrs = AttributeList::new();
        attrs.push("k", "v");
        tc.write_start_tag("a", &attrs).unwrap();
        tc.write_end_tag("a").unwrap();
        assert_eq!(tc.peek().unwrap(), b"<a k=\"v\"></a>");
    }
}
