//! Buffered byte input over a file or standard input, read in
//! filesystem-block-sized chunks.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::error::XmlkitError;
use crate::Result;

/// Name under which standard input appears in a file list.
pub const STDIN_NAME: &str = "stdin";

const DEFAULT_BLKSIZE: usize = 4096;

pub struct ByteStream {
    source: Source,
    pub blksize: usize,
}

enum Source {
    Stdin(io::Stdin),
    File(File),
}

impl ByteStream {
    /// `stdin` (or `-`) opens standard input.
    pub fn open(name: &str) -> Result<ByteStream> {
        if name == STDIN_NAME || name == "-" {
            return Ok(ByteStream {
                source: Source::Stdin(io::stdin()),
                blksize: DEFAULT_BLKSIZE,
            });
        }
        let path = Path::new(name);
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if meta.is_dir() {
            return Err(XmlkitError::IsDirectory(path.to_path_buf()));
        }
        let blksize = block_size(&meta);
        Ok(ByteStream {
            source: Source::File(file),
            blksize,
        })
    }

    /// Read up to one block; Ok(0) is end of input.
    pub fn read_block(&mut self, buf: &mut Vec<u8>) -> Result<usize> {
        buf.resize(self.blksize, 0);
        let n = match &mut self.source {
            Source::Stdin(s) => s.read(buf)?,
            Source::File(f) => f.read(buf)?,
        };
        buf.truncate(n);
        Ok(n)
    }
}

#[cfg(unix)]
fn block_size(meta: &std::fs::Metadata) -> usize {
    use std::os::unix::fs::MetadataExt;
    let bs = meta.blksize() as usize;
    if bs == 0 {
        DEFAULT_BLKSIZE
    } else {
        bs
    }
}

#[cfg(not(unix))]
fn block_size(_meta: &std::fs::Metadata) -> usize {
    DEFAULT_BLKSIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_file_in_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("x.xml");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"<a/>")
            .unwrap();
        let mut bs = ByteStream::open(path.to_str().unwrap()).unwrap();
        let mut buf = Vec::new();
        assert_eq!(bs.read_block(&mut buf).unwrap(), 4);
        assert_eq!(buf, b"<a/>");
        assert_eq!(bs.read_block(&mut buf).unwrap(), 0);
    }

    #[test]
    fn directories_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ByteStream::open(dir.path().to_str().unwrap()).is_err());
    }
}
