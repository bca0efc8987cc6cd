//! Random-offset reads over a file through the block cache.

use std::fs::File;
use std::path::Path;

use crate::blockmgr::BlockManager;
use crate::error::XmlkitError;
use crate::Result;

pub struct FileBlockReader {
    file: File,
    size: u64,
    bm: BlockManager,
}

impl FileBlockReader {
    pub fn open(path: &Path, maxblocks: usize) -> Result<FileBlockReader> {
        let file = File::open(path)?;
        let meta = file.metadata()?;
        if meta.is_dir() {
            return Err(XmlkitError::IsDirectory(path.to_path_buf()));
        }
        let blksize = block_size(&meta);
        Ok(FileBlockReader {
            file,
            size: meta.len(),
            bm: BlockManager::new(blksize, maxblocks),
        })
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn blocksize(&self) -> usize {
        self.bm.blocksize()
    }

    /// Bytes from `offset` to the end of its block. A miss reads the
    /// whole owning block from disk; offsets within one block never
    /// cost more than one read.
    pub fn read(&mut self, offset: u64) -> Result<&[u8]> {
        if offset >= self.size {
            return Ok(&[]);
        }
        let blocksize = self.bm.blocksize() as u64;
        let blockid = offset / blocksize;
        let slot = match self.bm.find(blockid) {
            Some(slot) => slot,
            None => {
                let slot = self.bm.create_block();
                let n = read_at(&self.file, blockid * blocksize, self.bm.buffer_mut(slot))?;
                let block = self.bm.block_mut(slot);
                block.blockid = blockid;
                block.touch = 1;
                block.bytecount = n;
                self.bm.insert(slot);
                slot
            }
        };
        let block = self.bm.block(slot);
        let begin = ((offset % blocksize) as usize).min(block.bytecount);
        let end = block.bytecount;
        Ok(&self.bm.buffer(slot)[begin..end])
    }

    /// Bump the owning block's touch count without reading, keeping
    /// blocks near a cursor warm.
    pub fn touch(&mut self, offset: u64) -> bool {
        let blockid = offset / self.bm.blocksize() as u64;
        self.bm.find(blockid).is_some()
    }
}

#[cfg(unix)]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<usize> {
    use std::os::unix::fs::FileExt;
    let mut total = 0;
    while total < buf.len() {
        let n = file.read_at(&mut buf[total..], offset + total as u64)?;
        if n == 0 {
            break;
        }
        total += n;
    }
    Ok(total)
}

#[cfg(not(unix))]
fn read_at(file: &File, offset: u64, buf: &mut [u8]) -> Result<usize> {
    use std::io::{Read, Seek, SeekFrom};
    let mut f = file;
    f.seek(SeekFrom::Start(offset))?;
    let n = f.read(buf)?;
    Ok(n)
}

#[cfg(unix)]
fn block_size(meta: &std::fs::Metadata) -> usize {
    use std::os::unix::fs::MetadataExt;
    let bs = meta.blksize() as usize;
    if bs == 0 {
        4096
    } else {
        bs
    }
}

#[cfg(not(unix))]
fn block_size(_meta: &std::fs::Metadata) -> usize {
    4096
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample(dir: &tempfile::TempDir, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join("data.bin");
        std::fs::File::create(&path).unwrap().write_all(content).unwrap();
        path
    }

    #[test]
    fn reads_at_arbitrary_offsets() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, b"0123456789");
        let mut r = FileBlockReader::open(&path, 4).unwrap();
        assert_eq!(&r.read(0).unwrap()[..3], b"012");
        assert_eq!(&r.read(7).unwrap()[..3], b"789");
        assert_eq!(r.read(10).unwrap(), b"");
    }

    #[test]
    fn rereads_within_block_hit_the_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = sample(&dir, b"abcdef");
        let mut r = FileBlockReader::open(&path, 4).unwrap();
        r.read(0).unwrap();
        assert!(r.touch(3));
        // the same block still answers after the file shrinks on disk,
        // proving the second read never went to disk
        std::fs::write(&path, b"").unwrap();
        assert_eq!(&r.read(2).unwrap()[..2], b"cd");
    }
}
