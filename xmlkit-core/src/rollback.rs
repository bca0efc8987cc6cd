//! Repairable write pipeline. Output goes to a sibling temp file that
//! is renamed over the target on commit, or unlinked on abort. A
//! process-global registry lets signal-time cleanup unlink whatever is
//! still pending; the `busy` flag gates cleanup away from mid-mutation
//! states.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::XmlkitError;
use crate::Result;

static REGISTRY: Mutex<Vec<(u64, PathBuf)>> = Mutex::new(Vec::new());
static BUSY: AtomicBool = AtomicBool::new(false);
static NEXT_ID: Mutex<u64> = Mutex::new(0);

fn register(id: u64, temp: &Path) {
    BUSY.store(true, Ordering::SeqCst);
    if let Ok(mut reg) = REGISTRY.lock() {
        reg.push((id, temp.to_path_buf()));
    }
    BUSY.store(false, Ordering::SeqCst);
}

fn unregister(id: u64) {
    BUSY.store(true, Ordering::SeqCst);
    if let Ok(mut reg) = REGISTRY.lock() {
        reg.retain(|(other, _)| *other != id);
    }
    BUSY.store(false, Ordering::SeqCst);
}

/// Unlink every registered temp file. Called on fatal signals and at
/// exit; skipped entirely while the registry is mid-mutation.
pub fn cleanup_all() {
    if BUSY.load(Ordering::SeqCst) {
        return;
    }
    if let Ok(reg) = REGISTRY.lock() {
        for (_, path) in reg.iter() {
            let _ = std::fs::remove_file(path);
        }
    }
}

/// A target file being rewritten under rollback discipline.
pub struct RollbackFile {
    id: u64,
    target: PathBuf,
    temp_path: PathBuf,
    file: Option<File>,
    committed: bool,
    closed: bool,
}

impl RollbackFile {
    /// Create `target.<progname>.XXXXXX` next to the target with
    /// exclusive-create semantics.
    pub fn open(target: &Path, progname: &str) -> Result<RollbackFile> {
        let dir = target.parent().filter(|p| !p.as_os_str().is_empty());
        let file_name = target
            .file_name()
            .ok_or_else(|| XmlkitError::Rollback(target.to_path_buf()))?;
        let named = tempfile::Builder::new()
            .prefix(&format!("{}.{}.", file_name.to_string_lossy(), progname))
            .rand_bytes(6)
            .tempfile_in(dir.unwrap_or_else(|| Path::new(".")))
            .map_err(|_| XmlkitError::Rollback(target.to_path_buf()))?;
        // keep() hands ownership to the registry + signal cleanup
        let (file, temp_path) = named
            .keep()
            .map_err(|_| XmlkitError::Rollback(target.to_path_buf()))?;
        let id = {
            let mut next = NEXT_ID.lock().unwrap();
            *next += 1;
            *next
        };
        register(id, &temp_path);
        Ok(RollbackFile {
            id,
            target: target.to_path_buf(),
            temp_path,
            file: Some(file),
            committed: false,
            closed: false,
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Mark the pending write for rename-on-close.
    pub fn commit(&mut self) {
        self.committed = true;
    }

    /// Rename on commit, unlink otherwise.
    pub fn close(mut self) -> Result<()> {
        self.do_close()
    }

    fn do_close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if let Some(f) = self.file.take() {
            drop(f);
        }
        let mut renamed = false;
        if self.committed {
            match std::fs::rename(&self.temp_path, &self.target) {
                Ok(()) => {
                    debug!(target = %self.target.display(), "rollback commit");
                    renamed = true;
                }
                Err(e) => {
                    warn!("failed to update {}: {e}", self.target.display());
                }
            }
        }
        if !renamed {
            let _ = std::fs::remove_file(&self.temp_path);
        }
        unregister(self.id);
        Ok(())
    }
}

impl Write for RollbackFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self.file.as_mut() {
            Some(f) => f.write(buf),
            None => Err(std::io::Error::other("rollback file closed")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self.file.as_mut() {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

impl Drop for RollbackFile {
    fn drop(&mut self) {
        let _ = self.do_close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn commit_renames_over_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.xml");
        std::fs::write(&target, b"old").unwrap();

        let mut rb = RollbackFile::open(&target, "xmlkit").unwrap();
        rb.write_all(b"new contents").unwrap();
        let temp = rb.temp_path.clone();
        assert!(temp.exists());
        rb.commit();
        rb.close().unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"new contents");
        assert!(!temp.exists());
    }

    #[test]
    fn abort_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.xml");
        std::fs::write(&target, b"old").unwrap();

        let mut rb = RollbackFile::open(&target, "xmlkit").unwrap();
        rb.write_all(b"new contents").unwrap();
        let temp = rb.temp_path.clone();
        rb.close().unwrap(); // no commit

        assert_eq!(std::fs::read(&target).unwrap(), b"old");
        assert!(!temp.exists());
    }

    #[test]
    fn drop_without_commit_unlinks_temp() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.xml");
        let temp = {
            let mut rb = RollbackFile::open(&target, "xmlkit").unwrap();
            rb.write_all(b"pending").unwrap();
            rb.temp_path.clone()
        };
        assert!(!temp.exists());
        assert!(!target.exists());
    }

    #[test]
    fn cleanup_all_removes_registered_temps() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.xml");
        let mut rb = RollbackFile::open(&target, "xmlkit").unwrap();
        rb.write_all(b"pending").unwrap();
        let temp = rb.temp_path.clone();
        cleanup_all();
        assert!(!temp.exists());
        // closing after cleanup is harmless
        rb.close().unwrap();
    }

    #[test]
    fn temp_name_carries_target_and_progname() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("data.xml");
        let rb = RollbackFile::open(&target, "xmlkit").unwrap();
        let name = rb.temp_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("data.xml.xmlkit."));
        assert_eq!(rb.temp_path.parent(), target.parent());
    }
}
