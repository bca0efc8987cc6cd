//! Shared command-line convention: filenames and `:path` expressions
//! interleave, and each path-expression group attaches to every
//! preceding file that does not have one yet.
//!
//! A leading path-expression group also attaches to the synthetic
//! `stdin` entry, which is only served when no real files were named
//! (or the flags ask for it). These are the documented, occasionally
//! surprising semantics; keep them.

use bitflags::bitflags;
use tracing::warn;

use crate::input::STDIN_NAME;

/// Prefix marking a command-line token as a path expression.
pub const XPATH_MAGIC: char = ':';

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct FileListFlags: u8 {
        /// Tool accepts exactly one file.
        const EQ1 = 1 << 0;
        /// Tool accepts stdin when no file is named.
        const MIN1 = 1 << 1;
        /// Tool accepts stdin plus one file when only one is named.
        const MIN2 = 1 << 2;
    }
}

#[derive(Debug)]
pub struct FileList {
    files: Vec<String>,
    /// Index into `groups` per file.
    assigned: Vec<Option<usize>>,
    groups: Vec<Vec<String>>,
    flags: FileListFlags,
    need_stdin: bool,
    has_xpaths: bool,
    has_multipaths: bool,
}

impl FileList {
    pub fn parse<S: AsRef<str>>(args: &[S], flags: FileListFlags) -> FileList {
        let mut fl = FileList {
            files: vec![STDIN_NAME.to_string()],
            assigned: vec![None],
            groups: vec![vec!["/".to_string()]],
            flags,
            need_stdin: false,
            has_xpaths: false,
            has_multipaths: false,
        };

        let mut i = 0;
        // first file whose group is still open for assignment
        let mut k = 0;
        while i < args.len() {
            let tok = args[i].as_ref();
            if !tok.starts_with(XPATH_MAGIC) {
                if fl.files.len() > 1 && flags.contains(FileListFlags::EQ1) {
                    warn!("this command accepts a single file, ignoring remaining");
                    break;
                }
                fl.files.push(tok.to_string());
                fl.assigned.push(None);
                i += 1;
            } else {
                if i == 0 {
                    fl.need_stdin = true;
                }
                let mut group = Vec::new();
                while i < args.len() && args[i].as_ref().starts_with(XPATH_MAGIC) {
                    group.push(args[i].as_ref()[1..].to_string());
                    i += 1;
                }
                if group.len() > 1 {
                    fl.has_multipaths = true;
                }
                fl.groups.push(group);
                let gid = fl.groups.len() - 1;
                for slot in &mut fl.assigned[k..] {
                    if slot.is_none() {
                        *slot = Some(gid);
                    }
                }
                k = fl.files.len();
                fl.has_xpaths = true;
            }
        }
        fl
    }

    /// Keep the synthetic stdin entry only when something refers to it.
    fn keep_stdin(&self) -> bool {
        let n = self.files.len();
        self.need_stdin
            || (self.flags.contains(FileListFlags::EQ1) && n == 1)
            || (self.flags.contains(FileListFlags::MIN1) && n == 1)
            || (self.flags.contains(FileListFlags::MIN2) && n == 2)
    }

    fn first(&self) -> usize {
        if self.keep_stdin() {
            0
        } else {
            1
        }
    }

    pub fn len(&self) -> usize {
        self.files.len() - self.first()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn has_xpaths(&self) -> bool {
        self.has_xpaths
    }

    pub fn has_multipaths(&self) -> bool {
        self.has_multipaths
    }

    /// Served (file, path-expressions) pairs, default group included.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.files
            .iter()
            .zip(self.assigned.iter())
            .skip(self.first())
            .map(|(f, a)| {
                let group = &self.groups[a.unwrap_or(0)];
                (f.as_str(), group.as_slice())
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str], flags: FileListFlags) -> FileList {
        FileList::parse(args, flags)
    }

    fn collect(fl: &FileList) -> Vec<(String, Vec<String>)> {
        fl.entries()
            .map(|(f, x)| (f.to_string(), x.to_vec()))
            .collect()
    }

    #[test]
    fn no_args_serves_stdin_with_default_path() {
        let fl = parse(&[], FileListFlags::MIN1);
        let e = collect(&fl);
        assert_eq!(e, vec![("stdin".to_string(), vec!["/".to_string()])]);
    }

    #[test]
    fn xpaths_attach_to_preceding_files() {
        let fl = parse(&["a.xml", "b.xml", ":/x", "c.xml"], FileListFlags::empty());
        let e = collect(&fl);
        assert_eq!(e.len(), 3);
        assert_eq!(e[0].1, vec!["/x"]);
        assert_eq!(e[1].1, vec!["/x"]);
        assert_eq!(e[2].1, vec!["/"]); // default
        assert!(fl.has_xpaths());
    }

    #[test]
    fn leading_xpath_binds_stdin() {
        let fl = parse(&[":/q", "a.xml", ":/r"], FileListFlags::empty());
        let e = collect(&fl);
        assert_eq!(e[0].0, "stdin");
        assert_eq!(e[0].1, vec!["/q"]);
        assert_eq!(e[1].0, "a.xml");
        assert_eq!(e[1].1, vec!["/r"]);
    }

    #[test]
    fn trailing_xpath_group_reaches_back_one_group_only() {
        // the documented surprise: ":/x" after a file also lands on the
        // synthetic stdin entry, which then stays hidden
        let fl = parse(&["a.xml", ":/x", ":/y"], FileListFlags::empty());
        let e = collect(&fl);
        assert_eq!(e.len(), 1);
        assert_eq!(e[0].1, vec!["/x", "/y"]);
        assert!(fl.has_multipaths());
    }

    #[test]
    fn eq1_ignores_extra_files() {
        let fl = parse(&["a.xml", "b.xml"], FileListFlags::EQ1);
        let e = collect(&fl);
        assert_eq!(e.len(), 1);
        assert_eq!(e[0].0, "a.xml");
    }
}
