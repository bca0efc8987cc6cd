//! Renders (path, string-value) pairs as bracketed strings suitable as
//! input to the echo formatter: `[/a/b@k=v]text`.

use bitflags::bitflags;

use crate::path::XmlPath;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct UnechoFlags: u8 {
        /// Always emit the full path, never a relative one.
        const ABSOLUTE = 1 << 0;
    }
}

#[derive(Debug, Default)]
pub struct Unecho {
    /// Path of the previously formatted leaf.
    cp: XmlPath,
    flags: UnechoFlags,
}

impl Unecho {
    pub fn new(flags: UnechoFlags) -> Self {
        Unecho {
            cp: XmlPath::new(),
            flags,
        }
    }

    pub fn reset(&mut self, flags: UnechoFlags) {
        self.cp.reset();
        self.flags = flags;
    }

    /// Format one leaf. The bracketed path is omitted when the leaf
    /// shares the previous leaf's path, and relative unless ABSOLUTE.
    pub fn format_leaf(&mut self, path: &str, value: &str) -> String {
        let mut out = String::new();
        if self.cp.as_str() != path {
            let target = XmlPath::from(path);
            out.push('[');
            if self.flags.contains(UnechoFlags::ABSOLUTE) || self.cp.is_empty() {
                out.push_str(path);
            } else {
                let mut rel = self.cp.clone();
                if rel.retarget(&target) {
                    out.push_str(rel.as_str());
                } else {
                    out.push_str(path);
                }
            }
            out.push(']');
            self.cp = target;
        }
        encode_value(&mut out, value);
        out
    }
}

/// Escape value text so the echo parser sees it as plain chardata.
/// Backslash itself is left alone so that `\Q`/`\q` CDATA markers
/// embedded by the leaf parser survive.
fn encode_value(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '[' => out.push_str("\\["),
            ']' => out.push_str("\\]"),
            other => out.push(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_leaf_is_absolute() {
        let mut ue = Unecho::new(UnechoFlags::empty());
        assert_eq!(ue.format_leaf("/a/b", "hello"), "[/a/b]hello");
    }

    #[test]
    fn following_leaves_are_relative() {
        let mut ue = Unecho::new(UnechoFlags::empty());
        ue.format_leaf("/a/b", "x");
        assert_eq!(ue.format_leaf("/a/c", "y"), "[../c]y");
        // same path, no bracket
        assert_eq!(ue.format_leaf("/a/c", "z"), "z");
    }

    #[test]
    fn absolute_flag_keeps_full_paths() {
        let mut ue = Unecho::new(UnechoFlags::ABSOLUTE);
        ue.format_leaf("/a/b", "x");
        assert_eq!(ue.format_leaf("/a/c", "y"), "[/a/c]y");
    }

    #[test]
    fn value_escapes() {
        let mut ue = Unecho::new(UnechoFlags::empty());
        assert_eq!(
            ue.format_leaf("/a", "line\nwith\ttabs [x]"),
            "[/a]line\\nwith\\ttabs \\[x\\]"
        );
    }
}
