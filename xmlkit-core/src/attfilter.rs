//! Trailing `@name` / `@*` attribute selector compiled per pattern.

use crate::escape::{rskip_unescaped_delimiter, skip_unescaped_delimiters};
use crate::pattern::{match_range, MatchOutcome};

#[derive(Debug, Clone, Default)]
pub struct AttrFilter {
    pattern: String,
    /// Byte range of the `@name` fragment, `@` included.
    att: Option<(usize, usize)>,
    precheck: bool,
}

impl AttrFilter {
    pub fn compile(pattern: &str) -> AttrFilter {
        let att = rskip_unescaped_delimiter(pattern, pattern.len(), b'@').map(|begin| {
            let end = skip_unescaped_delimiters(pattern, begin + 1, "/@=[]");
            (begin, end)
        });
        AttrFilter {
            pattern: pattern.to_string(),
            att,
            precheck: false,
        }
    }

    pub fn has_attr(&self) -> bool {
        self.att.is_some()
    }

    fn selector(&self) -> Option<&str> {
        self.att.map(|(b, e)| &self.pattern[b..e])
    }

    /// Does `name` satisfy the selector? `@*` accepts any attribute.
    pub fn matches_name(&self, name: &str) -> bool {
        match self.selector() {
            Some(sel) => sel == "@*" || &sel[1..] == name,
            None => false,
        }
    }

    pub fn precheck(&self) -> bool {
        match self.att {
            Some(_) => self.precheck,
            None => true,
        }
    }

    /// Precompute, at start-tag time, whether any of the tag's
    /// attributes can satisfy the selector.
    pub fn update<'a, I>(&mut self, attrs: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        if self.att.is_none() {
            return;
        }
        self.precheck = attrs.into_iter().any(|(name, _)| self.matches_name(name));
    }

    pub fn clear_precheck(&mut self) {
        self.precheck = false;
    }

    /// The selector's attribute name when its pattern prefix exactly
    /// matches `path`.
    pub fn selector_name_at(&self, path: &str) -> Option<String> {
        let (begin, _) = self.att?;
        if match_range(&self.pattern, begin, path) == MatchOutcome::Exact {
            self.selector().map(|s| s[1..].to_string())
        } else {
            None
        }
    }

    /// Full check at attribute level: the pattern prefix before `@`
    /// must exactly match `path` and the attribute name must satisfy
    /// the selector.
    pub fn check(&self, path: &str, name: &str) -> bool {
        match self.att {
            Some((begin, _)) => {
                self.matches_name(name)
                    && match_range(&self.pattern, begin, path) == MatchOutcome::Exact
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compiles_trailing_attribute() {
        let f = AttrFilter::compile("/a/b@k");
        assert!(f.has_attr());
        assert!(f.matches_name("k"));
        assert!(!f.matches_name("x"));

        let f = AttrFilter::compile("/a/b");
        assert!(!f.has_attr());
        assert!(f.precheck());
    }

    #[test]
    fn wildcard_attribute() {
        let f = AttrFilter::compile("/a@*");
        assert!(f.matches_name("anything"));
    }

    #[test]
    fn precheck_from_start_tag() {
        let mut f = AttrFilter::compile("/a@k");
        f.update([("q", "1"), ("k", "2")]);
        assert!(f.precheck());
        f.update([("q", "1")]);
        assert!(!f.precheck());
    }

    #[test]
    fn attribute_level_check() {
        let f = AttrFilter::compile("/a/b@k");
        assert!(f.check("/a/b", "k"));
        assert!(!f.check("/a", "k"));
        assert!(!f.check("/a/b", "q"));
    }
}
