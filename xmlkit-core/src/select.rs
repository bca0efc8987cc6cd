//! Selection engine: decides, per event, whether the current tag,
//! string value, node or attribute is covered by one of the compiled
//! path patterns, with per-depth memoization.

use crate::attfilter::AttrFilter;
use crate::attlist::AttributeList;
use crate::error::XmlkitError;
use crate::history::History;
use crate::path::XmlPath;
use crate::pattern::{match_pattern, MatchOutcome};
use crate::predicate::PredicateSet;
use crate::Result;

pub const INFDEPTH: usize = usize::MAX;

/// One pattern with its predicates and attribute filter. Bundling the
/// three keeps their one-to-one alignment structural.
#[derive(Debug, Clone)]
pub struct CompiledPattern {
    pub pattern: String,
    pub preds: PredicateSet,
    pub attr: AttrFilter,
}

impl CompiledPattern {
    pub fn compile(pattern: &str) -> Result<CompiledPattern> {
        let preds = PredicateSet::compile(pattern).map_err(XmlkitError::Predicate)?;
        Ok(CompiledPattern {
            pattern: pattern.to_string(),
            preds,
            attr: AttrFilter::compile(pattern),
        })
    }
}

#[derive(Debug, Default)]
pub struct Selector {
    patterns: Vec<CompiledPattern>,
    history: History,
    /// Current node is inside a selected region.
    pub active: bool,
    /// Current start-tag has a selected attribute.
    pub attrib: bool,
    pub mindepth: usize,
    pub maxdepth: usize,
}

impl Selector {
    pub fn new() -> Self {
        Selector {
            patterns: Vec::new(),
            history: History::new(),
            active: false,
            attrib: false,
            mindepth: INFDEPTH,
            maxdepth: 0,
        }
    }

    /// Compile the pattern list for the next file.
    pub fn set_patterns<S: AsRef<str>>(&mut self, patterns: &[S]) -> Result<()> {
        self.patterns = patterns
            .iter()
            .map(|p| CompiledPattern::compile(p.as_ref()))
            .collect::<Result<_>>()?;
        self.reset();
        Ok(())
    }

    pub fn reset(&mut self) {
        for cp in &mut self.patterns {
            cp.preds.reset();
            cp.attr.clear_precheck();
        }
        self.history.reset();
        self.history.push_level(0);
        self.active = false;
        self.attrib = false;
        self.mindepth = INFDEPTH;
        self.maxdepth = 0;
    }

    pub fn has_patterns(&self) -> bool {
        !self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|cp| cp.pattern.as_str())
    }

    /// Evaluate every pattern against `path`; returns (tag, attribute)
    /// activity without touching the memo.
    fn find_matching(&mut self, path: &str) -> (bool, bool) {
        let mut tmatch = false;
        let mut amatch = false;
        for cp in &self.patterns {
            let m = match_pattern(&cp.pattern, path);
            let v = cp.preds.valid();
            tmatch |= !cp.attr.has_attr() && m.selects() && v;
            amatch |= cp.attr.has_attr()
                && cp.attr.precheck()
                && m == MatchOutcome::Exact
                && v;
        }
        (tmatch, amatch)
    }

    /// Locate (or create) the memo frame for `depth`. The walker visits
    /// depths monotonically, so the frame is the top, one below it, or
    /// needs a push/pop to line up.
    fn align_history(&mut self, depth: usize) -> Result<()> {
        let top = self.history.top();
        if top == depth {
            self.history.push_level(depth);
        } else if top == depth + 2 {
            self.history.pop_level(depth + 1);
        } else if top != depth + 1 {
            return Err(XmlkitError::Internal(format!(
                "selection history corrupted (depth={depth}, top={top})"
            )));
        }
        Ok(())
    }

    /// Start-tag / end-tag activation. `attrs` is present exactly at
    /// start-tag events, where predicates and prechecks advance.
    pub fn activate_tag(
        &mut self,
        depth: usize,
        path: &XmlPath,
        attrs: Option<&AttributeList>,
    ) -> Result<()> {
        if self.patterns.is_empty() {
            return Ok(());
        }
        self.align_history(depth)?;
        let cached = self.history.node_at(depth).and_then(|n| n.tag);
        let fresh = cached.is_none();
        if fresh {
            if let Some(attrs) = attrs {
                for cp in &mut self.patterns {
                    cp.preds.update(path.as_str());
                    cp.attr.update(attrs.iter());
                }
            }
        }
        let (tag, attrib) = match cached {
            Some(t) => (t, self.attrib),
            None => {
                let (t, a) = self.find_matching(path.as_str());
                if let Some(node) = self.history.node_at(depth) {
                    node.tag = Some(t);
                }
                (t, a)
            }
        };
        self.active = tag;
        self.attrib = attrib;
        if fresh && self.active {
            self.mindepth = self.mindepth.min(depth);
            self.maxdepth = self.maxdepth.max(depth);
        }
        Ok(())
    }

    pub fn activate_stringval(&mut self, depth: usize, path: &XmlPath) -> Result<()> {
        if self.patterns.is_empty() {
            return Ok(());
        }
        self.align_history(depth)?;
        let cached = self.history.node_at(depth).and_then(|n| n.stringval);
        let value = match cached {
            Some(v) => v,
            None => {
                let (t, _) = self.find_matching(path.as_str());
                if let Some(node) = self.history.node_at(depth) {
                    node.stringval = Some(t);
                }
                t
            }
        };
        self.active = value;
        Ok(())
    }

    /// Arbitrary-node activation, used by the leaf parser where events
    /// other than tags advance the position.
    pub fn activate_node(&mut self, depth: usize, path: &XmlPath) -> Result<()> {
        if self.patterns.is_empty() {
            return Ok(());
        }
        self.align_history(depth)?;
        let cached = self.history.node_at(depth).and_then(|n| n.node);
        let fresh = cached.is_none();
        if fresh {
            for cp in &mut self.patterns {
                cp.preds.update(path.as_str());
            }
        }
        let value = match cached {
            Some(v) => v,
            None => {
                let (t, _) = self.find_matching(path.as_str());
                if let Some(node) = self.history.node_at(depth) {
                    node.node = Some(t);
                }
                t
            }
        };
        self.active = value;
        Ok(())
    }

    /// Attribute activation; not memoized, the path already carries the
    /// `@name` extension.
    pub fn activate_attribute(&mut self, path: &XmlPath, name: &str) {
        self.active = self.check_attribute(path.as_str(), name);
    }

    /// Pure form of the attribute test, used by consumers that filter
    /// attribute lists without touching selection state.
    pub fn check_attribute(&self, path: &str, name: &str) -> bool {
        self.patterns.iter().any(|cp| cp.attr.check(path, name))
    }

    /// Attribute selectors whose pattern prefix exactly matches `path`,
    /// with the selector's attribute name.
    pub fn matching_attribute_selectors(&self, path: &str) -> Vec<String> {
        self.patterns
            .iter()
            .filter(|cp| cp.attr.has_attr())
            .filter_map(|cp| cp.attr.selector_name_at(path))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector(patterns: &[&str]) -> Selector {
        let mut s = Selector::new();
        s.set_patterns(patterns).unwrap();
        s
    }

    #[test]
    fn plain_pattern_activates_subtree() {
        let mut s = selector(&["/a/b"]);
        let mut path = XmlPath::new();
        let attrs = AttributeList::new();

        path.push_tag("a");
        s.activate_tag(1, &path, Some(&attrs)).unwrap();
        assert!(!s.active);

        path.push_tag("b");
        s.activate_tag(2, &path, Some(&attrs)).unwrap();
        assert!(s.active);

        path.push_tag("c");
        s.activate_tag(3, &path, Some(&attrs)).unwrap();
        assert!(s.active); // descendant of selection

        // end-tag side: popped path re-evaluates parent's memo
        path.pop();
        s.activate_tag(2, &path, None).unwrap();
        assert!(s.active);
        path.pop();
        s.activate_tag(1, &path, None).unwrap();
        assert!(!s.active);
    }

    #[test]
    fn memoized_answer_matches_fresh_answer() {
        let mut s = selector(&["/a//c"]);
        let mut path = XmlPath::new();
        let attrs = AttributeList::new();
        path.push_tag("a");
        s.activate_tag(1, &path, Some(&attrs)).unwrap();
        path.push_tag("b");
        s.activate_tag(2, &path, Some(&attrs)).unwrap();
        path.push_tag("c");
        s.activate_tag(3, &path, Some(&attrs)).unwrap();
        let first = s.active;
        // same depth, same path: second query must hit the memo
        s.activate_tag(3, &path, None).unwrap();
        assert_eq!(s.active, first);
        assert!(first);
    }

    #[test]
    fn positional_predicate_selects_second_sibling() {
        let mut s = selector(&["/r/a[2]"]);
        let mut path = XmlPath::new();
        let attrs = AttributeList::new();

        path.push_tag("r");
        s.activate_tag(1, &path, Some(&attrs)).unwrap();

        path.push_tag("a");
        s.activate_tag(2, &path, Some(&attrs)).unwrap();
        assert!(!s.active); // first <a>
        path.pop();
        s.activate_tag(1, &path, None).unwrap();

        path.push_tag("a");
        s.activate_tag(2, &path, Some(&attrs)).unwrap();
        assert!(s.active); // second <a>
    }

    #[test]
    fn attribute_selection() {
        let mut s = selector(&["/a@k"]);
        let mut path = XmlPath::new();
        let mut attrs = AttributeList::new();
        attrs.push("k", "1");

        path.push_tag("a");
        s.activate_tag(1, &path, Some(&attrs)).unwrap();
        assert!(!s.active); // tag itself is not selected
        assert!(s.attrib); // but one of its attributes is

        path.push_attribute("k");
        s.activate_attribute(&path, "k");
        assert!(s.active);
        path.pop_attribute();

        s.activate_attribute(&path, "q");
        assert!(!s.active);
    }

    #[test]
    fn default_slash_pattern_selects_everything() {
        let mut s = selector(&["/"]);
        let mut path = XmlPath::new();
        let attrs = AttributeList::new();
        path.push_tag("anything");
        s.activate_tag(1, &path, Some(&attrs)).unwrap();
        assert!(s.active);
    }

    #[test]
    fn min_max_depth_track_selected_region() {
        let mut s = selector(&["/a/b"]);
        let mut path = XmlPath::new();
        let attrs = AttributeList::new();
        path.push_tag("a");
        s.activate_tag(1, &path, Some(&attrs)).unwrap();
        path.push_tag("b");
        s.activate_tag(2, &path, Some(&attrs)).unwrap();
        path.push_tag("c");
        s.activate_tag(3, &path, Some(&attrs)).unwrap();
        assert_eq!(s.mindepth, 2);
        assert_eq!(s.maxdepth, 3);
    }
}
