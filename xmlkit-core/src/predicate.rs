//! Positional `[n]` predicates compiled per pattern. Counters advance as
//! start-tag events arrive; a predicate holds once its step has been
//! entered for the n-th time at the matching position.

use crate::escape::skip_unescaped_delimiters;
use crate::pattern::{match_range, MatchOutcome};

#[derive(Debug, Clone)]
pub struct Predicate {
    /// Byte offset of this predicate's `[` in the pattern; the prefix
    /// before it is the step the predicate guards.
    pub offset: usize,
    target: u32,
    count: u32,
    value: bool,
}

impl Predicate {
    pub fn holds(&self) -> bool {
        self.value
    }
}

/// All positional predicates of one pattern, in step order.
#[derive(Debug, Clone, Default)]
pub struct PredicateSet {
    pattern: String,
    preds: Vec<Predicate>,
}

impl PredicateSet {
    /// Extract `[n]` fragments from `pattern`. Non-numeric or
    /// non-positive predicates are rejected.
    pub fn compile(pattern: &str) -> Result<PredicateSet, String> {
        let mut preds = Vec::new();
        let mut begin = 0;
        let end = pattern.len();
        while begin < end {
            let p = skip_unescaped_delimiters(pattern, begin, "[");
            if p < end {
                let close = skip_unescaped_delimiters(pattern, p, "]");
                let body = &pattern[p + 1..close.min(end)];
                let target: u32 = body.trim().parse().map_err(|_| body.to_string())?;
                if target == 0 {
                    return Err(body.to_string());
                }
                preds.push(Predicate {
                    offset: p,
                    target,
                    count: 0,
                    value: false,
                });
            }
            begin = p + 1;
        }
        Ok(PredicateSet {
            pattern: pattern.to_string(),
            preds,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.preds.is_empty()
    }

    pub fn reset(&mut self) {
        for p in &mut self.preds {
            p.count = 0;
            p.value = false;
        }
    }

    /// Valid iff every predicate holds. No predicates means always valid.
    pub fn valid(&self) -> bool {
        self.preds.iter().all(Predicate::holds)
    }

    /// Advance counters for a start-tag at `path`. When a step matches
    /// exactly, its counter bumps and all later predicates of the same
    /// pattern restart their counts.
    pub fn update(&mut self, path: &str) {
        let pattern = std::mem::take(&mut self.pattern);
        let mut j = 0;
        while j < self.preds.len() {
            let outcome = match_range(&pattern, self.preds[j].offset, path);
            match outcome {
                MatchOutcome::Exact => {
                    let p = &mut self.preds[j];
                    p.count += 1;
                    p.value = p.count == p.target;
                    for later in &mut self.preds[j + 1..] {
                        later.count = 0;
                    }
                }
                MatchOutcome::TargetPrefix | MatchOutcome::NoMatch => break,
                _ => {}
            }
            j += 1;
        }
        self.pattern = pattern;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_finds_offsets() {
        let ps = PredicateSet::compile("/a[2]/b[1]").unwrap();
        assert_eq!(ps.preds.len(), 2);
        assert_eq!(ps.preds[0].offset, 2); // the "[" after "/a"
        assert_eq!(ps.preds[0].target, 2);
        assert_eq!(ps.preds[1].offset, 7); // the "[" after "/a[2]/b"
    }

    #[test]
    fn rejects_non_positional() {
        assert!(PredicateSet::compile("/a[x]").is_err());
        assert!(PredicateSet::compile("/a[0]").is_err());
    }

    #[test]
    fn empty_set_is_always_valid() {
        let ps = PredicateSet::compile("/a/b").unwrap();
        assert!(ps.valid());
    }

    #[test]
    fn second_child_selected() {
        // /r/a[2]: valid only while inside the second <a>
        let mut ps = PredicateSet::compile("/r/a[2]").unwrap();
        ps.update("/r");
        ps.update("/r/a"); // first <a>
        assert!(!ps.valid());
        ps.update("/r/a"); // second <a>
        assert!(ps.valid());
        ps.update("/r/a"); // third <a>
        assert!(!ps.valid());
    }

    #[test]
    fn nested_counts_reset_under_new_parent() {
        // /r/a[1]/b[2]
        let mut ps = PredicateSet::compile("/r/a[1]/b[2]").unwrap();
        ps.update("/r");
        ps.update("/r/a");
        assert!(!ps.valid()); // a[1] holds, b[2] not yet
        ps.update("/r/a/b");
        assert!(!ps.valid());
        ps.update("/r/a/b");
        assert!(ps.valid());
    }
}
