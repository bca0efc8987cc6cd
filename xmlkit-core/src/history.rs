//! Depth-indexed memo of selection decisions. One frame per open depth,
//! each holding three independently-cached answers.

/// Cached activity decisions for one depth.
#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryNode {
    pub node: Option<bool>,
    pub tag: Option<bool>,
    pub stringval: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct History {
    memo: Vec<HistoryNode>,
}

impl History {
    pub fn new() -> Self {
        History { memo: Vec::new() }
    }

    pub fn reset(&mut self) {
        self.memo.clear();
    }

    pub fn top(&self) -> usize {
        self.memo.len()
    }

    /// Push an undefined frame for `level`; only legal at the top.
    pub fn push_level(&mut self, level: usize) -> bool {
        if level == self.memo.len() {
            self.memo.push(HistoryNode::default());
            true
        } else {
            false
        }
    }

    /// Pop the frame for `level`; only legal for the topmost frame.
    pub fn pop_level(&mut self, level: usize) -> bool {
        if level + 1 == self.memo.len() {
            self.memo.pop();
            true
        } else {
            false
        }
    }

    pub fn node_at(&mut self, level: usize) -> Option<&mut HistoryNode> {
        if level + 1 == self.memo.len() {
            self.memo.get_mut(level)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_pop_is_depth_disciplined() {
        let mut h = History::new();
        assert!(h.push_level(0));
        assert!(!h.push_level(0)); // already there
        assert!(h.push_level(1));
        assert!(!h.pop_level(0)); // not the top
        assert!(h.pop_level(1));
        assert!(h.pop_level(0));
    }

    #[test]
    fn memo_survives_at_level() {
        let mut h = History::new();
        h.push_level(0);
        h.node_at(0).unwrap().tag = Some(true);
        assert_eq!(h.node_at(0).unwrap().tag, Some(true));
    }
}
