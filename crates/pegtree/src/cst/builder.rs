use triomphe::Arc;

use super::{CstNode, NodeId, RootCstNode, TextOffset};
use crate::grammar::{ElemId, Grammar};

/// Restores the builder (and the caller's cursor) to an earlier state.
///
/// Rewinding truncates the arena, so a checkpoint is only valid as long as no
/// rewind to an even earlier state happened in between.
#[derive(Debug, Clone, Copy)]
pub struct Checkpoint {
    node_count: u32,
    current: NodeId,
    stack_top: usize,
    cursor: TextOffset,
}

/// Incremental CST construction over a [`RootCstNode`] arena.
///
/// `enter` opens a composite node and makes it current, `exit` closes it,
/// `leaf` appends a childless node to the current parent. While a node is
/// open its `link` field holds the previous current id, which encodes the
/// parent chain; `finalize` converts those temporary links into next-sibling
/// links in one pass.
pub struct CstBuilder {
    root: RootCstNode,
    stack: Vec<NodeId>,
    stack_top: usize,
    current: NodeId,
    finalized: bool,
}

impl CstBuilder {
    pub fn new(text: &str, grammar: Grammar) -> CstBuilder {
        CstBuilder {
            root: RootCstNode::new(text, grammar),
            stack: Vec::new(),
            stack_top: 0,
            current: NodeId::NONE,
            finalized: false,
        }
    }

    pub fn text(&self) -> &str {
        self.root.text()
    }

    pub fn shared_text(&self) -> std::sync::Arc<str> {
        self.root.shared_text()
    }

    pub fn node_count(&self) -> u32 {
        self.root.node_count()
    }

    pub fn mark(&self, cursor: TextOffset) -> Checkpoint {
        Checkpoint {
            node_count: self.root.node_count(),
            current: self.current,
            stack_top: self.stack_top,
            cursor,
        }
    }

    /// Truncate back to `checkpoint`; returns the saved cursor.
    pub fn rewind(&mut self, checkpoint: Checkpoint) -> TextOffset {
        self.root.truncate(checkpoint.node_count);
        self.current = checkpoint.current;
        self.stack_top = checkpoint.stack_top;
        checkpoint.cursor
    }

    /// Drop all nodes and start over on the same input.
    pub fn reset(&mut self) {
        self.root.truncate(0);
        self.current = NodeId::NONE;
        self.stack_top = 0;
        self.finalized = false;
    }

    /// Open a new composite node at `begin` and make it current.
    pub fn enter(&mut self, begin: TextOffset) {
        debug_assert!(!self.finalized);
        let parent = self.current;
        let id = self.root.alloc_node();
        if self.stack_top == self.stack.len() {
            self.stack.push(id);
        } else {
            self.stack[self.stack_top] = id;
        }
        self.stack_top += 1;
        self.current = id;
        *self.root.node_mut(id) = CstNode {
            begin,
            end: begin,
            elem: ElemId::NONE,
            link: parent,
            is_leaf: true,
            is_hidden: false,
            is_recovered: false,
        };
    }

    /// Close the current node, tagging it with the element that produced it.
    ///
    /// The node must have at least one child: its first child lives at
    /// `id + 1`, so a childless composite would alias the next sibling.
    pub fn exit(&mut self, end: TextOffset, elem: ElemId) {
        debug_assert!(!self.finalized);
        debug_assert!(self.stack_top > 0);
        debug_assert!(!self.current.is_none());

        let id = self.current;
        debug_assert!(
            self.root.node_count() > id.0 + 1,
            "exit on a node without children"
        );
        self.stack_top -= 1;
        let parent = if self.stack_top > 0 {
            self.stack[self.stack_top - 1]
        } else {
            NodeId::NONE
        };
        let n = self.root.node_mut(id);
        n.is_leaf = false;
        n.end = end;
        n.elem = elem;
        n.link = parent;
        self.current = parent;
    }

    /// Append a childless node to the current parent.
    pub fn leaf(
        &mut self,
        begin: TextOffset,
        end: TextOffset,
        elem: ElemId,
        hidden: bool,
        recovered: bool,
    ) {
        debug_assert!(!self.finalized);
        debug_assert!(begin <= end);
        let parent = self.current;
        let id = self.root.alloc_node();
        *self.root.node_mut(id) = CstNode {
            begin,
            end,
            elem,
            link: parent,
            is_leaf: true,
            is_hidden: hidden,
            is_recovered: recovered,
        };
        if recovered && !parent.is_none() {
            self.mark_recovered_ancestors(parent);
        }
    }

    /// Retag an already-emitted node with a different grammar element.
    pub fn override_grammar_element(&mut self, id: NodeId, elem: ElemId) {
        debug_assert!(!self.finalized);
        debug_assert!(id.0 < self.root.node_count());
        self.root.node_mut(id).elem = elem;
    }

    fn mark_recovered_ancestors(&mut self, mut parent: NodeId) {
        while !parent.is_none() {
            let n = self.root.node_mut(parent);
            n.is_recovered = true;
            parent = n.link;
        }
    }

    /// Convert temporary parent links into next-sibling links and hand the
    /// finished tree out. Idempotent via the `finalized` flag.
    pub fn finalize(mut self) -> Arc<RootCstNode> {
        self.finalize_links();
        Arc::new(self.root)
    }

    fn finalize_links(&mut self) {
        if self.finalized {
            return;
        }
        self.finalized = true;
        let n = self.root.node_count();
        if n == 0 {
            return;
        }

        let mut last_child = vec![NodeId::NONE; n as usize];
        let mut root_last = NodeId::NONE;

        for i in 0..n {
            let child = NodeId(i);
            let parent = self.root.node(child).link;
            self.root.node_mut(child).link = NodeId::NONE;

            if parent.is_none() {
                if !root_last.is_none() {
                    self.root.node_mut(root_last).link = child;
                }
                root_last = child;
                continue;
            }

            let last = last_child[parent.0 as usize];
            if !last.is_none() {
                self.root.node_mut(last).link = child;
            }
            last_child[parent.0 as usize] = child;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;

    fn empty_grammar() -> Grammar {
        GrammarBuilder::new().finish()
    }

    #[test]
    fn leaf_then_finalize() {
        let mut b = CstBuilder::new("ab", empty_grammar());
        b.leaf(0, 1, ElemId::NONE, false, false);
        b.leaf(1, 2, ElemId::NONE, false, false);
        let root = b.finalize();

        let texts: Vec<&str> = root.children().map(|c| c.text()).collect();
        assert_eq!(texts, ["a", "b"]);
    }

    #[test]
    fn enter_exit_builds_subtree() {
        let mut b = CstBuilder::new("abc", empty_grammar());
        b.enter(0);
        b.leaf(0, 1, ElemId::NONE, false, false);
        b.leaf(1, 3, ElemId::NONE, false, false);
        b.exit(3, ElemId::NONE);
        let root = b.finalize();

        let top: Vec<_> = root.children().collect();
        assert_eq!(top.len(), 1);
        assert_eq!(top[0].text(), "abc");
        assert!(!top[0].is_leaf());

        let kids: Vec<&str> = top[0].children().map(|c| c.text()).collect();
        assert_eq!(kids, ["a", "bc"]);
    }

    #[test]
    fn rewind_truncates() {
        let mut b = CstBuilder::new("abcd", empty_grammar());
        b.leaf(0, 1, ElemId::NONE, false, false);
        let cp = b.mark(1);
        b.enter(1);
        b.leaf(1, 2, ElemId::NONE, false, false);
        assert_eq!(b.node_count(), 3);

        let cursor = b.rewind(cp);
        assert_eq!(cursor, 1);
        assert_eq!(b.node_count(), 1);

        b.leaf(1, 4, ElemId::NONE, false, false);
        let root = b.finalize();
        let texts: Vec<&str> = root.children().map(|c| c.text()).collect();
        assert_eq!(texts, ["a", "bcd"]);
    }

    #[test]
    fn recovered_leaf_marks_open_ancestors() {
        let mut b = CstBuilder::new("xy", empty_grammar());
        b.enter(0);
        b.leaf(0, 1, ElemId::NONE, false, false);
        b.leaf(1, 1, ElemId::NONE, true, true);
        b.exit(2, ElemId::NONE);
        let root = b.finalize();

        let top: Vec<_> = root.children().collect();
        assert!(top[0].is_recovered());
        let kids: Vec<_> = top[0].children().collect();
        assert!(!kids[0].is_recovered());
        assert!(kids[1].is_recovered());
    }

    #[test]
    fn first_child_is_id_plus_one() {
        let mut b = CstBuilder::new("ab", empty_grammar());
        b.enter(0);
        b.leaf(0, 2, ElemId::NONE, false, false);
        b.exit(2, ElemId::NONE);
        let root = b.finalize();
        let parent = root.children().next().unwrap();
        let child = parent.children().next().unwrap();
        assert_eq!(child.id().index(), parent.id().index() + 1);
    }
}
