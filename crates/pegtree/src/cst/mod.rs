//! The concrete syntax tree: a chunked arena of small nodes owned by a
//! [`RootCstNode`], plus lightweight views over it.
//!
//! Nodes are allocated in depth-first pre-order, so the first child of a
//! non-leaf node is always the node at `id + 1`. The `link` field of a node
//! plays two roles over its lifetime: while the tree is being built it holds
//! the id of the (still open) parent; [`CstBuilder::finalize`] converts it
//! into the next-sibling id, after which child access is O(1) arithmetic plus
//! a sibling chain.

mod builder;

pub use builder::{Checkpoint, CstBuilder};

use std::fmt;
use std::sync::Arc;

use crate::grammar::{ElemId, Grammar};

/// Byte offset into the parsed input. Inputs are limited to `u32::MAX - 1`
/// bytes.
pub type TextOffset = u32;

/// Identifier of a CST node inside its root's arena.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) const NONE: NodeId = NodeId(u32::MAX);

    #[inline]
    pub(crate) fn is_none(self) -> bool {
        self == NodeId::NONE
    }

    pub fn index(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "NodeId(none)")
        } else {
            write!(f, "NodeId({})", self.0)
        }
    }
}

/// One record in the arena. Trivially copyable; kept small so rewinding is a
/// plain count reset and chunk memory is reused across recovery attempts.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CstNode {
    pub(crate) begin: TextOffset,
    pub(crate) end: TextOffset,
    /// The grammar element that produced this node.
    pub(crate) elem: ElemId,
    /// Temporary parent id during construction, next sibling id afterwards.
    pub(crate) link: NodeId,
    pub(crate) is_leaf: bool,
    pub(crate) is_hidden: bool,
    pub(crate) is_recovered: bool,
}

impl CstNode {
    pub(crate) const EMPTY: CstNode = CstNode {
        begin: 0,
        end: 0,
        elem: ElemId::NONE,
        link: NodeId::NONE,
        is_leaf: true,
        is_hidden: false,
        is_recovered: false,
    };
}

const CHUNK_LEN: usize = 4096;
const CHUNK_SHIFT: u32 = 12;
const CHUNK_MASK: u32 = (CHUNK_LEN as u32) - 1;

/// Owns one parse's input text and the arena holding its CST.
///
/// Returned (behind an `Arc`) from every parse entry point; views into the
/// tree borrow from it.
pub struct RootCstNode {
    text: Arc<str>,
    grammar: Grammar,
    chunks: Vec<Box<[CstNode]>>,
    node_count: u32,
}

impl RootCstNode {
    pub(crate) fn new(text: &str, grammar: Grammar) -> RootCstNode {
        assert!(
            text.len() < u32::MAX as usize,
            "input text exceeds TextOffset capacity (4 GiB max)"
        );
        RootCstNode {
            text: Arc::from(text),
            grammar,
            chunks: Vec::new(),
            node_count: 0,
        }
    }

    /// The full input text this tree was parsed from.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn shared_text(&self) -> Arc<str> {
        Arc::clone(&self.text)
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn node_count(&self) -> u32 {
        self.node_count
    }

    /// View a node by id. Panics if `id` is out of range.
    pub fn view(&self, id: NodeId) -> CstNodeView<'_> {
        assert!(id.0 < self.node_count, "node id out of range");
        CstNodeView { root: self, id }
    }

    /// Iterate the root-level nodes (after finalization).
    pub fn children(&self) -> Children<'_> {
        let first = if self.node_count == 0 {
            NodeId::NONE
        } else {
            NodeId(0)
        };
        Children { root: self, cur: first }
    }

    #[inline]
    pub(crate) fn node(&self, id: NodeId) -> &CstNode {
        &self.chunks[(id.0 >> CHUNK_SHIFT) as usize][(id.0 & CHUNK_MASK) as usize]
    }

    #[inline]
    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut CstNode {
        &mut self.chunks[(id.0 >> CHUNK_SHIFT) as usize][(id.0 & CHUNK_MASK) as usize]
    }

    pub(crate) fn alloc_node(&mut self) -> NodeId {
        assert!(
            self.node_count < u32::MAX,
            "CST node count exceeds NodeId capacity"
        );
        let id = NodeId(self.node_count);
        self.node_count += 1;
        if (id.0 >> CHUNK_SHIFT) as usize == self.chunks.len() {
            self.chunks
                .push(vec![CstNode::EMPTY; CHUNK_LEN].into_boxed_slice());
        }
        id
    }

    pub(crate) fn truncate(&mut self, count: u32) {
        debug_assert!(count <= self.node_count);
        self.node_count = count;
    }
}

impl fmt::Debug for RootCstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn print(f: &mut fmt::Formatter<'_>, indent: usize, view: CstNodeView<'_>) -> fmt::Result {
            write!(
                f,
                "{:indent$}{}@{}..{}",
                "",
                view.root.grammar.label(view.elem()),
                view.begin(),
                view.end(),
            )?;
            if view.is_leaf() {
                write!(f, " {:?}", view.text())?;
            }
            if view.is_hidden() {
                write!(f, " (hidden)")?;
            }
            if view.is_recovered() {
                write!(f, " (recovered)")?;
            }
            writeln!(f)?;
            for child in view.children() {
                print(f, indent + 2, child)?;
            }
            Ok(())
        }

        for child in self.children() {
            print(f, 0, child)?;
        }
        Ok(())
    }
}

/// A lightweight reference to one CST node: the root plus a node id.
#[derive(Clone, Copy)]
pub struct CstNodeView<'a> {
    root: &'a RootCstNode,
    id: NodeId,
}

impl<'a> CstNodeView<'a> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn root(&self) -> &'a RootCstNode {
        self.root
    }

    /// The input slice this node covers.
    pub fn text(&self) -> &'a str {
        let n = self.root.node(self.id);
        &self.root.text[n.begin as usize..n.end as usize]
    }

    pub fn begin(&self) -> TextOffset {
        self.root.node(self.id).begin
    }

    pub fn end(&self) -> TextOffset {
        self.root.node(self.id).end
    }

    pub fn is_leaf(&self) -> bool {
        self.root.node(self.id).is_leaf
    }

    pub fn is_hidden(&self) -> bool {
        self.root.node(self.id).is_hidden
    }

    pub fn is_recovered(&self) -> bool {
        self.root.node(self.id).is_recovered
    }

    /// Id of the grammar element that produced this node.
    pub fn elem(&self) -> ElemId {
        self.root.node(self.id).elem
    }

    /// Iterate the direct children, hidden ones included.
    pub fn children(&self) -> Children<'a> {
        let first = if self.root.node(self.id).is_leaf {
            NodeId::NONE
        } else {
            NodeId(self.id.0 + 1)
        };
        Children { root: self.root, cur: first }
    }

    /// Iterate the direct children, skipping hidden ones.
    pub fn visible_children(self) -> impl Iterator<Item = CstNodeView<'a>> {
        self.children().filter(|c| !c.is_hidden())
    }
}

impl fmt::Debug for CstNodeView<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}..{}",
            self.root.grammar.label(self.elem()),
            self.begin(),
            self.end()
        )
    }
}

/// Sibling-chain iterator over the children of a node (or of the root).
pub struct Children<'a> {
    root: &'a RootCstNode,
    cur: NodeId,
}

impl<'a> Iterator for Children<'a> {
    type Item = CstNodeView<'a>;

    fn next(&mut self) -> Option<CstNodeView<'a>> {
        if self.cur.is_none() {
            return None;
        }
        let view = CstNodeView {
            root: self.root,
            id: self.cur,
        };
        self.cur = self.root.node(self.cur).link;
        Some(view)
    }
}
