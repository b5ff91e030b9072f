//! Small CST search helpers used by entry-point materialization.

use crate::cst::{CstNodeView, NodeId, RootCstNode};
use crate::grammar::ElemId;

/// First visible root-level node produced by `elem`.
pub fn find_first_root_matching(root: &RootCstNode, elem: ElemId) -> Option<NodeId> {
    root.children()
        .find(|child| !child.is_hidden() && child.elem() == elem)
        .map(|child| child.id())
}

/// First visible node produced by `elem`, depth-first.
pub fn find_first_matching(root: &RootCstNode, elem: ElemId) -> Option<NodeId> {
    for child in root.children() {
        if let Some(found) = find_in(child, elem) {
            return Some(found);
        }
    }
    None
}

fn find_in(view: CstNodeView<'_>, elem: ElemId) -> Option<NodeId> {
    if !view.is_hidden() && view.elem() == elem {
        return Some(view.id());
    }
    for child in view.children() {
        if let Some(found) = find_in(child, elem) {
            return Some(found);
        }
    }
    None
}

/// First non-hidden child of a node.
pub fn first_visible_child<'a>(view: CstNodeView<'a>) -> Option<CstNodeView<'a>> {
    view.children().find(|child| !child.is_hidden())
}
