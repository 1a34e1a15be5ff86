use smallvec::{SmallVec, smallvec};

use marionette_core::{AnimationError, Result};

use crate::tree::{AnimationTree, NodeHandle};

impl AnimationTree {
    /// Rejects attaching `child` below `parent` when `parent` is `child`
    /// itself or one of its descendants.
    pub(crate) fn check_acyclic(&self, parent: NodeHandle, child: NodeHandle) -> Result<()> {
        if parent == child || self.reaches(child, parent) {
            log::warn!("AnimationTree: attaching {child:?} below {parent:?} would close a cycle");
            return Err(AnimationError::CyclicGraph {
                parent: parent.index(),
                child: child.index(),
            });
        }
        Ok(())
    }

    /// Depth-first walk of `from`'s subtree looking for `target`. Each node
    /// is expanded at most once, so the walk is bounded by the arena size.
    pub(crate) fn reaches(&self, from: NodeHandle, target: NodeHandle) -> bool {
        let mut visited = vec![false; self.nodes.len()];
        let mut stack: SmallVec<[NodeHandle; 16]> = smallvec![from];

        while let Some(handle) = stack.pop() {
            if handle == target {
                return true;
            }
            if std::mem::replace(&mut visited[handle.index()], true) {
                continue;
            }
            stack.extend(self.nodes[handle.index()].kind.children());
        }
        false
    }
}
