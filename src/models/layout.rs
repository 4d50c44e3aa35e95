//! # Layout Tree
//!
//! Immutable binary split tree shared by editor panes and terminal session
//! groups. Children sit behind `Arc`, so every transform returns a new root
//! that shares all untouched subtrees with the old one.
//!
//! Every operation tolerates ids that are no longer in the tree and hands the
//! tree back unchanged; callers routinely race against entities that were
//! already removed.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_SPLIT_RATIO: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitDirection {
    Row,
    Column,
}

/// Branch of a split. A path is the list of branches taken from the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitPosition {
    First,
    Second,
}

impl SplitPosition {
    pub fn opposite(self) -> Self {
        match self {
            SplitPosition::First => SplitPosition::Second,
            SplitPosition::Second => SplitPosition::First,
        }
    }
}

/// Screen direction used for neighbour lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FocusDirection {
    Left,
    Right,
    Up,
    Down,
}

impl FocusDirection {
    fn axis(self) -> SplitDirection {
        match self {
            FocusDirection::Left | FocusDirection::Right => SplitDirection::Row,
            FocusDirection::Up | FocusDirection::Down => SplitDirection::Column,
        }
    }

    /// Branch a leaf must sit in for the movement to cross that split.
    fn origin(self) -> SplitPosition {
        match self {
            FocusDirection::Left | FocusDirection::Up => SplitPosition::Second,
            FocusDirection::Right | FocusDirection::Down => SplitPosition::First,
        }
    }
}

pub type LayoutPath = Vec<SplitPosition>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum LayoutTree<T> {
    Leaf {
        id: T,
    },
    Split {
        direction: SplitDirection,
        first: Arc<LayoutTree<T>>,
        second: Arc<LayoutTree<T>>,
        ratio: u8,
    },
}

impl<T: Clone + PartialEq> LayoutTree<T> {
    pub fn leaf(id: T) -> Self {
        LayoutTree::Leaf { id }
    }

    pub fn branch(direction: SplitDirection, first: Self, second: Self, ratio: u8) -> Self {
        LayoutTree::Split {
            direction,
            first: Arc::new(first),
            second: Arc::new(second),
            ratio: crate::utils::clamp_ratio(ratio),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, LayoutTree::Leaf { .. })
    }

    /// Depth-first search, `first` before `second`. The root leaf yields `[]`.
    pub fn find_path(&self, id: &T) -> Option<LayoutPath> {
        let mut path = Vec::new();
        self.find_path_into(id, &mut path).then_some(path)
    }

    fn find_path_into(&self, id: &T, path: &mut LayoutPath) -> bool {
        match self {
            LayoutTree::Leaf { id: leaf } => leaf == id,
            LayoutTree::Split { first, second, .. } => {
                path.push(SplitPosition::First);
                if first.find_path_into(id, path) {
                    return true;
                }
                path.pop();
                path.push(SplitPosition::Second);
                if second.find_path_into(id, path) {
                    return true;
                }
                path.pop();
                false
            }
        }
    }

    pub fn subtree(&self, path: &[SplitPosition]) -> Option<&Self> {
        let mut current = self;
        for step in path {
            current = current.child(*step)?;
        }
        Some(current)
    }

    fn child(&self, position: SplitPosition) -> Option<&Self> {
        match self {
            LayoutTree::Leaf { .. } => None,
            LayoutTree::Split { first, second, .. } => Some(match position {
                SplitPosition::First => first.as_ref(),
                SplitPosition::Second => second.as_ref(),
            }),
        }
    }

    /// Rebuild only the spine along `path`; siblings are shared. An empty path
    /// replaces the whole tree, a path that runs into a leaf changes nothing.
    pub fn replace_at_path(&self, path: &[SplitPosition], replacement: Self) -> Self {
        let Some((step, rest)) = path.split_first() else {
            return replacement;
        };
        match self {
            LayoutTree::Leaf { .. } => self.clone(),
            LayoutTree::Split {
                direction,
                first,
                second,
                ratio,
            } => {
                let (first, second) = match step {
                    SplitPosition::First => (
                        Arc::new(first.replace_at_path(rest, replacement)),
                        Arc::clone(second),
                    ),
                    SplitPosition::Second => (
                        Arc::clone(first),
                        Arc::new(second.replace_at_path(rest, replacement)),
                    ),
                };
                LayoutTree::Split {
                    direction: *direction,
                    first,
                    second,
                    ratio: *ratio,
                }
            }
        }
    }

    /// Remove a leaf, promoting its sibling into the parent's slot.
    /// Returns `None` only when the leaf was the entire tree.
    pub fn remove_leaf(&self, id: &T) -> Option<Self> {
        match self.find_path(id) {
            Some(path) => self.remove_at_path(&path),
            None => Some(self.clone()),
        }
    }

    fn remove_at_path(&self, path: &[SplitPosition]) -> Option<Self> {
        let Some((step, rest)) = path.split_first() else {
            return None;
        };
        match self {
            LayoutTree::Leaf { .. } => Some(self.clone()),
            LayoutTree::Split {
                direction,
                first,
                second,
                ratio,
            } => {
                let (target, sibling) = match step {
                    SplitPosition::First => (first, second),
                    SplitPosition::Second => (second, first),
                };
                match target.remove_at_path(rest) {
                    None => Some(sibling.as_ref().clone()),
                    Some(updated) => {
                        let updated = Arc::new(updated);
                        let (first, second) = match step {
                            SplitPosition::First => (updated, Arc::clone(second)),
                            SplitPosition::Second => (Arc::clone(first), updated),
                        };
                        Some(LayoutTree::Split {
                            direction: *direction,
                            first,
                            second,
                            ratio: *ratio,
                        })
                    }
                }
            }
        }
    }

    /// Turn the leaf `id` into `Split{direction, id, new_id, 50}`.
    pub fn split(&self, id: &T, direction: SplitDirection, new_id: T) -> Self {
        self.split_at(id, direction, SplitPosition::Second, new_id, DEFAULT_SPLIT_RATIO)
    }

    /// Like [`split`](Self::split) with the new leaf placed on `position`.
    pub fn split_at(
        &self,
        id: &T,
        direction: SplitDirection,
        position: SplitPosition,
        new_id: T,
        ratio: u8,
    ) -> Self {
        let Some(path) = self.find_path(id) else {
            return self.clone();
        };
        let existing = Self::leaf(id.clone());
        let fresh = Self::leaf(new_id);
        let node = match position {
            SplitPosition::First => Self::branch(direction, fresh, existing, ratio),
            SplitPosition::Second => Self::branch(direction, existing, fresh, ratio),
        };
        self.replace_at_path(&path, node)
    }

    /// Wrap the whole tree with a new leaf on the `second` side.
    pub fn append(&self, new_id: T, direction: SplitDirection) -> Self {
        Self::branch(direction, self.clone(), Self::leaf(new_id), DEFAULT_SPLIT_RATIO)
    }

    pub fn replace_leaf(&self, old: &T, new: T) -> Self {
        match self.find_path(old) {
            Some(path) => self.replace_at_path(&path, Self::leaf(new)),
            None => self.clone(),
        }
    }

    /// Keep the leaves accepted by `keep`, collapsing splits that lose a side.
    /// `None` when nothing survives.
    pub fn retain(&self, keep: &mut impl FnMut(&T) -> bool) -> Option<Self> {
        match self {
            LayoutTree::Leaf { id } => keep(id).then(|| self.clone()),
            LayoutTree::Split {
                direction,
                first,
                second,
                ratio,
            } => match (first.retain(keep), second.retain(keep)) {
                (Some(a), Some(b)) => Some(Self::branch(*direction, a, b, *ratio)),
                (Some(only), None) | (None, Some(only)) => Some(only),
                (None, None) => None,
            },
        }
    }

    /// Walk up from `id` to the nearest split on the requested axis that the
    /// movement crosses and return the first leaf on the far side.
    pub fn adjacent_leaf(&self, id: &T, direction: FocusDirection) -> Option<&T> {
        let path = self.find_path(id)?;
        let mut spine = Vec::with_capacity(path.len());
        let mut current = self;
        for step in &path {
            spine.push(current);
            current = current.child(*step)?;
        }
        for (node, step) in spine.into_iter().zip(path.iter()).rev() {
            if let LayoutTree::Split {
                direction: axis,
                first,
                second,
                ..
            } = node
            {
                if *axis == direction.axis() && *step == direction.origin() {
                    let other = match step {
                        SplitPosition::First => second,
                        SplitPosition::Second => first,
                    };
                    return Some(other.first_leaf());
                }
            }
        }
        None
    }

    pub fn first_leaf(&self) -> &T {
        match self {
            LayoutTree::Leaf { id } => id,
            LayoutTree::Split { first, .. } => first.first_leaf(),
        }
    }

    pub fn leaves(&self) -> Vec<T> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves(&self, out: &mut Vec<T>) {
        match self {
            LayoutTree::Leaf { id } => out.push(id.clone()),
            LayoutTree::Split { first, second, .. } => {
                first.collect_leaves(out);
                second.collect_leaves(out);
            }
        }
    }

    pub fn contains(&self, id: &T) -> bool {
        match self {
            LayoutTree::Leaf { id: leaf } => leaf == id,
            LayoutTree::Split { first, second, .. } => first.contains(id) || second.contains(id),
        }
    }

    pub fn leaf_count(&self) -> usize {
        match self {
            LayoutTree::Leaf { .. } => 1,
            LayoutTree::Split { first, second, .. } => first.leaf_count() + second.leaf_count(),
        }
    }
}
