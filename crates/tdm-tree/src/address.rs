//! External (row, column, parent) addressing.

#![allow(missing_docs)]

use crate::node::NodeId;

/// Address of one cell as seen by a view.
///
/// The node handle inside is generation-checked, so an address taken before
/// its node was removed resolves to [`TreeError::StaleAddress`] rather than to
/// another node. The root and every out-of-range lookup share the canonical
/// invalid address.
///
/// [`TreeError::StaleAddress`]: crate::error::TreeError::StaleAddress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ModelIndex {
    row: usize,
    column: usize,
    node: Option<NodeId>,
}

impl ModelIndex {
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            row: 0,
            column: 0,
            node: None,
        }
    }

    pub(crate) fn new(row: usize, column: usize, node: NodeId) -> Self {
        Self {
            row,
            column,
            node: Some(node),
        }
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.node.is_some()
    }

    #[must_use]
    pub fn row(&self) -> usize {
        self.row
    }

    #[must_use]
    pub fn column(&self) -> usize {
        self.column
    }

    #[must_use]
    pub fn node_id(&self) -> Option<NodeId> {
        self.node
    }
}
