//! Arena node types shared by regression trees.

/// Zero-based feature column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct FeatureIndex(usize);

impl FeatureIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based feature column index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Position of a node in a tree's `Vec<Node>` arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
pub struct NodeIndex(usize);

impl NodeIndex {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    /// Return the zero-based arena index.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

/// Target variance of the samples at a node.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Impurity(f64);

impl Impurity {
    pub(crate) fn new(value: f64) -> Self {
        Self(value)
    }

    /// Return the variance.
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }
}

/// A node in a regression tree arena. Children are referenced by
/// [`NodeIndex`]; the root is at index 0.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Node {
    /// An interior split node.
    Split {
        /// Feature used for the split.
        feature: FeatureIndex,
        /// Samples with `feature <= threshold` go left.
        threshold: f64,
        /// Left child.
        left: NodeIndex,
        /// Right child.
        right: NodeIndex,
        /// Target variance before splitting.
        impurity: Impurity,
        /// Training samples that reached this node.
        n_samples: usize,
        /// Decrease in the sum of squared errors from this split.
        gain: f64,
    },
    /// A terminal leaf node.
    Leaf {
        /// Mean target of the samples in this leaf.
        value: f64,
        /// Target variance at this leaf.
        impurity: Impurity,
        /// Training samples in this leaf.
        n_samples: usize,
    },
}

impl Node {
    /// Return the target variance at this node.
    #[must_use]
    pub fn impurity(&self) -> Impurity {
        match self {
            Node::Split { impurity, .. } | Node::Leaf { impurity, .. } => *impurity,
        }
    }

    /// Return the number of training samples that reached this node.
    #[must_use]
    pub fn n_samples(&self) -> usize {
        match self {
            Node::Split { n_samples, .. } | Node::Leaf { n_samples, .. } => *n_samples,
        }
    }

    /// Return the leaf prediction, or `None` for a split.
    #[must_use]
    pub fn leaf_value(&self) -> Option<f64> {
        match self {
            Node::Leaf { value, .. } => Some(*value),
            Node::Split { .. } => None,
        }
    }

    /// Return `true` if this node is a leaf.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_round_trip() {
        assert_eq!(NodeIndex::new(42).index(), 42);
        assert!(FeatureIndex::new(1) < FeatureIndex::new(5));
    }

    #[test]
    fn node_accessors() {
        let leaf = Node::Leaf {
            value: 2.5,
            impurity: Impurity::new(0.25),
            n_samples: 10,
        };
        let split = Node::Split {
            feature: FeatureIndex::new(2),
            threshold: 3.5,
            left: NodeIndex::new(1),
            right: NodeIndex::new(2),
            impurity: Impurity::new(1.5),
            n_samples: 20,
            gain: 12.0,
        };
        assert!(leaf.is_leaf());
        assert!(!split.is_leaf());
        assert_eq!(leaf.leaf_value(), Some(2.5));
        assert_eq!(split.leaf_value(), None);
        assert_eq!(leaf.n_samples(), 10);
        assert_eq!(split.impurity().value(), 1.5);
    }
}
