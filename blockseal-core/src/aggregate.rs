//! Local hash tree aggregation of record digests

use blockseal_types::{AggregationResult, Error, HashAlgorithm, HashTreeNode, Imprint, Result};

/// Aggregates record digests into a single root submitted for timestamping.
///
/// Parent nodes hash `left_imprint || right_imprint || level`, where the
/// imprints carry their algorithm id byte and the level is the parent's
/// level as a single byte. For the two leaves of a block this yields a root
/// at level 1.
#[derive(Debug, Clone)]
pub struct Aggregator {
    algorithm: HashAlgorithm,
}

impl Aggregator {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    /// Aggregate the leaves in order. At least two are required.
    pub fn aggregate(&self, leaves: &[Imprint]) -> Result<AggregationResult> {
        if leaves.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "aggregation needs at least 2 leaves, got {}",
                leaves.len()
            )));
        }

        let mut builder = HashTreeBuilder::new(self.algorithm);
        for leaf in leaves {
            builder.add_leaf(leaf.clone());
        }

        let root = builder
            .build()
            .ok_or_else(|| Error::InvalidInput("aggregation produced no root".to_string()))?;
        Ok(AggregationResult {
            root: root.imprint,
            level: root.level,
        })
    }

    pub fn combine(&self, left: &HashTreeNode, right: &HashTreeNode) -> HashTreeNode {
        combine(self.algorithm, left, right)
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new(HashAlgorithm::LEDGER)
    }
}

fn combine(algorithm: HashAlgorithm, left: &HashTreeNode, right: &HashTreeNode) -> HashTreeNode {
    let level = left.level.max(right.level).saturating_add(1);
    let mut hasher = algorithm.hasher();
    hasher
        .update(&left.imprint.to_bytes())
        .update(&right.imprint.to_bytes())
        .update(&[level]);
    HashTreeNode {
        level,
        imprint: hasher.finalize(),
    }
}

/// Incremental builder keeping a stack of pending subtree heads.
///
/// Each new node is merged with the heads whose level does not exceed its
/// own, so the stack stays strictly decreasing in level from bottom to top.
/// `build` folds what is left from the right.
pub struct HashTreeBuilder {
    algorithm: HashAlgorithm,
    heads: Vec<HashTreeNode>,
    leaf_count: usize,
}

impl HashTreeBuilder {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        Self {
            algorithm,
            heads: Vec::new(),
            leaf_count: 0,
        }
    }

    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    pub fn add_leaf(&mut self, imprint: Imprint) {
        self.leaf_count += 1;
        let mut node = HashTreeNode::leaf(imprint);
        while let Some(head) = self.heads.pop() {
            if head.level > node.level {
                self.heads.push(head);
                break;
            }
            node = combine(self.algorithm, &head, &node);
        }
        self.heads.push(node);
    }

    /// Root of everything added so far, `None` if nothing was added
    pub fn build(self) -> Option<HashTreeNode> {
        let mut heads = self.heads.into_iter().rev();
        let mut root = heads.next()?;
        for head in heads {
            root = combine(self.algorithm, &head, &root);
        }
        Some(root)
    }
}
