use std::collections::VecDeque;

use crate::common::{RecordId, Result};

use super::b_plus_tree::BPlusTree;
use super::key_comparator::{IndexKey, KeyComparator};

/// Entries copied out of one leaf while it was read-latched.
pub(crate) struct LeafBatch<K> {
    pub(crate) entries: Vec<(K, RecordId)>,
    /// Lower bound of the next leaf; `None` after the last leaf
    pub(crate) fence: Option<K>,
}

/// Forward cursor over the leaves in key order.
///
/// Each leaf is visited with a read-latched descent from the root, the same
/// way a point lookup is, and its entries are copied out before the latch is
/// dropped. No latch or pin is held between calls. The next leaf is found by
/// descending to the previous leaf's fence key, so keys come out strictly
/// ascending even while writers split or merge leaves.
pub struct IndexIterator<'a, K, C> {
    tree: &'a BPlusTree<K, C>,
    buffered: VecDeque<(K, RecordId)>,
    next_leaf: NextLeaf<K>,
}

enum NextLeaf<K> {
    First,
    From(K),
    Done,
}

impl<'a, K: IndexKey, C: KeyComparator<K>> IndexIterator<'a, K, C> {
    /// Positions a cursor at the first key >= `start`, or at the smallest
    /// key for `None`.
    pub(crate) fn new(tree: &'a BPlusTree<K, C>, start: Option<K>) -> Result<Self> {
        let mut iter = Self {
            tree,
            buffered: VecDeque::new(),
            next_leaf: match start {
                Some(key) => NextLeaf::From(key),
                None => NextLeaf::First,
            },
        };
        iter.fill()?;
        Ok(iter)
    }

    pub fn is_end(&self) -> bool {
        self.buffered.is_empty() && matches!(self.next_leaf, NextLeaf::Done)
    }

    /// Loads leaves until one yields entries or the tree runs out.
    fn fill(&mut self) -> Result<()> {
        while self.buffered.is_empty() {
            let start = match &self.next_leaf {
                NextLeaf::Done => return Ok(()),
                NextLeaf::First => None,
                NextLeaf::From(key) => Some(*key),
            };

            match self.tree.scan_leaf(start.as_ref())? {
                None => self.next_leaf = NextLeaf::Done,
                Some(batch) => {
                    self.buffered.extend(batch.entries);
                    self.next_leaf = batch.fence.map_or(NextLeaf::Done, NextLeaf::From);
                }
            }
        }
        Ok(())
    }
}

impl<K: IndexKey, C: KeyComparator<K>> Iterator for IndexIterator<'_, K, C> {
    type Item = Result<(K, RecordId)>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Err(e) = self.fill() {
            self.buffered.clear();
            self.next_leaf = NextLeaf::Done;
            return Some(Err(e));
        }
        self.buffered.pop_front().map(Ok)
    }
}
