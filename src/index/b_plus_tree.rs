use std::cmp::Ordering;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread;

use log::{debug, trace, warn};
use parking_lot::{RwLock, RwLockWriteGuard};

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{BurrowError, PageId, RecordId, Result, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::disk::PageStore;
use crate::storage::page::{HeaderPage, HeaderPageRef};

use super::b_plus_tree_internal_page::InternalPage;
use super::b_plus_tree_leaf_page::LeafPage;
use super::b_plus_tree_page::{page_type_of, set_parent_of, IndexPageType, TreeHeader, TreePage};
use super::index_iterator::{IndexIterator, LeafBatch};
use super::key_comparator::{IndexKey, KeyComparator};

/// Makes sure the header page exists at `HEADER_PAGE_ID`.
///
/// On an empty store this allocates it, so it must run before anything else
/// allocates pages. Safe to call concurrently: a caller that loses the race
/// for page 0 gives its page back, and the header is only initialized under
/// its latch when it is not valid yet.
pub fn bootstrap_header_page(bpm: &BufferPoolManager) -> Result<()> {
    if bpm.page_store().num_pages() == 0 {
        let page_id = bpm.new_page()?.page_id();
        if page_id != HEADER_PAGE_ID {
            bpm.delete_page(page_id)?;
        }
    }

    let mut guard = bpm.fetch_page_write(HEADER_PAGE_ID)?;
    if !HeaderPageRef::new(guard.data()).is_valid() {
        HeaderPage::new(guard.data_mut()).init();
        debug!("initialized header page");
    }
    Ok(())
}

/// Times `free_pages` retries a page that a departing reader still pins.
const DELETE_ATTEMPTS: usize = 64;

fn corrupted(msg: impl Into<String>) -> BurrowError {
    BurrowError::IndexCorrupted(msg.into())
}

fn take_spare(spare: &mut Vec<WritePageGuard>) -> Result<WritePageGuard> {
    spare
        .pop()
        .ok_or_else(|| corrupted("split needed more pages than were allocated"))
}

/// Slot of `node_id` in `parent` and the neighbour it rebalances with: the
/// left one, or the right one for the first child.
fn sibling_of<K: IndexKey>(parent: &WritePageGuard, node_id: PageId) -> Result<(usize, PageId)> {
    let parent = InternalPage::<_, K>::new(parent.data());
    let index = parent
        .value_index(node_id)
        .ok_or_else(|| corrupted(format!("{} is not a child of {}", node_id, parent.page_id())))?;
    let sibling_id = if index == 0 {
        parent.value_at(1)
    } else {
        parent.value_at(index - 1)
    };
    Ok((index, sibling_id))
}

#[derive(Debug, Clone, Copy)]
enum Operation {
    Insert,
    Remove,
}

impl Operation {
    /// Whether `page` absorbs this operation without splitting or merging.
    fn is_safe<P: TreePage>(self, page: &P) -> bool {
        match self {
            Operation::Insert => page.size() < page.max_size(),
            Operation::Remove => page.size() > page.min_size(),
        }
    }
}

/// Latches held by one write operation.
///
/// `write_set` is the path from the highest page that may still change down
/// to the parent of the page being worked on. The root lock is held only
/// while the root itself may change.
struct Context<'a> {
    root_guard: Option<RwLockWriteGuard<'a, PageId>>,
    write_set: Vec<WritePageGuard>,
    deleted_pages: Vec<PageId>,
}

impl<'a> Context<'a> {
    fn new(root_guard: RwLockWriteGuard<'a, PageId>) -> Self {
        Self {
            root_guard: Some(root_guard),
            write_set: Vec::new(),
            deleted_pages: Vec::new(),
        }
    }

    /// Unlatches and unpins every page above a safe page, top-down.
    fn release_ancestors(&mut self) {
        self.root_guard = None;
        self.write_set.clear();
    }

    fn root_page_id(&self) -> Result<PageId> {
        self.root_guard
            .as_ref()
            .map(|guard| **guard)
            .ok_or_else(|| corrupted("root latch released before descent"))
    }
}

/// A disk-resident B+Tree mapping unique fixed-width keys to record ids.
///
/// Safe to share between threads: readers and writers descend with latch
/// crabbing over the buffer pool's page latches. The root page id is kept
/// in the header page under the index name, so a tree can be reopened with
/// [`BPlusTree::new`].
pub struct BPlusTree<K, C> {
    index_name: String,
    bpm: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    root_page_id: RwLock<PageId>,
    _key: PhantomData<fn() -> K>,
}

impl<K: IndexKey, C: KeyComparator<K>> BPlusTree<K, C> {
    /// Opens the index `name`, creating an empty one if the header page has
    /// no record for it. Node sizes are as large as a page allows.
    pub fn new(name: &str, bpm: Arc<BufferPoolManager>, comparator: C) -> Result<Self> {
        Self::with_max_sizes(
            name,
            bpm,
            comparator,
            LeafPage::<&[u8], K>::MAX_SIZE_LIMIT,
            InternalPage::<&[u8], K>::MAX_SIZE_LIMIT,
        )
    }

    /// Like [`new`](Self::new) with explicit node capacities.
    /// `leaf_max_size` counts entries and `internal_max_size` children.
    pub fn with_max_sizes(
        name: &str,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        assert!(
            (2..=LeafPage::<&[u8], K>::MAX_SIZE_LIMIT).contains(&leaf_max_size),
            "leaf max size {leaf_max_size} out of range"
        );
        assert!(
            (3..=InternalPage::<&[u8], K>::MAX_SIZE_LIMIT).contains(&internal_max_size),
            "internal max size {internal_max_size} out of range"
        );

        bootstrap_header_page(&bpm)?;

        let root_page_id = {
            let mut guard = bpm.fetch_page_write(HEADER_PAGE_ID)?;
            let existing = HeaderPageRef::new(guard.data()).get_root_id(name);
            match existing {
                Some(root_page_id) => {
                    debug!("opened index {} with root {}", name, root_page_id);
                    root_page_id
                }
                None => {
                    HeaderPage::new(guard.data_mut()).insert_record(name, INVALID_PAGE_ID)?;
                    debug!("created index {}", name);
                    INVALID_PAGE_ID
                }
            }
        };

        Ok(Self {
            index_name: name.to_string(),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            root_page_id: RwLock::new(root_page_id),
            _key: PhantomData,
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    // ---------------------------------------------------------------------
    // Search
    // ---------------------------------------------------------------------

    /// Point lookup.
    pub fn get_value(&self, key: &K) -> Result<Option<RecordId>> {
        let Some((guard, _)) = self.find_leaf_for_read(Some(key))? else {
            return Ok(None);
        };
        Ok(LeafPage::<_, K>::new(guard.data()).lookup(key, &self.comparator))
    }

    /// Descends with read latches to the leaf that would hold `key`, or to
    /// the leftmost leaf when `key` is `None`. Each parent is released as
    /// soon as its child is latched.
    ///
    /// Also returns the leaf's upper fence: the nearest separator above it
    /// on the path, or `None` for the last leaf. Every key in the leaf is
    /// below the fence while the leaf stays latched.
    fn find_leaf_for_read(&self, key: Option<&K>) -> Result<Option<(ReadPageGuard, Option<K>)>> {
        let root = self.root_page_id.read();
        if !root.is_valid() {
            return Ok(None);
        }
        let mut guard = self.bpm.fetch_page_read(*root)?;
        drop(root);

        let mut fence = None;
        loop {
            let child = {
                let data = guard.data();
                if page_type_of(data)? == IndexPageType::Leaf {
                    None
                } else {
                    let node = InternalPage::<_, K>::new(data);
                    let index = match key {
                        Some(key) => node.lookup_index(key, &self.comparator),
                        None => 0,
                    };
                    if index + 1 < node.size() {
                        fence = Some(node.key_at(index + 1));
                    }
                    Some(node.value_at(index))
                }
            };

            match child {
                None => return Ok(Some((guard, fence))),
                Some(child) => guard = self.bpm.fetch_page_read(child)?,
            }
        }
    }

    /// Descends with write latches, keeping a page's ancestors latched only
    /// while the page is unsafe for `op`. Returns the leaf; the pages still
    /// held above it are in `ctx.write_set`.
    fn find_leaf_for_write(
        &self,
        ctx: &mut Context<'_>,
        key: &K,
        op: Operation,
    ) -> Result<WritePageGuard> {
        let mut page_id = ctx.root_page_id()?;

        loop {
            let guard = self.bpm.fetch_page_write(page_id)?;
            let (safe, child) = {
                let data = guard.data();
                if page_type_of(data)? == IndexPageType::Leaf {
                    (op.is_safe(&LeafPage::<_, K>::new(data)), None)
                } else {
                    let node = InternalPage::<_, K>::new(data);
                    (op.is_safe(&node), Some(node.lookup(key, &self.comparator)))
                }
            };

            if safe {
                ctx.release_ancestors();
            }

            match child {
                None => return Ok(guard),
                Some(child) => {
                    ctx.write_set.push(guard);
                    page_id = child;
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Insertion
    // ---------------------------------------------------------------------

    /// Inserts a unique key. Returns false, leaving the tree unchanged, if
    /// the key is already present.
    ///
    /// Every page a split can consume is allocated before the leaf changes,
    /// so a full pool fails the insert with the tree untouched.
    pub fn insert(&self, key: &K, value: RecordId) -> Result<bool> {
        let mut root_guard = self.root_page_id.write();
        if !root_guard.is_valid() {
            self.start_new_tree(&mut root_guard, key, value)?;
            return Ok(true);
        }

        let mut ctx = Context::new(root_guard);
        let mut leaf_guard = self.find_leaf_for_write(&mut ctx, key, Operation::Insert)?;

        let is_full = {
            let leaf = LeafPage::<_, K>::new(leaf_guard.data());
            if leaf.lookup(key, &self.comparator).is_some() {
                return Ok(false);
            }
            leaf.size() >= leaf.max_size()
        };

        let mut spare_pages = if is_full {
            self.allocate_pages(Self::split_page_count(&ctx))?
        } else {
            Vec::new()
        };

        LeafPage::<_, K>::new(leaf_guard.data_mut()).insert(key, value, &self.comparator);
        trace!("{}: inserted {:?} into {}", self.index_name, key, leaf_guard.page_id());

        if is_full {
            let mut sibling_guard = take_spare(&mut spare_pages)?;
            let sibling_id = sibling_guard.page_id();
            let separator = {
                let mut leaf = LeafPage::<_, K>::new(leaf_guard.data_mut());
                let mut sibling = LeafPage::<_, K>::new(sibling_guard.data_mut());
                sibling.init(sibling_id, leaf.parent_page_id(), self.leaf_max_size);
                leaf.move_half_to(&mut sibling);
                sibling.key_at(0)
            };
            debug!(
                "{}: split leaf {} into {}",
                self.index_name,
                leaf_guard.page_id(),
                sibling_id
            );
            self.insert_into_parent(
                &mut ctx,
                leaf_guard,
                separator,
                sibling_guard,
                &mut spare_pages,
            )?;
        }

        drop(ctx);
        self.release_pages(spare_pages)?;
        Ok(true)
    }

    /// Pages a split of the latched leaf consumes: one per level that
    /// overflows, plus a new root when every held level overflows. Held
    /// ancestors are full except possibly the topmost one.
    fn split_page_count(ctx: &Context<'_>) -> usize {
        let mut count = 1;
        for guard in ctx.write_set.iter().rev() {
            let header = TreeHeader(guard.data());
            if header.size() < header.max_size() {
                return count;
            }
            count += 1;
        }
        count + 1
    }

    /// Allocates `count` latched pages, or none at all.
    fn allocate_pages(&self, count: usize) -> Result<Vec<WritePageGuard>> {
        let mut pages = Vec::with_capacity(count);
        for _ in 0..count {
            match self.bpm.new_page_write() {
                Ok(guard) => pages.push(guard),
                Err(e) => {
                    self.release_pages(pages)?;
                    return Err(e);
                }
            }
        }
        Ok(pages)
    }

    /// Gives unused pages from [`allocate_pages`](Self::allocate_pages) back.
    fn release_pages(&self, pages: Vec<WritePageGuard>) -> Result<()> {
        let page_ids = pages.iter().map(|guard| guard.page_id()).collect();
        drop(pages);
        self.free_pages(page_ids)
    }

    fn start_new_tree(
        &self,
        root_guard: &mut RwLockWriteGuard<'_, PageId>,
        key: &K,
        value: RecordId,
    ) -> Result<()> {
        let mut guard = self.bpm.new_page_write()?;
        let page_id = guard.page_id();
        {
            let mut leaf = LeafPage::<_, K>::new(guard.data_mut());
            leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, value, &self.comparator);
        }
        drop(guard);

        **root_guard = page_id;
        self.update_root_record(page_id)?;
        debug!("{}: started tree at {}", self.index_name, page_id);
        Ok(())
    }

    /// Links a freshly split `right` page in after `left`, splitting
    /// ancestors for as long as they overflow. New pages come from `spare`.
    fn insert_into_parent(
        &self,
        ctx: &mut Context<'_>,
        mut left: WritePageGuard,
        mut key: K,
        mut right: WritePageGuard,
        spare: &mut Vec<WritePageGuard>,
    ) -> Result<()> {
        loop {
            let left_id = left.page_id();
            let right_id = right.page_id();

            let Some(mut parent_guard) = ctx.write_set.pop() else {
                // `left` was the root: grow the tree by one level
                let mut root_guard = take_spare(spare)?;
                let root_id = root_guard.page_id();
                {
                    let mut root = InternalPage::<_, K>::new(root_guard.data_mut());
                    root.init(root_id, INVALID_PAGE_ID, self.internal_max_size);
                    root.populate_new_root(left_id, &key, right_id);
                }
                set_parent_of(left.data_mut(), root_id);
                set_parent_of(right.data_mut(), root_id);
                drop((left, right, root_guard));

                self.set_root(ctx, root_id)?;
                debug!("{}: new root {}", self.index_name, root_id);
                return Ok(());
            };

            drop((left, right));

            let overflow = {
                let mut parent = InternalPage::<_, K>::new(parent_guard.data_mut());
                parent.insert_node_after(left_id, &key, right_id) > parent.max_size()
            };
            if !overflow {
                return Ok(());
            }

            let mut sibling_guard = take_spare(spare)?;
            let sibling_id = sibling_guard.page_id();
            let (separator, moved) = {
                let mut parent = InternalPage::<_, K>::new(parent_guard.data_mut());
                let mut sibling = InternalPage::<_, K>::new(sibling_guard.data_mut());
                sibling.init(sibling_id, parent.parent_page_id(), self.internal_max_size);
                let moved = parent.move_half_to(&mut sibling);
                (sibling.key_at(0), moved)
            };
            for child in moved {
                self.set_parent(child, sibling_id)?;
            }
            debug!(
                "{}: split internal {} into {}",
                self.index_name,
                parent_guard.page_id(),
                sibling_id
            );

            left = parent_guard;
            right = sibling_guard;
            key = separator;
        }
    }

    // ---------------------------------------------------------------------
    // Removal
    // ---------------------------------------------------------------------

    /// Removes `key`. Returns false if it was not present.
    ///
    /// Siblings needed for rebalancing are latched before the leaf changes,
    /// so a full pool fails the removal with the tree untouched.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let root_guard = self.root_page_id.write();
        if !root_guard.is_valid() {
            return Ok(false);
        }

        let mut ctx = Context::new(root_guard);
        let mut leaf_guard = self.find_leaf_for_write(&mut ctx, key, Operation::Remove)?;

        if LeafPage::<_, K>::new(leaf_guard.data())
            .lookup(key, &self.comparator)
            .is_none()
        {
            return Ok(false);
        }

        let siblings = self.latch_siblings(&ctx, &leaf_guard)?;

        LeafPage::<_, K>::new(leaf_guard.data_mut()).remove(key, &self.comparator);
        trace!("{}: removed {:?} from {}", self.index_name, key, leaf_guard.page_id());

        self.coalesce_or_redistribute(&mut ctx, leaf_guard, siblings)?;

        // Emptied pages go back to the pool once nothing is latched.
        let deleted = std::mem::take(&mut ctx.deleted_pages);
        drop(ctx);
        self.free_pages(deleted)?;

        Ok(true)
    }

    /// Latches, bottom-up, the neighbour each level will merge with or
    /// borrow from once `leaf` loses an entry. Stops at the first level
    /// that stays large enough or only borrows.
    fn latch_siblings(
        &self,
        ctx: &Context<'_>,
        leaf: &WritePageGuard,
    ) -> Result<Vec<WritePageGuard>> {
        let mut siblings = Vec::new();
        let mut parents = ctx.write_set.iter().rev();
        let mut node = leaf;

        loop {
            let (is_root, size, min_size, max_size) = {
                let header = TreeHeader(node.data());
                (header.is_root(), header.size(), header.min_size(), header.max_size())
            };
            if is_root || size > min_size {
                return Ok(siblings);
            }

            let parent = parents.next().ok_or_else(|| {
                corrupted(format!("parent of underfull {} was released", node.page_id()))
            })?;
            let (_, sibling_id) = sibling_of::<K>(parent, node.page_id())?;
            let sibling = self.bpm.fetch_page_write(sibling_id)?;
            let merges = size - 1 + TreeHeader(sibling.data()).size() <= max_size;
            siblings.push(sibling);

            if !merges {
                return Ok(siblings);
            }
            node = parent;
        }
    }

    /// Restores the size bounds from `node` upward after a removal, using
    /// the neighbours [`latch_siblings`](Self::latch_siblings) collected.
    fn coalesce_or_redistribute(
        &self,
        ctx: &mut Context<'_>,
        node: WritePageGuard,
        siblings: Vec<WritePageGuard>,
    ) -> Result<()> {
        let mut node = node;
        let mut siblings = siblings.into_iter();

        loop {
            let (is_root, is_leaf, size, min_size, max_size) = {
                let header = TreeHeader(node.data());
                (
                    header.is_root(),
                    header.is_leaf(),
                    header.size(),
                    header.min_size(),
                    header.max_size(),
                )
            };

            if is_root {
                return self.adjust_root(ctx, node);
            }
            if size >= min_size {
                return Ok(());
            }

            let node_id = node.page_id();
            let mut parent_guard = ctx.write_set.pop().ok_or_else(|| {
                corrupted(format!("parent of underfull {} was released", node_id))
            })?;
            let (index, sibling_id) = sibling_of::<K>(&parent_guard, node_id)?;

            let sibling_guard = siblings
                .next()
                .filter(|guard| guard.page_id() == sibling_id)
                .ok_or_else(|| {
                    corrupted(format!("sibling {} of {} not latched", sibling_id, node_id))
                })?;
            let sibling_size = TreeHeader(sibling_guard.data()).size();

            if size + sibling_size <= max_size {
                // Always fold the right page into the left one
                if index == 0 {
                    self.coalesce(ctx, node, sibling_guard, &mut parent_guard, 1, is_leaf)?;
                } else {
                    self.coalesce(ctx, sibling_guard, node, &mut parent_guard, index, is_leaf)?;
                }
                node = parent_guard;
            } else {
                return self.redistribute(node, sibling_guard, &mut parent_guard, index, is_leaf);
            }
        }
    }

    /// Moves everything from `right` into `left` and drops `right`'s slot
    /// from the parent.
    fn coalesce(
        &self,
        ctx: &mut Context<'_>,
        mut left: WritePageGuard,
        mut right: WritePageGuard,
        parent: &mut WritePageGuard,
        right_index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        let left_id = left.page_id();
        let right_id = right.page_id();

        if is_leaf {
            let mut source = LeafPage::<_, K>::new(right.data_mut());
            let mut recipient = LeafPage::<_, K>::new(left.data_mut());
            source.move_all_to(&mut recipient);
        } else {
            let middle_key = InternalPage::<_, K>::new(parent.data()).key_at(right_index);
            let moved = {
                let mut source = InternalPage::<_, K>::new(right.data_mut());
                let mut recipient = InternalPage::<_, K>::new(left.data_mut());
                source.move_all_to(&mut recipient, &middle_key)
            };
            drop((left, right));
            for child in moved {
                self.set_parent(child, left_id)?;
            }
        }

        InternalPage::<_, K>::new(parent.data_mut()).remove(right_index);
        ctx.deleted_pages.push(right_id);
        debug!("{}: merged {} into {}", self.index_name, right_id, left_id);
        Ok(())
    }

    /// Borrows one entry from `sibling` and fixes the separator between them.
    fn redistribute(
        &self,
        mut node: WritePageGuard,
        mut sibling: WritePageGuard,
        parent: &mut WritePageGuard,
        index: usize,
        is_leaf: bool,
    ) -> Result<()> {
        let node_id = node.page_id();

        if index == 0 {
            // Sibling is on the right; its first entry moves over.
            let separator = if is_leaf {
                let mut source = LeafPage::<_, K>::new(sibling.data_mut());
                source.move_first_to_end_of(&mut LeafPage::<_, K>::new(node.data_mut()));
                source.key_at(0)
            } else {
                let middle_key = InternalPage::<_, K>::new(parent.data()).key_at(1);
                let mut source = InternalPage::<_, K>::new(sibling.data_mut());
                let mut recipient = InternalPage::<_, K>::new(node.data_mut());
                let child = source.move_first_to_end_of(&mut recipient, &middle_key);
                self.set_parent(child, node_id)?;
                source.key_at(0)
            };
            InternalPage::<_, K>::new(parent.data_mut()).set_key_at(1, &separator);
        } else {
            // Sibling is on the left; its last entry moves over.
            let separator = if is_leaf {
                let mut recipient = LeafPage::<_, K>::new(node.data_mut());
                LeafPage::<_, K>::new(sibling.data_mut()).move_last_to_front_of(&mut recipient);
                recipient.key_at(0)
            } else {
                let middle_key = InternalPage::<_, K>::new(parent.data()).key_at(index);
                let mut recipient = InternalPage::<_, K>::new(node.data_mut());
                let child = InternalPage::<_, K>::new(sibling.data_mut())
                    .move_last_to_front_of(&mut recipient, &middle_key);
                self.set_parent(child, node_id)?;
                recipient.key_at(0)
            };
            InternalPage::<_, K>::new(parent.data_mut()).set_key_at(index, &separator);
        }

        debug!(
            "{}: redistributed between {} and {}",
            self.index_name,
            node_id,
            sibling.page_id()
        );
        Ok(())
    }

    /// Shrinks the tree at the top: an empty root leaf empties the tree and
    /// an internal root with one child hands the root to that child.
    fn adjust_root(&self, ctx: &mut Context<'_>, mut root: WritePageGuard) -> Result<()> {
        let root_id = root.page_id();
        let (is_leaf, size) = {
            let header = TreeHeader(root.data());
            (header.is_leaf(), header.size())
        };

        if is_leaf && size == 0 {
            drop(root);
            ctx.deleted_pages.push(root_id);
            self.set_root(ctx, INVALID_PAGE_ID)?;
            debug!("{}: tree is now empty", self.index_name);
        } else if !is_leaf && size == 1 {
            let child = InternalPage::<_, K>::new(root.data_mut()).remove_and_return_only_child();
            drop(root);
            self.set_parent(child, INVALID_PAGE_ID)?;
            ctx.deleted_pages.push(root_id);
            self.set_root(ctx, child)?;
            debug!("{}: root collapsed into {}", self.index_name, child);
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Shared helpers
    // ---------------------------------------------------------------------

    /// Rewrites a child's parent pointer. The child must not be latched by
    /// this thread.
    fn set_parent(&self, child: PageId, parent: PageId) -> Result<()> {
        self.bpm.modify_page(child, |data| set_parent_of(data, parent))
    }

    /// Installs a new root; the caller must still hold the root lock.
    fn set_root(&self, ctx: &mut Context<'_>, root_page_id: PageId) -> Result<()> {
        let guard = ctx
            .root_guard
            .as_mut()
            .ok_or_else(|| corrupted("root changed without the root lock"))?;
        **guard = root_page_id;
        self.update_root_record(root_page_id)
    }

    fn update_root_record(&self, root_page_id: PageId) -> Result<()> {
        let mut result = Ok(());
        self.bpm.modify_page(HEADER_PAGE_ID, |data| {
            result = HeaderPage::new(data).update_record(&self.index_name, root_page_id);
        })?;
        result
    }

    /// Deletes pages this operation emptied. A reader that latched one just
    /// before it was unlinked may still hold a pin for a moment.
    fn free_pages(&self, page_ids: Vec<PageId>) -> Result<()> {
        for page_id in page_ids {
            let mut attempts = 0;
            while !self.bpm.delete_page(page_id)? {
                attempts += 1;
                if attempts == DELETE_ATTEMPTS {
                    warn!(
                        "{}: {} is still pinned and was not reclaimed",
                        self.index_name, page_id
                    );
                    break;
                }
                thread::yield_now();
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Iteration
    // ---------------------------------------------------------------------

    /// Cursor over every entry in key order.
    pub fn begin(&self) -> Result<IndexIterator<'_, K, C>> {
        IndexIterator::new(self, None)
    }

    /// Cursor starting at the first key >= `key`.
    pub fn begin_at(&self, key: &K) -> Result<IndexIterator<'_, K, C>> {
        IndexIterator::new(self, Some(*key))
    }

    /// Copies the entries at or after `start` out of the leaf `start`
    /// belongs to (the leftmost leaf for `None`), with that leaf's fence.
    /// Returns `None` for an empty tree.
    pub(crate) fn scan_leaf(&self, start: Option<&K>) -> Result<Option<LeafBatch<K>>> {
        let Some((guard, fence)) = self.find_leaf_for_read(start)? else {
            return Ok(None);
        };
        let leaf = LeafPage::<_, K>::new(guard.data());
        let from = start.map_or(0, |key| leaf.key_index(key, &self.comparator));
        let entries = (from..leaf.size()).map(|i| leaf.item(i)).collect();
        Ok(Some(LeafBatch { entries, fence }))
    }

    /// All entries with `start <= key <= end`.
    pub fn range_scan(&self, start: &K, end: &K) -> Result<Vec<(K, RecordId)>> {
        let mut results = Vec::new();
        for item in self.begin_at(start)? {
            let (key, value) = item?;
            if self.comparator.compare(&key, end) == Ordering::Greater {
                break;
            }
            results.push((key, value));
        }
        Ok(results)
    }

    // ---------------------------------------------------------------------
    // Debugging
    // ---------------------------------------------------------------------

    /// Checks the structural invariants of the whole tree. Meant for
    /// quiescent trees; concurrent writers can make it report false errors.
    pub fn validate(&self) -> Result<()> {
        let root = self.root_page_id();
        if !root.is_valid() {
            return Ok(());
        }

        let mut state = ValidateState {
            leaf_depth: None,
            leaves: Vec::new(),
        };
        self.validate_subtree(root, INVALID_PAGE_ID, None, None, 0, &mut state)?;

        for pair in state.leaves.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if left.next != right.page_id {
                return Err(corrupted(format!(
                    "leaf {} links to {} instead of {}",
                    left.page_id, left.next, right.page_id
                )));
            }
            if self.comparator.compare(&left.last_key, &right.first_key) != Ordering::Less {
                return Err(corrupted(format!(
                    "leaves {} and {} overlap",
                    left.page_id, right.page_id
                )));
            }
        }
        if let Some(last) = state.leaves.last() {
            if last.next.is_valid() {
                return Err(corrupted(format!("last leaf {} links to {}", last.page_id, last.next)));
            }
        }
        Ok(())
    }

    fn in_bounds(&self, key: &K, lower: Option<&K>, upper: Option<&K>) -> bool {
        lower.map_or(true, |lower| self.comparator.compare(key, lower) != Ordering::Less)
            && upper.map_or(true, |upper| self.comparator.compare(key, upper) == Ordering::Less)
    }

    fn validate_subtree(
        &self,
        page_id: PageId,
        parent_id: PageId,
        lower: Option<K>,
        upper: Option<K>,
        depth: usize,
        state: &mut ValidateState<K>,
    ) -> Result<()> {
        let guard = self.bpm.fetch_page_read(page_id)?;
        let data = guard.data();
        let page_type = page_type_of(data)?;
        let header = TreeHeader(data);

        if header.page_id() != page_id {
            return Err(corrupted(format!("{} claims to be {}", page_id, header.page_id())));
        }
        if header.parent_page_id() != parent_id {
            return Err(corrupted(format!(
                "{} points at parent {} instead of {}",
                page_id,
                header.parent_page_id(),
                parent_id
            )));
        }
        if header.size() < header.min_size() || header.size() > header.max_size() {
            return Err(corrupted(format!(
                "{} has size {} outside [{}, {}]",
                page_id,
                header.size(),
                header.min_size(),
                header.max_size()
            )));
        }

        if page_type == IndexPageType::Leaf {
            let leaf = LeafPage::<_, K>::new(data);
            let keys: Vec<K> = (0..leaf.size()).map(|i| leaf.key_at(i)).collect();
            self.check_keys(page_id, &keys, lower.as_ref(), upper.as_ref())?;

            match state.leaf_depth {
                Some(expected) if expected != depth => {
                    return Err(corrupted(format!(
                        "leaf {} at depth {}, expected {}",
                        page_id, depth, expected
                    )));
                }
                _ => state.leaf_depth = Some(depth),
            }
            state.leaves.push(LeafSummary {
                page_id,
                next: leaf.next_page_id(),
                first_key: keys[0],
                last_key: keys[keys.len() - 1],
            });
            return Ok(());
        }

        let node = InternalPage::<_, K>::new(data);
        let size = node.size();
        let separators: Vec<K> = (1..size).map(|i| node.key_at(i)).collect();
        self.check_keys(page_id, &separators, lower.as_ref(), upper.as_ref())?;
        let children = node.children();
        drop(guard);

        for (i, child) in children.into_iter().enumerate() {
            let child_lower = if i == 0 { lower } else { Some(separators[i - 1]) };
            let child_upper = if i + 1 < size { Some(separators[i]) } else { upper };
            self.validate_subtree(child, page_id, child_lower, child_upper, depth + 1, state)?;
        }
        Ok(())
    }

    fn check_keys(
        &self,
        page_id: PageId,
        keys: &[K],
        lower: Option<&K>,
        upper: Option<&K>,
    ) -> Result<()> {
        for pair in keys.windows(2) {
            if self.comparator.compare(&pair[0], &pair[1]) != Ordering::Less {
                return Err(corrupted(format!(
                    "{} keys out of order: {:?} then {:?}",
                    page_id, pair[0], pair[1]
                )));
            }
        }
        if let Some(key) = keys.iter().find(|key| !self.in_bounds(key, lower, upper)) {
            return Err(corrupted(format!(
                "{} holds {:?} outside [{:?}, {:?})",
                page_id, key, lower, upper
            )));
        }
        Ok(())
    }

    /// Renders the tree one level per line.
    pub fn dump(&self) -> Result<String> {
        let mut out = String::new();
        let root = self.root_page_id();
        if !root.is_valid() {
            out.push_str("(empty)\n");
            return Ok(out);
        }

        let mut level = vec![root];
        let mut depth = 0;
        while !level.is_empty() {
            let mut next_level = Vec::new();
            out.push_str(&format!("level {}:", depth));

            for page_id in level {
                let guard = self.bpm.fetch_page_read(page_id)?;
                let data = guard.data();
                if page_type_of(data)? == IndexPageType::Leaf {
                    let leaf = LeafPage::<_, K>::new(data);
                    let keys: Vec<String> =
                        (0..leaf.size()).map(|i| format!("{:?}", leaf.key_at(i))).collect();
                    out.push_str(&format!(" [{}: {}]", page_id.as_u32(), keys.join(" ")));
                } else {
                    let node = InternalPage::<_, K>::new(data);
                    let mut parts = vec![format!("<{}>", node.value_at(0).as_u32())];
                    for i in 1..node.size() {
                        parts.push(format!("{:?} <{}>", node.key_at(i), node.value_at(i).as_u32()));
                    }
                    out.push_str(&format!(" [{}: {}]", page_id.as_u32(), parts.join(" ")));
                    next_level.extend(node.children());
                }
            }

            out.push('\n');
            level = next_level;
            depth += 1;
        }
        Ok(out)
    }
}

struct LeafSummary<K> {
    page_id: PageId,
    next: PageId,
    first_key: K,
    last_key: K,
}

struct ValidateState<K> {
    leaf_depth: Option<usize>,
    leaves: Vec<LeafSummary<K>>,
}
