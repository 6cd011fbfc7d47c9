//! The B-tree engine: search, insert with recursive split, delete with
//! borrow/merge/shrink, and the tainted-page commit.
//!
//! Pages reachable during an operation are held in a resident-page table
//! keyed by offset (the root stays resident across operations). Child and
//! parent links are offsets; parents are rebuilt while descending. Every
//! mutation taints the touched pages, and each top-level `add`/`delete`
//! ends with a commit that writes the tainted set, the root pointer when it
//! changed, and the tree size.

use crate::item::Item;
use crate::page::Page;
use crate::store::PageStore;
use bsistent_codec::Record;
use bsistent_common::{BsistentError, Result, TreeConfig};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

/// A persistent B-tree of records of type `T`.
///
/// All operations take `&mut self`; the tree is a single-threaded
/// structure and performs no internal locking. I/O or decode failures
/// surface as errors without rollback, after which the in-memory tree and
/// the data file may disagree.
pub struct Btree<T: Record> {
    grade: usize,
    item_capacity: usize,
    min_items: usize,
    size: i64,
    root: u64,
    store: PageStore<T>,
    /// Resident pages by offset; the root is always present.
    pages: HashMap<u64, Page<T>>,
    /// Offsets of pages that differ from their on-disk image.
    tainted: BTreeSet<u64>,
    root_changed: bool,
}

impl<T: Record> Btree<T> {
    /// Opens a tree as described by `config`.
    pub fn open(config: TreeConfig) -> Result<Self> {
        config.validate()?;
        let mut store = PageStore::open(
            &config.storage_path,
            config.page_capacity(),
            config.item_size,
            config.cache_size,
            config.reset,
        )?;
        let root_page = store.load_root()?;
        let root = root_page.offset();
        let size = store.tree_size();
        let mut pages = HashMap::new();
        pages.insert(root, root_page);
        Ok(Self {
            grade: config.grade,
            item_capacity: config.item_size,
            min_items: config.min_items(),
            size,
            root,
            store,
            pages,
            tainted: BTreeSet::new(),
            root_changed: false,
        })
    }

    /// Inserts `value`. Empty (zero-valued) records are ignored; a record
    /// whose encoding exceeds the item capacity is an error.
    pub fn add(&mut self, value: T) -> Result<()> {
        let item = Item::load(self.item_capacity, value)?;
        if item.is_empty() {
            return Ok(());
        }
        let leaf = self.find_leaf_for(&item)?;
        self.insert_into(leaf, item, None)?;
        self.size += 1;
        self.persist()
    }

    /// Alias for [`add`](Self::add).
    pub fn save(&mut self, value: T) -> Result<()> {
        self.add(value)
    }

    /// Looks up the record matching the key fields of `partial`.
    pub fn find(&mut self, partial: &T) -> Result<Option<T>> {
        let found = match self.locate(partial)? {
            Some((offset, index)) => self
                .page(offset)?
                .item(index)
                .map(|item| item.content().clone()),
            None => None,
        };
        self.release();
        Ok(found)
    }

    /// Removes the record matching the key fields of `partial`, reporting
    /// whether one was present.
    pub fn delete(&mut self, partial: &T) -> Result<bool> {
        let Some((offset, index)) = self.locate(partial)? else {
            self.release();
            return Ok(false);
        };
        self.remove_from(offset, index)?;
        self.size -= 1;
        self.persist()?;
        Ok(true)
    }

    /// Number of records in the tree.
    pub fn size(&self) -> u64 {
        self.size.max(0) as u64
    }

    pub fn is_empty(&self) -> bool {
        self.pages
            .get(&self.root)
            .map_or(true, |page| page.is_empty())
    }

    /// The resident root page.
    pub fn root(&self) -> &Page<T> {
        &self.pages[&self.root]
    }

    /// Loads the page at `offset` for inspection.
    pub fn load_page(&mut self, offset: u64) -> Result<Page<T>> {
        self.store.load(offset)
    }

    pub fn storage_path(&self) -> &Path {
        self.store.path()
    }

    pub fn grade(&self) -> usize {
        self.grade
    }

    pub fn min_items(&self) -> usize {
        self.min_items
    }

    /// Checks every page reachable from the root: items strictly sorted,
    /// size bounds respected, child counts consistent, and child subtrees
    /// ordered around their separators.
    pub fn validate(&mut self) -> Result<bool> {
        let valid = self.validate_page(self.root)?;
        self.release();
        Ok(valid)
    }

    // Descent

    fn find_leaf_for(&mut self, item: &Item<T>) -> Result<u64> {
        let mut current = self.root;
        loop {
            let next = {
                let page = self.page(current)?;
                if page.is_leaf() {
                    return Ok(current);
                }
                let slot = page.slot_for(item);
                page.child(slot).ok_or_else(|| missing_child(current, slot))?
            };
            self.make_resident(next, Some(current))?;
            current = next;
        }
    }

    fn locate(&mut self, value: &T) -> Result<Option<(u64, usize)>> {
        let probe = Item::load(self.item_capacity, value.clone())?;
        let mut current = self.root;
        loop {
            let next = {
                let page = self.page(current)?;
                let slot = page.slot_for(&probe);
                if slot > 0 {
                    if let Some(previous) = page.item(slot - 1) {
                        if previous.compare(&probe) == Ordering::Equal {
                            return Ok(Some((current, slot - 1)));
                        }
                    }
                }
                if page.is_leaf() {
                    return Ok(None);
                }
                page.child(slot).ok_or_else(|| missing_child(current, slot))?
            };
            self.make_resident(next, Some(current))?;
            current = next;
        }
    }

    /// Walks to the edge leaf of the subtree at `offset`: the rightmost
    /// leaf when `rightmost`, the leftmost otherwise. Returns the leaf and
    /// the index of its edge item.
    fn find_edge(&mut self, offset: u64, rightmost: bool) -> Result<(u64, usize)> {
        let mut current = offset;
        loop {
            let next = {
                let page = self.page(current)?;
                if page.is_leaf() {
                    let index = if rightmost {
                        page.size().saturating_sub(1)
                    } else {
                        0
                    };
                    return Ok((current, index));
                }
                let slot = if rightmost {
                    page.children().len() - 1
                } else {
                    0
                };
                page.child(slot).ok_or_else(|| missing_child(current, slot))?
            };
            self.make_resident(next, Some(current))?;
            current = next;
        }
    }

    // Insertion

    fn insert_into(&mut self, offset: u64, item: Item<T>, right_child: Option<u64>) -> Result<()> {
        let slot = self.page_mut(offset)?.insert_item(item);
        if let Some(child) = right_child {
            self.page_mut(offset)?.insert_child(slot + 1, child);
            if let Some(page) = self.pages.get_mut(&child) {
                page.set_parent(Some(offset));
            }
        }
        self.taint(offset);
        if self.page(offset)?.is_overfull() {
            self.split(offset)?;
        }
        Ok(())
    }

    /// Splits an overfull page, pushing its pivot into the parent and the
    /// right half into a freshly allocated sibling. Recurses upward through
    /// `insert_into` while parents overflow.
    fn split(&mut self, offset: u64) -> Result<()> {
        let parent = match self.page(offset)?.parent() {
            Some(parent) => parent,
            None => self.grow_root(offset)?,
        };
        let (pivot, right_items, right_children) = self.page_mut(offset)?.split();

        let mut right = self.store.new_page(false)?;
        let right_offset = right.offset();
        right.set_items(right_items);
        right.set_children(right_children);
        right.set_parent(Some(parent));
        for &child in right.children() {
            if let Some(page) = self.pages.get_mut(&child) {
                page.set_parent(Some(right_offset));
            }
        }
        self.pages.insert(right_offset, right);

        self.taint(offset);
        self.taint(right_offset);
        self.insert_into(parent, pivot, Some(right_offset))
    }

    /// Allocates a new root above `child` when the old root split.
    fn grow_root(&mut self, child: u64) -> Result<u64> {
        let root = self.store.new_page(false)?;
        let root_offset = root.offset();
        self.pages.insert(root_offset, root);
        self.page_mut(root_offset)?.push_child(child);
        self.page_mut(child)?.set_parent(Some(root_offset));
        self.root = root_offset;
        self.root_changed = true;
        self.taint(root_offset);
        Ok(root_offset)
    }

    // Deletion

    fn remove_from(&mut self, offset: u64, index: usize) -> Result<()> {
        let (leaf, leaf_index) = self.maneuver(offset, index)?;
        self.page_mut(leaf)?.remove_item(leaf_index).ok_or_else(|| {
            BsistentError::Corrupted(format!(
                "no item at slot {leaf_index} of page at offset {leaf}"
            ))
        })?;
        self.taint(leaf);
        let deficient = self.page(leaf)?.size() < self.min_items;
        if deficient && leaf != self.root {
            self.fix(leaf)?;
        }
        Ok(())
    }

    /// Moves a deletion target on an internal page down to a leaf.
    ///
    /// Picks the larger of the two children flanking the target. When that
    /// child can donate, the target is exchanged with its predecessor (left
    /// child) or successor (right child) at the edge leaf of the child's
    /// subtree. Otherwise the two children merge around the target and the
    /// maneuver continues inside the merged child.
    fn maneuver(&mut self, offset: u64, index: usize) -> Result<(u64, usize)> {
        if self.page(offset)?.is_leaf() {
            return Ok((offset, index));
        }
        self.load_children(offset)?;
        let (left, right) = {
            let page = self.page(offset)?;
            let left = page.child(index).ok_or_else(|| missing_child(offset, index))?;
            let right = page
                .child(index + 1)
                .ok_or_else(|| missing_child(offset, index + 1))?;
            (left, right)
        };
        let donor_is_left = self.page(right)?.size() <= self.page(left)?.size();
        let donor = if donor_is_left { left } else { right };
        let can_donate = {
            let page = self.page(donor)?;
            page.size() > self.min_items || !page.is_leaf()
        };

        if can_donate {
            let (leaf, edge_index) = self.find_edge(donor, donor_is_left)?;
            let edge_item = self.page_mut(leaf)?.remove_item(edge_index).ok_or_else(|| {
                BsistentError::Corrupted(format!(
                    "no edge item at slot {edge_index} of page at offset {leaf}"
                ))
            })?;
            let target = self
                .page_mut(offset)?
                .replace_item(index, edge_item)
                .ok_or_else(|| missing_item(offset, index))?;
            self.page_mut(leaf)?.insert_item_at(edge_index, target);
            self.taint(leaf);
            self.taint(offset);
            Ok((leaf, edge_index))
        } else {
            let target_index = self.merge_children(offset, index)?;
            let at_root = offset == self.root;
            let remaining = self.page(offset)?.size();
            if at_root && remaining == 0 {
                self.shrink()?;
            } else if !at_root && remaining < self.min_items {
                self.fix(offset)?;
            }
            self.maneuver(left, target_index)
        }
    }

    /// Rebalances a page that dropped below the minimum item count.
    ///
    /// Prefers rotating an item through the parent from the larger adjacent
    /// sibling; merges with the sibling when neither can donate, fixing the
    /// parent in turn if the pulled-down separator left it deficient.
    fn fix(&mut self, offset: u64) -> Result<()> {
        let Some(parent) = self.page(offset)?.parent() else {
            return Ok(());
        };
        self.load_children(parent)?;
        let index = self
            .page(parent)?
            .child_index(offset)
            .ok_or_else(|| orphaned_page(offset, parent))?;
        let (sibling, sibling_index) = {
            let page = self.page(parent)?;
            let left = if index > 0 { page.child(index - 1) } else { None };
            let right = page.child(index + 1);
            match (left, right) {
                (Some(l), Some(r)) => {
                    if self.page(r)?.size() > self.page(l)?.size() {
                        (r, index + 1)
                    } else {
                        (l, index - 1)
                    }
                }
                (Some(l), None) => (l, index - 1),
                (None, Some(r)) => (r, index + 1),
                (None, None) => {
                    return Err(BsistentError::Corrupted(format!(
                        "page at offset {offset} has no siblings under parent {parent}"
                    )))
                }
            }
        };

        if self.page(sibling)?.size() > self.min_items {
            self.rotate(parent, offset, index, sibling, sibling_index)?;
        } else {
            let item_index = index.min(sibling_index);
            self.merge_children(parent, item_index)?;
            let at_root = parent == self.root;
            let remaining = self.page(parent)?.size();
            if at_root && remaining == 0 {
                self.shrink()?;
            } else if !at_root && remaining < self.min_items {
                self.fix(parent)?;
            }
        }
        Ok(())
    }

    /// Moves one item from `sibling` through the parent separator into the
    /// deficient page; internal siblings hand over the adjacent child too.
    fn rotate(
        &mut self,
        parent: u64,
        deficient: u64,
        deficient_index: usize,
        sibling: u64,
        sibling_index: usize,
    ) -> Result<()> {
        if sibling_index < deficient_index {
            // Left sibling donates its rightmost item and child.
            let separator_slot = sibling_index;
            let donated = {
                let page = self.page_mut(sibling)?;
                let last = page.size() - 1;
                page.remove_item(last)
                    .ok_or_else(|| missing_item(sibling, last))?
            };
            let separator = self
                .page_mut(parent)?
                .replace_item(separator_slot, donated)
                .ok_or_else(|| missing_item(parent, separator_slot))?;
            self.page_mut(deficient)?.insert_item_at(0, separator);

            let donated_child = {
                let page = self.page_mut(sibling)?;
                if page.is_leaf() {
                    None
                } else {
                    let last = page.children().len() - 1;
                    page.remove_child(last)
                }
            };
            if let Some(child) = donated_child {
                self.page_mut(deficient)?.insert_child(0, child);
                if let Some(page) = self.pages.get_mut(&child) {
                    page.set_parent(Some(deficient));
                }
            }
        } else {
            // Right sibling donates its leftmost item and child.
            let separator_slot = deficient_index;
            let donated = self
                .page_mut(sibling)?
                .remove_item(0)
                .ok_or_else(|| missing_item(sibling, 0))?;
            let separator = self
                .page_mut(parent)?
                .replace_item(separator_slot, donated)
                .ok_or_else(|| missing_item(parent, separator_slot))?;
            self.page_mut(deficient)?.push_item(separator);

            let donated_child = {
                let page = self.page_mut(sibling)?;
                if page.is_leaf() {
                    None
                } else {
                    page.remove_child(0)
                }
            };
            if let Some(child) = donated_child {
                self.page_mut(deficient)?.push_child(child);
                if let Some(page) = self.pages.get_mut(&child) {
                    page.set_parent(Some(deficient));
                }
            }
        }
        self.taint(parent);
        self.taint(sibling);
        self.taint(deficient);
        Ok(())
    }

    /// Merges the children flanking the parent item at `item_index` into
    /// the left child, pulling the separator down between them. Returns the
    /// separator's index inside the merged page. The emptied right page
    /// stays tainted and is discarded at commit.
    fn merge_children(&mut self, parent: u64, item_index: usize) -> Result<usize> {
        let (left, right) = {
            let page = self.page(parent)?;
            let left = page
                .child(item_index)
                .ok_or_else(|| missing_child(parent, item_index))?;
            let right = page
                .child(item_index + 1)
                .ok_or_else(|| missing_child(parent, item_index + 1))?;
            (left, right)
        };
        let separator = self
            .page_mut(parent)?
            .remove_item(item_index)
            .ok_or_else(|| missing_item(parent, item_index))?;
        self.page_mut(parent)?.remove_child(item_index + 1);

        let (right_items, right_children) = {
            let page = self.page_mut(right)?;
            (page.take_items(), page.take_children())
        };
        let separator_index = {
            let page = self.page_mut(left)?;
            let index = page.size();
            page.push_item(separator);
            for item in right_items {
                page.push_item(item);
            }
            for &child in &right_children {
                page.push_child(child);
            }
            index
        };
        for child in right_children {
            if let Some(page) = self.pages.get_mut(&child) {
                page.set_parent(Some(left));
            }
        }

        self.taint(parent);
        self.taint(left);
        self.taint(right);
        Ok(separator_index)
    }

    /// Replaces an emptied internal root with its sole remaining child.
    fn shrink(&mut self) -> Result<()> {
        let child = self
            .page(self.root)?
            .child(0)
            .ok_or_else(|| missing_child(self.root, 0))?;
        self.make_resident(child, None)?;
        let old_root = self.root;
        self.pages.remove(&old_root);
        self.root = child;
        self.root_changed = true;
        if let Some(page) = self.pages.get_mut(&child) {
            page.set_parent(None);
        }
        Ok(())
    }

    // Commit

    /// Writes every tainted page with items, then the root pointer when it
    /// changed, then the tree size. Zero-size pages on the tainted set are
    /// transient split/merge residue and are discarded without writing; the
    /// root is the one page that may legitimately end an operation empty,
    /// so it is always written. Saved pages have their resident children
    /// invalidated in the cache so re-reads observe the post-merge state.
    fn persist(&mut self) -> Result<()> {
        let tainted: Vec<u64> = std::mem::take(&mut self.tainted).into_iter().collect();
        for &offset in &tainted {
            let Some(page) = self.pages.get(&offset) else {
                continue;
            };
            if page.size() == 0 && offset != self.root {
                continue;
            }
            self.store.save(page)?;
        }
        if self.root_changed {
            self.store.save_root_reference(self.root)?;
            self.root_changed = false;
        }
        for &offset in &tainted {
            let resident_children: Vec<u64> = match self.pages.get(&offset) {
                Some(page) if page.size() > 0 => page
                    .children()
                    .iter()
                    .copied()
                    .filter(|child| self.pages.contains_key(child))
                    .collect(),
                _ => continue,
            };
            for child in resident_children {
                self.store.invalidate(child);
            }
        }
        self.store.save_size(self.size)?;
        self.release();
        Ok(())
    }

    /// Drops every resident page except the root; the authoritative copies
    /// live on disk and in the cache.
    fn release(&mut self) {
        let root = self.root;
        self.pages.retain(|&offset, _| offset == root);
    }

    // Residency

    fn page(&self, offset: u64) -> Result<&Page<T>> {
        self.pages
            .get(&offset)
            .ok_or(BsistentError::PageNotFound(offset))
    }

    fn page_mut(&mut self, offset: u64) -> Result<&mut Page<T>> {
        self.pages
            .get_mut(&offset)
            .ok_or(BsistentError::PageNotFound(offset))
    }

    fn make_resident(&mut self, offset: u64, parent: Option<u64>) -> Result<()> {
        if !self.pages.contains_key(&offset) {
            let page = self.store.load(offset)?;
            self.pages.insert(offset, page);
        }
        if let Some(parent) = parent {
            if let Some(page) = self.pages.get_mut(&offset) {
                page.set_parent(Some(parent));
            }
        }
        Ok(())
    }

    fn load_children(&mut self, offset: u64) -> Result<()> {
        let children: Vec<u64> = self.page(offset)?.children().to_vec();
        for child in children {
            self.make_resident(child, Some(offset))?;
        }
        Ok(())
    }

    fn taint(&mut self, offset: u64) {
        self.tainted.insert(offset);
    }

    // Validation

    fn validate_page(&mut self, offset: u64) -> Result<bool> {
        self.make_resident(offset, None)?;
        let (sorted, size, children) = {
            let page = self.page(offset)?;
            let sorted = page
                .items()
                .windows(2)
                .all(|pair| pair[0].compare(&pair[1]) == Ordering::Less);
            (sorted, page.size(), page.children().to_vec())
        };
        if !sorted {
            return Ok(false);
        }
        if offset != self.root && size < self.min_items {
            return Ok(false);
        }
        if size > self.grade - 1 {
            return Ok(false);
        }
        if !children.is_empty() && children.len() != size + 1 {
            return Ok(false);
        }
        for (i, &child) in children.iter().enumerate() {
            self.make_resident(child, Some(offset))?;
            if i < size {
                let below = {
                    let child_page = self.page(child)?;
                    let parent_page = self.page(offset)?;
                    match (child_page.last_item(), parent_page.item(i)) {
                        (Some(last), Some(separator)) => {
                            last.compare(separator) == Ordering::Less
                        }
                        _ => false,
                    }
                };
                if !below {
                    return Ok(false);
                }
            }
            if i > 0 {
                let above = {
                    let child_page = self.page(child)?;
                    let parent_page = self.page(offset)?;
                    match (child_page.first_item(), parent_page.item(i - 1)) {
                        (Some(first), Some(separator)) => {
                            first.compare(separator) == Ordering::Greater
                        }
                        _ => false,
                    }
                };
                if !above {
                    return Ok(false);
                }
            }
            if !self.validate_page(child)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl<T: Record + fmt::Debug> Btree<T> {
    /// Indented pretty-print of the whole tree, one page per line.
    pub fn render(&mut self) -> Result<String> {
        let mut out = String::new();
        self.render_page(self.root, "", &mut out)?;
        self.release();
        Ok(out)
    }

    fn render_page(&mut self, offset: u64, prefix: &str, out: &mut String) -> Result<()> {
        self.make_resident(offset, None)?;
        let (line, children) = {
            let page = self.page(offset)?;
            (format!("{prefix}|-- {page}\n"), page.children().to_vec())
        };
        out.push_str(&line);
        let child_prefix = format!("{prefix}    ");
        for child in children {
            self.render_page(child, &child_prefix, out)?;
        }
        Ok(())
    }
}

fn missing_child(offset: u64, slot: usize) -> BsistentError {
    BsistentError::Corrupted(format!(
        "page at offset {offset} has no child at slot {slot}"
    ))
}

fn missing_item(offset: u64, slot: usize) -> BsistentError {
    BsistentError::Corrupted(format!(
        "page at offset {offset} has no item at slot {slot}"
    ))
}

fn orphaned_page(offset: u64, parent: u64) -> BsistentError {
    BsistentError::Corrupted(format!(
        "page at offset {offset} is not a child of its parent at offset {parent}"
    ))
}
