//! Page storage: the data file, its header, and the page cache.
//!
//! File layout: a 16-byte header (root page offset at `[0, 8)`, tree size at
//! `[8, 16)`, both signed 64-bit little-endian) followed by fixed-size pages.
//! Pages are allocated at monotonically increasing offsets; a page vacated
//! by a merge keeps its slot in the file.

use crate::page::Page;
use crate::serialized::PageLayout;
use bsistent_cache::PageCache;
use bsistent_codec::{ByteReader, ByteWriter, Record};
use bsistent_common::{BsistentError, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte length of the file header.
pub const HEADER_SIZE: u64 = 16;

const ROOT_REF_OFFSET: u64 = 0;
const TREE_SIZE_OFFSET: u64 = 8;

/// Owns the data file and serves pages to the tree engine.
///
/// Loads consult the cache before touching the file; saves write through
/// and refresh the cached copy, so the cache always mirrors the most
/// recently written bytes.
pub struct PageStore<T: Record> {
    file: File,
    path: PathBuf,
    layout: PageLayout,
    root_offset: i64,
    tree_size: i64,
    last_allocated: u64,
    locked: bool,
    cache: PageCache<Page<T>>,
}

impl<T: Record> PageStore<T> {
    /// Opens the data file, creating it (and its parent directory) if absent.
    ///
    /// Reads the header when present; a fresh or unreadable header is
    /// initialized to zeros. The allocation cursor is derived from the file
    /// length so a reopened file keeps growing past its existing pages.
    pub fn open(
        path: &Path,
        capacity: usize,
        item_capacity: usize,
        cache_size: usize,
        reset: bool,
    ) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        if reset {
            file.set_len(0)?;
        }

        let layout = PageLayout::new(capacity, item_capacity);
        let mut store = Self {
            file,
            path: path.to_path_buf(),
            layout,
            root_offset: 0,
            tree_size: 0,
            last_allocated: HEADER_SIZE,
            locked: false,
            cache: PageCache::new(cache_size, Page::new(0, capacity)),
        };

        match store.read_header() {
            Ok((root, size)) if root > 0 => {
                store.root_offset = root;
                store.tree_size = size;
            }
            _ => {
                store.save_root_reference(0)?;
                store.save_size(0)?;
            }
        }

        let page_size = store.layout.page_size() as u64;
        let file_len = store.file.metadata()?.len();
        if file_len > HEADER_SIZE {
            let pages = (file_len - HEADER_SIZE) / page_size;
            if pages > 0 {
                store.last_allocated = HEADER_SIZE + (pages - 1) * page_size;
            }
        }

        Ok(store)
    }

    /// Returns the root page, allocating the first page of a fresh file.
    pub fn load_root(&mut self) -> Result<Page<T>> {
        if self.root_offset > 0 {
            return self.load(self.root_offset as u64);
        }
        let page = self.new_page(true)?;
        self.save_root_reference(page.offset())?;
        Ok(page)
    }

    /// Returns the page at `offset`, from the cache when resident.
    pub fn load(&mut self, offset: u64) -> Result<Page<T>> {
        self.lock()?;
        let result = self.load_page(offset);
        self.locked = false;
        result
    }

    fn load_page(&mut self, offset: u64) -> Result<Page<T>> {
        if let Some(cached) = self.cache.load(offset) {
            return Ok(cached.clone());
        }
        let mut buf = vec![0u8; self.layout.page_size()];
        self.read_exact_at(offset, &mut buf)?;
        let page = self.layout.decode_page(offset, &buf)?;
        self.cache.save(page.clone());
        Ok(page)
    }

    /// Reserves a page slot and returns the page bound to it.
    ///
    /// With `first` the slot is the current allocation cursor (the first
    /// page of a fresh file); otherwise the cursor advances by one page.
    pub fn new_page(&mut self, first: bool) -> Result<Page<T>> {
        self.lock()?;
        let result = self.reserve_page(first);
        self.locked = false;
        result
    }

    fn reserve_page(&mut self, first: bool) -> Result<Page<T>> {
        let offset = if first {
            self.last_allocated
        } else {
            self.last_allocated + self.layout.page_size() as u64
        };
        let zero = self.layout.zero_page().to_vec();
        self.write_at(offset, &zero)?;
        self.last_allocated = offset;
        Ok(Page::new(offset, self.layout.capacity()))
    }

    /// Writes `page` at its offset and refreshes the cached copy.
    pub fn save(&mut self, page: &Page<T>) -> Result<()> {
        self.lock()?;
        let result = self.save_page(page);
        self.locked = false;
        result
    }

    fn save_page(&mut self, page: &Page<T>) -> Result<()> {
        let bytes = self.layout.encode_page(page)?;
        self.write_at(page.offset(), &bytes)?;
        self.cache.save(page.clone());
        Ok(())
    }

    /// Writes the root page offset into the header.
    pub fn save_root_reference(&mut self, offset: u64) -> Result<()> {
        let mut w = ByteWriter::with_capacity(8);
        w.put_i64(offset as i64);
        self.write_at(ROOT_REF_OFFSET, w.as_slice())?;
        self.root_offset = offset as i64;
        Ok(())
    }

    /// Writes the tree size into the header.
    pub fn save_size(&mut self, size: i64) -> Result<()> {
        let mut w = ByteWriter::with_capacity(8);
        w.put_i64(size);
        self.write_at(TREE_SIZE_OFFSET, w.as_slice())?;
        self.tree_size = size;
        Ok(())
    }

    /// Truncates the data file and restores the initial state.
    pub fn reset(&mut self) -> Result<()> {
        self.file.set_len(0)?;
        self.last_allocated = HEADER_SIZE;
        self.cache.clear();
        self.save_root_reference(0)?;
        self.save_size(0)
    }

    /// Drops the cached copy of the page at `offset`, if any.
    pub fn invalidate(&mut self, offset: u64) {
        self.cache.invalidate(offset);
    }

    pub fn root_offset(&self) -> u64 {
        self.root_offset.max(0) as u64
    }

    /// Tree size as recorded in the header.
    pub fn tree_size(&self) -> i64 {
        self.tree_size
    }

    pub fn page_size(&self) -> usize {
        self.layout.page_size()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_header(&mut self) -> Result<(i64, i64)> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.read_exact_at(0, &mut buf)?;
        let mut r = ByteReader::new(&buf);
        Ok((r.get_i64()?, r.get_i64()?))
    }

    fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(BsistentError::StorageLocked);
        }
        self.locked = true;
        Ok(())
    }

    #[cfg(test)]
    fn force_lock(&mut self) {
        self.locked = true;
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        let written = self.file.write(bytes)?;
        if written < bytes.len() {
            return Err(BsistentError::ShortWrite {
                expected: bytes.len(),
                written,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;
    use tempfile::tempdir;

    fn open_store(
        dir: &Path,
        cache_size: usize,
        reset: bool,
    ) -> PageStore<i64> {
        PageStore::open(&dir.join("data"), 4, 8, cache_size, reset).unwrap()
    }

    #[test]
    fn test_fresh_file_has_zero_header() {
        let dir = tempdir().unwrap();
        let store = open_store(dir.path(), 0, false);
        assert_eq!(store.root_offset(), 0);
        assert_eq!(store.tree_size(), 0);
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let store: PageStore<i64> = PageStore::open(&nested.join("data"), 4, 8, 0, false).unwrap();
        assert!(store.path().exists());
    }

    #[test]
    fn test_load_root_allocates_first_page() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        let root = store.load_root().unwrap();
        assert_eq!(root.offset(), HEADER_SIZE);
        assert_eq!(store.root_offset(), HEADER_SIZE);
        assert!(root.is_empty());
    }

    #[test]
    fn test_new_page_advances_allocation() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        let first = store.new_page(true).unwrap();
        let second = store.new_page(false).unwrap();
        let third = store.new_page(false).unwrap();
        let page_size = store.page_size() as u64;
        assert_eq!(first.offset(), 16);
        assert_eq!(second.offset(), 16 + page_size);
        assert_eq!(third.offset(), 16 + 2 * page_size);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        let mut page = store.new_page(true).unwrap();
        page.insert_item(Item::load(8, 42i64).unwrap());
        page.insert_item(Item::load(8, 7i64).unwrap());
        store.save(&page).unwrap();

        let loaded = store.load(page.offset()).unwrap();
        assert_eq!(loaded.size(), 2);
        assert_eq!(*loaded.item(0).unwrap().content(), 7);
        assert_eq!(*loaded.item(1).unwrap().content(), 42);
    }

    #[test]
    fn test_header_survives_reopen() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(dir.path(), 0, false);
            let root = store.load_root().unwrap();
            store.save(&root).unwrap();
            store.save_size(11).unwrap();
        }
        let store = open_store(dir.path(), 0, false);
        assert_eq!(store.root_offset(), 16);
        assert_eq!(store.tree_size(), 11);
    }

    #[test]
    fn test_reopen_allocates_past_existing_pages() {
        let dir = tempdir().unwrap();
        let (second_offset, page_size) = {
            let mut store = open_store(dir.path(), 0, false);
            store.load_root().unwrap();
            let second = store.new_page(false).unwrap();
            (second.offset(), store.page_size() as u64)
        };
        let mut store = open_store(dir.path(), 0, false);
        let next = store.new_page(false).unwrap();
        assert_eq!(next.offset(), second_offset + page_size);
    }

    #[test]
    fn test_file_length_matches_page_count() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        store.new_page(true).unwrap();
        store.new_page(false).unwrap();
        let expected = HEADER_SIZE + 2 * store.page_size() as u64;
        // The header writes happen at open; reserving pages extends the file.
        let len = std::fs::metadata(store.path()).unwrap().len();
        assert_eq!(len, expected);
    }

    #[test]
    fn test_load_past_end_of_file_fails() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        store.load_root().unwrap();
        assert!(store.load(1 << 20).is_err());
    }

    #[test]
    fn test_reset_truncates() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 4, false);
        let mut page = store.load_root().unwrap();
        page.insert_item(Item::load(8, 1i64).unwrap());
        store.save(&page).unwrap();
        store.save_size(1).unwrap();

        store.reset().unwrap();
        assert_eq!(store.root_offset(), 0);
        assert_eq!(store.tree_size(), 0);
        let len = std::fs::metadata(store.path()).unwrap().len();
        assert_eq!(len, HEADER_SIZE);
        assert!(store.load(16).is_err());
    }

    #[test]
    fn test_open_with_reset_discards_previous_contents() {
        let dir = tempdir().unwrap();
        {
            let mut store = open_store(dir.path(), 0, false);
            let root = store.load_root().unwrap();
            store.save(&root).unwrap();
            store.save_size(5).unwrap();
        }
        let store = open_store(dir.path(), 0, true);
        assert_eq!(store.root_offset(), 0);
        assert_eq!(store.tree_size(), 0);
    }

    #[test]
    fn test_cache_serves_resident_page() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 4, false);
        let mut page = store.new_page(true).unwrap();
        page.insert_item(Item::load(8, 42i64).unwrap());
        store.save(&page).unwrap();

        // Clobber the page bytes on disk behind the cache; a load must still
        // observe the most recently saved image.
        store.write_at(page.offset(), &vec![0u8; store.page_size()]).unwrap();
        let loaded = store.load(page.offset()).unwrap();
        assert_eq!(loaded.size(), 1);

        // After invalidation the zeroed bytes become visible.
        store.invalidate(page.offset());
        let reloaded = store.load(page.offset()).unwrap();
        assert!(reloaded.is_empty());
    }

    #[test]
    fn test_failed_load_leaves_store_usable() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        let mut page = store.new_page(true).unwrap();
        page.insert_item(Item::load(8, 5i64).unwrap());
        store.save(&page).unwrap();

        assert!(store.load(1 << 20).is_err());
        // The guard must be released on the error path.
        let loaded = store.load(page.offset()).unwrap();
        assert_eq!(loaded.size(), 1);
    }

    #[test]
    fn test_locked_store_rejects_operations() {
        let dir = tempdir().unwrap();
        let mut store = open_store(dir.path(), 0, false);
        let page = store.new_page(true).unwrap();
        store.force_lock();
        assert!(matches!(
            store.load(page.offset()),
            Err(BsistentError::StorageLocked)
        ));
        assert!(matches!(
            store.save(&page),
            Err(BsistentError::StorageLocked)
        ));
        assert!(matches!(
            store.new_page(false),
            Err(BsistentError::StorageLocked)
        ));
    }
}
