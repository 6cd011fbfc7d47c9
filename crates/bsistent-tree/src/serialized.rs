//! On-disk page layout.
//!
//! A serialized page is a fixed-width frame:
//!
//! ```text
//! offset:   i64
//! capacity: i64
//! items:    u32 count (= capacity), then capacity item slots
//! parent:   i64                 (reserved; parents rebuild on load)
//! children: u32 count (= capacity + 1), then capacity+1 i64 offsets (0 = absent)
//! ```
//!
//! Each item slot is `bool empty + u32 len (= item capacity) + payload`,
//! with the payload zero-padded to the item capacity. Empty and occupied
//! slots therefore occupy the same width, and every page for a given
//! configuration encodes to exactly `page_size` bytes.

use crate::item::Item;
use crate::page::Page;
use bsistent_codec::{ByteReader, ByteWriter, Encode, Record};
use bsistent_common::{BsistentError, Result};

/// Fixed page geometry for one tree configuration.
#[derive(Debug, Clone)]
pub struct PageLayout {
    capacity: usize,
    item_capacity: usize,
    zero_page: Vec<u8>,
}

impl PageLayout {
    /// Computes the geometry for pages of `capacity` items of at most
    /// `item_capacity` bytes each. The page size is the length of the
    /// encoded zero page.
    pub fn new(capacity: usize, item_capacity: usize) -> Self {
        Self {
            capacity,
            item_capacity,
            zero_page: encode_zero_page(capacity, item_capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn item_capacity(&self) -> usize {
        self.item_capacity
    }

    /// Byte length of every page on disk.
    pub fn page_size(&self) -> usize {
        self.zero_page.len()
    }

    /// The canonical all-empty page image.
    pub fn zero_page(&self) -> &[u8] {
        &self.zero_page
    }

    /// Serializes `page` into exactly [`page_size`](Self::page_size) bytes.
    pub fn encode_page<T: Record>(&self, page: &Page<T>) -> Result<Vec<u8>> {
        if page.size() > self.capacity {
            return Err(BsistentError::Corrupted(format!(
                "page at offset {} holds {} items (capacity {})",
                page.offset(),
                page.size(),
                self.capacity
            )));
        }

        let mut w = ByteWriter::with_capacity(self.page_size());
        w.put_i64(page.offset() as i64);
        w.put_i64(self.capacity as i64);

        w.put_u32(self.capacity as u32);
        for slot in 0..self.capacity {
            match page.item(slot) {
                Some(item) => {
                    let mut body = ByteWriter::with_capacity(self.item_capacity);
                    item.content().encode(&mut body);
                    if body.len() > self.item_capacity {
                        return Err(BsistentError::RecordTooLarge {
                            size: body.len(),
                            max: self.item_capacity,
                        });
                    }
                    w.put_bool(false);
                    w.put_u32(self.item_capacity as u32);
                    let padding = self.item_capacity - body.len();
                    w.put_slice(body.as_slice());
                    w.put_zeros(padding);
                }
                None => {
                    w.put_bool(true);
                    w.put_u32(self.item_capacity as u32);
                    w.put_zeros(self.item_capacity);
                }
            }
        }

        // Parent offset slot, reserved.
        w.put_i64(0);

        w.put_u32((self.capacity + 1) as u32);
        for slot in 0..=self.capacity {
            w.put_i64(page.child(slot).unwrap_or(0) as i64);
        }

        Ok(w.freeze().to_vec())
    }

    /// Rebuilds a page from its on-disk image.
    ///
    /// A freshly reserved page is all zeros and decodes to an empty page;
    /// counts then read as zero rather than the configured capacity.
    pub fn decode_page<T: Record>(&self, offset: u64, bytes: &[u8]) -> Result<Page<T>> {
        let mut r = ByteReader::new(bytes);
        let _stored_offset = r.get_i64()?;
        let _stored_capacity = r.get_i64()?;

        let item_count = r.get_u32()? as usize;
        if item_count > self.capacity {
            return Err(BsistentError::Corrupted(format!(
                "page at offset {offset} declares {item_count} item slots (capacity {})",
                self.capacity
            )));
        }

        let mut page = Page::new(offset, self.capacity);
        for _ in 0..item_count {
            let empty = r.get_bool()?;
            let content = r.get_block()?;
            if !empty {
                let mut body = ByteReader::new(content);
                let value = T::decode(&mut body)?;
                page.push_item(Item::load(self.item_capacity, value)?);
            }
        }

        let _parent = r.get_i64()?;

        let child_count = r.get_u32()? as usize;
        if child_count > self.capacity + 1 {
            return Err(BsistentError::Corrupted(format!(
                "page at offset {offset} declares {child_count} child slots (capacity {})",
                self.capacity + 1
            )));
        }
        for _ in 0..child_count {
            let child = r.get_i64()?;
            if child > 0 {
                page.push_child(child as u64);
            }
        }

        Ok(page)
    }
}

fn encode_zero_page(capacity: usize, item_capacity: usize) -> Vec<u8> {
    let mut w = ByteWriter::new();
    w.put_i64(0);
    w.put_i64(capacity as i64);
    w.put_u32(capacity as u32);
    for _ in 0..capacity {
        w.put_bool(true);
        w.put_u32(item_capacity as u32);
        w.put_zeros(item_capacity);
    }
    w.put_i64(0);
    w.put_u32((capacity + 1) as u32);
    for _ in 0..=capacity {
        w.put_i64(0);
    }
    w.freeze().to_vec()
}
