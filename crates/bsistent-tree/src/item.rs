//! A single record slot with a fixed serialized-size budget.

use bsistent_codec::{compare_records, Encode, Record};
use bsistent_common::{BsistentError, Result};
use std::cmp::Ordering;
use std::fmt;

/// One record plus the byte budget its encoding must fit in.
///
/// An item is empty when its record equals the zero value of `T`.
#[derive(Debug, Clone)]
pub struct Item<T> {
    content: T,
    capacity: usize,
}

impl<T: Record> Item<T> {
    /// Creates an empty item with the given byte budget.
    pub fn empty(capacity: usize) -> Self {
        Self {
            content: T::default(),
            capacity,
        }
    }

    /// Wraps `value`, rejecting records whose encoding exceeds the budget.
    pub fn load(capacity: usize, value: T) -> Result<Self> {
        let size = value.encoded_size();
        if size > capacity {
            return Err(BsistentError::RecordTooLarge {
                size,
                max: capacity,
            });
        }
        Ok(Self {
            content: value,
            capacity,
        })
    }

    pub fn content(&self) -> &T {
        &self.content
    }

    pub fn into_content(self) -> T {
        self.content
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.content == T::default()
    }

    /// Orders items by the key fields of their records.
    pub fn compare(&self, other: &Self) -> Ordering {
        compare_records(&self.content, &other.content)
    }
}

impl<T: fmt::Debug> fmt::Display for Item<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{:?}}}", self.content)
    }
}
