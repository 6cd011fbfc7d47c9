//! Fluent construction of a [`Btree`].

use crate::tree::Btree;
use bsistent_codec::{Encode, Record};
use bsistent_common::{Result, TreeConfig};
use std::marker::PhantomData;
use std::path::PathBuf;

/// Builder for a [`Btree`], starting from [`TreeConfig::default`].
///
/// ```no_run
/// use bsistent_tree::Builder;
///
/// let mut tree = Builder::<i64>::new()
///     .grade(5)
///     .item_size(8)
///     .cache_size(40)
///     .storage_path("/tmp/numbers")
///     .open()
///     .unwrap();
/// tree.add(42).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct Builder<T> {
    config: TreeConfig,
    _record: PhantomData<T>,
}

impl<T: Record> Builder<T> {
    pub fn new() -> Self {
        Self {
            config: TreeConfig::default(),
            _record: PhantomData,
        }
    }

    /// Maximum children per page; must be at least 3.
    pub fn grade(mut self, grade: usize) -> Self {
        self.config.grade = grade;
        self
    }

    /// Byte budget for a serialized record.
    pub fn item_size(mut self, item_size: usize) -> Self {
        self.config.item_size = item_size;
        self
    }

    /// Derives the item size from the encoded size of a prototype record.
    ///
    /// Pass a prototype whose variable-width fields carry their maximum
    /// width (for instance a string key at its widest).
    pub fn item_shape(mut self, prototype: &T) -> Self {
        self.config.item_size = prototype.encoded_size();
        self
    }

    pub fn storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.storage_path = path.into();
        self
    }

    /// Truncate the data file when opening.
    pub fn reset(mut self, reset: bool) -> Self {
        self.config.reset = reset;
        self
    }

    /// Maximum pages held in the cache; 0 disables caching.
    pub fn cache_size(mut self, cache_size: usize) -> Self {
        self.config.cache_size = cache_size;
        self
    }

    /// Opens the tree, validating the configuration first.
    pub fn open(self) -> Result<Btree<T>> {
        Btree::open(self.config)
    }
}

impl<T: Record> Default for Builder<T> {
    fn default() -> Self {
        Self::new()
    }
}
