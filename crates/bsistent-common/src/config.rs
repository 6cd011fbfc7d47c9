//! Configuration for a bsistent tree.

use crate::error::{BsistentError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for a persistent B-tree instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum number of children per page; must be at least 3.
    pub grade: usize,
    /// Maximum serialized size of a record, in bytes.
    pub item_size: usize,
    /// Path of the data file.
    pub storage_path: PathBuf,
    /// Truncate the data file when opening.
    pub reset: bool,
    /// Maximum number of pages held in the cache; 0 disables caching.
    pub cache_size: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            grade: 500,
            item_size: 64,
            storage_path: default_storage_path(),
            reset: false,
            cache_size: 0,
        }
    }
}

impl TreeConfig {
    /// Maximum number of items a page may hold.
    pub fn page_capacity(&self) -> usize {
        self.grade - 1
    }

    /// Minimum number of children of a non-root internal page.
    pub fn min_children(&self) -> usize {
        (self.grade + 1) / 2
    }

    /// Minimum number of items of a non-root page.
    pub fn min_items(&self) -> usize {
        self.min_children() - 1
    }

    /// Checks the configuration for values the tree cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.grade < 3 {
            return Err(BsistentError::InvalidParameter {
                name: "grade".to_string(),
                value: self.grade.to_string(),
            });
        }
        if self.item_size == 0 {
            return Err(BsistentError::InvalidParameter {
                name: "item_size".to_string(),
                value: self.item_size.to_string(),
            });
        }
        Ok(())
    }
}

/// Returns the default data file path, `$HOME/.bsistent/bsistent`.
fn default_storage_path() -> PathBuf {
    let home = std::env::var_os("HOME").unwrap_or_default();
    PathBuf::from(home).join(".bsistent").join("bsistent")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TreeConfig::default();
        assert_eq!(config.grade, 500);
        assert_eq!(config.item_size, 64);
        assert!(!config.reset);
        assert_eq!(config.cache_size, 0);
        assert!(config.storage_path.ends_with(".bsistent/bsistent"));
    }

    #[test]
    fn test_page_capacity() {
        let config = TreeConfig {
            grade: 5,
            ..Default::default()
        };
        assert_eq!(config.page_capacity(), 4);
    }

    #[test]
    fn test_min_items_odd_grade() {
        let config = TreeConfig {
            grade: 5,
            ..Default::default()
        };
        assert_eq!(config.min_children(), 3);
        assert_eq!(config.min_items(), 2);
    }

    #[test]
    fn test_min_items_even_grade() {
        let config = TreeConfig {
            grade: 4,
            ..Default::default()
        };
        assert_eq!(config.min_children(), 2);
        assert_eq!(config.min_items(), 1);
    }

    #[test]
    fn test_min_items_smallest_grade() {
        let config = TreeConfig {
            grade: 3,
            ..Default::default()
        };
        assert_eq!(config.min_children(), 2);
        assert_eq!(config.min_items(), 1);
    }

    #[test]
    fn test_validate_rejects_small_grade() {
        let config = TreeConfig {
            grade: 2,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.to_string(), "invalid parameter: grade = 2");
    }

    #[test]
    fn test_validate_rejects_zero_item_size() {
        let config = TreeConfig {
            item_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_defaults() {
        assert!(TreeConfig::default().validate().is_ok());
    }

    #[test]
    fn test_serde_roundtrip() {
        let original = TreeConfig {
            grade: 7,
            item_size: 32,
            storage_path: PathBuf::from("/tmp/bsistent-test"),
            reset: true,
            cache_size: 40,
        };
        let serialized = serde_json::to_string(&original).unwrap();
        let deserialized: TreeConfig = serde_json::from_str(&serialized).unwrap();

        assert_eq!(original.grade, deserialized.grade);
        assert_eq!(original.item_size, deserialized.item_size);
        assert_eq!(original.storage_path, deserialized.storage_path);
        assert_eq!(original.reset, deserialized.reset);
        assert_eq!(original.cache_size, deserialized.cache_size);
    }
}
