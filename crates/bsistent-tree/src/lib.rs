//! Persistent, disk-backed B-tree keyed on user-defined records.
//!
//! Records implement [`Record`] (usually through the
//! [`record_codec!`] macro) and are stored in fixed-size pages in a single
//! data file, fronted by a bounded page cache. Every `add`/`delete`
//! persists the pages it touched before returning.
//!
//! ```no_run
//! use bsistent_tree::{record_codec, Builder};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Account {
//!     id: String,
//!     balance: i64,
//! }
//!
//! record_codec!(Account { id: String, balance: i64 } key [id]);
//!
//! let mut tree = Builder::<Account>::new()
//!     .grade(5)
//!     .item_shape(&Account { id: "0123456789".into(), balance: 0 })
//!     .storage_path("/tmp/accounts")
//!     .open()
//!     .unwrap();
//!
//! tree.add(Account { id: "alice67890".into(), balance: 12 }).unwrap();
//! let found = tree.find(&Account { id: "alice67890".into(), ..Default::default() }).unwrap();
//! assert_eq!(found.unwrap().balance, 12);
//! ```

pub mod builder;
pub mod item;
pub mod page;
pub mod serialized;
pub mod store;
pub mod tree;

pub use builder::Builder;
pub use item::Item;
pub use page::Page;
pub use serialized::PageLayout;
pub use store::{PageStore, HEADER_SIZE};
pub use tree::Btree;

pub use bsistent_codec::{record_codec, ByteReader, ByteWriter, Encode, Record};
pub use bsistent_common::{BsistentError, Result, TreeConfig};
