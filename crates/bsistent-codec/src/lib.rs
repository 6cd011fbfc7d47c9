//! Binary record codec for bsistent.
//!
//! A self-describing, little-endian, length-prefixed format:
//! - fixed scalars are written as their raw little-endian bytes,
//!   `isize`/`usize` widened to 64 bits;
//! - strings and slices carry a `u32` length/count prefix;
//! - maps carry a `u32` pair count followed by `(key, value)` pairs;
//! - structs carry a `u32` byte length of their payload followed by the
//!   field encodings in declaration order.
//!
//! Encoding is expressed through the [`Encode`] trait, so totality over the
//! supported kinds is checked at compile time. The [`Record`] trait adds key
//! extraction on top, and [`record_codec!`] generates both impls for a user
//! struct.

pub mod encode;
pub mod reader;
pub mod record;
pub mod writer;

pub use bsistent_common::{BsistentError, Result};
pub use encode::Encode;
pub use reader::ByteReader;
pub use record::{cmp_magnitude, compare_records, Record};
pub use writer::ByteWriter;

// Re-exported for use by the `record_codec!` macro expansion.
#[doc(hidden)]
pub use bytes;
