//! Record keys and ordering.
//!
//! A [`Record`] is a value the tree can store: encodable, cloneable, with a
//! zero value (`Default`) that marks an empty slot. Its `key()` designates
//! the fields records are ordered by; the default is the whole encoded
//! record.
//!
//! Key fields compare as the non-negative integer their little-endian
//! encoded bytes denote. For fixed-width integers this orders non-negative
//! values numerically, but two's-complement negatives sort *above* all
//! positives; callers that need signed ordering should key on an unsigned
//! encoding. Strings order by byte length first, then by content from the
//! most significant (last) byte down. Records whose implicit whole-record
//! key contains a map do not order deterministically; designate explicit
//! key fields instead.

use crate::encode::Encode;
use crate::writer::ByteWriter;
use bytes::Bytes;
use std::cmp::Ordering;

/// A storable record with designated comparison keys.
pub trait Record: Encode + Clone + Default + PartialEq {
    /// Encoded key fields in declaration order, earlier fields dominant.
    ///
    /// The default takes the whole encoded record as a single key field.
    fn key(&self) -> Vec<Bytes> {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        vec![w.freeze()]
    }
}

macro_rules! whole_value_record {
    ($($ty:ty),* $(,)?) => {
        $(impl Record for $ty {})*
    };
}

whole_value_record! {
    bool, u8, i8, u16, i16, u32, i32, u64, i64, usize, isize, f32, f64, String,
}

/// Compares two records field by field over their key fields.
pub fn compare_records<T: Record>(a: &T, b: &T) -> Ordering {
    let keys_a = a.key();
    let keys_b = b.key();
    for (field_a, field_b) in keys_a.iter().zip(keys_b.iter()) {
        match cmp_magnitude(field_a, field_b) {
            Ordering::Equal => continue,
            decided => return decided,
        }
    }
    Ordering::Equal
}

/// Compares two encoded fields as non-negative little-endian integers.
///
/// High-order zero bytes (the trailing bytes of a little-endian encoding)
/// are not significant, so the longer significant run wins, and equal runs
/// compare from the most significant byte down.
pub fn cmp_magnitude(a: &[u8], b: &[u8]) -> Ordering {
    let a = significant(a);
    let b = significant(b);
    a.len()
        .cmp(&b.len())
        .then_with(|| a.iter().rev().cmp(b.iter().rev()))
}

fn significant(bytes: &[u8]) -> &[u8] {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    &bytes[..end]
}

/// Generates [`Encode`] and [`Record`] impls for a struct.
///
/// The struct itself is declared separately and must derive `Clone`,
/// `Default`, and `PartialEq`. Fields encode in the listed order inside a
/// `u32`-length-prefixed payload. An optional `key [field, ...]` suffix
/// designates the comparison keys; without it the whole record is the key.
///
/// ```
/// use bsistent_codec::record_codec;
///
/// #[derive(Debug, Clone, Default, PartialEq)]
/// struct Account {
///     id: String,
///     balance: i64,
/// }
///
/// record_codec!(Account { id: String, balance: i64 } key [id]);
/// ```
#[macro_export]
macro_rules! record_codec {
    ($name:ident { $($field:ident: $ty:ty),+ $(,)? } key [$($key:ident),+ $(,)?]) => {
        $crate::record_codec!(@encode $name { $($field: $ty),+ });

        impl $crate::Record for $name {
            fn key(&self) -> ::std::vec::Vec<$crate::bytes::Bytes> {
                ::std::vec![
                    $({
                        let mut w = $crate::ByteWriter::new();
                        $crate::Encode::encode(&self.$key, &mut w);
                        w.freeze()
                    }),+
                ]
            }
        }
    };
    ($name:ident { $($field:ident: $ty:ty),+ $(,)? }) => {
        $crate::record_codec!(@encode $name { $($field: $ty),+ });

        impl $crate::Record for $name {}
    };
    (@encode $name:ident { $($field:ident: $ty:ty),+ }) => {
        impl $crate::Encode for $name {
            fn encode(&self, w: &mut $crate::ByteWriter) {
                let mut body = $crate::ByteWriter::new();
                $($crate::Encode::encode(&self.$field, &mut body);)+
                w.put_block(body.as_slice());
            }

            fn decode(r: &mut $crate::ByteReader<'_>) -> $crate::Result<Self> {
                let payload = r.get_block()?;
                let mut body = $crate::ByteReader::new(payload);
                Ok(Self {
                    $($field: <$ty as $crate::Encode>::decode(&mut body)?),+
                })
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ByteReader;

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Keyed {
        id: String,
        more: i64,
    }

    record_codec!(Keyed { id: String, more: i64 } key [id]);

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Unkeyed {
        a: i64,
        b: i64,
    }

    record_codec!(Unkeyed { a: i64, b: i64 });

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Nested {
        name: String,
        tags: Vec<String>,
        inner: Unkeyed,
    }

    record_codec!(Nested { name: String, tags: Vec<String>, inner: Unkeyed } key [name]);

    #[test]
    fn test_struct_wire_form_has_length_prefix() {
        let v = Unkeyed { a: 1, b: 2 };
        let mut w = ByteWriter::new();
        v.encode(&mut w);
        let bytes = w.freeze();
        // u32 payload length followed by two i64 fields
        assert_eq!(bytes.len(), 4 + 16);
        assert_eq!(&bytes[..4], [16, 0, 0, 0]);
    }

    #[test]
    fn test_struct_roundtrip() {
        let v = Keyed {
            id: "abc".to_string(),
            more: -9,
        };
        let mut w = ByteWriter::new();
        v.encode(&mut w);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Keyed::decode(&mut r).unwrap(), v);
    }

    #[test]
    fn test_nested_struct_roundtrip() {
        let v = Nested {
            name: "n".to_string(),
            tags: vec!["x".to_string(), "yz".to_string()],
            inner: Unkeyed { a: 5, b: -5 },
        };
        let mut w = ByteWriter::new();
        v.encode(&mut w);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Nested::decode(&mut r).unwrap(), v);
    }

    #[test]
    fn test_decode_ignores_trailing_padding() {
        // A record read back out of a fixed-width item slot sees zero
        // padding after its payload.
        let v = Keyed {
            id: "pad".to_string(),
            more: 1,
        };
        let mut w = ByteWriter::new();
        v.encode(&mut w);
        w.put_zeros(16);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes);
        assert_eq!(Keyed::decode(&mut r).unwrap(), v);
    }

    #[test]
    fn test_key_uses_designated_field_only() {
        let a = Keyed {
            id: "same".to_string(),
            more: 1,
        };
        let b = Keyed {
            id: "same".to_string(),
            more: 999,
        };
        assert_eq!(compare_records(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_default_key_is_whole_record() {
        let a = Unkeyed { a: 1, b: 1 };
        let b = Unkeyed { a: 1, b: 2 };
        assert_ne!(compare_records(&a, &b), Ordering::Equal);
    }

    #[test]
    fn test_integer_keys_order_numerically() {
        let values = [0i64, 1, 2, 255, 256, 257, 65535, 1 << 40, i64::MAX];
        for window in values.windows(2) {
            assert_eq!(
                compare_records(&window[0], &window[1]),
                Ordering::Less,
                "{} should order before {}",
                window[0],
                window[1]
            );
        }
    }

    #[test]
    fn test_negative_integers_sort_above_positives() {
        assert_eq!(compare_records(&-1i64, &i64::MAX), Ordering::Greater);
    }

    #[test]
    fn test_cmp_magnitude_strips_high_zero_bytes() {
        assert_eq!(cmp_magnitude(&[1, 0, 0, 0], &[1]), Ordering::Equal);
        assert_eq!(cmp_magnitude(&[0, 0], &[]), Ordering::Equal);
        assert_eq!(cmp_magnitude(&[2, 0], &[1, 1]), Ordering::Less);
    }

    #[test]
    fn test_string_keys_order_by_length_then_content() {
        let short = "zz".to_string();
        let long = "aaa".to_string();
        assert_eq!(compare_records(&short, &long), Ordering::Less);

        let a = "xa".to_string();
        let b = "xb".to_string();
        assert_eq!(compare_records(&a, &b), Ordering::Less);
    }

    #[test]
    fn test_equal_keys_compare_equal() {
        let a = "same".to_string();
        let b = "same".to_string();
        assert_eq!(compare_records(&a, &b), Ordering::Equal);
    }
}
