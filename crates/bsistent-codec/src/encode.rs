//! The [`Encode`] trait and its implementations for the supported kinds.

use crate::reader::ByteReader;
use crate::writer::ByteWriter;
use bsistent_common::{BsistentError, Result};
use std::collections::HashMap;
use std::hash::Hash;

/// A value with a deterministic binary wire form.
///
/// Fixed scalars encode as their raw little-endian bytes (`isize`/`usize`
/// widened to 64 bits), strings, vectors and arrays carry a `u32`
/// length prefix, maps a `u32` pair count. Struct impls (usually generated
/// by [`record_codec!`](crate::record_codec)) frame their fields with a
/// `u32` payload length.
///
/// Encoding into memory cannot fail; decoding returns an error for short
/// buffers and malformed prefixes.
pub trait Encode: Sized {
    fn encode(&self, w: &mut ByteWriter);

    fn decode(r: &mut ByteReader<'_>) -> Result<Self>;

    /// Length in bytes of the encoded form.
    fn encoded_size(&self) -> usize {
        let mut w = ByteWriter::new();
        self.encode(&mut w);
        w.len()
    }
}

macro_rules! fixed_scalar {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Encode for $ty {
                fn encode(&self, w: &mut ByteWriter) {
                    w.$put(*self);
                }

                fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
                    r.$get()
                }
            }
        )*
    };
}

fixed_scalar! {
    bool => put_bool, get_bool;
    u8 => put_u8, get_u8;
    i8 => put_i8, get_i8;
    u16 => put_u16, get_u16;
    i16 => put_i16, get_i16;
    u32 => put_u32, get_u32;
    i32 => put_i32, get_i32;
    u64 => put_u64, get_u64;
    i64 => put_i64, get_i64;
    f32 => put_f32, get_f32;
    f64 => put_f64, get_f64;
}

// Pointer-sized integers are widened to 64 bits so the wire form does not
// depend on the host platform.
impl Encode for isize {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_i64(*self as i64);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(r.get_i64()? as isize)
    }
}

impl Encode for usize {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_u64(*self as u64);
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        Ok(r.get_u64()? as usize)
    }
}

impl Encode for String {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_block(self.as_bytes());
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let bytes = r.get_block()?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| BsistentError::InvalidUtf8(e.to_string()))
    }
}

impl<T: Encode> Encode for Vec<T> {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_u32(self.len() as u32);
        for element in self {
            element.encode(w);
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.get_u32()? as usize;
        let mut elements = Vec::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            elements.push(T::decode(r)?);
        }
        Ok(elements)
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, w: &mut ByteWriter) {
        w.put_u32(N as u32);
        for element in self {
            element.encode(w);
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.get_u32()? as usize;
        if count != N {
            return Err(BsistentError::Corrupted(format!(
                "array length mismatch: encoded {count}, expected {N}"
            )));
        }
        let mut elements = Vec::with_capacity(N);
        for _ in 0..N {
            elements.push(T::decode(r)?);
        }
        elements
            .try_into()
            .map_err(|_| BsistentError::Corrupted("array length mismatch".to_string()))
    }
}

impl<K, V> Encode for HashMap<K, V>
where
    K: Encode + Eq + Hash,
    V: Encode,
{
    /// Pair order on the wire is unspecified; round-trip equality is by set
    /// semantics.
    fn encode(&self, w: &mut ByteWriter) {
        w.put_u32(self.len() as u32);
        for (key, value) in self {
            key.encode(w);
            value.encode(w);
        }
    }

    fn decode(r: &mut ByteReader<'_>) -> Result<Self> {
        let count = r.get_u32()? as usize;
        let mut map = HashMap::with_capacity(count.min(r.remaining()));
        for _ in 0..count {
            let key = K::decode(r)?;
            let value = V::decode(r)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip<T: Encode + PartialEq + std::fmt::Debug>(value: T) {
        let mut w = ByteWriter::new();
        value.encode(&mut w);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes);
        let decoded = T::decode(&mut r).unwrap();
        assert_eq!(decoded, value);
        assert!(r.is_empty(), "decode consumed {} of {} bytes", bytes.len() - r.remaining(), bytes.len());
    }

    #[test]
    fn test_scalar_roundtrips() {
        roundtrip(0u8);
        roundtrip(-3i8);
        roundtrip(4660u16);
        roundtrip(-30000i16);
        roundtrip(0xDEAD_BEEFu32);
        roundtrip(i32::MIN);
        roundtrip(u64::MAX);
        roundtrip(-1i64);
        roundtrip(3.5f32);
        roundtrip(-2.25f64);
        roundtrip(true);
        roundtrip(false);
    }

    #[test]
    fn test_pointer_sized_widened() {
        assert_eq!(7usize.encoded_size(), 8);
        assert_eq!((-7isize).encoded_size(), 8);
        roundtrip(123usize);
        roundtrip(-123isize);
    }

    #[test]
    fn test_string_roundtrip() {
        roundtrip(String::new());
        roundtrip("hello".to_string());
        roundtrip("héllo wörld".to_string());
    }

    #[test]
    fn test_string_wire_form() {
        let mut w = ByteWriter::new();
        "ab".to_string().encode(&mut w);
        assert_eq!(w.as_slice(), [2, 0, 0, 0, b'a', b'b']);
    }

    #[test]
    fn test_string_invalid_utf8() {
        let data = [2, 0, 0, 0, 0xFF, 0xFE];
        let mut r = ByteReader::new(&data);
        let err = String::decode(&mut r).unwrap_err();
        assert!(matches!(err, BsistentError::InvalidUtf8(_)));
    }

    #[test]
    fn test_vec_roundtrip() {
        roundtrip(Vec::<i64>::new());
        roundtrip(vec![1i64, -2, 3]);
        roundtrip(vec!["a".to_string(), "bb".to_string()]);
        roundtrip(vec![vec![1u8, 2], vec![3u8]]);
    }

    #[test]
    fn test_vec_wire_form() {
        let mut w = ByteWriter::new();
        vec![1u16, 2].encode(&mut w);
        assert_eq!(w.as_slice(), [2, 0, 0, 0, 1, 0, 2, 0]);
    }

    #[test]
    fn test_array_roundtrip() {
        roundtrip([1i64, -2, 3]);
        roundtrip([0u8; 4]);
        roundtrip(["a".to_string(), "bb".to_string()]);
    }

    #[test]
    fn test_array_shares_the_slice_wire_form() {
        let mut as_array = ByteWriter::new();
        [1u16, 2].encode(&mut as_array);
        let mut as_vec = ByteWriter::new();
        vec![1u16, 2].encode(&mut as_vec);
        assert_eq!(as_array.as_slice(), as_vec.as_slice());
    }

    #[test]
    fn test_array_length_mismatch_is_an_error() {
        let mut w = ByteWriter::new();
        [1i64, 2, 3].encode(&mut w);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes);
        assert!(matches!(
            <[i64; 2]>::decode(&mut r),
            Err(BsistentError::Corrupted(_))
        ));
    }

    #[test]
    fn test_map_roundtrip_by_set_semantics() {
        let mut map = HashMap::new();
        map.insert("one".to_string(), 1i64);
        map.insert("two".to_string(), 2i64);
        map.insert("three".to_string(), 3i64);

        let mut w = ByteWriter::new();
        map.encode(&mut w);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes);
        let decoded: HashMap<String, i64> = HashMap::decode(&mut r).unwrap();
        assert_eq!(decoded, map);
    }

    #[test]
    fn test_truncated_vec_is_an_error() {
        let mut w = ByteWriter::new();
        vec![1i64, 2, 3].encode(&mut w);
        let bytes = w.freeze();
        let mut r = ByteReader::new(&bytes[..bytes.len() - 4]);
        assert!(Vec::<i64>::decode(&mut r).is_err());
    }

    #[test]
    fn test_encoded_size_matches_output() {
        let value = vec!["abc".to_string(), "defg".to_string()];
        let mut w = ByteWriter::new();
        value.encode(&mut w);
        assert_eq!(value.encoded_size(), w.len());
    }
}
