//! Bounds-checked little-endian byte reader.

use bsistent_common::{BsistentError, Result};
use bytes::Buf;

/// Cursor over a byte slice that decodes little-endian wire values.
///
/// Every read is bounds-checked; running past the end of the buffer yields
/// [`BsistentError::BufferUnderflow`] rather than panicking, so a truncated
/// or corrupted page surfaces as a decode error.
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Number of bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Consumes and returns the next `count` bytes.
    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.data.len() < count {
            return Err(BsistentError::BufferUnderflow {
                needed: count,
                remaining: self.data.len(),
            });
        }
        let (head, rest) = self.data.split_at(count);
        self.data = rest;
        Ok(head)
    }

    pub fn get_bool(&mut self) -> Result<bool> {
        Ok(self.get_u8()? != 0)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn get_i8(&mut self) -> Result<i8> {
        Ok(self.get_u8()? as i8)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(self.take(2)?.get_u16_le())
    }

    pub fn get_i16(&mut self) -> Result<i16> {
        Ok(self.take(2)?.get_i16_le())
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        Ok(self.take(4)?.get_u32_le())
    }

    pub fn get_i32(&mut self) -> Result<i32> {
        Ok(self.take(4)?.get_i32_le())
    }

    pub fn get_u64(&mut self) -> Result<u64> {
        Ok(self.take(8)?.get_u64_le())
    }

    pub fn get_i64(&mut self) -> Result<i64> {
        Ok(self.take(8)?.get_i64_le())
    }

    pub fn get_f32(&mut self) -> Result<f32> {
        Ok(self.take(4)?.get_f32_le())
    }

    pub fn get_f64(&mut self) -> Result<f64> {
        Ok(self.take(8)?.get_f64_le())
    }

    /// Reads a `u32` length prefix and returns that many payload bytes.
    pub fn get_block(&mut self) -> Result<&'a [u8]> {
        let len = self.get_u32()? as usize;
        self.take(len)
    }
}
