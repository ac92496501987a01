//! Wire codec: length-prefixed big-endian framing for
//! primitive integers, strings, and big numbers, over a growable buffer
//! that supports `add`, `prepend`, and `remove` without a second copy.
//!
//! This is how the engine inserts its `[control_block, recipient_id]`
//! header in front of an implementation-written payload: the
//! implementation writes its bytes first with `add_*`, and the engine
//! later `prepend`s its header — one allocation, not two.

use crate::error::{Error, Result};
use num_bigint::BigUint;

/// A growable byte buffer that owns outgoing bytes until the transport
/// takes them.
#[derive(Debug, Clone, Default)]
pub struct Buffer {
    bytes: Vec<u8>,
}

impl Buffer {
    #[must_use]
    pub fn new() -> Self {
        Buffer { bytes: Vec::new() }
    }

    #[must_use]
    pub fn with_capacity(cap: usize) -> Self {
        Buffer {
            bytes: Vec::with_capacity(cap),
        }
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Buffer { bytes }
    }

    #[must_use]
    pub fn length(&self) -> usize {
        self.bytes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
    }

    /// Appends raw bytes to the end of the buffer.
    pub fn add_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Inserts raw bytes at the front of the buffer. Used by the engine to
    /// add its wire header in front of payload bytes already written by
    /// the fronctocol implementation.
    pub fn prepend_bytes(&mut self, bytes: &[u8]) {
        self.bytes.splice(0..0, bytes.iter().copied());
    }

    /// Removes and returns the first `n` bytes.
    pub fn remove(&mut self, n: usize) -> Vec<u8> {
        let tail = self.bytes.split_off(n.min(self.bytes.len()));
        std::mem::replace(&mut self.bytes, tail)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<u8> {
        self.bytes
    }

    #[must_use]
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor {
            bytes: &self.bytes,
            pos: 0,
        }
    }

    pub fn add_u8(&mut self, v: u8) {
        self.bytes.push(v);
    }

    pub fn add_u32(&mut self, v: u32) {
        self.add_bytes(&v.to_be_bytes());
    }

    pub fn add_u64(&mut self, v: u64) {
        self.add_bytes(&v.to_be_bytes());
    }

    pub fn prepend_u8(&mut self, v: u8) {
        self.prepend_bytes(&[v]);
    }

    pub fn prepend_u64(&mut self, v: u64) {
        self.prepend_bytes(&v.to_be_bytes());
    }

    /// `u32`-length-prefixed UTF-8 string.
    pub fn add_string(&mut self, s: &str) {
        self.add_u32(u32::try_from(s.len()).expect("string longer than u32::MAX"));
        self.add_bytes(s.as_bytes());
    }

    /// `u16`-length-prefixed big-endian magnitude. Fails hard, rather
    /// than silently truncating, if the magnitude is `>= 2^16` bytes.
    pub fn add_big_number(&mut self, n: &BigUint) -> Result<()> {
        let magnitude = n.to_bytes_be();
        if magnitude.len() >= (1 << 16) {
            return Err(Error::BigNumberTooLarge(magnitude.len()));
        }
        self.add_bytes(&u16::try_from(magnitude.len()).unwrap().to_be_bytes());
        self.add_bytes(&magnitude);
        Ok(())
    }
}

/// A read-only, position-tracking view over a buffer's bytes.
#[derive(Debug, Clone, Copy)]
pub struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Cursor { bytes, pos: 0 }
    }

    #[must_use]
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Transport(format!(
                "short read: wanted {n} bytes, {} remaining",
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(u32::from_be_bytes(self.take(4)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        Ok(u64::from_be_bytes(self.take(8)?.try_into().unwrap()))
    }

    pub fn read_string(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Transport(format!("invalid utf8 in wire string: {e}")))
    }

    pub fn read_big_number(&mut self) -> Result<BigUint> {
        let len = u16::from_be_bytes(self.take(2)?.try_into().unwrap()) as usize;
        Ok(BigUint::from_bytes_be(self.take(len)?))
    }

    /// Every byte not yet consumed, without advancing the cursor.
    #[must_use]
    pub fn remaining_bytes(&self) -> &'a [u8] {
        &self.bytes[self.pos..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integers_round_trip() {
        let mut buf = Buffer::new();
        buf.add_u32(42);
        buf.add_u64(u64::MAX);
        let mut cursor = buf.cursor();
        assert_eq!(cursor.read_u32().unwrap(), 42);
        assert_eq!(cursor.read_u64().unwrap(), u64::MAX);
    }

    #[test]
    fn prepend_inserts_header_without_disturbing_payload() {
        let mut buf = Buffer::new();
        buf.add_string("payload");
        buf.prepend_u8(0x01);
        buf.prepend_u64(7);
        let mut cursor = buf.cursor();
        assert_eq!(cursor.read_u8().unwrap(), 0x01);
        assert_eq!(cursor.read_u64().unwrap(), 7);
        assert_eq!(cursor.read_string().unwrap(), "payload");
    }

    #[test]
    fn big_number_round_trips() {
        let mut buf = Buffer::new();
        let n = BigUint::from(123_456_789_u64);
        buf.add_big_number(&n).unwrap();
        let mut cursor = buf.cursor();
        assert_eq!(cursor.read_big_number().unwrap(), n);
    }

    #[test]
    fn oversized_big_number_is_a_hard_error() {
        let mut buf = Buffer::new();
        let huge = BigUint::from(1_u8) << (17 * 8); // 17 bytes of magnitude
        assert!(matches!(
            buf.add_big_number(&huge),
            Err(Error::BigNumberTooLarge(_))
        ));
    }

    #[test]
    fn remove_splits_the_front_off() {
        let mut buf = Buffer::new();
        buf.add_bytes(&[1, 2, 3, 4, 5]);
        let front = buf.remove(2);
        assert_eq!(front, vec![1, 2]);
        assert_eq!(buf.as_slice(), &[3, 4, 5]);
    }

    proptest::proptest! {
        #[test]
        fn mixed_writes_read_back_in_order(
            a in proptest::prelude::any::<u32>(),
            b in proptest::prelude::any::<u64>(),
            s in "[a-zA-Z0-9 ]{0,64}",
            n in proptest::prelude::any::<u64>(),
        ) {
            let mut buf = Buffer::new();
            buf.add_u32(a);
            buf.add_string(&s);
            buf.add_u64(b);
            buf.add_big_number(&BigUint::from(n)).unwrap();
            let mut cursor = buf.cursor();
            proptest::prop_assert_eq!(cursor.read_u32().unwrap(), a);
            proptest::prop_assert_eq!(cursor.read_string().unwrap(), s);
            proptest::prop_assert_eq!(cursor.read_u64().unwrap(), b);
            proptest::prop_assert_eq!(cursor.read_big_number().unwrap(), BigUint::from(n));
            proptest::prop_assert_eq!(cursor.remaining(), 0);
        }
    }
}
