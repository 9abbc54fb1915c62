//! Bit-level reader and writer used by the TC string segments.
//!
//! Fields are written most-significant bit first, packed without alignment.
//! The writer pads the final byte with zero bits; the reader never looks past
//! the last byte and reports [`TcStringError::Truncated`] instead.

use super::errors::TcStringError;
use super::id_set::IdSet;

#[derive(Debug, Default)]
pub struct BitWriter {
    bytes: Vec<u8>,
    len: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bits written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn push_bool(&mut self, bit: bool) {
        if self.len % 8 == 0 {
            self.bytes.push(0);
        }
        if bit {
            let last = self.bytes.len() - 1;
            self.bytes[last] |= 0x80 >> (self.len % 8);
        }
        self.len += 1;
    }

    /// Writes the low `width` bits of `value`.
    pub fn push(&mut self, field: &'static str, value: u64, width: u8) -> Result<(), TcStringError> {
        if width < 64 && value >> width != 0 {
            return Err(TcStringError::FieldOverflow { field, value, bits: width });
        }
        for shift in (0..width).rev() {
            self.push_bool((value >> shift) & 1 == 1);
        }
        Ok(())
    }

    /// Two uppercase letters, six bits each, `A` = 0.
    pub fn push_letters(&mut self, field: &'static str, code: &str) -> Result<(), TcStringError> {
        let bytes = code.as_bytes();
        if bytes.len() != 2 {
            return Err(TcStringError::InvalidLetter(bytes.first().copied().unwrap_or(0)));
        }
        for b in bytes {
            let upper = b.to_ascii_uppercase();
            if !upper.is_ascii_uppercase() {
                return Err(TcStringError::InvalidLetter(*b));
            }
            self.push(field, u64::from(upper - b'A'), 6)?;
        }
        Ok(())
    }

    /// Fixed-width bitfield where bit `i` (1-based) marks id `i` as present.
    pub fn push_fixed_set(&mut self, field: &'static str, set: &IdSet, width: u16) -> Result<(), TcStringError> {
        if let Some(id) = set.iter().find(|id| *id == 0 || *id > width) {
            return Err(TcStringError::IdOutOfRange { field, id });
        }
        for id in 1..=width {
            self.push_bool(set.has(id));
        }
        Ok(())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

#[derive(Debug)]
pub struct BitReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() * 8 - self.pos
    }

    fn ensure(&self, needed: usize) -> Result<(), TcStringError> {
        let available = self.remaining();
        if needed > available {
            return Err(TcStringError::Truncated { needed, available });
        }
        Ok(())
    }

    pub fn read_bool(&mut self) -> Result<bool, TcStringError> {
        self.ensure(1)?;
        let byte = self.bytes[self.pos / 8];
        let bit = byte & (0x80 >> (self.pos % 8)) != 0;
        self.pos += 1;
        Ok(bit)
    }

    pub fn read(&mut self, width: u8) -> Result<u64, TcStringError> {
        self.ensure(usize::from(width))?;
        let mut value = 0u64;
        for _ in 0..width {
            value = (value << 1) | u64::from(self.read_bool()?);
        }
        Ok(value)
    }

    pub fn read_u16(&mut self, width: u8) -> Result<u16, TcStringError> {
        Ok(self.read(width)? as u16)
    }

    pub fn read_letters(&mut self) -> Result<String, TcStringError> {
        let mut code = String::with_capacity(2);
        for _ in 0..2 {
            let v = self.read(6)? as u8;
            if v > 25 {
                return Err(TcStringError::InvalidLetter(v));
            }
            code.push(char::from(b'A' + v));
        }
        Ok(code)
    }

    pub fn read_fixed_set(&mut self, width: u16) -> Result<IdSet, TcStringError> {
        self.ensure(usize::from(width))?;
        let mut set = IdSet::new();
        for id in 1..=width {
            if self.read_bool()? {
                set.set(id);
            }
        }
        Ok(set)
    }
}
