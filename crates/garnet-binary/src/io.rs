use crate::error::BinaryError;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Cursor over an immutable byte buffer. Reads consume from the front.
#[derive(Debug, Clone)]
pub struct BinaryReader {
    buffer: Bytes,
}

impl BinaryReader {
    pub fn new(buffer: Bytes) -> Self {
        Self { buffer }
    }

    pub fn from_slice(data: &[u8]) -> Self {
        Self {
            buffer: Bytes::copy_from_slice(data),
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<(), BinaryError> {
        let remaining = self.buffer.remaining();
        if remaining < needed {
            return Err(BinaryError::UnexpectedEof { needed, remaining });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8, BinaryError> {
        self.ensure(1)?;
        Ok(self.buffer.get_u8())
    }

    pub fn read_u16_le(&mut self) -> Result<u16, BinaryError> {
        self.ensure(2)?;
        Ok(self.buffer.get_u16_le())
    }

    pub fn read_u16_be(&mut self) -> Result<u16, BinaryError> {
        self.ensure(2)?;
        Ok(self.buffer.get_u16())
    }

    pub fn read_u32_le(&mut self) -> Result<u32, BinaryError> {
        self.ensure(4)?;
        Ok(self.buffer.get_u32_le())
    }

    pub fn read_u32_be(&mut self) -> Result<u32, BinaryError> {
        self.ensure(4)?;
        Ok(self.buffer.get_u32())
    }

    /// Splits `len` bytes off the front without copying the payload.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes, BinaryError> {
        self.ensure(len)?;
        Ok(self.buffer.copy_to_bytes(len))
    }

    pub fn read_exact(&mut self, dst: &mut [u8]) -> Result<(), BinaryError> {
        self.ensure(dst.len())?;
        self.buffer.copy_to_slice(dst);
        Ok(())
    }
}

/// Growable byte buffer with write helpers matching `BinaryReader`.
#[derive(Debug, Clone, Default)]
pub struct BinaryWriter {
    buffer: BytesMut,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), BinaryError> {
        self.buffer.put_u8(value);
        Ok(())
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<(), BinaryError> {
        self.buffer.put_u16_le(value);
        Ok(())
    }

    pub fn write_u16_be(&mut self, value: u16) -> Result<(), BinaryError> {
        self.buffer.put_u16(value);
        Ok(())
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<(), BinaryError> {
        self.buffer.put_u32_le(value);
        Ok(())
    }

    pub fn write_u32_be(&mut self, value: u32) -> Result<(), BinaryError> {
        self.buffer.put_u32(value);
        Ok(())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<(), BinaryError> {
        self.buffer.put_slice(data);
        Ok(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    pub fn into_inner(self) -> BytesMut {
        self.buffer
    }
}
