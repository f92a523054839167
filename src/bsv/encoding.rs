//! Stream cursor for the BSV envelopes (BUMP, BEEF)
//!
//! Compact-size integers and transactions are decoded with the `bitcoin`
//! consensus codec; the cursor only tracks where the next item starts.

use bitcoin::consensus::encode::{deserialize_partial, serialize, Decodable, VarInt};

use crate::errors::{WalletError, WalletResult};

/// Number of bytes a varint takes for `value`
pub fn varint_size(value: u64) -> usize {
    VarInt(value).size()
}

pub fn write_varint(buf: &mut Vec<u8>, value: u64) {
    buf.extend_from_slice(&serialize(&VarInt(value)));
}

/// Length-prefixed byte string
pub fn write_var_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_varint(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Cursor over a byte slice
#[derive(Debug)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn rest(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    pub fn read_bytes(&mut self, len: usize) -> WalletResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(WalletError::SerializationError(format!(
                "Unexpected end of data: wanted {len} bytes at offset {}, {} left",
                self.position,
                self.remaining()
            )));
        }
        let slice = &self.data[self.position..self.position + len];
        self.position += len;
        Ok(slice)
    }

    pub fn read_array<const N: usize>(&mut self) -> WalletResult<[u8; N]> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    pub fn read_u8(&mut self) -> WalletResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u32_le(&mut self) -> WalletResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Decode one consensus item and advance past it
    pub fn read_consensus<T: Decodable>(&mut self) -> WalletResult<T> {
        let (value, used) = deserialize_partial::<T>(self.rest()).map_err(|e| {
            WalletError::SerializationError(format!("at offset {}: {e}", self.position))
        })?;
        self.position += used;
        Ok(value)
    }

    pub fn read_varint(&mut self) -> WalletResult<u64> {
        let VarInt(value) = self.read_consensus()?;
        Ok(value)
    }

    /// Varint used as a length or count, bounded by the bytes left
    pub fn read_length(&mut self) -> WalletResult<usize> {
        let value = self.read_varint()?;
        if value > self.remaining() as u64 {
            return Err(WalletError::SerializationError(format!(
                "Declared length {value} exceeds remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(value as usize)
    }
}
