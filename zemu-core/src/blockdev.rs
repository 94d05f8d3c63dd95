//! Latched-address block storage device.
//!
//! The device is driven through two ports. The address port is written three
//! times, most significant byte first, to select a 24-bit offset (the
//! cursor). The data port then reads or writes the single byte under the
//! cursor. The cursor never moves on data access; reaching the next byte
//! takes a fresh three-byte address sequence.

use std::io::{ErrorKind, Read};

use tracing::{debug, warn};

use crate::error::{EmuError, EmuResult};

/// Largest supported backing store, in bytes.
pub const MAX_SIZE: usize = 0x20000;

/// Fixed-capacity byte buffer with checked accessors.
#[derive(Clone)]
pub struct BlockBuffer {
    bytes: Vec<u8>,
}

impl BlockBuffer {
    /// Create a zero-filled buffer of `capacity` bytes.
    pub fn new(capacity: usize) -> Self {
        Self {
            bytes: vec![0; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.bytes.len()
    }

    pub fn get(&self, offset: usize) -> EmuResult<u8> {
        self.bytes
            .get(offset)
            .copied()
            .ok_or(EmuError::OutOfBounds {
                offset,
                capacity: self.bytes.len(),
            })
    }

    pub fn set(&mut self, offset: usize, value: u8) -> EmuResult<()> {
        let capacity = self.bytes.len();
        match self.bytes.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(EmuError::OutOfBounds { offset, capacity }),
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

/// Progress through the three-byte address sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Latch {
    /// Address complete; data port usable.
    Idle,
    /// High byte received.
    GotHigh,
    /// High and middle bytes received.
    GotMid,
}

/// Answer to a status query on the address port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AddressStatus {
    /// 0: cursor within bounds
    InBounds = 0,
    /// 1: cursor equals capacity (valid append point for writes, invalid for reads)
    AtEnd = 1,
    /// 2: cursor beyond capacity
    OutOfBounds = 2,
    /// 3: address sequence incomplete
    Incomplete = 3,
}

impl AddressStatus {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Block storage controller: backing buffer, address latch and cursor.
pub struct BlockDevice {
    buffer: BlockBuffer,
    cursor: u32,
    latch: Latch,
}

impl Default for BlockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockDevice {
    /// Create a device with the full [`MAX_SIZE`] backing store.
    pub fn new() -> Self {
        Self {
            buffer: BlockBuffer::new(MAX_SIZE),
            cursor: 0,
            latch: Latch::Idle,
        }
    }

    /// Create a device with a smaller backing store.
    pub fn with_capacity(capacity: usize) -> EmuResult<Self> {
        if capacity > MAX_SIZE {
            return Err(EmuError::CapacityTooLarge {
                requested: capacity,
                max: MAX_SIZE,
            });
        }
        Ok(Self {
            buffer: BlockBuffer::new(capacity),
            cursor: 0,
            latch: Latch::Idle,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    pub fn cursor(&self) -> u32 {
        self.cursor
    }

    pub fn latch(&self) -> Latch {
        self.latch
    }

    /// Backing store contents.
    pub fn contents(&self) -> &[u8] {
        self.buffer.as_slice()
    }

    /// Fill the backing store from `reader`, starting at offset 0.
    ///
    /// Stops at end of stream or once the store is full. Returns the number
    /// of bytes stored.
    pub fn fill_from(&mut self, reader: &mut dyn Read) -> EmuResult<usize> {
        let bytes = &mut self.buffer.bytes;
        let mut filled = 0;
        while filled < bytes.len() {
            match reader.read(&mut bytes[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        Ok(filled)
    }

    /// Feed one byte of the address sequence.
    pub fn select_address_byte(&mut self, value: u8) {
        let value = u32::from(value);
        self.latch = match self.latch {
            Latch::Idle => {
                self.cursor = value << 16;
                Latch::GotHigh
            }
            Latch::GotHigh => {
                self.cursor |= value << 8;
                Latch::GotMid
            }
            Latch::GotMid => {
                self.cursor |= value;
                Latch::Idle
            }
        };
    }

    /// Select a complete address, as the emulated program would with three writes.
    pub fn select_address(&mut self, offset: u32) {
        let [_, high, mid, low] = offset.to_be_bytes();
        self.select_address_byte(high);
        self.select_address_byte(mid);
        self.select_address_byte(low);
    }

    pub fn query_status(&self) -> AddressStatus {
        if self.latch != Latch::Idle {
            return AddressStatus::Incomplete;
        }
        let capacity = self.capacity();
        let cursor = self.cursor as usize;
        if cursor < capacity {
            AddressStatus::InBounds
        } else if cursor == capacity {
            AddressStatus::AtEnd
        } else {
            AddressStatus::OutOfBounds
        }
    }

    /// Read the byte under the cursor; 0 when the read is not allowed.
    pub fn read_byte(&self) -> u8 {
        if self.latch != Latch::Idle {
            warn!(
                "Reading block device in the middle of an addr op ({})",
                self.cursor
            );
            return 0;
        }
        match self.buffer.get(self.cursor as usize) {
            Ok(value) => {
                debug!("Reading block device at offset {}", self.cursor);
                value
            }
            Err(_) => {
                warn!("Out of bounds block device read at {}", self.cursor);
                0
            }
        }
    }

    /// Write the byte under the cursor; dropped when the write is not allowed.
    pub fn write_byte(&mut self, value: u8) {
        if self.latch != Latch::Idle {
            warn!(
                "Writing to block device in the middle of an addr op ({})",
                self.cursor
            );
            return;
        }
        match self.buffer.set(self.cursor as usize, value) {
            Ok(()) => debug!("Writing to block device ({})", self.cursor),
            Err(_) => warn!("Out of bounds block device write at {}", self.cursor),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn test_latch_cycle() {
        let mut dev = BlockDevice::new();
        assert_eq!(dev.latch(), Latch::Idle);

        dev.select_address_byte(0x01);
        assert_eq!(dev.latch(), Latch::GotHigh);
        assert_eq!(dev.cursor(), 0x01_0000);

        dev.select_address_byte(0x23);
        assert_eq!(dev.latch(), Latch::GotMid);
        assert_eq!(dev.cursor(), 0x01_2300);

        dev.select_address_byte(0x45);
        assert_eq!(dev.latch(), Latch::Idle);
        assert_eq!(dev.cursor(), 0x01_2345);
    }

    #[test]
    fn test_new_sequence_replaces_cursor() {
        let mut dev = BlockDevice::new();
        dev.select_address(0xFF_FFFF);
        dev.select_address(0x00_0102);
        assert_eq!(dev.cursor(), 0x0102);
    }

    #[test]
    fn test_status_against_capacity() {
        for capacity in [0, 1, 0x100, MAX_SIZE] {
            let mut dev = BlockDevice::with_capacity(capacity).unwrap();
            let size = capacity as u32;

            dev.select_address(size);
            assert_eq!(dev.query_status(), AddressStatus::AtEnd);
            assert_eq!(dev.query_status().code(), 1);

            if size > 0 {
                dev.select_address(size - 1);
                assert_eq!(dev.query_status(), AddressStatus::InBounds);
            }

            dev.select_address(size + 1);
            assert_eq!(dev.query_status(), AddressStatus::OutOfBounds);
        }
    }

    #[test]
    fn test_incomplete_address_blocks_data_port() {
        let mut dev = BlockDevice::new();
        dev.select_address(0);
        dev.write_byte(0x77);

        dev.select_address_byte(0);
        assert_eq!(dev.query_status().code(), 3);
        assert_eq!(dev.read_byte(), 0);
        dev.write_byte(0x11);

        dev.select_address_byte(0);
        assert_eq!(dev.query_status(), AddressStatus::Incomplete);
        assert_eq!(dev.read_byte(), 0);

        dev.select_address_byte(0);
        assert_eq!(dev.read_byte(), 0x77);
    }

    #[test]
    fn test_no_auto_advance() {
        let mut dev = BlockDevice::new();
        dev.fill_from(&mut Cursor::new(vec![1, 2, 3])).unwrap();
        dev.select_address(1);
        assert_eq!(dev.read_byte(), 2);
        assert_eq!(dev.read_byte(), 2);
        assert_eq!(dev.cursor(), 1);
    }

    #[test]
    fn test_write_then_read_back() {
        let mut dev = BlockDevice::new();
        dev.select_address(0);
        dev.write_byte(0xAB);
        dev.select_address(0);
        assert_eq!(dev.read_byte(), 0xAB);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let mut dev = BlockDevice::with_capacity(16).unwrap();
        dev.select_address(16);
        dev.write_byte(0x42);
        assert_eq!(dev.read_byte(), 0);
        assert!(dev.contents().iter().all(|&b| b == 0));

        dev.select_address(0xFF_FFFF);
        assert_eq!(dev.read_byte(), 0);
    }

    #[test]
    fn test_capacity_limit() {
        assert!(BlockDevice::with_capacity(MAX_SIZE).is_ok());
        assert!(matches!(
            BlockDevice::with_capacity(MAX_SIZE + 1),
            Err(EmuError::CapacityTooLarge { .. })
        ));
    }

    #[test]
    fn test_fill_from_stops_when_full() {
        let mut dev = BlockDevice::with_capacity(4).unwrap();
        let filled = dev.fill_from(&mut Cursor::new(vec![9; 10])).unwrap();
        assert_eq!(filled, 4);
        assert_eq!(dev.contents(), &[9, 9, 9, 9]);
    }

    #[test]
    fn test_buffer_checked_access() {
        let mut buf = BlockBuffer::new(2);
        buf.set(1, 5).unwrap();
        assert_eq!(buf.get(1).unwrap(), 5);
        assert!(matches!(
            buf.get(2),
            Err(EmuError::OutOfBounds {
                offset: 2,
                capacity: 2
            })
        ));
        assert!(buf.set(2, 0).is_err());
    }
}
