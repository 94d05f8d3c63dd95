//! Flat 64KB address space with an advisory read-only low region.

use tracing::warn;

use crate::error::{EmuError, EmuResult};

/// Size of the address space in bytes.
pub const MEMORY_SIZE: usize = 0x10000;

/// First writable address. Everything below is the ROM region holding the
/// kernel image.
pub const RAM_START: u16 = 0x4000;

/// Memory side of the bus the CPU engine is bound to.
pub trait MemoryBus {
    /// Read the byte stored at `addr`.
    fn read(&self, addr: u16) -> u8;

    /// Store `value` at `addr`.
    fn write(&mut self, addr: u16, value: u8);
}

/// 64KB machine memory.
///
/// Writes below [`RAM_START`] are reported as ROM violations but still land
/// in memory: protection is advisory only.
pub struct AddressSpace {
    bytes: Box<[u8]>,
    rom_writes: u64,
}

impl Default for AddressSpace {
    fn default() -> Self {
        Self::new()
    }
}

impl AddressSpace {
    /// Create a zero-filled address space.
    pub fn new() -> Self {
        Self {
            bytes: vec![0; MEMORY_SIZE].into_boxed_slice(),
            rom_writes: 0,
        }
    }

    /// Copy `data` verbatim starting at `offset`.
    ///
    /// This is a host-side load and never counts as a ROM violation.
    pub fn load(&mut self, offset: u16, data: &[u8]) -> EmuResult<()> {
        let start = offset as usize;
        let end = start + data.len();
        if end > MEMORY_SIZE {
            return Err(EmuError::KernelTooLarge(data.len()));
        }
        self.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Number of writes that targeted the ROM region.
    pub fn rom_writes(&self) -> u64 {
        self.rom_writes
    }

    /// Whole memory contents.
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl MemoryBus for AddressSpace {
    fn read(&self, addr: u16) -> u8 {
        self.bytes[addr as usize]
    }

    fn write(&mut self, addr: u16, value: u8) {
        if addr < RAM_START {
            self.rom_writes += 1;
            warn!("Writing to ROM ({addr:#06x})!");
        }
        self.bytes[addr as usize] = value;
    }
}
