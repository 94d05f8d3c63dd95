//! Machine bootstrap: filesystem image and kernel image loading.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::console::Console;
use crate::emulator::Machine;
use crate::error::{EmuError, EmuResult};
use crate::memory::MEMORY_SIZE;
use crate::packer::FilesystemPacker;

/// Default host directory packed into the block device.
pub const DEFAULT_FS_INPUT: &str = "cfsin";

/// Outcome of loading the filesystem image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsLoad {
    /// The packer ran and this many bytes were stored.
    Loaded(usize),
    /// The packer could not be started; the block device stays zeroed.
    Blank,
}

/// Populates a machine before execution starts.
pub struct Bootstrap<'a> {
    packer: &'a dyn FilesystemPacker,
    fs_input: PathBuf,
}

impl<'a> Bootstrap<'a> {
    pub fn new(packer: &'a dyn FilesystemPacker) -> Self {
        Self {
            packer,
            fs_input: PathBuf::from(DEFAULT_FS_INPUT),
        }
    }

    /// Pack `dir` instead of the default input directory.
    pub fn fs_input(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fs_input = dir.into();
        self
    }

    /// Stream the packed filesystem into the block device.
    ///
    /// An image that fills the whole device is rejected as too large.
    pub fn load_filesystem<C: Console>(&self, machine: &mut Machine<C>) -> EmuResult<FsLoad> {
        let mut stream = match self.packer.pack(&self.fs_input) {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Can't initialize filesystem ({e}). Leaving blank.");
                return Ok(FsLoad::Blank);
            }
        };

        info!("Initializing filesystem from {}", self.fs_input.display());
        let block = machine.block_mut();
        let filled = block.fill_from(stream.as_mut())?;
        if filled == block.capacity() {
            return Err(EmuError::ImageTooLarge {
                limit: block.capacity(),
            });
        }
        Ok(FsLoad::Loaded(filled))
    }

    /// Copy the kernel image to the start of memory.
    pub fn load_kernel<C: Console>(&self, machine: &mut Machine<C>, image: &[u8]) -> EmuResult<()> {
        if image.len() > MEMORY_SIZE {
            return Err(EmuError::KernelTooLarge(image.len()));
        }
        machine.memory_mut().load(0, image)?;
        info!("Loaded kernel ({} bytes)", image.len());
        Ok(())
    }

    /// Run both steps: filesystem first, then kernel.
    pub fn load<C: Console>(&self, machine: &mut Machine<C>, kernel: &[u8]) -> EmuResult<FsLoad> {
        let fs = self.load_filesystem(machine)?;
        self.load_kernel(machine, kernel)?;
        Ok(fs)
    }
}

/// Unpack the block device contents into `dest` after a session.
pub fn unpack_filesystem<C: Console>(
    machine: &Machine<C>,
    packer: &dyn FilesystemPacker,
    dest: &Path,
) -> EmuResult<()> {
    info!("Unpacking filesystem into {}", dest.display());
    packer.unpack(machine.block().contents(), dest)
}
