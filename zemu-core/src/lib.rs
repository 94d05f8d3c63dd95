//! Z80 Shell Machine Core
//!
//! This crate provides the device and memory fabric of a single-CPU Z80
//! machine that runs a shell kernel:
//! - 64KB address space with an advisory ROM region
//! - Console port bridged to a host console
//! - Latched-address block storage device
//! - Bootstrap of kernel and filesystem images
//!
//! # Architecture
//!
//! - `MemoryBus` / `IoBus` traits: what the CPU engine is bound to
//! - `StepEngine` trait: single-step CPU primitive (`Z80Engine` wraps z80emu)
//! - `Console` trait: byte I/O abstraction
//! - `FilesystemPacker` trait: host directory <-> block device image
//! - `Emulator`: steps the engine over a `Machine` until halt or shutdown

pub mod blockdev;
pub mod bootstrap;
pub mod config;
pub mod console;
pub mod emulator;
pub mod engine;
pub mod error;
pub mod memory;
pub mod packer;
pub mod ports;

pub use blockdev::{AddressStatus, BlockDevice, Latch, MAX_SIZE};
pub use bootstrap::{unpack_filesystem, Bootstrap, FsLoad, DEFAULT_FS_INPUT};
pub use config::SessionConfig;
pub use console::{Console, HeadlessConsole};
pub use emulator::{Emulator, Machine};
pub use engine::{StepEngine, Z80Engine};
pub use error::{EmuError, EmuResult};
pub use memory::{AddressSpace, MemoryBus, RAM_START};
pub use packer::{CfsPacker, CommandPacker, FilesystemPacker};
pub use ports::{IoBus, PortMap};

/// Reason the execution loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// CPU executed HALT
    Halt,
    /// Console cleared the run flag (end of input or shutdown byte)
    Stopped,
}

/// Information about a finished session.
#[derive(Debug, Clone)]
pub struct SessionExit {
    pub reason: ExitReason,
    pub steps: u64,
    pub t_states: u64,
}
