//! I/O port map.
//!
//! | Port | Device | Read | Write |
//! |------|--------|------|-------|
//! | 0 | console | next input byte | output byte, 0x04 shuts down |
//! | 1 | block data | byte at cursor | byte at cursor |
//! | 2 | block address | status code 0-3 | next address byte, MSB first |

use tracing::warn;

use crate::blockdev::BlockDevice;
use crate::console::{Console, ConsoleDevice};

pub const CONSOLE_PORT: u8 = 0x00;
pub const BLOCK_DATA_PORT: u8 = 0x01;
pub const BLOCK_ADDR_PORT: u8 = 0x02;

/// I/O side of the bus the CPU engine is bound to.
pub trait IoBus {
    fn read_port(&mut self, port: u8) -> u8;

    fn write_port(&mut self, port: u8, value: u8);
}

/// Devices reachable through the port map, plus the machine run flag.
pub struct PortMap<C: Console> {
    console: ConsoleDevice<C>,
    block: BlockDevice,
    running: bool,
}

impl<C: Console> PortMap<C> {
    pub fn new(console: C, block: BlockDevice) -> Self {
        Self {
            console: ConsoleDevice::new(console),
            block,
            running: true,
        }
    }

    /// Whether the execution loop should keep going.
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn console(&self) -> &C {
        self.console.console()
    }

    pub fn console_mut(&mut self) -> &mut C {
        self.console.console_mut()
    }

    pub fn block(&self) -> &BlockDevice {
        &self.block
    }

    pub fn block_mut(&mut self) -> &mut BlockDevice {
        &mut self.block
    }
}

impl<C: Console> IoBus for PortMap<C> {
    fn read_port(&mut self, port: u8) -> u8 {
        match port {
            CONSOLE_PORT => self.console.read_byte(&mut self.running),
            BLOCK_DATA_PORT => self.block.read_byte(),
            BLOCK_ADDR_PORT => self.block.query_status().code(),
            _ => {
                warn!("Out of bounds I/O read: {port}");
                0
            }
        }
    }

    fn write_port(&mut self, port: u8, value: u8) {
        match port {
            CONSOLE_PORT => self.console.write_byte(value, &mut self.running),
            BLOCK_DATA_PORT => self.block.write_byte(value),
            BLOCK_ADDR_PORT => self.block.select_address_byte(value),
            _ => warn!("Out of bounds I/O write: {port} / {value} ({value:#x})"),
        }
    }
}
