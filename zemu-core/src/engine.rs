//! CPU engine binding.
//!
//! The instruction set itself lives in `z80emu`. The machine only needs a
//! single-step primitive that calls back into the memory and I/O buses.

use std::num::NonZeroU16;

use z80emu::host::TsCounter;
use z80emu::{Clock, Cpu, Io, Memory, Z80NMOS};

use crate::memory::MemoryBus;
use crate::ports::IoBus;

/// Type alias for the clock.
type TsClock = TsCounter<i32>;

/// Single-stepping CPU engine.
pub trait StepEngine {
    /// Reset the CPU to its power-on state.
    fn reset(&mut self);

    /// Execute exactly one instruction against the given buses.
    fn step(&mut self, memory: &mut dyn MemoryBus, io: &mut dyn IoBus);

    /// Whether the CPU executed a HALT.
    fn is_halted(&self) -> bool;

    /// T-states elapsed since the last reset.
    fn t_states(&self) -> u64 {
        0
    }
}

/// Bus handed to z80emu for one instruction.
struct Bus<'a> {
    memory: &'a mut dyn MemoryBus,
    io: &'a mut dyn IoBus,
}

impl Memory for Bus<'_> {
    type Timestamp = i32;

    fn read_debug(&self, addr: u16) -> u8 {
        self.memory.read(addr)
    }

    fn read_mem(&self, addr: u16, _ts: Self::Timestamp) -> u8 {
        self.memory.read(addr)
    }

    fn write_mem(&mut self, addr: u16, value: u8, _ts: Self::Timestamp) {
        self.memory.write(addr, value);
    }
}

impl Io for Bus<'_> {
    type Timestamp = i32;
    type WrIoBreak = ();
    type RetiBreak = ();

    fn read_io(&mut self, port: u16, _ts: Self::Timestamp) -> (u8, Option<NonZeroU16>) {
        // Only the low byte selects the device.
        (self.io.read_port(port as u8), None)
    }

    fn write_io(
        &mut self,
        port: u16,
        value: u8,
        _ts: Self::Timestamp,
    ) -> (Option<Self::WrIoBreak>, Option<NonZeroU16>) {
        self.io.write_port(port as u8, value);
        (None, None)
    }
}

/// NMOS Z80 from `z80emu`.
#[derive(Default)]
pub struct Z80Engine {
    cpu: Z80NMOS,
    clock: TsClock,
}

impl Z80Engine {
    pub fn new() -> Self {
        let mut engine = Self::default();
        engine.reset();
        engine
    }

    pub fn pc(&self) -> u16 {
        self.cpu.get_pc()
    }
}

impl StepEngine for Z80Engine {
    fn reset(&mut self) {
        self.cpu.reset();
        self.clock = TsClock::default();
    }

    fn step(&mut self, memory: &mut dyn MemoryBus, io: &mut dyn IoBus) {
        let mut bus = Bus { memory, io };
        let _result =
            self.cpu
                .execute_next(&mut bus, &mut self.clock, None::<fn(z80emu::CpuDebug)>);
    }

    fn is_halted(&self) -> bool {
        self.cpu.is_halt()
    }

    fn t_states(&self) -> u64 {
        self.clock.as_timestamp().max(0) as u64
    }
}
