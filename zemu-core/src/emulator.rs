//! Machine state and the execution loop.

use tracing::{debug, info};

use crate::blockdev::BlockDevice;
use crate::console::Console;
use crate::engine::{StepEngine, Z80Engine};
use crate::memory::AddressSpace;
use crate::ports::PortMap;
use crate::{ExitReason, SessionExit};

/// Everything the CPU can touch: memory, devices and the run flag.
pub struct Machine<C: Console> {
    memory: AddressSpace,
    ports: PortMap<C>,
}

impl<C: Console> Machine<C> {
    /// Create a machine with blank memory and a full-size block device.
    pub fn new(console: C) -> Self {
        Self::with_block_device(console, BlockDevice::new())
    }

    pub fn with_block_device(console: C, block: BlockDevice) -> Self {
        Self {
            memory: AddressSpace::new(),
            ports: PortMap::new(console, block),
        }
    }

    pub fn memory(&self) -> &AddressSpace {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut AddressSpace {
        &mut self.memory
    }

    pub fn ports(&self) -> &PortMap<C> {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut PortMap<C> {
        &mut self.ports
    }

    pub fn block(&self) -> &BlockDevice {
        self.ports.block()
    }

    pub fn block_mut(&mut self) -> &mut BlockDevice {
        self.ports.block_mut()
    }

    pub fn console(&self) -> &C {
        self.ports.console()
    }

    pub fn is_running(&self) -> bool {
        self.ports.is_running()
    }
}

/// Execution driver: steps the CPU engine until it halts or the console stops the machine.
pub struct Emulator<C: Console, E: StepEngine = Z80Engine> {
    engine: E,
    machine: Machine<C>,
    steps: u64,
}

impl<C: Console> Emulator<C, Z80Engine> {
    /// Create an emulator around a Z80 engine.
    pub fn new(machine: Machine<C>) -> Self {
        Self::with_engine(machine, Z80Engine::new())
    }
}

impl<C: Console, E: StepEngine> Emulator<C, E> {
    pub fn with_engine(machine: Machine<C>, engine: E) -> Self {
        Self {
            engine,
            machine,
            steps: 0,
        }
    }

    pub fn machine(&self) -> &Machine<C> {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine<C> {
        &mut self.machine
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Give the machine back, e.g. to unpack the block device after a session.
    pub fn into_machine(self) -> Machine<C> {
        self.machine
    }

    /// Execute one instruction.
    pub fn step(&mut self) {
        let Machine { memory, ports } = &mut self.machine;
        self.engine.step(memory, ports);
        self.steps += 1;
    }

    /// Run until the CPU halts or the run flag is cleared.
    pub fn run(&mut self) -> SessionExit {
        self.machine.ports.set_running(true);
        info!("Starting execution");

        while self.machine.is_running() && !self.engine.is_halted() {
            self.step();
        }

        let reason = if self.engine.is_halted() {
            ExitReason::Halt
        } else {
            ExitReason::Stopped
        };
        debug!("Execution ended ({reason:?}) after {} steps", self.steps);

        SessionExit {
            reason,
            steps: self.steps,
            t_states: self.engine.t_states(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::console::HeadlessConsole;
    use crate::memory::MemoryBus;
    use crate::ports::{IoBus, CONSOLE_PORT};

    /// Engine that reads the console port on every step and halts after a fixed count.
    struct EchoEngine {
        halt_after: u64,
        steps: u64,
    }

    impl StepEngine for EchoEngine {
        fn reset(&mut self) {
            self.steps = 0;
        }

        fn step(&mut self, memory: &mut dyn MemoryBus, io: &mut dyn IoBus) {
            let ch = io.read_port(CONSOLE_PORT);
            memory.write(0x4000 + self.steps as u16, ch);
            io.write_port(CONSOLE_PORT, ch);
            self.steps += 1;
        }

        fn is_halted(&self) -> bool {
            self.steps >= self.halt_after
        }
    }

    #[test]
    fn test_emulator_creation() {
        let emu = Emulator::new(Machine::new(HeadlessConsole::new()));
        assert!(emu.machine().is_running());
        assert!(!emu.engine().is_halted());
        assert_eq!(emu.machine().memory().read(0), 0);
    }

    #[test]
    fn test_end_of_input_stops_without_halt() {
        let machine = Machine::new(HeadlessConsole::with_input(b"ab"));
        let engine = EchoEngine {
            halt_after: u64::MAX,
            steps: 0,
        };
        let mut emu = Emulator::with_engine(machine, engine);

        let exit = emu.run();

        assert_eq!(exit.reason, ExitReason::Stopped);
        assert_eq!(exit.steps, 3);
        assert!(!emu.machine().is_running());
        assert_eq!(emu.machine().memory().read(0x4001), b'b');
    }

    #[test]
    fn test_engine_halt_ends_loop() {
        let machine = Machine::new(HeadlessConsole::with_input(b"abcdef"));
        let engine = EchoEngine {
            halt_after: 2,
            steps: 0,
        };
        let mut emu = Emulator::with_engine(machine, engine);

        let exit = emu.run();

        assert_eq!(exit.reason, ExitReason::Halt);
        assert_eq!(exit.steps, 2);
        assert_eq!(emu.machine().console().output_string(), "ab");
    }

    #[test]
    fn test_halted_engine_runs_no_steps() {
        let engine = EchoEngine {
            halt_after: 0,
            steps: 0,
        };
        let mut emu = Emulator::with_engine(Machine::new(HeadlessConsole::new()), engine);
        let exit = emu.run();
        assert_eq!(exit.reason, ExitReason::Halt);
        assert_eq!(exit.steps, 0);
    }
}
