//! Console I/O abstraction and the console port device.
//!
//! The `Console` trait provides byte I/O that works identically for both
//! testing (HeadlessConsole) and real terminals. `ConsoleDevice` puts the
//! shutdown policy of the console port on top of it.

use std::collections::VecDeque;

/// Byte the emulated kernel writes to the console port to shut the machine down (Ctrl-D).
pub const SHUTDOWN_BYTE: u8 = 0x04;

/// Byte returned by a console read once the host input has ended.
pub const EOF_SENTINEL: u8 = 0xFF;

/// Console interface for byte I/O.
pub trait Console: Send {
    /// Write a byte to console output. It must be visible immediately.
    fn write(&mut self, ch: u8);

    /// Wait for the next input byte (blocking). Returns None once input has ended.
    fn read(&mut self) -> Option<u8>;
}

/// Scripted console: input comes from a fixed byte script, output is captured.
///
/// Input ends once the script is consumed.
#[derive(Default)]
pub struct HeadlessConsole {
    script: VecDeque<u8>,
    captured: Vec<u8>,
}

impl HeadlessConsole {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_input(input: impl AsRef<[u8]>) -> Self {
        Self {
            script: input.as_ref().iter().copied().collect(),
            captured: Vec::new(),
        }
    }

    /// Script bytes not read yet.
    pub fn pending_input(&self) -> usize {
        self.script.len()
    }

    pub fn output(&self) -> &[u8] {
        &self.captured
    }

    /// Output as a string (lossy UTF-8 conversion).
    pub fn output_string(&self) -> String {
        String::from_utf8_lossy(&self.captured).into_owned()
    }
}

impl Console for HeadlessConsole {
    fn write(&mut self, ch: u8) {
        self.captured.push(ch);
    }

    fn read(&mut self) -> Option<u8> {
        self.script.pop_front()
    }
}

/// Console port device.
///
/// Reads block the whole machine until the host console yields a byte.
/// Both end of input and [`SHUTDOWN_BYTE`] clear the run flag.
pub struct ConsoleDevice<C: Console> {
    console: C,
}

impl<C: Console> ConsoleDevice<C> {
    pub fn new(console: C) -> Self {
        Self { console }
    }

    /// Read one byte for the emulated program.
    pub fn read_byte(&mut self, running: &mut bool) -> u8 {
        match self.console.read() {
            Some(ch) => ch,
            None => {
                *running = false;
                EOF_SENTINEL
            }
        }
    }

    /// Write one byte from the emulated program.
    pub fn write_byte(&mut self, value: u8, running: &mut bool) {
        if value == SHUTDOWN_BYTE {
            *running = false;
        } else {
            self.console.write(value);
        }
    }

    pub fn console(&self) -> &C {
        &self.console
    }

    pub fn console_mut(&mut self) -> &mut C {
        &mut self.console
    }
}
