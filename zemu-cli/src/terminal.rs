//! Host terminal raw mode.
//!
//! The emulated shell echoes its own input, so the host terminal must not
//! echo or line-buffer while the machine runs.

use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use zemu_core::{EmuError, EmuResult};

/// Keeps the host terminal in raw mode until released or dropped.
///
/// Raw mode also clears ISIG and OPOST. Ctrl-C reaches the kernel as byte
/// 0x03 instead of interrupting the host process, and LF written by the
/// kernel is not turned into CRLF. Run with `--no-raw` to keep the host
/// line discipline.
pub struct RawModeGuard {
    active: bool,
}

impl RawModeGuard {
    /// Switch the terminal to raw mode.
    pub fn acquire() -> EmuResult<Self> {
        enable_raw_mode().map_err(|e| EmuError::TerminalSetup(e.to_string()))?;
        Ok(Self { active: true })
    }

    /// Guard that leaves the terminal untouched (non-interactive runs).
    pub fn inactive() -> Self {
        Self { active: false }
    }

    /// Restore the original terminal attributes.
    pub fn release(mut self) -> EmuResult<()> {
        self.restore()
    }

    fn restore(&mut self) -> EmuResult<()> {
        if self.active {
            self.active = false;
            disable_raw_mode()?;
        }
        Ok(())
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = self.restore();
    }
}
