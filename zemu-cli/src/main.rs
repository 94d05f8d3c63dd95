//! Z80 shell machine CLI.
//!
//! Usage:
//!   zemu <kernel.bin> [options]
//!
//! Examples:
//!   zemu shell.bin                        # pack ./cfsin, run the shell
//!   zemu shell.bin --fs-out cfsout        # unpack the block device after the session
//!   zemu shell.bin --fs-pattern '*.txt'   # pack only matching files
//!   zemu shell.bin --packer ../cfspack/cfspack
//!   zemu --config zemu.json

mod terminal;

use std::io::{self, ErrorKind, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use zemu_core::{
    unpack_filesystem, BlockDevice, Bootstrap, CfsPacker, CommandPacker, Console, Emulator,
    FilesystemPacker, Machine, SessionConfig,
};

use terminal::RawModeGuard;

/// Z80 shell machine emulator
#[derive(Parser, Debug)]
#[command(name = "zemu")]
#[command(about = "Run a Z80 shell kernel with a packed block device")]
struct Args {
    /// Kernel image loaded at address 0
    kernel: Option<PathBuf>,

    /// JSON session configuration; command-line options take precedence
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory packed into the block device
    #[arg(long)]
    fs_in: Option<PathBuf>,

    /// Directory the block device is unpacked into after the session
    #[arg(long)]
    fs_out: Option<PathBuf>,

    /// Glob selecting which files of the input directory get packed
    #[arg(long)]
    fs_pattern: Option<String>,

    /// External pack command (program and leading arguments)
    #[arg(long)]
    packer: Option<String>,

    /// External unpack command (program and leading arguments)
    #[arg(long)]
    unpacker: Option<String>,

    /// Block device capacity in bytes
    #[arg(long)]
    block_size: Option<usize>,

    /// Leave the host terminal in its current mode
    #[arg(long)]
    no_raw: bool,

    /// Enable per-access device tracing
    #[arg(short, long)]
    trace: bool,
}

impl Args {
    /// Merge command-line options over the configuration file.
    fn session_config(&self) -> zemu_core::EmuResult<SessionConfig> {
        let mut config = match &self.config {
            Some(path) => SessionConfig::from_path(path)?,
            None => SessionConfig::default(),
        };
        if let Some(kernel) = &self.kernel {
            config.kernel = Some(kernel.clone());
        }
        if let Some(dir) = &self.fs_in {
            config.fs_input = dir.clone();
        }
        if let Some(dir) = &self.fs_out {
            config.fs_output = Some(dir.clone());
        }
        if let Some(pattern) = &self.fs_pattern {
            config.fs_pattern = Some(pattern.clone());
        }
        if let Some(cmd) = &self.packer {
            config.packer = Some(split_command(cmd));
        }
        if let Some(cmd) = &self.unpacker {
            config.unpacker = Some(split_command(cmd));
        }
        if self.block_size.is_some() {
            config.block_size = self.block_size;
        }
        Ok(config)
    }
}

fn split_command(cmd: &str) -> Vec<String> {
    cmd.split_whitespace().map(str::to_string).collect()
}

/// Console bridged to the process's stdin and stdout.
struct StdioConsole {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl StdioConsole {
    fn new() -> Self {
        Self {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

/// Write one byte and push it out immediately.
fn put_byte(out: &mut impl Write, ch: u8) -> io::Result<()> {
    out.write_all(&[ch])?;
    out.flush()
}

impl Console for StdioConsole {
    fn write(&mut self, ch: u8) {
        if let Err(e) = put_byte(&mut self.stdout.lock(), ch) {
            warn!("Console write failed: {e}");
        }
    }

    fn read(&mut self) -> Option<u8> {
        let mut buf = [0u8; 1];
        loop {
            match self.stdin.lock().read(&mut buf) {
                Ok(0) => return None,
                Ok(_) => return Some(buf[0]),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Console read failed: {e}");
                    return None;
                }
            }
        }
    }
}

fn init_tracing(trace: bool) {
    let default_level = if trace { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing(args.trace);

    let config = args.session_config()?;
    let kernel_path = config
        .kernel
        .clone()
        .ok_or("No kernel image given (pass a path or set \"kernel\" in the config)")?;
    let kernel = std::fs::read(&kernel_path).map_err(|e| {
        eprintln!("Failed to read {}: {}", kernel_path.display(), e);
        e
    })?;

    let packer: Box<dyn FilesystemPacker> = match &config.packer {
        Some(cmd) => {
            let mut packer = CommandPacker::new(cmd.clone());
            if let Some(unpack) = &config.unpacker {
                packer = packer.with_unpack(unpack.clone());
            }
            if let Some(pattern) = &config.fs_pattern {
                packer = packer.with_pattern(pattern.clone());
            }
            Box::new(packer)
        }
        None => {
            let mut packer = CfsPacker::new();
            if let Some(pattern) = &config.fs_pattern {
                packer = packer.with_pattern(pattern)?;
            }
            Box::new(packer)
        }
    };

    let block = match config.block_size {
        Some(size) => BlockDevice::with_capacity(size)?,
        None => BlockDevice::new(),
    };
    let mut machine = Machine::with_block_device(StdioConsole::new(), block);

    // Fatal bootstrap errors happen before the terminal is touched.
    Bootstrap::new(packer.as_ref())
        .fs_input(&config.fs_input)
        .load(&mut machine, &kernel)?;

    let guard = if args.no_raw {
        RawModeGuard::inactive()
    } else {
        RawModeGuard::acquire()?
    };

    // Run emulator in a blocking task; console reads block the whole machine.
    let emu_handle = tokio::task::spawn_blocking(move || {
        let mut emu = Emulator::new(machine);
        let exit = emu.run();
        (exit, emu.into_machine())
    });
    let (exit, machine) = emu_handle.await?;

    guard.release()?;
    println!("Done!");
    info!(
        "Session ended: {:?} after {} steps ({} T-states)",
        exit.reason, exit.steps, exit.t_states
    );

    if let Some(dest) = &config.fs_output {
        if let Err(e) = unpack_filesystem(&machine, packer.as_ref(), dest) {
            warn!("Failed to unpack filesystem into {}: {}", dest.display(), e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zemu.json");
        std::fs::write(
            &path,
            r#"{"kernel": "a.bin", "fsInput": "in", "fsPattern": "*.bin", "blockSize": 16}"#,
        )
        .unwrap();

        let args = Args::parse_from([
            "zemu",
            "b.bin",
            "--config",
            path.to_str().unwrap(),
            "--packer",
            "cfspack -q",
            "--fs-pattern",
            "*.txt",
        ]);
        let config = args.session_config().unwrap();

        assert_eq!(config.kernel, Some(PathBuf::from("b.bin")));
        assert_eq!(config.fs_input, PathBuf::from("in"));
        assert_eq!(config.block_size, Some(16));
        assert_eq!(
            config.packer,
            Some(vec!["cfspack".to_string(), "-q".to_string()])
        );
        assert_eq!(config.fs_pattern.as_deref(), Some("*.txt"));
        assert_eq!(config.fs_output, None);
    }

    #[test]
    fn test_config_pattern_kept_without_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("zemu.json");
        std::fs::write(&path, r#"{"fsPattern": "*.bin"}"#).unwrap();

        let args = Args::parse_from(["zemu", "--config", path.to_str().unwrap()]);
        let config = args.session_config().unwrap();

        assert_eq!(config.fs_pattern.as_deref(), Some("*.bin"));
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Err(io::Error::from(ErrorKind::BrokenPipe))
        }
    }

    #[test]
    fn test_put_byte_flushes() {
        let mut out = Vec::new();
        put_byte(&mut out, b'x').unwrap();
        assert_eq!(out, b"x");
    }

    #[test]
    fn test_put_byte_reports_flush_failure() {
        let err = put_byte(&mut BrokenPipe, b'x').unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BrokenPipe);
    }

    #[test]
    fn test_defaults_without_config() {
        let args = Args::parse_from(["zemu", "shell.bin", "--fs-out", "cfsout"]);
        let config = args.session_config().unwrap();
        assert_eq!(config.fs_input, PathBuf::from("cfsin"));
        assert_eq!(config.fs_output, Some(PathBuf::from("cfsout")));
        assert_eq!(config.packer, None);
    }
}
