//! Packer backed by external host programs.

use std::io::{self, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdout, Command, Stdio};

use tracing::{debug, warn};

use super::FilesystemPacker;
use crate::error::{EmuError, EmuResult};

/// Runs `<program> [args..] <dir> [pattern]` to pack and unpack images.
///
/// The pack program writes the image to stdout. The unpack program reads it
/// from stdin. The file name pattern, when set, is only passed to the pack
/// program.
#[derive(Debug, Clone)]
pub struct CommandPacker {
    pack: Vec<String>,
    unpack: Option<Vec<String>>,
    pattern: Option<String>,
}

impl CommandPacker {
    /// Create from a pack command line (program followed by leading arguments).
    pub fn new(pack: Vec<String>) -> Self {
        Self {
            pack,
            unpack: None,
            pattern: None,
        }
    }

    /// Pass `pattern` to the pack program after the directory.
    pub fn with_pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    /// Set the unpack command line.
    pub fn with_unpack(mut self, unpack: Vec<String>) -> Self {
        self.unpack = Some(unpack);
        self
    }

    fn command(argv: &[String], dir: &Path) -> EmuResult<Command> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| EmuError::Packer("empty command line".to_string()))?;
        let mut cmd = Command::new(program);
        cmd.args(args).arg(dir);
        Ok(cmd)
    }
}

/// Stdout of a running pack process. The process is reaped on drop.
struct ChildStream {
    child: Child,
    stdout: Option<ChildStdout>,
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ChildStream {
    fn drop(&mut self) {
        // Close the pipe first so a process still writing gets EPIPE instead of blocking.
        drop(self.stdout.take());
        match self.child.wait() {
            Ok(status) if !status.success() => warn!("Packer exited with {status}"),
            Ok(_) => {}
            Err(e) => warn!("Failed to wait for packer: {e}"),
        }
    }
}

impl FilesystemPacker for CommandPacker {
    fn pack(&self, source: &Path) -> EmuResult<Box<dyn Read>> {
        let mut cmd = Self::command(&self.pack, source)?;
        if let Some(pattern) = &self.pattern {
            cmd.arg(pattern);
        }
        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .spawn()?;
        debug!("Started packer {:?} on {}", self.pack, source.display());
        let stdout = child.stdout.take();
        Ok(Box::new(ChildStream { child, stdout }))
    }

    fn unpack(&self, image: &[u8], dest: &Path) -> EmuResult<()> {
        let argv = self
            .unpack
            .as_ref()
            .ok_or_else(|| EmuError::Packer("no unpack command configured".to_string()))?;
        let mut child = Self::command(argv, dest)?
            .stdin(Stdio::piped())
            .spawn()?;
        // An unpacker that quits early closes the pipe, so its exit status is checked first.
        let written = match child.stdin.take() {
            Some(mut stdin) => stdin.write_all(image),
            None => Ok(()),
        };
        let status = child.wait()?;
        if !status.success() {
            return Err(EmuError::Packer(format!("unpacker exited with {status}")));
        }
        written?;
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["sh".to_string(), "-c".to_string(), script.to_string(), "sh".to_string()]
    }

    #[test]
    fn test_pack_streams_stdout() {
        let packer = CommandPacker::new(sh("printf CFS"));
        let mut stream = packer.pack(Path::new("cfsin")).unwrap();
        let mut out = Vec::new();
        stream.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"CFS");
    }

    #[test]
    fn test_pack_spawn_failure() {
        let packer = CommandPacker::new(vec!["/nonexistent/packer-program".to_string()]);
        assert!(matches!(packer.pack(Path::new("cfsin")), Err(EmuError::Io(_))));
    }

    #[test]
    fn test_empty_command_line() {
        let packer = CommandPacker::new(Vec::new());
        assert!(matches!(packer.pack(Path::new("cfsin")), Err(EmuError::Packer(_))));
    }

    #[test]
    fn test_unpack_feeds_stdin() {
        let dest = tempfile::tempdir().unwrap();
        let packer = CommandPacker::new(sh("true"))
            .with_unpack(sh("mkdir -p \"$1\" && cat > \"$1/image\""));

        packer.unpack(b"image-bytes", dest.path()).unwrap();

        assert_eq!(
            std::fs::read(dest.path().join("image")).unwrap(),
            b"image-bytes"
        );
    }

    #[test]
    fn test_pack_passes_pattern_after_dir() {
        let packer =
            CommandPacker::new(sh("printf '%s|%s' \"$1\" \"$2\"")).with_pattern("*.txt");
        let mut out = String::new();
        packer
            .pack(Path::new("cfsin"))
            .unwrap()
            .read_to_string(&mut out)
            .unwrap();
        assert_eq!(out, "cfsin|*.txt");
    }

    #[test]
    fn test_unpack_reports_exit_status_when_input_unread() {
        let packer = CommandPacker::new(sh("true")).with_unpack(sh("exit 3"));
        let image = vec![0u8; 1 << 20];

        match packer.unpack(&image, Path::new("cfsout")) {
            Err(EmuError::Packer(msg)) => assert!(msg.contains("exit"), "{msg}"),
            Err(e) => panic!("unexpected error: {e}"),
            Ok(()) => panic!("unpack should fail"),
        }
    }

    #[test]
    fn test_unpack_requires_command() {
        let packer = CommandPacker::new(sh("true"));
        assert!(packer.unpack(b"", Path::new("out")).is_err());
    }
}
