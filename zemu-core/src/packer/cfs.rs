//! Built-in CFS packer.
//!
//! A CFS image is a chain of file records, each aligned on a 256-byte block.
//! A record starts with a 32-byte header:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 3 | magic `CFS` |
//! | 3 | 1 | block count |
//! | 4 | 2 | file size, little endian |
//! | 6 | 26 | NUL-padded file name |
//!
//! File data follows the header. A record with a block count of 0 ends the chain.

use std::fs;
use std::io::{Cursor, Read};
use std::path::{Component, Path};

use glob::Pattern;
use tracing::{debug, info};

use super::FilesystemPacker;
use crate::error::{EmuError, EmuResult};

pub const BLOCK_SIZE: usize = 0x100;
pub const HEADER_SIZE: usize = 0x20;
/// Longest file name, excluding the terminating NUL.
pub const MAX_NAME_LEN: usize = 25;
/// Largest file whose block count still fits the one-byte header field.
pub const MAX_FILE_SIZE: usize = 0xFF * BLOCK_SIZE - HEADER_SIZE;

const MAGIC: &[u8; 3] = b"CFS";
const NAME_FIELD_LEN: usize = MAX_NAME_LEN + 1;

/// Blocks needed for a file of `size` bytes plus its header.
fn block_count(size: usize) -> usize {
    (size + HEADER_SIZE).div_ceil(BLOCK_SIZE).max(1)
}

fn push_record(out: &mut Vec<u8>, name: &str, data: &[u8]) {
    let start = out.len();
    let blocks = block_count(data.len());

    out.extend_from_slice(MAGIC);
    out.push(blocks as u8);
    out.extend_from_slice(&(data.len() as u16).to_le_bytes());
    let mut name_field = [0u8; NAME_FIELD_LEN];
    name_field[..name.len()].copy_from_slice(name.as_bytes());
    out.extend_from_slice(&name_field);
    out.extend_from_slice(data);
    out.resize(start + blocks * BLOCK_SIZE, 0);
}

fn pack_file(out: &mut Vec<u8>, path: &Path, name: &str) -> EmuResult<()> {
    if name.len() > MAX_NAME_LEN {
        return Err(EmuError::NameTooLong(name.to_string()));
    }
    let size = fs::metadata(path)?.len();
    if size > MAX_FILE_SIZE as u64 {
        return Err(EmuError::FileTooBig {
            path: path.to_path_buf(),
            size,
        });
    }
    let data = fs::read(path)?;
    debug!("Packing {} ({} bytes)", name, data.len());
    push_record(out, name, &data);
    Ok(())
}

fn pack_dir(
    out: &mut Vec<u8>,
    dir: &Path,
    prefix: &str,
    pattern: Option<&Pattern>,
) -> EmuResult<()> {
    let mut entries = fs::read_dir(dir)?.collect::<Result<Vec<_>, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let file_name = entry.file_name();
        let file_name = file_name.to_string_lossy();
        let name = if prefix.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", prefix, file_name)
        };
        if name.len() > MAX_NAME_LEN {
            return Err(EmuError::NameTooLong(name));
        }

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            pack_dir(out, &entry.path(), &name, pattern)?;
        } else if file_type.is_file() {
            // The filter sees the bare file name; directories are always walked.
            if pattern.is_some_and(|p| !p.matches(&file_name)) {
                continue;
            }
            pack_file(out, &entry.path(), &name)?;
        } else {
            return Err(EmuError::UnsupportedFileType(entry.path()));
        }
    }
    Ok(())
}

/// Pack a directory tree, or a single regular file, into a CFS image.
///
/// Directories are walked depth-first in name order and terminated with an
/// empty block. When `pattern` is given, only regular files whose name
/// matches the glob are packed. A single file produces just its own record
/// and ignores the pattern.
pub fn pack_path(source: &Path, pattern: Option<&str>) -> EmuResult<Vec<u8>> {
    let pattern = pattern.map(Pattern::new).transpose()?;
    pack_tree(source, pattern.as_ref())
}

fn pack_tree(source: &Path, pattern: Option<&Pattern>) -> EmuResult<Vec<u8>> {
    let meta = fs::metadata(source)?;
    let mut out = Vec::new();

    if meta.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        pack_file(&mut out, source, &name)?;
    } else if meta.is_dir() {
        pack_dir(&mut out, source, "", pattern)?;
        let mut end = [0u8; BLOCK_SIZE];
        end[..MAGIC.len()].copy_from_slice(MAGIC);
        out.extend_from_slice(&end);
    } else {
        return Err(EmuError::UnsupportedFileType(source.to_path_buf()));
    }
    Ok(out)
}

fn format_error(offset: usize, reason: &str) -> EmuError {
    EmuError::CfsFormat {
        offset,
        reason: reason.to_string(),
    }
}

/// Unpack the files of a CFS image into `dest`. Returns the number of files written.
///
/// Records whose name starts with NUL are deleted files and are skipped.
pub fn unpack_image(image: &[u8], dest: &Path) -> EmuResult<usize> {
    fs::create_dir_all(dest)?;

    let mut offset = 0;
    let mut written = 0;
    while offset + HEADER_SIZE <= image.len() {
        let header = &image[offset..offset + HEADER_SIZE];
        if &header[..MAGIC.len()] != MAGIC {
            break;
        }
        let blocks = header[3] as usize;
        if blocks == 0 {
            break;
        }
        let size = u16::from_le_bytes([header[4], header[5]]) as usize;
        if size + HEADER_SIZE > blocks * BLOCK_SIZE {
            return Err(format_error(offset, "file size exceeds record"));
        }
        let data_start = offset + HEADER_SIZE;
        let data = image
            .get(data_start..data_start + size)
            .ok_or_else(|| format_error(offset, "file data past end of image"))?;

        let name_field = &header[6..6 + NAME_FIELD_LEN];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(NAME_FIELD_LEN);
        if name_len > 0 {
            let name = std::str::from_utf8(&name_field[..name_len])
                .map_err(|_| format_error(offset, "file name is not UTF-8"))?;
            let relative = Path::new(name);
            if !relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)))
            {
                return Err(format_error(offset, "unsafe file name"));
            }

            let target = dest.join(relative);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&target, data)?;
            debug!("Unpacked {} ({} bytes)", name, size);
            written += 1;
        }

        offset += blocks * BLOCK_SIZE;
    }

    info!("Unpacked {} files into {}", written, dest.display());
    Ok(written)
}

/// Packer implemented in-process.
#[derive(Debug, Default, Clone)]
pub struct CfsPacker {
    pattern: Option<Pattern>,
}

impl CfsPacker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Only pack regular files whose name matches the glob `pattern`.
    pub fn with_pattern(mut self, pattern: &str) -> EmuResult<Self> {
        self.pattern = Some(Pattern::new(pattern)?);
        Ok(self)
    }
}

impl FilesystemPacker for CfsPacker {
    fn pack(&self, source: &Path) -> EmuResult<Box<dyn Read>> {
        let image = pack_tree(source, self.pattern.as_ref())?;
        Ok(Box::new(Cursor::new(image)))
    }

    fn unpack(&self, image: &[u8], dest: &Path) -> EmuResult<()> {
        unpack_image(image, dest).map(|_| ())
    }
}
