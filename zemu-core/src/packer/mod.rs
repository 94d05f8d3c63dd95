//! Host-side filesystem packers.
//!
//! A packer turns a host directory into a block device image and back:
//! - `CfsPacker`: built-in CFS implementation
//! - `CommandPacker`: delegates to external host programs

mod cfs;
mod command;

use std::io::Read;
use std::path::Path;

use crate::error::EmuResult;

pub use cfs::{
    pack_path, unpack_image, CfsPacker, BLOCK_SIZE, HEADER_SIZE, MAX_FILE_SIZE, MAX_NAME_LEN,
};
pub use command::CommandPacker;

/// Packs a host directory into a block device image and unpacks it again.
pub trait FilesystemPacker {
    /// Start packing `source`. The returned stream yields the image bytes.
    ///
    /// An error means the packer could not be started at all.
    fn pack(&self, source: &Path) -> EmuResult<Box<dyn Read>>;

    /// Unpack `image` into the `dest` directory.
    fn unpack(&self, image: &[u8], dest: &Path) -> EmuResult<()>;
}
