//! Tree entry modes
//!
//! Modes are kept as the raw octal values Git writes into tree objects so
//! that unusual modes read from a remote survive a rewrite unchanged.

use crate::artifacts::objects::object_type::ObjectType;

pub const MODE_REGULAR: u32 = 0o100644;
pub const MODE_EXECUTABLE: u32 = 0o100755;
pub const MODE_SYMLINK: u32 = 0o120000;
pub const MODE_DIRECTORY: u32 = 0o40000;
pub const MODE_GITLINK: u32 = 0o160000;

/// Object kind a tree entry with this mode points at
pub fn object_type_for_mode(mode: u32) -> ObjectType {
    match mode {
        MODE_DIRECTORY => ObjectType::Tree,
        MODE_GITLINK => ObjectType::Commit,
        _ => ObjectType::Blob,
    }
}

pub fn is_directory(mode: u32) -> bool {
    mode == MODE_DIRECTORY
}

pub fn is_executable(mode: u32) -> bool {
    mode == MODE_EXECUTABLE
}

pub fn parse_octal(mode: &str) -> anyhow::Result<u32> {
    u32::from_str_radix(mode, 8).map_err(|_| anyhow::anyhow!("Invalid entry mode: {mode}"))
}
