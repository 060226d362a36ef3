//! Access policy: which commands need a signed URL
//!
//! Each access mode owns one permission bit. A server-wide protection level
//! is a bitmask of the modes that must be signed; a trusted certificate's
//! permission bitmask uses the same bits.

use crate::error::{CoreError, Result};
use crate::operation::AccessMode;

pub const PERMISSION_READ: u32 = 1;
pub const PERMISSION_CREATE: u32 = 2;
pub const PERMISSION_UPDATE: u32 = 4;
pub const PERMISSION_DELETE: u32 = 8;
pub const PERMISSION_ADMIN: u32 = 16;

/// read, create, update and delete; the usual content server protection
pub const PROTECTION_RCUD: u32 =
    PERMISSION_READ | PERMISSION_CREATE | PERMISSION_UPDATE | PERMISSION_DELETE;

impl AccessMode {
    /// Permission bit owned by this mode (`None` owns no bit)
    pub fn permission_bit(&self) -> u32 {
        match self {
            AccessMode::Read => PERMISSION_READ,
            AccessMode::Create => PERMISSION_CREATE,
            AccessMode::Update => PERMISSION_UPDATE,
            AccessMode::Delete => PERMISSION_DELETE,
            AccessMode::Admin => PERMISSION_ADMIN,
            AccessMode::None => 0,
        }
    }
}

/// Decide whether a command in `mode` must carry a verified signature
pub fn needs_signature(mode: AccessMode, protection_level: u32) -> bool {
    mode.permission_bit() & protection_level != 0
}

/// Parse a permission bitmask from an integer (`15`) or letters (`rcud`)
pub fn parse_permissions(value: &str) -> Result<u32> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }

    if let Ok(bits) = value.parse::<u32>() {
        return Ok(bits);
    }

    value.chars().try_fold(0u32, |bits, c| {
        match AccessMode::from_code(c) {
            AccessMode::None => Err(CoreError::InvalidArgument(format!(
                "Unknown permission letter '{}' in '{}'",
                c, value
            ))),
            mode => Ok(bits | mode.permission_bit()),
        }
    })
}

/// Render a permission bitmask as protocol letters
pub fn permission_letters(bits: u32) -> String {
    [
        AccessMode::Read,
        AccessMode::Create,
        AccessMode::Update,
        AccessMode::Delete,
        AccessMode::Admin,
    ]
    .iter()
    .filter(|mode| bits & mode.permission_bit() != 0)
    .filter_map(|mode| mode.code())
    .collect()
}
