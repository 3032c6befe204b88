//! Binary format for prototypes.
//!
//! ```text
//! +--------+---------+------------------------+
//! | \x1bLuma | version | bincode(Proto)        |
//! | 5 bytes  | 1 byte  | rest                  |
//! +--------+---------+------------------------+
//! ```

use crate::proto::Proto;

/// Header every dump starts with.
pub const MAGIC: &[u8; 5] = b"\x1bLuma";

/// Current format version.
pub const VERSION: u8 = 1;

const HEADER_LEN: usize = MAGIC.len() + 1;

/// Error decoding a binary dump.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("not a luma binary chunk (bad header)")]
    BadMagic,

    #[error("unsupported binary format version {0}")]
    Version(u8),

    #[error("truncated binary chunk")]
    Truncated,

    #[error("corrupt binary chunk: {0}")]
    Codec(#[from] bincode::Error),
}

/// Encode a prototype. Infallible for well-formed trees; an encoder failure
/// is reported rather than hidden.
pub fn encode(proto: &Proto) -> Result<Vec<u8>, LoadError> {
    let body = bincode::serialize(proto)?;
    let mut out = Vec::with_capacity(HEADER_LEN + body.len());
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Whether `bytes` starts like a binary chunk.
pub fn is_binary(bytes: &[u8]) -> bool {
    bytes.starts_with(MAGIC)
}

/// Decode a binary chunk.
pub fn decode(bytes: &[u8]) -> Result<Proto, LoadError> {
    if bytes.len() < HEADER_LEN {
        return Err(if MAGIC.starts_with(bytes) {
            LoadError::Truncated
        } else {
            LoadError::BadMagic
        });
    }
    if !is_binary(bytes) {
        return Err(LoadError::BadMagic);
    }
    let version = bytes[MAGIC.len()];
    if version != VERSION {
        return Err(LoadError::Version(version));
    }
    Ok(bincode::deserialize(&bytes[HEADER_LEN..])?)
}
