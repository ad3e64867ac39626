//! Error types for ROM image parsing and building

use thiserror::Error;

/// Errors that can occur when parsing or building a DS ROM image
#[derive(Debug, Error)]
pub enum RomError {
    /// Buffer length does not match a fixed-size region
    #[error("Buffer is 0x{found:X} bytes, expected 0x{expected:X}")]
    SizeMismatch {
        /// Required length of the region
        expected: usize,
        /// Length of the buffer that was supplied
        found: usize,
    },

    /// Integer does not fit in its little-endian header field
    #[error("Value 0x{value:X} does not fit in {field} ({len} bytes)")]
    Overflow {
        /// Name of the header field being written
        field: &'static str,
        /// Length of the field in bytes
        len: usize,
        /// Value that was rejected
        value: u64,
    },

    /// A computed slice exceeds the containing buffer
    #[error("Region 0x{offset:X} (+0x{len:X}) exceeds buffer of 0x{size:X} bytes")]
    OutOfBounds {
        /// Start of the requested region
        offset: u64,
        /// Length of the requested region
        len: u64,
        /// Length of the containing buffer
        size: usize,
    },

    /// The header references data past the end of the image
    #[error("{region} extends past the end of the image")]
    Truncated {
        /// Which region was being read
        region: &'static str,
    },

    /// Filename table bytes violate the FNT grammar
    #[error("Malformed filename table: {reason}")]
    MalformedFnt {
        /// What the decoder tripped over
        reason: String,
    },

    /// Overlay table references a nonexistent or already-claimed file ID
    #[error("Malformed overlay table: {reason}")]
    MalformedOvt {
        /// What the decoder tripped over
        reason: String,
    },

    /// File path violates the path syntax
    #[error("Invalid file path {path:?}")]
    InvalidPath {
        /// The offending path
        path: String,
    },

    /// Path component longer than the filename table allows
    #[error("Name {name:?} exceeds 127 bytes")]
    NameTooLong {
        /// The offending component
        name: String,
    },

    /// The same path was supplied twice
    #[error("Duplicate path {path:?}")]
    DuplicatePath {
        /// The offending path
        path: String,
    },

    /// Banner block is not the fixed banner size
    #[error("Banner is 0x{found:X} bytes, expected 0xA00")]
    BadBanner {
        /// Length of the banner that was supplied
        found: usize,
    },

    /// Composed image is larger than any supported cartridge
    #[error("ROM size 0x{size:X} exceeds the largest supported cartridge capacity")]
    CapacityExceeded {
        /// Size the image would have needed
        size: usize,
    },
}
