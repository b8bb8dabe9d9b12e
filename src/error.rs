use std::io;

use thiserror::Error;

use super::*;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading firmware or exchanging Bulk-Only mass storage commands.
#[derive(Debug, Error)]
pub enum Error {
    /// Structural violation found while parsing a firmware image.
    #[error("malformed image: {0}")]
    MalformedImage(String),

    #[error("{0} is not a recognized image type")]
    UnknownImageType(String),

    #[error("illegal microcontroller type: {0}")]
    UnknownFxType(String),

    #[error("no matching device found")]
    NoDevice,

    /// A segment the current RAM mode can't write, e.g. external memory while only the
    /// hardware loader is running.
    #[error("can't write {len} bytes external memory at {address:#010x}")]
    InvalidSegment { address: u32, len: usize },

    #[error("{label}: {source}")]
    TransferFailed {
        label: &'static str,
        #[source]
        source: TransportError,
    },

    #[error("{label}: transferred {actual} of {expected} bytes")]
    ShortTransfer { label: &'static str, expected: usize, actual: usize },

    /// A buffer larger than one request (or one command) can describe.
    #[error("{label}: {len} bytes exceeds the limit of {max}")]
    TransferTooLarge { label: &'static str, len: usize, max: usize },

    #[error("verify error at {address:#010x}")]
    VerificationFailed { address: u32 },

    #[error("checksum error: computed {computed:#010x}, image holds {expected:x?}")]
    ChecksumMismatch { computed: u32, expected: Option<u32> },

    #[error("don't know how to handle SCSI command {opcode:#04x}")]
    UnsupportedOpcode { opcode: u8 },

    #[error("cannot send command on IN endpoint {0:#04x}")]
    InvalidEndpoint(u8),

    #[error("mismatched tags (expected {expected:08X}, received {received:08X})")]
    TagMismatch { expected: u32, received: u32 },

    #[error("received {received} status bytes (expected 13)")]
    ShortStatus { received: usize },

    #[error("command failed with status {status:#04x}")]
    CommandFailed { status: u8 },

    /// The device reported a check condition; carries the REQUEST SENSE result, if any.
    #[error("check condition, sense {0:x?}")]
    CheckCondition(Option<SenseData>),

    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}
