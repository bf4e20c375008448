// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for topology operations.
//!
//! Ring ambiguity and missing rings are not errors: they are reported through
//! [`RingOutcome`](crate::builder::RingOutcome) and
//! [`UpdateReport`](crate::maintain::UpdateReport). Everything here aborts the
//! operation that produced it.

use crate::format::Version;
use crate::keys::{Face, LineId, RecordKind, Side};

/// Result type alias for topology operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during topology operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A referenced record does not exist or has been deleted.
    #[error("{kind} {id} not found")]
    NotFound { kind: RecordKind, id: u32 },

    /// An area/isle operation was attempted on a line that is not a boundary.
    #[error("line {0} is not a boundary")]
    NotBoundary(LineId),

    /// A boundary side that should be empty already references a face.
    #[error("{side} side of line {line} is already assigned to {existing:?}")]
    SlotOccupied {
        line: LineId,
        side: Side,
        existing: Face,
    },

    /// Cross-references between records disagree.
    #[error("topology consistency violation: {0}")]
    Consistency(String),

    /// A feature was written without coordinates.
    #[error("feature geometry has no points")]
    EmptyGeometry,

    /// A type code in a coordinate or topology record is not supported.
    #[error("unsupported feature type code {0}")]
    UnsupportedType(u8),

    /// The file needs a newer reader.
    #[error("topology format {file} needs a reader of at least {required}; upgrade the library")]
    ReaderTooOld { file: Version, required: Version },

    /// The file predates the oldest layout this reader understands.
    #[error("topology format {file} is older than {supported}; rebuild topology")]
    FileTooOld { file: Version, supported: Version },

    /// The byte-order tag in a header is neither little nor big endian.
    #[error("invalid byte order tag {0}")]
    InvalidByteOrder(u8),

    /// An offset cannot be represented with the chosen offset width.
    #[error("offset {offset} does not fit in {width} bytes")]
    OffsetOverflow { offset: u64, width: u8 },

    /// Structurally invalid file content.
    #[error("malformed topology data: {0}")]
    Format(String),

    /// The stream ended in the middle of a record.
    #[error("unexpected end of topology data")]
    Truncated,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    pub(crate) fn missing(kind: RecordKind, id: u32) -> Self {
        Error::NotFound { kind, id }
    }

    /// Maps an I/O error raised while decoding, turning a short read into
    /// [`Error::Truncated`].
    pub(crate) fn from_read(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::Truncated
        } else {
            Error::Io(err)
        }
    }
}
