use thiserror::Error;

/// Errors that can occur during log operations. The list is likely to stay as is but marked as
/// non-exhaustive to allow for future additions without breaking the API. `Empty`, `Full`,
/// `NoRecord` and `WriteFail` are ordinary outcomes a caller is expected to handle; the
/// remaining variants are static misconfiguration or hardware trouble.
#[derive(Error, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[non_exhaustive]
pub enum Error {
    /// A page must hold the 4-byte header plus at least one whole record.
    #[error("invalid page size")]
    InvalidPageSize,

    /// The record payload size must be at least one byte.
    #[error("invalid record size")]
    InvalidRecordSize,

    /// `pages_per_block` must be a power of two and `pages_per_block * page_size`
    /// must match the erase size of the medium.
    #[error("invalid erase block")]
    InvalidEraseBlock,

    /// The page range must be erase-block aligned, span at least two erase blocks
    /// and fit within the capacity of the medium.
    #[error("invalid page range")]
    InvalidPageRange,

    /// The engine updates single marker bytes in place and therefore requires a
    /// medium with byte read/write granularity.
    #[error("unsupported medium")]
    UnsupportedMedium,

    /// The payload buffer passed by the caller does not match the configured
    /// record payload size.
    #[error("invalid payload length")]
    InvalidPayloadLength,

    /// The internal error value is returned from the provided `NorFlash` medium.
    /// The store is considered faulted afterwards.
    #[error("internal flash error")]
    FlashError,

    /// A read was requested but the store holds no live records.
    #[error("store is empty")]
    Empty,

    /// The write cursor caught up with the oldest live page under the
    /// stop-when-full policy. Archive or wipe to make room.
    #[error("store is full")]
    Full,

    /// The cursor reached the end of traversal in the requested direction.
    /// Not a fault; the cursor keeps its position and can resume later.
    #[error("no record")]
    NoRecord,

    /// A single write+verify failed. The failing header or record slot has been
    /// demoted and skipped; the caller may simply retry the operation.
    #[error("write failed")]
    WriteFail,

    /// The on-medium index no longer matches the in-memory handle, e.g. a page
    /// expected to be used turned out free. Only `reset` or `wipe` recover from this.
    #[error("index inconsistent")]
    Fatal,
}
