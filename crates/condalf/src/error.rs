use std::io;

use thiserror::Error;

use crate::driver::TransferJob;
use crate::record::Record;

/// Error kinds shared across the pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// A precondition was violated, or an invalidated instance was used.
    #[error("invalid argument or invalidated instance")]
    Invalid,
    /// A buffer or the underlying storage ran out of space.
    #[error("out of buffer or storage space")]
    NoSpace,
    /// The output buffer is too small to hold even a single record.
    ///
    /// The configuration is too tight to be useful for any encoding; swapping
    /// in a bigger buffer is the only way out.
    #[error("buffer too small for a single record")]
    NoBuffers,
    /// An asynchronous dispatch mailbox is full.
    #[error("dispatch mailbox full")]
    WouldBlock,
    /// The worker thread servicing the request is gone.
    #[error("worker thread is gone")]
    NoSuchProcess,
    /// The capability does not implement the requested operation.
    #[error("operation not supported")]
    NotSupported,
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl Error {
    /// Whether two errors are of the same kind.
    ///
    /// I/O errors compare by [`io::ErrorKind`].
    pub fn same_kind(&self, other: &Self) -> bool {
        use Error::*;
        match (self, other) {
            (Invalid, Invalid)
            | (NoSpace, NoSpace)
            | (NoBuffers, NoBuffers)
            | (WouldBlock, WouldBlock)
            | (NoSuchProcess, NoSuchProcess)
            | (NotSupported, NotSupported) => true,
            (Io(a), Io(b)) => a.kind() == b.kind(),
            _ => false,
        }
    }
}

/// Error returned by record-accepting operations.
///
/// The record which was passed in is handed back: a failed put has not taken
/// ownership of the caller's data, including any string payload.
#[derive(Debug, Error)]
#[error("record was not accepted")]
pub struct PutError {
    /// The record which was not accepted.
    pub record: Record,
    /// Why it was not accepted.
    #[source]
    pub source: Error,
}

impl PutError {
    pub(crate) fn new(record: Record, source: Error) -> Self {
        Self { record, source }
    }
}

/// Error returned by asynchronous transfer submission.
///
/// The job is handed back, and its completion has not been (and will not be)
/// invoked; cleanup remains with the caller.
#[derive(Debug, Error)]
#[error("transfer job was not enqueued")]
pub struct Rejected {
    /// The job which was not enqueued.
    pub job: TransferJob,
    /// Why it was not enqueued.
    #[source]
    pub source: Error,
}

impl Rejected {
    pub(crate) fn new(job: TransferJob, source: Error) -> Self {
        Self { job, source }
    }

    pub(crate) fn not_supported(job: TransferJob) -> Self {
        Self::new(job, Error::NotSupported)
    }
}
