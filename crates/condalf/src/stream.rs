//! The record stream capability: what producers see.

use crate::error::{Error, PutError};
use crate::name::Name;
use crate::record::Record;

/// Display name of a record stream, shown in log lines.
pub type StreamName = Name<15>;

/// A polymorphic stream of records.
///
/// Implementations serialize their operations internally; producers can
/// share a stream across threads and never see its guts.
pub trait RecordStream: Send + Sync {
    /// The stream's display name.
    fn name(&self) -> &str;

    /// Append a record to the stream, taking ownership of it on success.
    ///
    /// On failure the record comes back inside the error, string payload
    /// intact.
    ///
    /// It is implementation-defined whether this blocks, and with it, what
    /// success means for the record's journey.
    fn put(&self, record: Record) -> Result<(), PutError>;

    /// Retrieve a record from the stream, blocking.
    fn get(&self) -> Result<Record, Error> {
        Err(Error::NotSupported)
    }

    /// Push whatever the stream has buffered towards its destination.
    fn flush(&self) -> Result<(), Error>;

    /// Flush and release the stream's resources. Further operations fail
    /// with `Invalid`.
    fn close(&self) -> Result<(), Error>;
}
