//! The transfer driver capability: how an envelope leaves the device, or
//! reaches long-term storage. Consumers only ever see the trait.

use std::fmt;

use crate::error::{Error, Rejected};
use crate::vstorage::FileIo;

/// Invoked exactly once with the final status of an accepted transfer.
pub type Completion = Box<dyn FnOnce(Result<(), Error>) + Send>;

/// A single transfer: a file to read from (or write into) plus an optional
/// completion.
///
/// Ownership: whoever holds the job owns the file. A driver that accepts a
/// job through [`TransferDriver::try_send`] must eventually call
/// [`TransferJob::finish`], which invokes the completion and closes the file.
/// A rejected job travels back inside [`Rejected`] with the completion
/// untouched.
pub struct TransferJob {
    file: Box<dyn FileIo>,
    done: Option<Completion>,
}

impl TransferJob {
    pub fn new(file: Box<dyn FileIo>) -> Self {
        Self { file, done: None }
    }

    /// Attach a completion to be invoked with the final transfer status.
    pub fn on_done(mut self, done: Completion) -> Self {
        self.done = Some(done);
        self
    }

    pub fn file_mut(&mut self) -> &mut dyn FileIo {
        &mut *self.file
    }

    /// Report the final status and release the job's resources.
    pub fn finish(self, status: Result<(), Error>) {
        if let Some(done) = self.done {
            done(status);
        }
    }
}

impl fmt::Debug for TransferJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferJob")
            .field("has_completion", &self.done.is_some())
            .finish_non_exhaustive()
    }
}

/// Abstract capability for moving an envelope off-device or into long-term
/// storage.
///
/// Deletion of a driver maps to `Drop`; implementations that need to drain
/// outstanding work block there.
pub trait TransferDriver: Send + Sync {
    /// Start a send asynchronously. Never blocks: a job that cannot be
    /// enqueued right now comes back with `WouldBlock` (mailbox full) or
    /// `NoSuchProcess` (worker gone), and its completion will not be called.
    fn try_send(&self, job: TransferJob) -> Result<(), Rejected>;

    /// Send synchronously, blocking until the transfer completes or fails.
    fn send(&self, _file: &mut dyn FileIo) -> Result<(), Error> {
        Err(Error::NotSupported)
    }

    /// Start a receive asynchronously.
    fn try_recv(&self, job: TransferJob) -> Result<(), Rejected> {
        Err(Rejected::not_supported(job))
    }

    /// Receive synchronously, blocking until the transfer completes or
    /// fails.
    fn recv(&self, _file: &mut dyn FileIo) -> Result<(), Error> {
        Err(Error::NotSupported)
    }
}
